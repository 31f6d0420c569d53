use dotenvy::dotenv;
use tracing::{error, info};
use uuid::Uuid;

use service::Filter;

fn init_logging() {
    // 提前加载 .env，使得 RUST_LOG、DATABASE_URL 等环境变量生效
    dotenv().ok();
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => common::utils::logging::init_logging_json(),
        _ => common::utils::logging::init_logging_default(),
    }
    info!(service = "store", event = "logger_init", "tracing subscriber initialized");
}

/// Select the backend, then print a short summary of what it holds.
async fn run() -> anyhow::Result<()> {
    let cfg = configs::AppConfig::load_and_validate()?;
    let store = service::build_store(&cfg).await;

    let top = store.list_users("-exp", 10, Filter::new()).await?;
    let groups = store.list_groups("-commandCount", 0, Filter::new()).await?;
    info!(service = "store", event = "summary", mode = %store.mode(), groups = groups.len(), "store opened");

    for (rank, user) in top.iter().enumerate() {
        let shown = if user.name.is_empty() { user.id.as_str() } else { user.name.as_str() };
        println!("{:>2}. {shown:<24} lvl {:<3} exp {:<6} coins {}", rank + 1, user.level, user.exp, user.coins);
    }

    // 最活跃群组的发言排行
    if let Some(busiest) = groups.first() {
        println!("most active group {} ({} commands)", busiest.id, busiest.command_count);
        for (member, count) in busiest.message_counts.ranked().into_iter().take(5) {
            let role = busiest.member(member).map_or("-", |m| m.role.as_str());
            println!("    {member:<32} {role:<8} {count} messages");
        }
    }
    Ok(())
}

fn main() -> std::process::ExitCode {
    init_logging();

    let run_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    // Panic 钩子：捕获异常并输出错误日志
    std::panic::set_hook(Box::new(move |info| {
        error!(service = "store", event = "panic", %run_id, pid, message = %info, "unhandled panic occurred");
    }));

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "store", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return std::process::ExitCode::FAILURE;
        }
    };

    info!(service = "store", event = "start", %run_id, pid, version, "store tool starting");

    rt.block_on(async move {
        tokio::select! {
            res = run() => match res {
                Ok(()) => std::process::ExitCode::SUCCESS,
                Err(e) => {
                    error!(service = "store", event = "run_failed", error = %e, "store run returned error");
                    std::process::ExitCode::FAILURE
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!(service = "store", event = "shutdown_signal", %run_id, pid, "received Ctrl+C, shutting down");
                std::process::ExitCode::SUCCESS
            }
        }
    })
}
