use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use models::{GroupUpdate, UserCounter, UserUpdate};
use serde_json::{json, Value};
use service::storage::JsonSnapshotStore;
use service::{BackendMode, Filter, Store, StoreError};

struct Fixture {
    dir: PathBuf,
    path: PathBuf,
    store: Arc<Store>,
}

impl Fixture {
    async fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("file_store_{}", uuid::Uuid::new_v4()));
        let path = dir.join("database.json");
        Self::at(dir, path).await
    }

    async fn at(dir: PathBuf, path: PathBuf) -> Self {
        Self::with_ttl(dir, path, Duration::from_secs(30)).await
    }

    async fn with_ttl(dir: PathBuf, path: PathBuf, ttl: Duration) -> Self {
        let backend = JsonSnapshotStore::new(&path, ttl).await;
        let store = Arc::new(Store::new(backend, "!"));
        Self { dir, path, store }
    }

    async fn on_disk(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&tokio::fs::read(&self.path).await?)?)
    }

    async fn cleanup(self) {
        let _ = tokio::fs::remove_dir_all(&self.dir).await;
    }
}

#[tokio::test]
async fn unseen_user_gets_defaults_once() -> Result<()> {
    let fx = Fixture::new().await;
    assert_eq!(fx.store.mode(), BackendMode::File);

    let first = fx.store.get_user("1@x", None).await?;
    assert_eq!(first.id, "1@x");
    assert_eq!((first.coins, first.exp, first.level), (0, 0, 1));
    assert_eq!(first.last_daily_reward, None);

    let again = fx.store.get_user("1@x", None).await?;
    assert_eq!(first, again);
    fx.cleanup().await;
    Ok(())
}

#[tokio::test]
async fn concurrent_first_access_creates_one_user() -> Result<()> {
    let fx = Fixture::new().await;
    let mut tasks = Vec::new();
    for _ in 0..20 {
        let store = Arc::clone(&fx.store);
        tasks.push(tokio::spawn(async move { store.get_user("42@s.whatsapp.net", None).await }));
    }
    let mut join_dates = Vec::new();
    for t in tasks {
        join_dates.push(t.await??.join_date);
    }
    assert!(join_dates.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(fx.on_disk().await?["users"].as_object().map(|m| m.len()), Some(1));
    fx.cleanup().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn increments_survive_concurrent_readers() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("file_store_{}", uuid::Uuid::new_v4()));
    let path = dir.join("database.json");
    let fx = Fixture::with_ttl(dir, path, Duration::from_millis(2)).await;
    let id = "9@s.whatsapp.net";

    let mut tasks = Vec::new();
    for n in 0..600 {
        let store = Arc::clone(&fx.store);
        tasks.push(tokio::spawn(async move {
            match n % 3 {
                0 => store.increment_user(id, UserCounter::Coins, 1).await.map(|_| ()),
                1 => store.list_users("-coins", 5, Filter::new()).await.map(|_| ()),
                _ => store.get_user(id, None).await.map(|_| ()),
            }
        }));
    }
    for t in tasks {
        t.await??;
    }

    assert_eq!(fx.store.get_user(id, None).await?.coins, 200);
    assert_eq!(fx.on_disk().await?["users"][id]["coins"], json!(200));
    fx.cleanup().await;
    Ok(())
}

#[tokio::test]
async fn update_replaces_only_supplied_fields() -> Result<()> {
    let fx = Fixture::new().await;
    fx.store.get_user("1@x", None).await?;
    fx.store.update_user("1@x", UserUpdate::default().coins(500)).await?;

    let user = fx.store.get_user("1@x", None).await?;
    assert_eq!(user.coins, 500);
    assert_eq!(user.exp, 0);
    assert_eq!(user.level, 1);
    fx.cleanup().await;
    Ok(())
}

#[tokio::test]
async fn name_hint_refreshes_stored_name() -> Result<()> {
    let fx = Fixture::new().await;
    assert_eq!(fx.store.get_user("7@s.whatsapp.net", Some("Ana")).await?.name, "Ana");
    assert_eq!(fx.store.get_user("7@s.whatsapp.net", Some("Ana B")).await?.name, "Ana B");
    assert_eq!(fx.store.get_user("7@s.whatsapp.net", None).await?.name, "Ana B");
    assert_eq!(fx.on_disk().await?["users"]["7@s.whatsapp.net"]["name"], json!("Ana B"));
    fx.cleanup().await;
    Ok(())
}

#[tokio::test]
async fn leaderboard_is_sorted_limited_and_stable() -> Result<()> {
    let fx = Fixture::new().await;
    for i in 0..15 {
        let id = format!("{i}@s.whatsapp.net");
        fx.store.get_user(&id, None).await?;
        fx.store.update_user(&id, UserUpdate::default().exp((i % 4) * 10)).await?;
    }

    let top = fx.store.list_users("exp", 10, Filter::new()).await?;
    assert_eq!(top.len(), 10);
    assert!(top.windows(2).all(|w| w[0].exp >= w[1].exp));
    // exp 30 belongs to users 3, 7, 11 in that insertion order
    let leaders: Vec<_> = top.iter().take(3).map(|u| u.id.as_str()).collect();
    assert_eq!(leaders, ["3@s.whatsapp.net", "7@s.whatsapp.net", "11@s.whatsapp.net"]);

    let lowest = fx.store.list_users("+exp", 0, Filter::new()).await?;
    assert_eq!(lowest.len(), 15);
    assert_eq!(lowest[0].id, "0@s.whatsapp.net");

    let tens = fx.store.list_users("-exp", 0, Filter::new().eq("exp", 10)).await?;
    assert_eq!(tens.iter().map(|u| u.id.as_str()).collect::<Vec<_>>(), ["1@s.whatsapp.net", "5@s.whatsapp.net", "9@s.whatsapp.net", "13@s.whatsapp.net"]);
    fx.cleanup().await;
    Ok(())
}

#[tokio::test]
async fn settings_write_keeps_siblings() -> Result<()> {
    let fx = Fixture::new().await;
    fx.store.get_group("1-2@g.us").await?;
    fx.store.update_group("1-2@g.us", GroupUpdate::default().welcome_disabled(true)).await?;
    let group = fx.store.update_group("1-2@g.us", GroupUpdate::default().admin_only(true)).await?;

    assert!(group.settings.admin_only);
    assert!(group.settings.welcome_disabled);
    assert_eq!(group.settings.prefix, "!");
    fx.cleanup().await;
    Ok(())
}

#[tokio::test]
async fn tracking_counts_messages_per_member() -> Result<()> {
    let fx = Fixture::new().await;
    let member = "5511999@s.whatsapp.net";
    fx.store.track_message("g@g.us", member, Some("Bia")).await?;
    let (user, group) = fx.store.track_message("g@g.us", member, None).await?;

    assert_eq!(user.message_count, 2);
    assert_eq!(user.name, "Bia");
    assert_eq!(group.message_counts.get(member), 2);
    assert_eq!(fx.on_disk().await?["groups"]["g@g.us"]["messageCounts"][member], json!(2));

    let user = fx.store.track_command(member, None, Some("g@g.us")).await?;
    assert_eq!(user.command_count, 1);
    assert_eq!(fx.store.get_group("g@g.us").await?.command_count, 1);

    let user = fx.store.increment_user(member, UserCounter::Coins, 25).await?;
    assert_eq!(user.coins, 25);
    fx.cleanup().await;
    Ok(())
}

#[tokio::test]
async fn legacy_documents_are_repaired_on_read() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("file_store_{}", uuid::Uuid::new_v4()));
    let path = dir.join("database.json");
    tokio::fs::create_dir_all(&dir).await?;
    let seeded = json!({
        "users": {"u@s.whatsapp.net": {"coins": "abc", "exp": 12.9}},
        "groups": {"g@g.us": {
            "settings": {"prefix": ""},
            "messageCounts": [{"id": "u@s.whatsapp.net", "count": 4}]
        }}
    });
    tokio::fs::write(&path, serde_json::to_vec(&seeded)?).await?;
    let fx = Fixture::at(dir, path).await;

    let user = fx.store.get_user("u@s.whatsapp.net", None).await?;
    assert_eq!(user.coins, 0);
    assert_eq!(user.exp, 12);

    let group = fx.store.get_group("g@g.us").await?;
    assert_eq!(group.settings.prefix, "!");
    assert_eq!(group.message_counts.get("u@s.whatsapp.net"), 4);
    let stored = &fx.on_disk().await?["groups"]["g@g.us"];
    assert_eq!(stored["settings"]["prefix"], json!("!"));
    assert_eq!(stored["messageCounts"], json!({"u@s.whatsapp.net": 4}));

    let (_, group) = fx.store.track_message("g@g.us", "u@s.whatsapp.net", None).await?;
    assert_eq!(group.message_counts.get("u@s.whatsapp.net"), 5);
    fx.cleanup().await;
    Ok(())
}

#[tokio::test]
async fn empty_ids_are_rejected() -> Result<()> {
    let fx = Fixture::new().await;
    assert!(matches!(fx.store.get_user("", None).await, Err(StoreError::Validation(_))));
    assert!(matches!(fx.store.get_group("").await, Err(StoreError::Validation(_))));
    assert!(matches!(
        fx.store.list_users("", 0, Filter::new()).await,
        Err(StoreError::Validation(_))
    ));
    fx.cleanup().await;
    Ok(())
}
