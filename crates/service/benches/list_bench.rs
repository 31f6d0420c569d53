use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;

use models::UserUpdate;
use service::storage::JsonSnapshotStore;
use service::{Filter, Store};

fn bench_leaderboard(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let path = std::env::temp_dir().join(format!("list_bench_{}.json", uuid::Uuid::new_v4()));

    // seed 2k users outside of the measured loop
    let store = rt.block_on(async {
        let backend = JsonSnapshotStore::new(&path, Duration::from_secs(30)).await;
        let store = Arc::new(Store::new(backend, "!"));
        for i in 0..2_000i64 {
            let id = format!("{i}@s.whatsapp.net");
            store.update_user(&id, UserUpdate::default().exp(i * 7 % 1_000)).await.unwrap();
        }
        store
    });

    c.bench_function("file_list_users_top10", |b| {
        b.iter(|| {
            let top = rt.block_on(store.list_users("-exp", 10, Filter::new())).unwrap();
            assert_eq!(top.len(), 10);
        });
    });

    let _ = std::fs::remove_file(&path);
}

criterion_group!(benches, bench_leaderboard);
criterion_main!(benches);
