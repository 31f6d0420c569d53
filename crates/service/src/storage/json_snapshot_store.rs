use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use models::{Collection, Document, Patch};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    fs,
    sync::{Mutex, RwLock},
};
use tracing::{debug, error, warn};

use super::{BackendMode, DocumentBackend};
use crate::errors::StoreError;
use crate::query::ListQuery;

/// How long a loaded snapshot is served from memory.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Entire contents of the JSON data file: `{"users": {..}, "groups": {..}}`,
/// each mapping identifier to document. Key order is preserved.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: Document,
    #[serde(default)]
    pub groups: Document,
}

impl Snapshot {
    pub fn collection(&self, collection: Collection) -> &Document {
        match collection {
            Collection::Users => &self.users,
            Collection::Groups => &self.groups,
        }
    }

    pub fn collection_mut(&mut self, collection: Collection) -> &mut Document {
        match collection {
            Collection::Users => &mut self.users,
            Collection::Groups => &mut self.groups,
        }
    }

    /// Stored document for `id`, with `id` filled in from the key.
    pub fn document(&self, collection: Collection, id: &str) -> Option<Document> {
        self.collection(collection).get(id).map(|v| with_id(id, v))
    }

    /// Documents of a collection in storage order.
    pub fn documents(&self, collection: Collection) -> Vec<Document> {
        self.collection(collection).iter().map(|(id, v)| with_id(id, v)).collect()
    }
}

fn with_id(id: &str, value: &Value) -> Document {
    // Entries that are not objects are treated as empty records.
    let mut doc = value.as_object().cloned().unwrap_or_default();
    doc.insert("id".into(), Value::String(id.to_string()));
    doc
}

struct CachedSnapshot {
    snapshot: Arc<Snapshot>,
    captured_at: Instant,
}

/// JSON file backend with a time-bounded, write-through snapshot cache.
///
/// I/O failures never surface to callers: a failed read yields an empty
/// snapshot, a failed write is logged and the in-memory copy stays current.
pub struct JsonSnapshotStore {
    file_path: PathBuf,
    ttl: Duration,
    cache: RwLock<Option<CachedSnapshot>>,
    // Serialises load -> mutate -> save sequences within this process.
    write_lock: Mutex<()>,
}

impl JsonSnapshotStore {
    /// Open the store at `path`. Creates parent directories and an empty data
    /// file if missing.
    pub async fn new<P: Into<PathBuf>>(path: P, ttl: Duration) -> Arc<Self> {
        let store = Self {
            file_path: path.into(),
            ttl,
            cache: RwLock::new(None),
            write_lock: Mutex::new(()),
        };
        if fs::metadata(&store.file_path).await.is_err() {
            store.bootstrap().await;
        }
        Arc::new(store)
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    async fn bootstrap(&self) {
        if let Err(e) = write_file(&self.file_path, &Snapshot::default()).await {
            error!(path = %self.file_path.display(), error = %e, "failed to create JSON database");
        } else {
            debug!(path = %self.file_path.display(), "created empty JSON database");
        }
    }

    /// Current snapshot, from cache while it is fresh.
    ///
    /// A stale cache is refilled under the cache write lock, the same lock
    /// `persist` holds while writing, so a file read never races a save and an
    /// older read never replaces a newer snapshot.
    pub async fn load(&self) -> Arc<Snapshot> {
        if let Some(snapshot) = self.fresh(&*self.cache.read().await) {
            return snapshot;
        }

        let mut cache = self.cache.write().await;
        // refreshed or saved by someone else while we waited
        if let Some(snapshot) = self.fresh(&cache) {
            return snapshot;
        }
        match self.read_file().await {
            Some(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *cache = Some(CachedSnapshot { snapshot: Arc::clone(&snapshot), captured_at: Instant::now() });
                snapshot
            }
            None => Arc::new(Snapshot::default()),
        }
    }

    fn fresh(&self, cache: &Option<CachedSnapshot>) -> Option<Arc<Snapshot>> {
        cache
            .as_ref()
            .filter(|cached| cached.captured_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.snapshot))
    }

    /// `None` when the file cannot be read or parsed; the failure is logged.
    async fn read_file(&self) -> Option<Snapshot> {
        let bytes = match fs::read(&self.file_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.bootstrap().await;
                return None;
            }
            Err(e) => {
                error!(path = %self.file_path.display(), error = %e, "failed to read JSON database");
                return None;
            }
        };
        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                error!(path = %self.file_path.display(), error = %e, "failed to parse JSON database");
                None
            }
        }
    }

    /// Write the whole snapshot to disk and make it the cached copy.
    pub async fn save(&self, snapshot: Snapshot) {
        let _guard = self.write_lock.lock().await;
        self.persist(snapshot).await;
    }

    /// Run `f` on the current snapshot and save the result, holding the write
    /// lock for the whole sequence.
    pub async fn modify<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut Snapshot) -> R,
    {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = Snapshot::clone(&*self.load().await);
        let out = f(&mut snapshot);
        self.persist(snapshot).await;
        out
    }

    async fn persist(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        // Held through the disk write so no reader sees the old file after this point.
        let mut cache = self.cache.write().await;
        *cache = Some(CachedSnapshot { snapshot: Arc::clone(&snapshot), captured_at: Instant::now() });
        if let Err(e) = write_file(&self.file_path, &snapshot).await {
            error!(path = %self.file_path.display(), error = %e, "failed to save JSON database");
        }
    }
}

/// Pretty-printed write through a sibling temp file so readers never see a
/// half-written document.
async fn write_file(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|e| StoreError::Io(e.to_string()))?;
    }
    let data = serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Io(e.to_string()))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, data).await.map_err(|e| StoreError::Io(e.to_string()))?;
    fs::rename(&tmp, path).await.map_err(|e| StoreError::Io(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl DocumentBackend for JsonSnapshotStore {
    fn mode(&self) -> BackendMode {
        BackendMode::File
    }

    async fn get_or_create(&self, collection: Collection, id: &str, defaults: &Document) -> Result<Document, StoreError> {
        if let Some(doc) = self.load().await.document(collection, id) {
            return Ok(doc);
        }
        let doc = self
            .modify(|snapshot| {
                let entry = snapshot
                    .collection_mut(collection)
                    .entry(id.to_string())
                    .or_insert_with(|| Value::Object(defaults.clone()));
                with_id(id, entry)
            })
            .await;
        Ok(doc)
    }

    async fn merge_update(
        &self,
        collection: Collection,
        id: &str,
        defaults: &Document,
        patch: &Patch,
    ) -> Result<Document, StoreError> {
        let doc = self
            .modify(|snapshot| {
                let entry = snapshot
                    .collection_mut(collection)
                    .entry(id.to_string())
                    .or_insert_with(|| Value::Object(defaults.clone()));
                if !entry.is_object() {
                    warn!(%collection, id, "stored record was not an object; replacing with defaults");
                    *entry = Value::Object(defaults.clone());
                }
                if let Value::Object(doc) = &mut *entry {
                    patch.apply(doc);
                }
                with_id(id, entry)
            })
            .await;
        Ok(doc)
    }

    async fn list(&self, collection: Collection, query: &ListQuery, defaults: &Document) -> Result<Vec<Document>, StoreError> {
        let snapshot = self.load().await;
        Ok(query.run(snapshot.documents(collection), defaults))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::FieldPath;
    use serde_json::json;

    fn tmp_path(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("json_snapshot_store_{}", uuid::Uuid::new_v4()))
            .join(format!("{tag}.json"))
    }

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    async fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir).await;
        }
    }

    #[tokio::test]
    async fn bootstrap_writes_empty_document() -> Result<(), anyhow::Error> {
        let path = tmp_path("bootstrap");
        let store = JsonSnapshotStore::new(&path, DEFAULT_CACHE_TTL).await;
        let on_disk: Value = serde_json::from_slice(&fs::read(&path).await?)?;
        assert_eq!(on_disk, json!({"users": {}, "groups": {}}));
        assert_eq!(*store.load().await, Snapshot::default());
        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn latest_save_wins_for_other_callers() -> Result<(), anyhow::Error> {
        let path = tmp_path("saves");
        let store = JsonSnapshotStore::new(&path, DEFAULT_CACHE_TTL).await;
        let other = Arc::clone(&store);

        let mut first = Snapshot::default();
        first.users.insert("a".into(), json!({"coins": 1}));
        store.save(first).await;
        let mut second = Snapshot::default();
        second.users.insert("a".into(), json!({"coins": 2}));
        store.save(second.clone()).await;

        assert_eq!(*other.load().await, second);
        let on_disk: Snapshot = serde_json::from_slice(&fs::read(&path).await?)?;
        assert_eq!(on_disk, second);
        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn cache_hides_external_edits_until_expiry() -> Result<(), anyhow::Error> {
        let path = tmp_path("ttl");
        let store = JsonSnapshotStore::new(&path, Duration::from_millis(100)).await;
        assert!(store.load().await.users.is_empty());

        fs::write(&path, br#"{"users": {"x": {"coins": 7}}, "groups": {}}"#).await?;
        assert!(store.load().await.users.is_empty(), "fresh cache must not touch disk");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.load().await.users["x"], json!({"coins": 7}));
        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_or_partial_files_degrade_to_empty() -> Result<(), anyhow::Error> {
        let path = tmp_path("corrupt");
        let store = JsonSnapshotStore::new(&path, Duration::ZERO).await;

        fs::write(&path, b"{not json").await?;
        assert_eq!(*store.load().await, Snapshot::default());

        fs::write(&path, br#"{"users": {"u": {}}}"#).await?;
        let snap = store.load().await;
        assert!(snap.groups.is_empty());
        assert_eq!(snap.document(Collection::Users, "u"), Some(doc(json!({"id": "u"}))));
        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_first_access_creates_one_record() -> Result<(), anyhow::Error> {
        let path = tmp_path("race");
        let store = JsonSnapshotStore::new(&path, DEFAULT_CACHE_TTL).await;
        let mut tasks = Vec::new();
        for n in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let defaults = doc(json!({"id": "same", "joinDate": n}));
                store.get_or_create(Collection::Users, "same", &defaults).await
            }));
        }
        let mut seen = Vec::new();
        for t in tasks {
            seen.push(t.await??);
        }
        assert!(seen.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.load().await.users.len(), 1);
        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test]
    async fn merge_update_touches_only_patched_paths() -> Result<(), anyhow::Error> {
        let path = tmp_path("merge");
        let store = JsonSnapshotStore::new(&path, DEFAULT_CACHE_TTL).await;
        let defaults = doc(json!({"id": "g", "settings": {"prefix": "!", "welcomeDisabled": false}}));
        store.get_or_create(Collection::Groups, "g", &defaults).await?;

        let patch = Patch::new().set(FieldPath::parse("settings.welcomeDisabled")?, true);
        let out = store.merge_update(Collection::Groups, "g", &defaults, &patch).await?;
        assert_eq!(out["settings"], json!({"prefix": "!", "welcomeDisabled": true}));

        // reopen from disk
        let reopened = JsonSnapshotStore::new(&path, DEFAULT_CACHE_TTL).await;
        assert_eq!(reopened.load().await.document(Collection::Groups, "g"), Some(out));
        cleanup(&path).await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn refills_never_drop_concurrent_writes() -> Result<(), anyhow::Error> {
        let path = tmp_path("refill");
        let store = JsonSnapshotStore::new(&path, Duration::from_millis(1)).await;
        let defaults = doc(json!({"id": "u", "coins": 0}));
        let inc = Patch::new().inc(FieldPath::parse("coins")?, 1);

        let mut tasks = Vec::new();
        for n in 0..400 {
            let (store, defaults, inc) = (Arc::clone(&store), defaults.clone(), inc.clone());
            tasks.push(tokio::spawn(async move {
                if n % 4 == 0 {
                    store.merge_update(Collection::Users, "u", &defaults, &inc).await.map(|_| ())
                } else {
                    store.load().await;
                    Ok(())
                }
            }));
        }
        for t in tasks {
            t.await??;
        }
        assert_eq!(store.load().await.users["u"]["coins"], json!(100));
        let on_disk: Snapshot = serde_json::from_slice(&fs::read(&path).await?)?;
        assert_eq!(on_disk.users["u"]["coins"], json!(100));
        cleanup(&path).await;
        Ok(())
    }
}
