use crate::{Result, UnlockError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Mutex as TokioMutex;

/// Removals and puts committed together by [`KeyValueStore::apply`].
///
/// Removals are applied first, so a key both removed and put ends up with
/// the put value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    puts: Vec<(String, Value)>,
    removes: Vec<String>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: Value) {
        self.puts.push((key.into(), value));
    }

    pub fn remove(&mut self, key: impl Into<String>) {
        self.removes.push(key.into());
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.removes.is_empty()
    }

    /// Every key the batch touches
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.removes
            .iter()
            .map(String::as_str)
            .chain(self.puts.iter().map(|(key, _)| key.as_str()))
    }

    fn apply_to(self, map: &mut Map<String, Value>) {
        for key in self.removes {
            map.remove(&key);
        }
        for (key, value) in self.puts {
            map.insert(key, value);
        }
    }
}

impl From<Vec<(String, Value)>> for WriteBatch {
    fn from(puts: Vec<(String, Value)>) -> Self {
        Self {
            puts,
            removes: Vec::new(),
        }
    }
}

/// Durable key-value store the engine persists through.
///
/// Writes are last-write-wins per key. `apply` must commit the whole batch
/// or none of it.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Keys starting with `prefix`, sorted
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    async fn apply(&self, batch: WriteBatch) -> Result<()>;

    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()> {
        self.apply(WriteBatch::from(entries)).await
    }
}

/// In-process store, mainly for tests
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
    fail_writes: AtomicBool,
    failing_keys: Mutex<BTreeSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (reads keep working).
    ///
    /// Passing `false` also clears failures set with [`fail_writes_to`](Self::fail_writes_to).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
        if !fail {
            if let Ok(mut keys) = self.failing_keys.lock() {
                keys.clear();
            }
        }
    }

    /// Reject any write that touches `key`
    pub fn fail_writes_to(&self, key: impl Into<String>) {
        if let Ok(mut keys) = self.failing_keys.lock() {
            keys.insert(key.into());
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn check_writable<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(UnlockError::persistence("memory store rejected write"));
        }
        let failing = self
            .failing_keys
            .lock()
            .map_err(|_| UnlockError::persistence("memory store lock poisoned"))?;
        if let Some(key) = keys.into_iter().find(|key| failing.contains(*key)) {
            return Err(UnlockError::persistence(format!(
                "memory store rejected write to {key}"
            )));
        }
        Ok(())
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>> {
        self.entries
            .lock()
            .map_err(|_| UnlockError::persistence("memory store lock poisoned"))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.check_writable([key])?;
        self.entries()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_writable([key])?;
        self.entries()?.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries()?
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn apply(&self, batch: WriteBatch) -> Result<()> {
        self.check_writable(batch.keys())?;
        let mut guard = self.entries()?;
        for key in batch.removes {
            guard.remove(&key);
        }
        for (key, value) in batch.puts {
            guard.insert(key, value);
        }
        Ok(())
    }
}

/// Store backed by one flat JSON object on disk.
///
/// Each write serializes the whole object to a temp file and renames it into
/// place; the in-memory copy is only updated after the rename succeeds.
pub struct JsonFileStore {
    path: PathBuf,
    cache: TokioMutex<Option<Map<String, Value>>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: TokioMutex::new(None),
        }
    }

    /// `<data dir>/codeplay/state.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("codeplay").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(UnlockError::persistence(format!(
                    "read {}: {err}",
                    self.path.display()
                )))
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(UnlockError::persistence(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
            Err(err) => Err(UnlockError::persistence(format!(
                "parse {}: {err}",
                self.path.display()
            ))),
        }
    }

    async fn write(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| UnlockError::persistence(format!("create {}: {e}", parent.display())))?;
        }
        let bytes = serde_json::to_vec_pretty(map)
            .map_err(|e| UnlockError::persistence(format!("encode store: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| UnlockError::persistence(format!("write {}: {e}", tmp.display())))?;
        if let Err(err) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(UnlockError::persistence(format!(
                "replace {}: {err}",
                self.path.display()
            )));
        }
        Ok(())
    }

    async fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Map<String, Value>) + Send,
    {
        let mut guard = self.cache.lock().await;
        let current = match guard.as_ref() {
            Some(map) => map.clone(),
            None => self.load().await?,
        };
        let mut next = current;
        apply(&mut next);
        self.write(&next).await?;
        *guard = Some(next);
        Ok(())
    }

    async fn read<T, F>(&self, view: F) -> Result<T>
    where
        F: FnOnce(&Map<String, Value>) -> T + Send,
    {
        let mut guard = self.cache.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let map = guard
            .as_ref()
            .ok_or_else(|| UnlockError::persistence("store cache unavailable"))?;
        Ok(view(map))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.read(|map| map.get(key).cloned()).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let key = key.to_string();
        self.update(move |map| {
            map.insert(key, value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.update(move |map| {
            map.remove(&key);
        })
        .await
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.read(|map| {
            let mut keys: Vec<String> = map
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            keys
        })
        .await
    }

    async fn apply(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.update(move |map| batch.apply_to(map)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn memory_store_lists_by_prefix() {
        let store = MemoryStore::new();
        store.set("codeplay.a", json!(1)).await.expect("set");
        store.set("codeplay.b", json!(2)).await.expect("set");
        store.set("other.c", json!(3)).await.expect("set");
        assert_eq!(
            store.list_keys("codeplay.").await.expect("keys"),
            vec!["codeplay.a".to_string(), "codeplay.b".to_string()]
        );
        store.remove("codeplay.a").await.expect("remove");
        assert_eq!(store.get("codeplay.a").await.expect("get"), None);
    }

    #[tokio::test]
    async fn memory_store_failed_writes_leave_data_untouched() {
        let store = MemoryStore::new();
        store.set("k", json!(1)).await.expect("set");
        store.set_fail_writes(true);
        assert!(store.set("k", json!(2)).await.is_err());
        assert!(store
            .set_many(vec![("k".into(), json!(3)), ("j".into(), json!(4))])
            .await
            .is_err());
        assert_eq!(store.get("k").await.expect("get"), Some(json!(1)));
        assert_eq!(store.get("j").await.expect("get"), None);
    }

    #[tokio::test]
    async fn memory_store_rejects_whole_batch_for_one_failing_key() {
        let store = MemoryStore::new();
        store.set("codeplay.a", json!(1)).await.expect("set");
        store.set("codeplay.b", json!(2)).await.expect("set");
        store.fail_writes_to("codeplay.c");

        let mut batch = WriteBatch::new();
        batch.remove("codeplay.a");
        batch.put("codeplay.b", json!(20));
        batch.put("codeplay.c", json!(30));
        assert!(store.apply(batch).await.is_err());
        assert_eq!(store.get("codeplay.a").await.expect("get"), Some(json!(1)));
        assert_eq!(store.get("codeplay.b").await.expect("get"), Some(json!(2)));
        assert!(store.set("codeplay.b", json!(3)).await.is_ok());

        store.set_fail_writes(false);
        assert!(store.set("codeplay.c", json!(4)).await.is_ok());
    }

    #[tokio::test]
    async fn json_file_store_round_trips_through_disk() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("state.json");

        let store = JsonFileStore::new(&path);
        assert_eq!(store.path(), path.as_path());
        assert_eq!(store.get("codeplay.x").await.expect("get"), None);
        store
            .set_many(vec![
                ("codeplay.x".into(), json!({"status": "locked", "progress_lines": 3})),
                ("codeplay.y".into(), json!(9)),
            ])
            .await
            .expect("set_many");
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let mut batch = WriteBatch::new();
        batch.remove("codeplay.x");
        batch.put("codeplay.z", json!(true));
        store.apply(batch).await.expect("apply");

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("codeplay.y").await.expect("get"), Some(json!(9)));
        assert_eq!(reopened.get("codeplay.x").await.expect("get"), None);
        assert_eq!(
            reopened.list_keys("codeplay.").await.expect("keys"),
            vec!["codeplay.y".to_string(), "codeplay.z".to_string()]
        );
    }

    #[tokio::test]
    async fn json_file_store_reports_corrupt_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").expect("write");

        let store = JsonFileStore::new(&path);
        let err = store.get("codeplay.x").await.expect_err("corrupt");
        assert!(matches!(err, UnlockError::PersistenceFailure(_)));
    }

    #[tokio::test]
    async fn json_file_store_skips_empty_batches() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("state.json");

        let store = JsonFileStore::new(&path);
        store.apply(WriteBatch::new()).await.expect("apply");
        assert!(!path.exists());
    }
}
