//! Flat ordered keyspace over a single redb database.
//!
//! Every table in the layer shares this one keyspace; namespacing is done by
//! key prefixing in [`crate::table`], never here. The store only knows about
//! byte-string keys, JSON values and ascending ranges.

use std::ops::Bound;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use redb::{Database, TableDefinition};
use serde_json::Value;

use crate::error::{Error, Result};

/// The single redb table backing the whole layer.
const KEYSPACE: TableDefinition<&str, &[u8]> = TableDefinition::new("keyspace");

/// Hook invoked when the store begins closing.
pub type ClosingHook = Box<dyn Fn() + Send + Sync>;

/// Ordered byte-string key-value store with an open/close/destroy lifecycle.
///
/// All operations on a closed store fail immediately with
/// [`Error::StoreClosed`]; nothing is queued or retried.
pub struct Store {
    path: PathBuf,
    db: RwLock<Option<Database>>,
    closing_hooks: Mutex<Vec<ClosingHook>>,
}

impl Store {
    /// Open or create the store at the given file path.
    ///
    /// Creates parent directories if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        tracing::info!("Opening store at: {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    tracing::error!("Failed to create store directory: {}", e);
                    Error::Io(e)
                })?;
            }
        }

        let db = Database::create(&path)?;

        // Initialize the keyspace on first run
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(KEYSPACE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            path,
            db: RwLock::new(Some(db)),
            closing_hooks: Mutex::new(Vec::new()),
        })
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let guard = self.db.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(db) => f(db),
            None => Err(Error::StoreClosed),
        }
    }

    /// Fetch the value stored under `key`.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.with_db(|db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(KEYSPACE)?;
            match table.get(key)? {
                Some(guard) => Ok(serde_json::from_slice(guard.value())?),
                None => Err(Error::NotFound(key.to_string())),
            }
        })
    }

    /// Write `value` under `key`, replacing any previous value.
    pub fn put(&self, key: &str, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.with_db(|db| {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(KEYSPACE)?;
                table.insert(key, bytes.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })
    }

    /// Remove `key` if present. Removing an absent key is not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.with_db(|db| {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(KEYSPACE)?;
                table.remove(key)?;
            }
            write_txn.commit()?;
            Ok(())
        })
    }

    /// Ascending snapshot of all `(key, value)` pairs within the bounds.
    ///
    /// The snapshot is taken inside one read transaction; writes after the
    /// scan opens are not observed.
    pub fn scan(&self, lower: Bound<String>, upper: Bound<String>) -> Result<Vec<(String, Value)>> {
        self.with_db(|db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(KEYSPACE)?;
            let bounds = (bound_as_str(&lower), bound_as_str(&upper));
            let mut items = Vec::new();
            for entry in table.range::<&str>(bounds)? {
                let (key, value) = entry?;
                items.push((
                    key.value().to_string(),
                    serde_json::from_slice(value.value())?,
                ));
            }
            Ok(items)
        })
    }

    /// True once [`Store::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.db.read().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    /// Register a hook fired once when the store begins closing.
    ///
    /// Hooks must not block; a panicking hook is contained and logged.
    pub fn on_closing(&self, hook: ClosingHook) {
        self.closing_hooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(hook);
    }

    /// Release the store. Idempotent; closing hooks fire on the first call.
    pub fn close(&self) -> Result<()> {
        let released = {
            let mut guard = self.db.write().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if released.is_some() {
            tracing::info!("Closing store at: {:?}", self.path);
            let hooks = std::mem::take(
                &mut *self.closing_hooks.lock().unwrap_or_else(|e| e.into_inner()),
            );
            for hook in &hooks {
                if catch_unwind(AssertUnwindSafe(hook)).is_err() {
                    tracing::warn!("Closing hook panicked; ignoring");
                }
            }
        }
        Ok(())
    }

    /// Close the store and irreversibly remove its backing file.
    ///
    /// Succeeds even when the store was already closed.
    pub fn destroy(&self) -> Result<()> {
        self.close()?;
        if self.path.exists() {
            tracing::info!("Destroying store at: {:?}", self.path);
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn bound_as_str(bound: &Bound<String>) -> Bound<&str> {
    match bound {
        Bound::Included(s) => Bound::Included(s.as_str()),
        Bound::Excluded(s) => Bound::Excluded(s.as_str()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> Store {
        Store::open(dir.path().join("test.db")).unwrap()
    }

    #[test]
    fn test_put_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let value = json!({"joe": "blow", "n": 4.5});
        store.put("a:k", &value).unwrap();
        assert_eq!(store.get("a:k").unwrap(), value);
    }

    #[test]
    fn test_get_missing_key() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let err = store.get("nope").unwrap_err();
        assert!(matches!(err, Error::NotFound(k) if k == "nope"));
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.put("k", &json!(1)).unwrap();
        store.delete("k").unwrap();
        assert!(store.get("k").unwrap_err().is_not_found());
        // Deleting again is fine
        store.delete("k").unwrap();
    }

    #[test]
    fn test_scan_is_ordered() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        for key in ["b", "a", "c"] {
            store.put(key, &json!(key)).unwrap();
        }
        let items = store
            .scan(Bound::Unbounded, Bound::Unbounded)
            .unwrap();
        let keys: Vec<_> = items.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_scan_respects_bounds() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        for key in ["a", "b", "c", "d"] {
            store.put(key, &json!(null)).unwrap();
        }
        let items = store
            .scan(
                Bound::Excluded("a".to_string()),
                Bound::Included("c".to_string()),
            )
            .unwrap();
        let keys: Vec<_> = items.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn test_operations_after_close() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.put("k", &json!(1)).unwrap();
        store.close().unwrap();
        assert!(store.is_closed());

        assert!(matches!(store.get("k"), Err(Error::StoreClosed)));
        assert!(matches!(store.put("k", &json!(2)), Err(Error::StoreClosed)));
        assert!(matches!(
            store.scan(Bound::Unbounded, Bound::Unbounded),
            Err(Error::StoreClosed)
        ));

        // Close is idempotent, destroy after close still succeeds
        store.close().unwrap();
        store.destroy().unwrap();
    }

    #[test]
    fn test_closing_hooks_fire_once() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let fired = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = fired.clone();
        store.on_closing(Box::new(move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));

        store.close().unwrap();
        store.close().unwrap();
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroy_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let store = Store::open(&path).unwrap();
        store.put("k", &json!(1)).unwrap();
        store.destroy().unwrap();
        assert!(!path.exists());
    }
}
