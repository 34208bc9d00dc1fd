//! The namespacing / validation / access-control primitive.
//!
//! A [`Table`] carves a logical keyspace out of the shared flat keyspace by
//! prefixing every record key with `<name>:`. Every write is gated through the
//! table's access policy and compiled schema before it reaches the store, and
//! every successful write is broadcast to registered put observers.

use std::ops::Bound;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::constants::{DEFAULT_ID_KEY, KEY_DELIMITER, SCAN_SENTINEL};
use crate::error::{Error, Result};
use crate::schema::CompiledSchema;
use crate::store::Store;

/// Access predicate over `(actor, key, value)`.
///
/// Returning `false` fails the gated call with [`Error::AccessDenied`].
pub type AccessFn = Arc<dyn Fn(Option<&str>, &str, &Value) -> bool + Send + Sync>;

/// Optional read/write gates evaluated on every `get`/`put`.
#[derive(Clone, Default)]
pub struct AccessPolicy {
    pub get: Option<AccessFn>,
    pub put: Option<AccessFn>,
}

/// Per-table configuration.
#[derive(Clone)]
pub struct TableOptions {
    /// Schema document validated on every write; `None` accepts everything.
    pub schema: Option<Value>,
    /// Record field used as the record key by [`Table::put_record`].
    pub id_key: String,
    /// Access gates; not persisted, so they do not survive rehydration.
    pub access: Option<AccessPolicy>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            schema: None,
            id_key: DEFAULT_ID_KEY.to_string(),
            access: None,
        }
    }
}

/// Range options for [`Table::scan`], all expressed in logical (unprefixed)
/// keys. Bounds left `None` default to the table's own namespace edges.
#[derive(Clone, Default)]
pub struct ScanRange {
    pub gt: Option<String>,
    pub gte: Option<String>,
    pub lt: Option<String>,
    pub lte: Option<String>,
}

/// One scanned record, key already unprefixed.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: String,
    pub value: Value,
}

/// Finite ascending iterator over a snapshot of a table's namespace.
///
/// Restartable by calling [`Table::scan`] again; not resumable mid-stream.
pub struct Scan {
    items: std::vec::IntoIter<Entry>,
}

impl Iterator for Scan {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        self.items.next()
    }
}

type PutObserver = Box<dyn Fn(&str, &Value) + Send + Sync>;
type ClosingObserver = Box<dyn Fn() + Send + Sync>;

/// A logical table over the shared keyspace.
pub struct Table {
    store: Arc<Store>,
    name: String,
    id_key: String,
    schema: Option<CompiledSchema>,
    access: Option<AccessPolicy>,
    put_observers: Arc<Mutex<Vec<PutObserver>>>,
    closing_observers: Arc<Mutex<Vec<ClosingObserver>>>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("id_key", &self.id_key)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl Table {
    /// Build a table over `store`. The name is immutable afterwards.
    ///
    /// Names containing the key delimiter are rejected outright; the registry
    /// applies the stricter public grammar on top of this.
    pub(crate) fn new(store: Arc<Store>, name: &str, options: TableOptions) -> Result<Self> {
        if name.is_empty() || name.contains(KEY_DELIMITER) {
            return Err(Error::MalformedName(name.to_string()));
        }

        let schema = match options.schema {
            Some(document) => Some(CompiledSchema::compile(document)?),
            None => None,
        };

        let closing_observers: Arc<Mutex<Vec<ClosingObserver>>> =
            Arc::new(Mutex::new(Vec::new()));
        let forward = closing_observers.clone();
        store.on_closing(Box::new(move || {
            let observers = forward.lock().unwrap_or_else(|e| e.into_inner());
            for observer in observers.iter() {
                let _ = catch_unwind(AssertUnwindSafe(observer));
            }
        }));

        Ok(Self {
            store,
            name: name.to_string(),
            id_key: options.id_key,
            schema,
            access: options.access,
            put_observers: Arc::new(Mutex::new(Vec::new())),
            closing_observers,
        })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record field used as the record key by [`Table::put_record`].
    pub fn id_key(&self) -> &str {
        &self.id_key
    }

    /// The schema document this table validates against, if any.
    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref().map(CompiledSchema::document)
    }

    /// Map a logical key into the shared physical keyspace.
    pub fn prefixed(&self, key: &str) -> String {
        format!("{}{}{}", self.name, KEY_DELIMITER, key)
    }

    /// Strip this table's prefix from a physical key.
    ///
    /// Fails with [`Error::MalformedKey`] when the key does not carry exactly
    /// this table's name left of the first delimiter; a foreign or corrupt key
    /// must fail loudly rather than leak across tables.
    pub fn unprefixed(&self, physical_key: &str) -> Result<String> {
        match physical_key.split_once(KEY_DELIMITER) {
            Some((name, key)) if name == self.name && !key.is_empty() => Ok(key.to_string()),
            _ => Err(Error::MalformedKey(physical_key.to_string())),
        }
    }

    fn check_put_access(&self, actor: Option<&str>, key: &str, value: &Value) -> Result<()> {
        if let Some(rule) = self.access.as_ref().and_then(|a| a.put.as_ref()) {
            if !rule(actor, key, value) {
                return Err(Error::AccessDenied);
            }
        }
        Ok(())
    }

    /// Write `value` under an explicit logical key.
    ///
    /// Gating order: closed check, access policy, schema validation, store
    /// write, put-observer dispatch. Access failures are independent of
    /// schema validity.
    ///
    /// Record keys are always non-empty; an empty key would write a physical
    /// key that [`Table::unprefixed`] rejects, poisoning every later scan.
    pub fn put_by_key(&self, key: &str, value: &Value, actor: Option<&str>) -> Result<()> {
        if self.store.is_closed() {
            return Err(Error::StoreClosed);
        }
        if key.is_empty() {
            return Err(Error::MalformedKey(self.prefixed(key)));
        }
        self.check_put_access(actor, key, value)?;
        if let Some(schema) = &self.schema {
            schema.check(value)?;
        }
        self.store.put(&self.prefixed(key), value)?;
        self.emit_put(key, value);
        Ok(())
    }

    /// Write a whole record, reading the key from its `id_key` field.
    ///
    /// String keys are used as-is; numeric keys are rendered in decimal, as
    /// callers keying on numeric fields expect.
    pub fn put_record(&self, record: &Value, actor: Option<&str>) -> Result<()> {
        let key = match record.get(&self.id_key) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(Error::MalformedKey(format!(
                    "record has no usable {:?} field",
                    self.id_key
                )))
            }
        };
        self.put_by_key(&key, record, actor)
    }

    /// Fetch the record stored under `key`.
    ///
    /// The `get` access gate runs after the value is fetched, so "exists but
    /// forbidden" surfaces as [`Error::AccessDenied`], distinct from
    /// [`Error::NotFound`].
    pub fn get(&self, key: &str, actor: Option<&str>) -> Result<Value> {
        if self.store.is_closed() {
            return Err(Error::StoreClosed);
        }
        let value = self.store.get(&self.prefixed(key))?;
        if let Some(rule) = self.access.as_ref().and_then(|a| a.get.as_ref()) {
            if !rule(actor, key, &value) {
                return Err(Error::AccessDenied);
            }
        }
        Ok(value)
    }

    /// Ascending scan over this table's namespace.
    ///
    /// Bounds not supplied default to the namespace edges: the empty logical
    /// key below, the sentinel above, so an unbounded scan never touches the
    /// next table's keys.
    pub fn scan(&self, range: ScanRange) -> Result<Scan> {
        if self.store.is_closed() {
            return Err(Error::StoreClosed);
        }

        let lower = if let Some(gte) = range.gte {
            Bound::Included(self.prefixed(&gte))
        } else if let Some(gt) = range.gt {
            Bound::Excluded(self.prefixed(&gt))
        } else {
            Bound::Included(self.prefixed(""))
        };
        let upper = if let Some(lte) = range.lte {
            Bound::Included(self.prefixed(&lte))
        } else if let Some(lt) = range.lt {
            Bound::Excluded(self.prefixed(&lt))
        } else {
            Bound::Included(self.prefixed(&SCAN_SENTINEL.to_string()))
        };

        let mut entries = Vec::new();
        for (physical_key, value) in self.store.scan(lower, upper)? {
            entries.push(Entry {
                key: self.unprefixed(&physical_key)?,
                value,
            });
        }
        Ok(Scan {
            items: entries.into_iter(),
        })
    }

    /// Register an observer invoked synchronously after every successful put,
    /// with the unprefixed key and the stored value.
    ///
    /// Observers must not block; a panicking observer is contained and never
    /// unwinds the write.
    pub fn on_put(&self, observer: impl Fn(&str, &Value) + Send + Sync + 'static) {
        self.put_observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(observer));
    }

    /// Register an observer invoked once when the owning store begins closing.
    pub fn on_closing(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.closing_observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(observer));
    }

    fn emit_put(&self, key: &str, value: &Value) {
        let observers = self.put_observers.lock().unwrap_or_else(|e| e.into_inner());
        for observer in observers.iter() {
            if catch_unwind(AssertUnwindSafe(|| observer(key, value))).is_err() {
                tracing::warn!(table = %self.name, key, "Put observer panicked; ignoring");
            }
        }
    }
}
