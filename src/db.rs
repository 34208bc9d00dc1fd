//! The table registry: single entry point owning the store and mediating
//! table lifecycle.
//!
//! Table schemas are persisted in the reserved `_table` registry, so a table
//! created in one process run can be rehydrated after reopening the store.
//! The persist and cache steps are not atomic; recovery relies on lazy
//! rehydration from the registry, which is the specified behavior.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::constants::{KEY_DELIMITER, MAX_NAME_LEN, SCAN_SENTINEL, SCHEMA_TABLE};
use crate::error::{Error, Result, Subject};
use crate::store::Store;
use crate::table::{Scan, ScanRange, Table, TableOptions};
use crate::user::UserTable;

/// Database-level configuration.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Require an email address on user registration.
    pub email_required: bool,
}

/// Check a name against the table-name grammar:
/// `^([a-z][a-z-]{0,61}[a-z]|[a-z]{1,63})$`.
pub fn valid_table_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    if !name.bytes().all(|b| b.is_ascii_lowercase() || b == b'-') {
        return false;
    }
    !name.starts_with('-') && !name.ends_with('-')
}

/// The database: owns the store, the in-memory table cache, the persisted
/// schema registry and the built-in user table.
pub struct Database {
    store: Arc<Store>,
    tables: Mutex<HashMap<String, Arc<Table>>>,
    schemas: Table,
    users: UserTable,
}

impl Database {
    /// Open or create a database at the given file path.
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        // The delimiter and sentinel anchor the namespacing scheme; a grammar
        // that admitted either would corrupt every scan bound.
        debug_assert!(!KEY_DELIMITER.is_ascii_lowercase() && KEY_DELIMITER != '-');
        debug_assert!(SCAN_SENTINEL > KEY_DELIMITER);

        let store = Arc::new(Store::open(path)?);
        let schemas = Table::new(store.clone(), SCHEMA_TABLE, TableOptions::default())?;
        let users = UserTable::new(store.clone(), options.email_required)?;
        Ok(Self {
            store,
            tables: Mutex::new(HashMap::new()),
            schemas,
            users,
        })
    }

    /// Create a new table, persisting its schema in the registry.
    ///
    /// The schema is persisted before the table is cached or returned, so a
    /// crash can leave a registered-but-uncached table (rehydrated lazily on
    /// first access) but never a usable table with no persisted schema.
    pub fn create_table(&self, name: &str, options: TableOptions) -> Result<Arc<Table>> {
        if !valid_table_name(name) {
            return Err(Error::MalformedName(name.to_string()));
        }

        {
            let cache = self.tables.lock().unwrap_or_else(|e| e.into_inner());
            if cache.contains_key(name) {
                return Err(Error::AlreadyExists(Subject::Table));
            }
        }
        match self.schemas.get(name, None) {
            Ok(_) => return Err(Error::AlreadyExists(Subject::Table)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        // Registry value is the schema document, or `false` for schema-less
        // tables.
        let persisted = options.schema.clone().unwrap_or(Value::Bool(false));
        let table = Arc::new(Table::new(self.store.clone(), name, options)?);
        self.schemas.put_by_key(name, &persisted, None)?;
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), table.clone());
        tracing::info!(table = name, "Created table");
        Ok(table)
    }

    /// Look up a table: the cached instance if present, otherwise rehydrated
    /// from its persisted schema and cached.
    ///
    /// Rehydrated tables carry the persisted schema but no access policy;
    /// policies are in-memory configuration and are not persisted. Caching
    /// the rehydrated instance means repeated lookups share one table and one
    /// set of observers instead of registering a fresh closing hook each time.
    pub fn get_table(&self, name: &str) -> Result<Arc<Table>> {
        {
            let cache = self.tables.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(table) = cache.get(name) {
                return Ok(table.clone());
            }
        }
        let persisted = self.schemas.get(name, None)?;
        let schema = match persisted {
            Value::Bool(false) | Value::Null => None,
            document => Some(document),
        };
        let table = Arc::new(Table::new(
            self.store.clone(),
            name,
            TableOptions {
                schema,
                ..TableOptions::default()
            },
        )?);
        let mut cache = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        Ok(cache
            .entry(name.to_string())
            .or_insert(table)
            .clone())
    }

    /// Enumerate all created tables: the registry's own scan, names
    /// ascending, each value the persisted schema (or `false`).
    pub fn tables(&self) -> Result<Scan> {
        self.schemas.scan(ScanRange::default())
    }

    /// The built-in user table.
    pub fn users(&self) -> &UserTable {
        &self.users
    }

    /// Close the underlying store. Tables observe this via their closing
    /// observers; any later operation fails with [`Error::StoreClosed`].
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }

    /// Close the store and irreversibly remove the backing storage.
    /// Succeeds after an explicit [`Database::close`].
    pub fn destroy(&self) -> Result<()> {
        self.store.destroy()
    }
}
