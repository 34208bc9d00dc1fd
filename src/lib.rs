//! stratadb: a lightweight multi-table document layer over a single ordered
//! key-value store, with a built-in user/email authentication workflow.
//!
//! The underlying engine offers only flat byte-string keys, get/put/delete
//! and ascending range scans. This crate retrofits tables on top of that:
//! each [`Table`] carves a namespace out of the shared keyspace by key
//! prefixing, gates writes through schema validation and access control, and
//! notifies observers of changes. The [`Database`] registry persists every
//! table's schema so tables survive reopening the store, and ships a
//! [`user::UserTable`] implementing registration, login and time-boxed
//! password resets over two cooperating tables.
//!
//! ```no_run
//! use stratadb::{Database, Options, TableOptions};
//!
//! # fn main() -> stratadb::Result<()> {
//! let db = Database::open("./data/app.db", Options::default())?;
//! let table = db.create_table("inventory", TableOptions::default())?;
//! table.put_by_key("sku-1", &serde_json::json!({ "qty": 3 }), None)?;
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod db;
pub mod email;
pub mod error;
pub mod password;
pub mod rules;
pub mod schema;
pub mod store;
pub mod table;
pub mod user;

pub use db::{Database, Options};
pub use email::{EmailRecord, EmailTable};
pub use error::{Error, FieldViolation, Result, Subject};
pub use password::{hash_password, verify_password, Credentials};
pub use schema::CompiledSchema;
pub use store::Store;
pub use table::{AccessPolicy, Entry, Scan, ScanRange, Table, TableOptions};
pub use user::{Identity, NewUser, UserRecord, UserTable};
