/// Delimiter between a table name and a record key in the physical keyspace.
///
/// Table names must never contain this character; `Table::new` and the
/// table-name grammar both enforce it.
pub const KEY_DELIMITER: char = ':';

/// Upper-bound sentinel for unbounded table scans.
///
/// Sorts after any realistic record-key suffix, so an unbounded scan stops at
/// the end of the table's namespace without touching the next table's keys.
pub const SCAN_SENTINEL: char = '\u{fff0}';

/// Reserved table holding every other table's persisted schema.
pub const SCHEMA_TABLE: &str = "_table";

/// Reserved table holding user records.
pub const USER_TABLE: &str = "_user";

/// Reserved table holding email alias records.
pub const EMAIL_TABLE: &str = "_email";

/// Default record field used as the record key by `put_record`.
pub const DEFAULT_ID_KEY: &str = "_id";

/// Maximum length of a table name (also applies to user ids).
pub const MAX_NAME_LEN: usize = 63;

/// Salt length in bytes (32 lowercase hex characters on the wire).
pub const SALT_LEN: usize = 16;

/// Derived-key length in bytes (40 lowercase hex characters on the wire).
pub const DERIVED_KEY_LEN: usize = 20;

/// Reset-token length in bytes (24 lowercase hex characters on the wire).
pub const TOKEN_LEN: usize = 12;

/// PBKDF2 iteration count. Fixed: stored credentials do not embed parameters.
pub const KDF_ITERATIONS: u32 = 10;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Default validity window for a password-reset token, in minutes.
pub const TOKEN_VALID_MINUTES: i64 = 120;
