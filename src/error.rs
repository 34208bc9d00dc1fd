use thiserror::Error;

/// A single schema violation produced when a write is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// JSON pointer to the offending field (e.g. `/smaller`).
    pub path: String,
    /// Human-readable description of the violated constraint.
    pub message: String,
}

/// What kind of entity an [`Error::AlreadyExists`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Table,
    User,
    Email,
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::Table => write!(f, "table"),
            Subject::User => write!(f, "user"),
            Subject::Email => write!(f, "email"),
        }
    }
}

fn violations_text(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| {
            if v.path.is_empty() {
                v.message.clone()
            } else {
                format!("{}: {}", v.path, v.message)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Application error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("database is closed")]
    StoreClosed,

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("schema validation failed: {}", violations_text(.0))]
    Validation(Vec<FieldViolation>),

    #[error("access denied")]
    AccessDenied,

    #[error("malformed key: {0}")]
    MalformedKey(String),

    #[error("malformed table name: {0:?}")]
    MalformedName(String),

    #[error("malformed email: {0:?}")]
    MalformedEmail(String),

    #[error("{0} already exists")]
    AlreadyExists(Subject),

    #[error("password does not match")]
    PasswordMismatch,

    #[error("invalid token")]
    InvalidToken,

    #[error("{0}")]
    Policy(String),

    #[error("malformed schema: {0}")]
    MalformedSchema(String),

    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error is the expected "no such record" kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type alias for application results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_joins_violations() {
        let err = Error::Validation(vec![
            FieldViolation {
                path: "/smaller".to_string(),
                message: "5.5 is greater than the maximum of 5".to_string(),
            },
            FieldViolation {
                path: String::new(),
                message: "\"_id\" is a required property".to_string(),
            },
        ]);
        let text = err.to_string();
        assert!(text.contains("/smaller"));
        assert!(text.contains("required property"));
    }

    #[test]
    fn test_subject_display() {
        assert_eq!(Error::AlreadyExists(Subject::Email).to_string(), "email already exists");
        assert_eq!(Error::AlreadyExists(Subject::Table).to_string(), "table already exists");
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::NotFound("x".to_string()).is_not_found());
        assert!(!Error::AccessDenied.is_not_found());
    }
}
