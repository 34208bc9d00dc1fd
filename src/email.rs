//! Email alias table: one-to-one mapping from normalized address to user id.
//!
//! Plus-addressed variants of the same mailbox (`joe+a@x`, `joe+b@x`,
//! `JOE@x`) all normalize to one alias, so they collide on registration and
//! all resolve to the same user on login.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::constants::EMAIL_TABLE;
use crate::error::{Error, Result, Subject};
use crate::store::Store;
use crate::table::{Table, TableOptions};

/// Record stored per claimed alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Normalized alias, used as the record key.
    #[serde(rename = "_id")]
    pub alias: String,
    /// Literal address as supplied at registration.
    pub email: String,
    /// Owning user's canonical id.
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Normalize an address to its alias: strip the local part from the first
/// `+`, then lowercase the whole `local@domain`.
///
/// The domain is the segment between the first and second `@`; anything past
/// a second `@` is dropped.
pub fn unalias(email: &str) -> Result<String> {
    let mut parts = email.split('@');
    let local = parts.next().unwrap_or("");
    let domain = match parts.next() {
        Some(domain) if !domain.is_empty() => domain,
        _ => return Err(Error::MalformedEmail(email.to_string())),
    };
    let local = local.split('+').next().unwrap_or("");
    Ok(format!("{local}@{domain}").to_lowercase())
}

/// The reserved `_email` table.
pub struct EmailTable {
    table: Table,
}

impl EmailTable {
    pub(crate) fn new(store: Arc<Store>) -> Result<Self> {
        let schema = json!({
            "required": ["_id", "userId", "email"],
            "properties": {
                "_id": { "type": "string", "format": "email" },
                "userId": {
                    "type": "string",
                    "pattern": "^([a-z][a-z-]{0,61}[a-z]|[a-z]{1,63})$"
                },
                "email": { "type": "string", "format": "email" }
            }
        });
        let table = Table::new(
            store,
            EMAIL_TABLE,
            TableOptions {
                schema: Some(schema),
                ..TableOptions::default()
            },
        )?;
        Ok(Self { table })
    }

    /// Look up the claim on an address, by normalized alias.
    pub fn get(&self, email: &str) -> Result<EmailRecord> {
        let value = self.table.get(&unalias(email)?, None)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Claim an address for `user_id`.
    ///
    /// Fails with [`Error::AlreadyExists`] when the normalized alias is
    /// claimed, whether by this user or another.
    pub fn put(&self, email: &str, user_id: &str) -> Result<()> {
        let alias = unalias(email)?;
        match self.table.get(&alias, None) {
            Ok(_) => return Err(Error::AlreadyExists(Subject::Email)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let record = EmailRecord {
            alias: alias.clone(),
            email: email.to_string(),
            user_id: user_id.to_string(),
        };
        self.table
            .put_by_key(&alias, &serde_json::to_value(&record)?, None)
    }
}
