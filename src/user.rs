//! User registration, login and the password-reset token state machine.
//!
//! All mutation goes through the named operations here; the underlying table
//! is never exposed, since raw access would bypass the identity invariants
//! (lowercasing, email uniqueness, password hashing).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::constants::{TOKEN_VALID_MINUTES, USER_TABLE};
use crate::email::EmailTable;
use crate::error::{Error, Result, Subject};
use crate::password::{self, Credentials};
use crate::store::Store;
use crate::table::{AccessPolicy, Table, TableOptions};

/// How a caller names a user: by id, by email, or both (an explicit email
/// always wins). An id containing `@` is treated as an email.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub id: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    /// Identify a user by id (or by email, if the id contains `@`).
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            email: None,
        }
    }

    /// Identify a user by email address.
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            id: None,
            email: Some(email.into()),
        }
    }
}

/// Registration input.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub password: String,
    pub email: Option<String>,
}

/// Pending password-reset state; empty when no reset is outstanding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(rename = "validUntil", skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Stored user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Canonical (lowercased) handle.
    #[serde(rename = "_id")]
    pub id: String,
    /// Registration-time original casing.
    #[serde(rename = "origId", skip_serializing_if = "Option::is_none")]
    pub orig_id: Option<String>,
    pub salt: String,
    #[serde(rename = "derivedKey")]
    pub derived_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub reset: ResetState,
}

/// The reserved `_user` table plus its nested email index.
pub struct UserTable {
    table: Table,
    emails: EmailTable,
}

fn user_schema(email_required: bool) -> serde_json::Value {
    let mut required = vec!["_id", "salt", "derivedKey", "reset"];
    if email_required {
        required.push("email");
    }
    json!({
        "required": required,
        "properties": {
            "_id": {
                "type": "string",
                "pattern": "^([a-z][a-z-]{0,61}[a-z]|[a-z]{1,63})$"
            },
            "salt": { "type": "string", "pattern": "^[a-f0-9]{32}$" },
            "derivedKey": { "type": "string", "pattern": "^[a-f0-9]{40}$" },
            "email": { "type": "string", "format": "email" },
            "reset": {
                "type": "object",
                "properties": {
                    "token": { "type": "string", "pattern": "^[a-f0-9]{24}$" },
                    "validUntil": { "type": "string", "format": "date-time" }
                }
            }
        }
    })
}

impl UserTable {
    pub(crate) fn new(store: Arc<Store>, email_required: bool) -> Result<Self> {
        let access = AccessPolicy {
            get: Some(Arc::new(crate::rules::user_key)),
            put: Some(Arc::new(crate::rules::user_key)),
        };
        let table = Table::new(
            store.clone(),
            USER_TABLE,
            TableOptions {
                schema: Some(user_schema(email_required)),
                access: Some(access),
                ..TableOptions::default()
            },
        )?;
        let emails = EmailTable::new(store)?;
        Ok(Self { table, emails })
    }

    fn load(&self, id: &str) -> Result<UserRecord> {
        let value = self.table.get(id, Some(id))?;
        Ok(serde_json::from_value(value)?)
    }

    fn write(&self, user: &UserRecord) -> Result<()> {
        self.table
            .put_record(&serde_json::to_value(user)?, Some(&user.id))
    }

    /// Resolve an identity to its stored user record.
    ///
    /// An explicit email wins; failing that, an id containing `@` routes to
    /// email lookup; otherwise the id is lowercased and looked up directly.
    fn resolve(&self, identity: &Identity) -> Result<UserRecord> {
        if identity.id.is_none() && identity.email.is_none() {
            return Err(Error::Policy("email or _id required".to_string()));
        }
        let mut email = identity.email.clone();
        if email.is_none() {
            if let Some(id) = &identity.id {
                if id.contains('@') {
                    email = Some(id.clone());
                }
            }
        }
        let id = match email {
            Some(email) => self.emails.get(&email)?.user_id,
            None => identity
                .id
                .as_deref()
                .unwrap_or_default()
                .to_lowercase(),
        };
        self.load(&id)
    }

    /// Register a new user, returning the stored credential material.
    ///
    /// The email claim happens before the user record is written, so a
    /// duplicate or malformed email aborts registration entirely. The two
    /// writes are not atomic: a crash in between leaves a claimed email with
    /// no user, which a caller must clean up or retry.
    pub fn register(&self, new_user: &NewUser) -> Result<Credentials> {
        let orig_id = new_user.id.clone();
        let id = new_user.id.to_lowercase();

        match self.load(&id) {
            Ok(_) => return Err(Error::AlreadyExists(Subject::User)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        if let Some(email) = &new_user.email {
            self.emails.put(email, &id)?;
        }

        let credentials = password::hash_password(&new_user.password)?;
        let user = UserRecord {
            id: id.clone(),
            orig_id: Some(orig_id),
            salt: credentials.salt.clone(),
            derived_key: credentials.derived_key.clone(),
            email: new_user.email.clone(),
            reset: ResetState::default(),
        };
        self.write(&user)?;
        tracing::debug!(user = %id, "Registered user");
        Ok(credentials)
    }

    /// Verify a password, returning the canonical user id on success.
    pub fn login(&self, identity: &Identity, password: &str) -> Result<String> {
        let user = self.resolve(identity)?;
        password::verify_password(password, &user.salt, &user.derived_key)?;
        tracing::debug!(user = %user.id, "Login succeeded");
        Ok(user.id)
    }

    /// Replace a user's password, discarding any pending reset token.
    pub fn change_password(&self, identity: &Identity, new_password: &str) -> Result<()> {
        let mut user = self.resolve(identity)?;
        let credentials = password::hash_password(new_password)?;
        user.salt = credentials.salt;
        user.derived_key = credentials.derived_key;
        user.reset = ResetState::default();
        self.write(&user)
    }

    /// Issue a password-reset token valid for `valid_for` (default 120
    /// minutes).
    ///
    /// Idempotent while a token is pending and unexpired: the same token is
    /// returned rather than a new one minted.
    pub fn reset_password(&self, identity: &Identity, valid_for: Option<Duration>) -> Result<String> {
        let mut user = self.resolve(identity)?;
        let now = Utc::now();

        if let (Some(token), Some(valid_until)) = (&user.reset.token, user.reset.valid_until) {
            if valid_until > now {
                return Ok(token.clone());
            }
        }

        let token = password::make_token();
        let valid_for = valid_for.unwrap_or_else(|| Duration::minutes(TOKEN_VALID_MINUTES));
        user.reset = ResetState {
            token: Some(token.clone()),
            valid_until: Some(now + valid_for),
        };
        self.write(&user)?;
        tracing::debug!(user = %user.id, "Issued password-reset token");
        Ok(token)
    }

    /// Redeem a reset token, setting a new password and clearing the reset
    /// state.
    ///
    /// Token mismatch and token expiry are deliberately indistinguishable:
    /// both fail with [`Error::InvalidToken`].
    pub fn use_token(&self, identity: &Identity, token: &str, new_password: &str) -> Result<()> {
        if token.is_empty() {
            return Err(Error::InvalidToken);
        }
        if new_password.is_empty() {
            return Err(Error::Policy("new password must be supplied".to_string()));
        }

        let mut user = self.resolve(identity)?;
        let now = Utc::now();
        let valid = match (&user.reset.token, user.reset.valid_until) {
            (Some(stored), Some(valid_until)) => stored == token && valid_until >= now,
            _ => false,
        };
        if !valid {
            return Err(Error::InvalidToken);
        }

        let credentials = password::hash_password(new_password)?;
        user.salt = credentials.salt;
        user.derived_key = credentials.derived_key;
        user.reset = ResetState::default();
        self.write(&user)?;
        tracing::debug!(user = %user.id, "Password reset via token");
        Ok(())
    }
}
