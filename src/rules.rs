//! Stock access predicates for table policies.
//!
//! Rules receive `(actor, key, value)` and return whether the operation is
//! allowed.

use serde_json::Value;

/// Allow any authenticated actor.
pub fn any_user(actor: Option<&str>, _key: &str, _value: &Value) -> bool {
    actor.is_some()
}

/// Allow only the actor whose id equals the record key.
///
/// This is the rule guarding the user table: each user may only touch their
/// own record.
pub fn user_key(actor: Option<&str>, key: &str, _value: &Value) -> bool {
    actor == Some(key)
}
