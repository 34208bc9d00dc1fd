//! Password hashing and verification.
//!
//! Credentials are PBKDF2-HMAC-SHA1 derived keys with per-user random salts.
//! All parameters are fixed: stored credentials carry no parameter block, so
//! changing any constant here invalidates every existing credential.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha1::Sha1;
use subtle::ConstantTimeEq;

use crate::constants::{DERIVED_KEY_LEN, KDF_ITERATIONS, MIN_PASSWORD_LEN, SALT_LEN, TOKEN_LEN};
use crate::error::{Error, Result};

/// Stored credential material, both fields lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// 32 hex characters (16 random bytes).
    pub salt: String,
    /// 40 hex characters (20-byte PBKDF2 output).
    pub derived_key: String,
}

fn check_policy(password: &str) -> Result<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(Error::Policy(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// The hex salt string itself is the KDF salt input, not its decoded bytes.
fn derive_key(password: &str, salt: &str) -> String {
    let mut output = [0u8; DERIVED_KEY_LEN];
    pbkdf2_hmac::<Sha1>(
        password.as_bytes(),
        salt.as_bytes(),
        KDF_ITERATIONS,
        &mut output,
    );
    hex::encode(output)
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<Credentials> {
    check_policy(password)?;
    let mut salt_bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = hex::encode(salt_bytes);
    let derived_key = derive_key(password, &salt);
    Ok(Credentials { salt, derived_key })
}

/// Verify a password against stored credential material.
///
/// Both `salt` and `derived_key` must be supplied; re-derives the key with the
/// fixed parameters and compares in constant time.
pub fn verify_password(password: &str, salt: &str, derived_key: &str) -> Result<()> {
    check_policy(password)?;
    if salt.is_empty() || derived_key.is_empty() {
        return Err(Error::Policy(
            "both salt and derivedKey must be provided".to_string(),
        ));
    }
    let candidate = derive_key(password, salt);
    if bool::from(candidate.as_bytes().ct_eq(derived_key.as_bytes())) {
        Ok(())
    } else {
        Err(Error::PasswordMismatch)
    }
}

/// Mint an opaque random token (24 lowercase hex characters).
pub fn make_token() -> String {
    let mut bytes = [0u8; TOKEN_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verify_round_trip() {
        let creds = hash_password("elPassword").unwrap();
        verify_password("elPassword", &creds.salt, &creds.derived_key).unwrap();
    }

    #[test]
    fn test_wrong_password_mismatch() {
        let creds = hash_password("elPassword").unwrap();
        let err = verify_password("elPassword2", &creds.salt, &creds.derived_key).unwrap_err();
        assert!(matches!(err, Error::PasswordMismatch));
    }

    #[test]
    fn test_credential_format() {
        let creds = hash_password("elPassword").unwrap();
        assert_eq!(creds.salt.len(), 32);
        assert_eq!(creds.derived_key.len(), 40);
        assert!(creds.salt.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(creds.derived_key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fresh_salt_per_hash() {
        let a = hash_password("elPassword").unwrap();
        let b = hash_password("elPassword").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.derived_key, b.derived_key);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let creds = hash_password("elPassword").unwrap();
        assert_eq!(
            derive_key("elPassword", &creds.salt),
            creds.derived_key
        );
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(matches!(hash_password("short"), Err(Error::Policy(_))));
        assert!(matches!(
            verify_password("short", "ab", "cd"),
            Err(Error::Policy(_))
        ));
    }

    #[test]
    fn test_missing_credential_material() {
        let err = verify_password("elPassword", "", "abcd").unwrap_err();
        assert!(matches!(err, Error::Policy(_)));
        let err = verify_password("elPassword", "abcd", "").unwrap_err();
        assert!(matches!(err, Error::Policy(_)));
    }

    #[test]
    fn test_token_format() {
        let token = make_token();
        assert_eq!(token.len(), 24);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, make_token());
    }
}
