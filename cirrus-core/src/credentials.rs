//! Password salting, hashing and verification.
//!
//! Hashes are a single SHA-512 pass over `password || salt`, base64 encoded.
//! This matches the stored format of existing accounts. Moving to Argon2id
//! would need a hash-format version column so old rows keep verifying.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use constant_time_eq::constant_time_eq;
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha512};
use thiserror::Error;

use crate::account::Account;

/// Length of the salt generated for new and rotated passwords.
pub const SALT_LENGTH: usize = 10;

const ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// Largest multiple of the alphabet size that fits in a byte; bytes at or above
// it are rejected so every symbol is equally likely.
const REJECTION_BOUND: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("system randomness unavailable: {0}")]
    Randomness(String),
}

/// Random alphanumeric string of exactly `length` characters drawn from the
/// operating system CSPRNG.
pub fn generate_salt(length: usize) -> Result<String, CredentialError> {
    let mut out = String::with_capacity(length);
    let mut buf = [0u8; 64];

    while out.len() < length {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|err| CredentialError::Randomness(err.to_string()))?;

        for byte in buf {
            if out.len() == length {
                break;
            }
            if byte < REJECTION_BOUND {
                out.push(ALPHABET[byte as usize % ALPHABET.len()] as char);
            }
        }
    }

    Ok(out)
}

pub fn hash(password: &str, salt: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    STANDARD.encode(hasher.finalize())
}

pub fn verify(password: &str, account: &Account) -> bool {
    let candidate = hash(password, &account.salt);
    constant_time_eq(candidate.as_bytes(), account.password_hash.as_bytes())
}

/// Freshly salted hash of a plaintext password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaltedHash {
    pub salt: String,
    pub hash: String,
}

impl SaltedHash {
    pub fn from_password(password: &str) -> Result<Self, CredentialError> {
        let salt = generate_salt(SALT_LENGTH)?;
        let hash = hash(password, &salt);
        Ok(Self { salt, hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_with(password: &str) -> Account {
        let SaltedHash { salt, hash } =
            SaltedHash::from_password(password).unwrap();
        Account {
            id: 1,
            email: "user@example.com".into(),
            username: "user".into(),
            password_hash: hash,
            salt,
            deleted_at: None,
        }
    }

    #[test]
    fn salt_has_requested_length_and_alphabet() {
        for length in [0, 1, 10, 63, 200] {
            let salt = generate_salt(length).unwrap();
            assert_eq!(salt.len(), length);
            assert!(salt.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn salts_differ_between_calls() {
        let first = generate_salt(SALT_LENGTH).unwrap();
        let second = generate_salt(SALT_LENGTH).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash("hunter2", "abc"), hash("hunter2", "abc"));
        assert!(!hash("hunter2", "abc").is_empty());
    }

    #[test]
    fn hash_depends_on_salt() {
        assert_ne!(hash("hunter2", "salt-one"), hash("hunter2", "salt-two"));
    }

    #[test]
    fn hash_is_base64_sha512() {
        // 64 digest bytes encode to 88 padded base64 characters.
        let digest = hash("", "");
        assert_eq!(digest.len(), 88);
        assert!(digest.ends_with("=="));
    }

    #[test]
    fn verifies_original_password_only() {
        let account = account_with("correct horse");
        assert!(verify("correct horse", &account));
        assert!(!verify("battery staple", &account));
        assert!(account.verify_password("correct horse"));
    }
}
