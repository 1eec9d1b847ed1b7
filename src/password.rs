//! Share password hashing.
//!
//! Passwords are stored as the lowercase hex SHA-256 digest of the UTF-8
//! password. Verification compares digests in constant time.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Returns `true` when `supplied` hashes to `stored_hash`.
pub fn verify_password(supplied: &str, stored_hash: &str) -> bool {
    let supplied_hash = hash_password(supplied);
    supplied_hash
        .as_bytes()
        .ct_eq(stored_hash.to_ascii_lowercase().as_bytes())
        .into()
}
