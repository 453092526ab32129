//! Credential checks for the two sign-in paths: students by name, birth date
//! and an optional password; administrators by a shared access code.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// A profile without a stored hash accepts any (or no) password.
pub fn verify_password(stored_hash: Option<&str>, candidate: Option<&str>) -> bool {
    match stored_hash.map(str::trim).filter(|hash| !hash.is_empty()) {
        None => true,
        Some(hash) => candidate
            .map(|password| constant_time_eq(&hash_password(password), &hash.to_ascii_lowercase()))
            .unwrap_or(false),
    }
}

pub fn verify_admin_code(configured: &SecretString, candidate: &str) -> bool {
    let expected = configured.expose_secret();
    !expected.is_empty() && constant_time_eq(expected, candidate.trim())
}

/// Compares every byte so the admin-code check does not leak timing.
fn constant_time_eq(left: &str, right: &str) -> bool {
    let (left, right) = (left.as_bytes(), right.as_bytes());
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}
