//! Password hashing and random token helpers.
//!
//! Stored form: `$sha256$<salt-hex>$<hash-hex>`. Anything without that prefix
//! is treated as a legacy cleartext password.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Salt byte length for password hashing.
const SALT_BYTES: usize = 16;

/// Number of SHA-256 iterations for password stretching.
const HASH_ITERATIONS: u32 = 100_000;

/// Marker for hashed passwords in the users file.
const HASH_PREFIX: &str = "$sha256$";

/// Hash a password with a fresh random salt, returning the stored form.
pub fn hash(password: &str) -> String {
    let salt = random_hex(SALT_BYTES);
    let digest = stretch(password, &salt);
    format!("{HASH_PREFIX}{salt}${digest}")
}

/// Check a candidate password against a stored value.
pub fn verify(candidate: &str, stored: &str) -> bool {
    match stored
        .strip_prefix(HASH_PREFIX)
        .and_then(|rest| rest.split_once('$'))
    {
        Some((salt, expected)) => {
            constant_time_eq(stretch(candidate, salt).as_bytes(), expected.as_bytes())
        }
        None => constant_time_eq(candidate.as_bytes(), stored.as_bytes()),
    }
}

/// Burn the same amount of work as a real verification.
///
/// Called when the username does not exist so the response time does not
/// reveal that fact.
pub fn dummy_verify(candidate: &str) {
    let _ = stretch(candidate, "00000000000000000000000000000000");
}

/// `len` random bytes from the OS RNG, hex-encoded.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Iterated SHA-256 over salt + password.
fn stretch(password: &str, salt: &str) -> String {
    let mut hash = Sha256::new();
    hash.update(salt.as_bytes());
    hash.update(password.as_bytes());
    let mut result = hash.finalize();

    for _ in 1..HASH_ITERATIONS {
        let mut h = Sha256::new();
        h.update(result);
        h.update(salt.as_bytes());
        result = h.finalize();
    }

    hex::encode(result)
}

/// Constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
