//! SHA-256 / HMAC-SHA-256 primitives and AWS-flavored percent-encoding.
//!
//! Standalone pure functions over byte slices; no I/O, no global state.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

/// Compute SHA-256 of `data` and return the lowercase hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA-256 of `data` keyed by `key`. Both are raw bytes, never hex.
///
/// # Panics
/// Never panics — HMAC accepts any key length.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encode every byte outside the unreserved set `A-Z a-z 0-9 - _ . ~`.
///
/// Escapes use uppercase hex digits, per the AWS SigV4 URI-encoding rules.
/// Applied to request/query *values*, never to structural delimiters like
/// `&`, `=`, or `/`.
pub fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}
