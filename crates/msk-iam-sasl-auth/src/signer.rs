//! Signing key derivation and final signature/Authorization-header assembly
//! (SigV4 §4.C).

use crate::canonical::ALGORITHM;
use crate::hash::hmac_sha256;

/// Derive the `date -> region -> service -> "aws4_request"` nested HMAC key
/// chain and sign `string_to_sign` with it.
///
/// Returns the 64-character lowercase hex signature.
pub fn sign(secret_access_key: &str, ymd: &str, region: &str, service: &str, string_to_sign: &str) -> String {
    // "AWS4" + secret is a UTF-8 byte concatenation, never a hex decode.
    let k_secret = format!("AWS4{secret_access_key}");
    let k_date = hmac_sha256(k_secret.as_bytes(), ymd.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()))
}

/// Assemble the `Authorization` header value.
///
/// `"{algorithm} Credential={access_key_id}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}"`
pub fn authorization_header(
    access_key_id: &str,
    credential_scope: &str,
    signed_headers: &str,
    signature: &str,
) -> String {
    format!(
        "{ALGORITHM} Credential={access_key_id}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}"
    )
}
