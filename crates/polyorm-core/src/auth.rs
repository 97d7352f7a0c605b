//! Credential storage and verification.
//!
//! Stored credentials are scheme-prefixed: `{SHA256}` for an unsalted
//! digest, `{SSHA256}` for a salted one (salt appended after the digest in
//! the base64 payload). Anything without a recognized scheme prefix is
//! compared as plaintext. Candidate credentials never appear in logs or
//! errors.

use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};

const SHA256_SCHEME: &str = "{SHA256}";
const SSHA256_SCHEME: &str = "{SSHA256}";
const SHA256_LEN: usize = 32;

/// Transform a plaintext credential to its storage form. Values already
/// carrying a scheme prefix pass through unchanged.
#[must_use]
pub fn create_storage_password(plain: &str) -> String {
    if has_scheme_prefix(plain) {
        return plain.to_string();
    }

    let digest = Sha256::digest(plain.as_bytes());
    format!("{SHA256_SCHEME}{}", STANDARD.encode(digest))
}

/// Verify a candidate credential against its stored form.
#[must_use]
pub fn verify_credential(stored: &str, candidate: &str) -> bool {
    if let Some(payload) = strip_scheme(stored, SSHA256_SCHEME) {
        return verify_salted(payload, candidate);
    }
    if let Some(payload) = strip_scheme(stored, SHA256_SCHEME) {
        let Ok(digest) = STANDARD.decode(payload) else {
            return false;
        };
        return digest.as_slice() == Sha256::digest(candidate.as_bytes()).as_slice();
    }

    stored == candidate
}

fn verify_salted(payload: &str, candidate: &str) -> bool {
    let Ok(decoded) = STANDARD.decode(payload) else {
        return false;
    };
    if decoded.len() <= SHA256_LEN {
        return false;
    }
    let (digest, salt) = decoded.split_at(SHA256_LEN);

    let mut hasher = Sha256::new();
    hasher.update(candidate.as_bytes());
    hasher.update(salt);

    digest == hasher.finalize().as_slice()
}

fn strip_scheme<'a>(stored: &'a str, scheme: &str) -> Option<&'a str> {
    if stored.len() >= scheme.len() && stored[..scheme.len()].eq_ignore_ascii_case(scheme) {
        Some(&stored[scheme.len()..])
    } else {
        None
    }
}

fn has_scheme_prefix(value: &str) -> bool {
    value.starts_with('{') && value.contains('}')
}

///
/// TESTS
///
