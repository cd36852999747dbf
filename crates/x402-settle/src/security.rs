//! Secret comparison for operator-facing endpoints.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compare two secrets without leaking length or content through timing.
///
/// Both sides are hashed to fixed-size digests first, then compared with `subtle`.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}

/// Check an `Authorization` header value against the expected bearer token.
pub fn bearer_matches(header: Option<&str>, expected: &str) -> bool {
    let provided = header
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or("");
    // Still compare on a missing header, against a value that can never match.
    constant_time_eq(provided.as_bytes(), expected.as_bytes()) && !provided.is_empty()
}
