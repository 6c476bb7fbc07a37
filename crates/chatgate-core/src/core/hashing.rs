// crates/chatgate-core/src/core/hashing.rs
// ============================================================================
// Module: Chatgate Content Hashing
// Description: SHA-256 content hashes for tool outputs.
// Purpose: Give every tool result a stable digest for audit correlation.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! Tool outputs are hashed over their raw UTF-8 bytes. Digests render as
//! `sha256:<lowercase hex>` so the algorithm travels with the value.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write;

use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix identifying the digest algorithm.
pub const CONTENT_HASH_PREFIX: &str = "sha256:";

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Hashes raw bytes into a prefixed lowercase hex digest.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(CONTENT_HASH_PREFIX.len() + digest.len() * 2);
    out.push_str(CONTENT_HASH_PREFIX);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use super::content_hash;

    #[test]
    fn content_hash_matches_known_digest() {
        assert_eq!(
            content_hash(b"abc"),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn content_hash_is_stable_for_empty_input() {
        assert_eq!(content_hash(b""), content_hash(&[]));
        assert!(content_hash(b"").starts_with("sha256:e3b0c442"));
    }
}
