//! # Hashing Utilities
//!
//! Cryptographic hash functions used throughout H3TAG. We support two and
//! refuse to support more without a very good reason:
//!
//! - **SHA3-256** — The consensus hash. Block hashes, transaction hashes,
//!   merkle nodes, and vote digests are all SHA3-256 over a canonical
//!   serialization. Keccak's sponge construction needs no double-hashing
//!   tricks to resist length extension.
//!
//! - **SHA-256** — For backup and shard checksums, where the only
//!   requirement is a stable, widely-understood integrity digest that
//!   external tooling can re-verify with `sha256sum`.
//!
//! ## Domain separation
//!
//! Consensus structures are hashed through [`domain_hash`], which prefixes
//! the input with `h3tag.<context>\x00`. Two different structures with the
//! same byte serialization can therefore never collide — a merkle leaf is
//! not a block header is not a vote, even when the bytes agree.

use sha2::{Digest, Sha256};
use sha3::Sha3_256;

/// Compute the SHA3-256 hash of the input data.
///
/// Returns a 32-byte digest. This is the workhorse hash of the protocol;
/// every consensus-critical identifier comes out of this function (usually
/// via [`domain_hash`]).
///
/// # Example
///
/// ```
/// use h3tag_protocol::crypto::sha3_256;
///
/// let digest = sha3_256(b"H3TAG");
/// assert_eq!(digest.len(), 32);
/// ```
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA3-256, hex-encoded. Convenience for the many places where hashes
/// travel as strings (keys, JSON payloads, log fields).
pub fn sha3_hex(data: &[u8]) -> String {
    hex::encode(sha3_256(data))
}

/// Compute a domain-separated SHA3-256 hash.
///
/// The context string is namespaced under `h3tag.` and joined to the data
/// with a NUL byte, so `domain_hash("merkle.leaf", b"x")` and
/// `domain_hash("block", b"x")` can never collide. Context strings must
/// not contain NUL — they are compile-time literals in practice.
pub fn domain_hash(context: &str, data: &[u8]) -> [u8; 32] {
    debug_assert!(!context.contains('\0'));
    let mut hasher = Sha3_256::new();
    hasher.update(b"h3tag.");
    hasher.update(context.as_bytes());
    hasher.update([0u8]);
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the SHA-256 hash of the input data.
///
/// Used for backup batch checksums and shard integrity digests, where
/// operators verify files out-of-band with standard tooling. Not used in
/// consensus.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}
