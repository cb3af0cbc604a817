//! # Crypto Module
//!
//! The two cryptographic primitives the consensus core actually needs:
//! hashing and signatures. Everything else (key derivation, encryption,
//! the mining kernels) lives outside this crate and talks to us through
//! opaque strings.
//!
//! - **hash** — SHA3-256 with domain separation for consensus structures,
//!   SHA-256 for backup and shard checksums.
//! - **keys** — Ed25519 keypairs with hex-encoded public keys and
//!   signatures, matching the opaque-string signature contract.

pub mod hash;
pub mod keys;

pub use hash::{domain_hash, sha256, sha256_hex, sha3_256, sha3_hex};
pub use keys::{Keypair, PublicKey, SignatureError};
