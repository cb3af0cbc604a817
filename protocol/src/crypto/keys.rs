//! # Keys & Signatures
//!
//! Ed25519 keypairs for validators and voters, with the signature scheme
//! hidden behind opaque hex strings.
//!
//! The consensus core is deliberately agnostic to the signing algorithm:
//! votes, validators, and transactions carry `public_key` and `signature`
//! as plain strings, and everything funnels through [`verify_hex`]. Ed25519
//! is what those strings contain today — deterministic, 64-byte signatures,
//! fast batch-friendly verification — but nothing outside this module is
//! allowed to know that.
//!
//! Private key material never appears in `Debug` output and never gets
//! logged. If you add logging to this module, you will be asked to leave.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

/// Errors from key material handling.
///
/// Intentionally vague about *why* something failed — leaking details
/// about key material through error messages is a classic footgun.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid secret key material")]
    InvalidSecretKey,

    #[error("invalid public key material")]
    InvalidPublicKey,

    #[error("malformed signature encoding")]
    MalformedSignature,
}

/// An Ed25519 identity keypair.
///
/// Deliberately does NOT implement `Serialize` — persisting a private key
/// must be an explicit act via [`Keypair::secret_hex`], not a side effect
/// of shoving a struct into JSON.
pub struct Keypair {
    signing_key: SigningKey,
}

/// The public half of an identity, safe to share and to persist.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    bytes: [u8; 32],
}

impl Keypair {
    /// Generate a fresh keypair from the OS cryptographic RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstruct a keypair from a hex-encoded 32-byte secret key.
    pub fn from_hex(hex_str: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(hex_str).map_err(|_| SignatureError::InvalidSecretKey)?;
        let seed: [u8; SECRET_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidSecretKey)?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// The public key for this identity.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Hex-encoded public key — the form that appears on-chain as voter
    /// and validator addresses.
    pub fn public_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Hex-encoded secret key. Handle with extreme care.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Sign a message, returning the signature as a hex string.
    ///
    /// Ed25519 is deterministic: the same (key, message) pair always
    /// produces the same signature, so callers may treat the result as a
    /// stable identifier of intent.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret key material, not even "partially".
        write!(f, "Keypair(pub={})", self.public_hex())
    }
}

impl PublicKey {
    /// Parse a hex-encoded 32-byte public key.
    pub fn from_hex(hex_str: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(hex_str).map_err(|_| SignatureError::InvalidPublicKey)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SignatureError::InvalidPublicKey)?;
        // Reject encodings that are not valid curve points up front, so a
        // stored key either verifies or was never accepted.
        VerifyingKey::from_bytes(&bytes).map_err(|_| SignatureError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Hex encoding of this key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Verify a hex-encoded signature over `message`.
    ///
    /// Returns `false` for malformed signatures rather than erroring; a
    /// garbage signature is just an invalid one.
    pub fn verify(&self, message: &[u8], signature_hex: &str) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
            return false;
        };
        let signature = DalekSignature::from_bytes(&sig_bytes);
        verifying_key.verify(message, &signature).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// Verify an opaque (message, signature, public key) triple, all strings
/// hex-encoded. This is the single verification entry point the voting
/// engine and block validator use; any malformed component verifies false.
pub fn verify_hex(message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool {
    match PublicKey::from_hex(public_key_hex) {
        Ok(pk) => pk.verify(message, signature_hex),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = Keypair::generate();
        let msg = b"vote for chain B at fork 1000";
        let sig = kp.sign_hex(msg);
        assert!(verify_hex(msg, &sig, &kp.public_hex()));
    }

    #[test]
    fn wrong_message_fails() {
        let kp = Keypair::generate();
        let sig = kp.sign_hex(b"original");
        assert!(!verify_hex(b"tampered", &sig, &kp.public_hex()));
    }

    #[test]
    fn wrong_key_fails() {
        let kp = Keypair::generate();
        let other = Keypair::generate();
        let sig = kp.sign_hex(b"message");
        assert!(!verify_hex(b"message", &sig, &other.public_hex()));
    }

    #[test]
    fn malformed_inputs_verify_false() {
        let kp = Keypair::generate();
        // Garbage signature, truncated signature, garbage key — all false,
        // never a panic.
        assert!(!verify_hex(b"m", "not-hex", &kp.public_hex()));
        assert!(!verify_hex(b"m", "abcd", &kp.public_hex()));
        assert!(!verify_hex(b"m", &kp.sign_hex(b"m"), "not-a-key"));
    }

    #[test]
    fn keypair_hex_roundtrip() {
        let kp = Keypair::generate();
        let restored = Keypair::from_hex(&kp.secret_hex()).expect("valid secret");
        assert_eq!(kp.public_hex(), restored.public_hex());
    }

    #[test]
    fn signatures_are_deterministic() {
        let kp = Keypair::generate();
        assert_eq!(kp.sign_hex(b"same"), kp.sign_hex(b"same"));
    }

    #[test]
    fn debug_hides_secret() {
        let kp = Keypair::generate();
        let debug = format!("{:?}", kp);
        assert!(!debug.contains(&kp.secret_hex()));
    }
}
