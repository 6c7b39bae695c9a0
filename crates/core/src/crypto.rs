//! Ed25519 keys, signatures, and key-derived addresses.
//!
//! An address is the hex encoding of the owner's 32-byte verifying key, so
//! the public key needed to check a sender's signature can always be
//! recovered from the address itself.

use ed25519_dalek::{Signature as DalekSignature, Signer as _, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("malformed signature bytes")]
    InvalidSignature,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid address encoding: {0}")]
    InvalidAddress(String),
    #[error("signature verification failed")]
    VerificationFailed,
}

/// An account address.
///
/// Addresses of key holders are the hex encoding of their public key. Any
/// string is accepted as a recipient; only senders must decode to a key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Wrap an address string as-is.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The address owned by `public_key`.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self(public_key.to_hex())
    }

    /// The address as hex text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the public key this address encodes.
    pub fn public_key(&self) -> Result<PublicKey, CryptoError> {
        PublicKey::from_hex(&self.0).map_err(|_| CryptoError::InvalidAddress(self.0.clone()))
    }

    /// First characters of the address, for reports and logs.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(10);
        self.0.get(..end).unwrap_or(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Raw signature bytes.
///
/// Kept as an unchecked byte string: a well-formed Ed25519 signature is 64
/// bytes, anything else fails verification rather than failing to construct.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Wrap raw signature bytes. Length is checked at verification.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex of the signature.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse a signature from hex.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        hex::decode(s)
            .map(Self)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    fn to_dalek(&self) -> Result<DalekSignature, CryptoError> {
        DalekSignature::from_slice(&self.0).map_err(|_| CryptoError::InvalidSignature)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Signature({}...)", &hex[..hex.len().min(16)])
    }
}

/// A public key for signature verification.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(pub VerifyingKey);

impl PublicKey {
    /// The compressed 32-byte key.
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Lowercase hex of the key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    /// Parse a public key from hex, rejecting invalid points.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidPublicKey)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&arr)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// The address owned by this key.
    pub fn to_address(&self) -> Address {
        Address::from_public_key(self)
    }

    /// Verify a signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let sig = signature.to_dalek()?;
        self.0
            .verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0.as_bytes()[..8]))
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A keypair for signing and verification.
pub struct Keypair {
    signing_key: SigningKey,
    pub public_key: PublicKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Rebuild a keypair from its 32-byte secret.
    pub fn from_private_key(bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(bytes))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = PublicKey(signing_key.verifying_key());
        Self {
            signing_key,
            public_key,
        }
    }

    /// The 32-byte secret.
    pub fn private_key(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The address this keypair owns.
    pub fn address(&self) -> Address {
        self.public_key.to_address()
    }

    /// Sign `message` with the secret key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes().to_vec())
    }

    /// Verify a signature against this keypair's public key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        self.public_key.verify(message, signature)
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self::from_private_key(&self.private_key())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"hello world");
        assert!(kp.verify(b"hello world", &sig).is_ok());
        assert_eq!(kp.verify(b"hello", &sig), Err(CryptoError::VerificationFailed));
    }

    #[test]
    fn test_wrong_key_fails() {
        let kp1 = Keypair::generate();
        let kp2 = Keypair::generate();
        let sig = kp1.sign(b"hello");
        assert!(kp2.verify(b"hello", &sig).is_err());
    }

    #[test]
    fn test_address_recovers_public_key() {
        let kp = Keypair::generate();
        let recovered = kp.address().public_key().unwrap();
        assert_eq!(recovered, kp.public_key);
    }

    #[test]
    fn test_malformed_address_rejected() {
        assert!(matches!(
            Address::from("not-hex").public_key(),
            Err(CryptoError::InvalidAddress(_))
        ));
        // Valid hex but wrong length.
        assert!(Address::from("abcd").public_key().is_err());
    }

    #[test]
    fn test_malformed_signature_fails_closed() {
        let kp = Keypair::generate();
        let truncated = Signature::from_bytes(vec![1u8; 10]);
        assert_eq!(
            kp.verify(b"msg", &truncated),
            Err(CryptoError::InvalidSignature)
        );
        assert_eq!(
            Signature::from_hex("zz").unwrap_err(),
            CryptoError::InvalidSignature
        );
    }

    #[test]
    fn test_keypair_from_private_key() {
        let kp1 = Keypair::generate();
        let kp2 = Keypair::from_private_key(&kp1.private_key());
        assert_eq!(kp1.address(), kp2.address());
        assert_eq!(kp1.clone().address(), kp1.address());
    }

    #[test]
    fn test_public_key_json_roundtrip() {
        let kp = Keypair::generate();
        let json = serde_json::to_string(&kp.public_key).unwrap();
        assert_eq!(json, format!("\"{}\"", kp.public_key.to_hex()));
        let parsed: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, kp.public_key);
    }
}
