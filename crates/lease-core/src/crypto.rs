//! Digests, recoverable signatures, and signing wallets.
//!
//! Attestations are signed as 32-byte prehashed digests with secp256k1.
//! Signatures are 65 bytes (`r ‖ s ‖ v`) so the signer's address can be
//! recovered from the signature alone.

use std::fmt;

use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::{B256, Signature};
use serde::{Deserialize, Serialize};

use crate::{CoreError, Principal};

/// Length of a recoverable signature in bytes.
pub const SIGNATURE_LEN: usize = 65;

/// A 32-byte message digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Wraps raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<blake3::Hash> for Digest {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// A 65-byte secp256k1 signature from which the signer can be recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature([u8; SIGNATURE_LEN]);

impl RecoverableSignature {
    /// Wraps raw signature bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a signature from a slice of exactly [`SIGNATURE_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let raw: [u8; SIGNATURE_LEN] = bytes.try_into().map_err(|_| {
            CoreError::MalformedSignature(format!(
                "expected {SIGNATURE_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(raw))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Recovers the address that produced this signature over `digest`.
    pub fn recover(&self, digest: &Digest) -> Result<Principal, CoreError> {
        let signature = Signature::from_raw(&self.0)
            .map_err(|e| CoreError::MalformedSignature(e.to_string()))?;
        signature
            .recover_address_from_prehash(&B256::from(*digest.as_bytes()))
            .map_err(|e| CoreError::MalformedSignature(e.to_string()))
    }
}

/// A secp256k1 key pair able to sign attestation digests.
#[derive(Debug, Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
}

impl Wallet {
    /// Creates a wallet with a randomly generated key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    /// Creates a wallet from a raw 32-byte secret key.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Crypto` if the bytes are not a valid secp256k1 scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CoreError> {
        PrivateKeySigner::from_bytes(&B256::from(*bytes))
            .map(|signer| Self { signer })
            .map_err(|e| CoreError::Crypto(e.to_string()))
    }

    /// The address this wallet signs as.
    #[must_use]
    pub fn principal(&self) -> Principal {
        self.signer.address()
    }

    /// Signs a prehashed digest.
    pub fn sign_digest(&self, digest: &Digest) -> Result<RecoverableSignature, CoreError> {
        let signature = self
            .signer
            .sign_hash_sync(&B256::from(*digest.as_bytes()))
            .map_err(|e| CoreError::Crypto(e.to_string()))?;
        Ok(RecoverableSignature(signature.as_bytes()))
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(data: &[u8]) -> Digest {
        Digest::from(blake3::hash(data))
    }

    #[test]
    fn signature_recovers_signer() {
        let wallet = Wallet::new();
        let digest = digest_of(b"usage");
        let signature = wallet.sign_digest(&digest).unwrap();
        assert_eq!(signature.recover(&digest).unwrap(), wallet.principal());
    }

    #[test]
    fn recovery_over_other_digest_yields_other_address() {
        let wallet = Wallet::new();
        let signature = wallet.sign_digest(&digest_of(b"original")).unwrap();
        let recovered = signature.recover(&digest_of(b"tampered"));
        // Recovery either fails or yields an unrelated key.
        assert_ne!(recovered.ok(), Some(wallet.principal()));
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        let err = RecoverableSignature::from_slice(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, CoreError::MalformedSignature(_)));
    }

    #[test]
    fn garbage_signature_does_not_recover() {
        let signature = RecoverableSignature::from_bytes([0u8; SIGNATURE_LEN]);
        assert!(signature.recover(&digest_of(b"x")).is_err());
    }

    #[test]
    fn wallet_from_bytes_is_deterministic() {
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let a = Wallet::from_bytes(&secret).unwrap();
        let b = Wallet::from_bytes(&secret).unwrap();
        assert_eq!(a.principal(), b.principal());
    }

    #[test]
    fn wallet_from_zero_bytes_fails() {
        assert!(Wallet::from_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn digest_display_is_prefixed_hex() {
        let digest = Digest::from_bytes([0xab; 32]);
        assert!(digest.to_string().starts_with("0xabab"));
        assert_eq!(digest.to_hex().len(), 64);
    }
}
