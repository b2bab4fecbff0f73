//! ECDSA key pairs on secp256k1.

use crate::types::address::{ADDRESS_SIZE, Address};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::Hash;
use k256::ecdsa::signature::hazmat::{PrehashVerifier, RandomizedPrehashSigner};
use k256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand_core::{OsRng, RngCore};
use sha3::{Digest, Sha3_256};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

/// Length of a compressed SEC1 public key.
pub const PUBLIC_KEY_LEN: usize = 33;

/// Length of a fixed-size `r || s` signature.
pub const SIGNATURE_LEN: usize = 64;

/// Failures of the signing subsystem.
///
/// `RandomnessUnavailable` means the OS entropy source cannot be used; the
/// process cannot produce keys or signatures and should stop.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("secure randomness source unavailable: {0}")]
    RandomnessUnavailable(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}

/// Reads `N` bytes from the OS CSPRNG.
fn entropy<const N: usize>() -> Result<Zeroizing<[u8; N]>, CryptoError> {
    let mut buf = Zeroizing::new([0u8; N]);
    OsRng
        .try_fill_bytes(buf.as_mut())
        .map_err(|e| CryptoError::RandomnessUnavailable(e.to_string()))?;
    Ok(buf)
}

/// Private key for signing transactions and blocks.
///
/// Lives only inside the process that generated it; no encoding is provided.
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

impl PrivateKey {
    /// Generates a fresh private key from OS-provided entropy.
    ///
    /// Candidate scalars outside the curve order are discarded and redrawn.
    pub fn generate() -> Result<Self, CryptoError> {
        loop {
            let seed = entropy::<32>()?;
            if let Some(key) = Self::from_bytes(&seed) {
                return Ok(key);
            }
        }
    }

    /// Creates a private key from raw bytes.
    ///
    /// Returns `None` if the bytes are not a valid non-zero secp256k1 scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        SigningKey::from_bytes(bytes.into())
            .ok()
            .map(|key| Self { key })
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(VerifyingKey::from(&self.key))
    }

    /// Signs a message hash with a randomized ECDSA nonce.
    pub fn sign(&self, hash: &Hash) -> Result<Signature, CryptoError> {
        // Probe the entropy source first so an unusable RNG surfaces as an
        // error rather than a panic inside the signer.
        entropy::<8>()?;
        self.key
            .sign_prehash_with_rng(&mut OsRng, hash.as_slice())
            .map(Signature)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("address", &self.public_key().address())
            .finish_non_exhaustive()
    }
}

/// Public key for signature verification and address derivation.
///
/// The address is computed once on construction and carried alongside the key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
    address: Address,
}

impl PublicKey {
    fn from_verifying_key(key: VerifyingKey) -> Self {
        let address = derive_address(&key);
        Self { key, address }
    }

    /// Returns the compressed SEC1 encoding (33 bytes).
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        let point = self.key.to_encoded_point(true);
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Parses a compressed or uncompressed SEC1 public key.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Option<Self> {
        VerifyingKey::from_sec1_bytes(bytes)
            .ok()
            .map(Self::from_verifying_key)
    }

    /// Address derived from this key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Verifies `signature` over `hash`.
    ///
    /// Total: any mismatch, including a malformed signature, yields `false`.
    pub fn verify(&self, hash: &Hash, signature: &Signature) -> bool {
        self.key
            .verify_prehash(hash.as_slice(), &signature.0)
            .is_ok()
    }
}

/// Address derivation: SHA3-256(compressed_key)[12..32].
fn derive_address(key: &VerifyingKey) -> Address {
    let mut hasher = Sha3_256::new();
    hasher.update(key.to_encoded_point(true).as_bytes());
    let full: [u8; 32] = hasher.finalize().into();

    let mut addr = [0u8; ADDRESS_SIZE];
    addr.copy_from_slice(&full[32 - ADDRESS_SIZE..]);
    Address(addr)
}

impl Encode for PublicKey {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.to_bytes());
    }
}

impl Decode for PublicKey {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let raw = <[u8; PUBLIC_KEY_LEN]>::decode(input)?;
        PublicKey::from_sec1_bytes(&raw).ok_or(DecodeError::InvalidValue)
    }
}

/// ECDSA signature, the `(r, s)` scalar pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature(EcdsaSignature);

impl Signature {
    /// Big-endian bytes of `r`.
    pub fn r(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        let (r, _) = self.0.split_bytes();
        out.copy_from_slice(&r);
        out
    }

    /// Big-endian bytes of `s`.
    pub fn s(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        let (_, s) = self.0.split_bytes();
        out.copy_from_slice(&s);
        out
    }

    /// Returns the fixed-size `r || s` encoding.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(&self.0.to_bytes());
        out
    }

    /// Parses `r || s`; fails if either scalar is zero or out of range.
    pub fn from_bytes(bytes: &[u8; SIGNATURE_LEN]) -> Option<Self> {
        EcdsaSignature::from_slice(bytes).ok().map(Signature)
    }
}

impl Encode for Signature {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.to_bytes());
    }
}

impl Decode for Signature {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let raw = <[u8; SIGNATURE_LEN]>::decode(input)?;
        Signature::from_bytes(&raw).ok_or(DecodeError::InvalidValue)
    }
}
