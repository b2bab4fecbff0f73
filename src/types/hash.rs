//! 32-byte SHA3-256 hash type and the incremental builder used for all chain hashing.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::sync::OnceLock;

/// SHA3-256 hash length in bytes.
pub const HASH_LEN: usize = 32;

/// Fixed-size 32-byte hash used throughout the ledger.
///
/// This type is `Copy`: hashes are passed around constantly during validation
/// and are small enough to live on the stack.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, Ord, PartialOrd)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// Creates a zero-valued hash (all bytes are 0x00).
    ///
    /// Used as the previous-block hash of the genesis header.
    pub fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    /// Returns `true` if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Returns the hash as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Creates a new SHA3-256 hash builder for incremental hashing.
    pub fn sha3() -> HashBuilder {
        HashBuilder::new()
    }

    /// Hashes a single byte slice in one call.
    pub fn digest(data: &[u8]) -> Hash {
        Hash::sha3().chain(data).finalize()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Encode for Hash {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.0);
    }
}

impl Decode for Hash {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Hash(<[u8; HASH_LEN]>::decode(input)?))
    }
}

/// Incremental SHA3-256 hash builder.
///
/// Implements [`EncodeSink`] so encodable types can be hashed directly
/// without an intermediate byte buffer.
pub struct HashBuilder {
    hasher: Sha3_256,
}

impl HashBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Sha3_256::new(),
        }
    }

    /// Feeds data into the hash computation.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Builder-style variant of [`HashBuilder::update`].
    pub fn chain(mut self, data: &[u8]) -> Self {
        self.hasher.update(data);
        self
    }

    /// Consumes the builder and returns the final hash.
    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for HashBuilder {
    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }
}

/// Memoized hash slot.
///
/// Owners must call [`HashCache::invalidate`] whenever the hashed content
/// changes. Ignored by equality so two otherwise identical values compare
/// equal whether or not their hash was computed yet.
#[derive(Debug, Default)]
pub struct HashCache(OnceLock<Hash>);

impl HashCache {
    pub fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Returns the cached hash, computing it with `f` on first access.
    pub fn get_or_compute(&self, f: impl FnOnce() -> Hash) -> Hash {
        *self.0.get_or_init(f)
    }

    /// Drops the cached value.
    pub fn invalidate(&mut self) {
        self.0 = OnceLock::new();
    }

    pub fn is_cached(&self) -> bool {
        self.0.get().is_some()
    }
}

impl Clone for HashCache {
    fn clone(&self) -> Self {
        let cache = OnceLock::new();
        if let Some(hash) = self.0.get() {
            let _ = cache.set(*hash);
        }
        Self(cache)
    }
}

impl PartialEq for HashCache {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for HashCache {}
