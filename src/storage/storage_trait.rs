//! Block storage abstraction.
//!
//! Defines the [`Storage`] trait the ledger persists accepted blocks through.

use crate::core::block::Block;
use crate::types::encoding::DecodeError;
use crate::types::hash::Hash;
use thiserror::Error;

/// Errors that can occur while interacting with storage backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No block is stored under the requested hash.
    #[error("block {0} not found")]
    NotFound(Hash),

    /// Stored bytes no longer decode into a block.
    #[error("stored block {hash} is corrupt: {source}")]
    Corrupt { hash: Hash, source: DecodeError },

    /// Backend-specific write failure.
    #[error("failed to persist block {hash}: {reason}")]
    WriteFailed { hash: Hash, reason: String },
}

/// Storage backend for accepted blocks.
///
/// Implementations must be thread-safe (`Send + Sync`); the ledger calls
/// [`Storage::put`] while holding its exclusive lock and expects it to return
/// promptly.
pub trait Storage: Send + Sync {
    /// Persists a block under its header hash.
    fn put(&self, block: &Block) -> Result<(), StorageError>;

    /// Retrieves a block by header hash.
    fn get(&self, hash: Hash) -> Result<Block, StorageError>;
}
