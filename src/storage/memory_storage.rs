//! In-memory block store.

use crate::core::block::Block;
use crate::storage::storage_trait::{Storage, StorageError};
use crate::types::encoding::{Decode, Encode};
use crate::types::hash::Hash;
use bytes::Bytes;
use dashmap::DashMap;

/// Sharded concurrent map from block hash to the block's canonical encoding.
///
/// Blocks are decoded on every [`Storage::get`], so callers always receive an
/// owned copy that cannot alias stored state.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blocks: DashMap<Hash, Bytes>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn put(&self, block: &Block) -> Result<(), StorageError> {
        self.blocks.insert(block.hash(), block.to_bytes());
        Ok(())
    }

    fn get(&self, hash: Hash) -> Result<Block, StorageError> {
        let bytes = self
            .blocks
            .get(&hash)
            .map(|entry| entry.value().clone())
            .ok_or(StorageError::NotFound(hash))?;

        Block::from_bytes(&bytes).map_err(|source| StorageError::Corrupt { hash, source })
    }
}
