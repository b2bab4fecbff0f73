//! Block validation rules.
//!
//! Provides the [`Validator`] trait for pluggable validation policies and
//! [`BlockValidator`] as the default implementation.

use crate::core::block::{Block, Header};
use crate::core::transaction::TransactionError;
use crate::types::address::Address;
use crate::types::hash::Hash;
use thiserror::Error;

/// Reasons a candidate block is rejected.
///
/// Variants are listed in the order the default validator checks them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockValidatorError {
    #[error("block at height {height} already exists (candidate hash {hash})")]
    DuplicateBlock { height: u64, hash: Hash },

    #[error("invalid block height {actual}, expected {expected}")]
    HeightMismatch { expected: u64, actual: u64 },

    #[error("invalid previous block hash {actual}, expected {expected}")]
    PrevHashMismatch { expected: Hash, actual: Hash },

    #[error("block {0} has no validator signature")]
    MissingValidatorSignature(Hash),

    #[error("invalid validator signature on block {hash} from {validator}")]
    InvalidValidatorSignature { hash: Hash, validator: Address },

    #[error("transaction {index} in block {block} is invalid: {source}")]
    InvalidTransaction {
        index: usize,
        block: Hash,
        source: TransactionError,
    },

    #[error("data hash mismatch in block {block}: header has {expected}, transactions hash to {actual}")]
    DataHashMismatch {
        block: Hash,
        expected: Hash,
        actual: Hash,
    },
}

/// Read-only view of accepted chain state handed to validators.
pub trait ChainView {
    /// Height of the current tip.
    fn height(&self) -> u64;

    /// Header stored at `height`, if any.
    fn header(&self, height: u64) -> Option<&Header>;

    /// Returns `true` if `height` is already occupied.
    fn has_block(&self, height: u64) -> bool {
        height <= self.height()
    }
}

/// Headers indexed by height. Callers must never pass an empty slice.
impl ChainView for [Header] {
    fn height(&self) -> u64 {
        self.len().saturating_sub(1) as u64
    }

    fn header(&self, height: u64) -> Option<&Header> {
        usize::try_from(height).ok().and_then(|i| self.get(i))
    }
}

/// Policy deciding whether a block may extend the chain.
///
/// Implementations must be pure: no side effects, same answer for the same
/// chain state and block.
pub trait Validator: Send + Sync {
    fn validate_block<C: ChainView + ?Sized>(
        &self,
        chain: &C,
        block: &Block,
    ) -> Result<(), BlockValidatorError>;
}

/// Default validator implementing the chain rules.
///
/// Checks, in order:
/// - the candidate height is not already occupied,
/// - the height is exactly one past the tip,
/// - the previous hash matches the tip header,
/// - the block itself verifies (signatures and data hash).
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockValidator;

impl Validator for BlockValidator {
    fn validate_block<C: ChainView + ?Sized>(
        &self,
        chain: &C,
        block: &Block,
    ) -> Result<(), BlockValidatorError> {
        let height = block.height();
        if chain.has_block(height) {
            return Err(BlockValidatorError::DuplicateBlock {
                height,
                hash: block.hash(),
            });
        }

        let expected = chain.height().saturating_add(1);
        if height != expected {
            return Err(BlockValidatorError::HeightMismatch {
                expected,
                actual: height,
            });
        }

        let prev = chain
            .header(height - 1)
            .ok_or(BlockValidatorError::HeightMismatch {
                expected,
                actual: height,
            })?;
        let prev_hash = prev.hash();
        if block.header().prev_block_hash != prev_hash {
            return Err(BlockValidatorError::PrevHashMismatch {
                expected: prev_hash,
                actual: block.header().prev_block_hash,
            });
        }

        block.verify()
    }
}
