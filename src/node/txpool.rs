//! Transaction pool for pending transactions awaiting block inclusion.

use crate::core::transaction::Transaction;
use crate::types::hash::Hash;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Default transaction pool capacity.
pub const TXPOOL_CAPACITY: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxPoolError {
    #[error("transaction pool is full (capacity {capacity}), rejected transaction {hash}")]
    PoolFull { capacity: usize, hash: Hash },
}

#[derive(Default)]
struct Pending {
    /// Transactions indexed by hash for deduplication.
    by_hash: HashMap<Hash, Transaction>,
    /// Insertion order, used as block order.
    order: Vec<Hash>,
}

/// Thread-safe pool of pending transactions.
///
/// A single mutex guards both the index and the insertion order, so every
/// call observes and leaves them consistent.
pub struct TxPool {
    capacity: usize,
    pending: Mutex<Pending>,
}

impl TxPool {
    /// Creates a new transaction pool with the given capacity.
    ///
    /// Uses `TXPOOL_CAPACITY` if `None` is provided.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity: capacity.unwrap_or(TXPOOL_CAPACITY).max(1),
            pending: Mutex::new(Pending::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if the pool contains a transaction with the given hash.
    pub fn contains(&self, hash: Hash) -> bool {
        self.lock().by_hash.contains_key(&hash)
    }

    /// Adds a transaction if its hash is not already pooled.
    ///
    /// Re-adding a pooled hash is a successful no-op, even when the pool is full.
    pub fn add(&self, transaction: Transaction) -> Result<(), TxPoolError> {
        let hash = transaction.hash();
        let mut pending = self.lock();

        if pending.by_hash.contains_key(&hash) {
            return Ok(());
        }
        if pending.order.len() >= self.capacity {
            return Err(TxPoolError::PoolFull {
                capacity: self.capacity,
                hash,
            });
        }

        pending.order.push(hash);
        pending.by_hash.insert(hash, transaction);
        Ok(())
    }

    /// Returns the number of transactions in the pool.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all transactions from the pool.
    pub fn flush(&self) {
        let mut pending = self.lock();
        pending.by_hash.clear();
        pending.order.clear();
    }

    /// Removes transactions with the given hashes, keeping the rest in order.
    ///
    /// Unknown hashes are ignored.
    pub fn remove_batch(&self, hashes: &[Hash]) {
        let mut pending = self.lock();
        for hash in hashes {
            pending.by_hash.remove(hash);
        }
        let Pending { by_hash, order } = &mut *pending;
        order.retain(|h| by_hash.contains_key(h));
    }

    /// Returns all transactions in insertion order.
    pub fn transactions(&self) -> Vec<Transaction> {
        let pending = self.lock();
        pending
            .order
            .iter()
            .filter_map(|h| pending.by_hash.get(h).cloned())
            .collect()
    }
}
