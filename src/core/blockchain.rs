//! Core blockchain data structure and block management.

use crate::core::block::{Block, Header};
use crate::core::validator::{BlockValidator, BlockValidatorError, Validator};
use crate::info;
use crate::storage::memory_storage::MemoryStorage;
use crate::storage::storage_trait::{Storage, StorageError};
use crate::types::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors returned by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The validator refused the block; the reason is passed through unchanged.
    #[error(transparent)]
    Rejected(#[from] BlockValidatorError),

    #[error("requested height {requested} is above the current height {height}")]
    HeightOutOfRange { requested: u64, height: u64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Append-only chain of headers backed by a block store.
///
/// Headers are kept in memory, indexed by height; full blocks live in `S`.
/// The header list is never empty: it starts with the genesis header.
///
/// Generic over validator and storage so policies can be swapped at
/// construction without dynamic dispatch.
pub struct Blockchain<V: Validator = BlockValidator, S: Storage = MemoryStorage> {
    headers: RwLock<Vec<Header>>,
    validator: V,
    storage: S,
}

impl Blockchain {
    /// Creates a new blockchain with the default validator and in-memory storage.
    pub fn new(genesis: Block) -> Result<Self, ChainError> {
        Self::with_validator_and_storage(genesis, BlockValidator, MemoryStorage::new())
    }
}

impl<V: Validator, S: Storage> Blockchain<V, S> {
    /// Creates a new blockchain with a custom validator and storage.
    ///
    /// The genesis block is trusted as given: it is persisted and its header
    /// becomes height 0 without running the validator.
    pub fn with_validator_and_storage(
        genesis: Block,
        validator: V,
        storage: S,
    ) -> Result<Self, ChainError> {
        storage.put(&genesis)?;

        info!(
            "Initializing blockchain with genesis block: height={} hash={} transactions={}",
            genesis.height(),
            genesis.hash(),
            genesis.transactions.len()
        );

        Ok(Self {
            headers: RwLock::new(vec![genesis.header().clone()]),
            validator,
            storage,
        })
    }

    fn read_headers(&self) -> RwLockReadGuard<'_, Vec<Header>> {
        self.headers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_headers(&self) -> RwLockWriteGuard<'_, Vec<Header>> {
        self.headers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the height of the chain tip (genesis = 0).
    pub fn height(&self) -> u64 {
        self.read_headers().len().saturating_sub(1) as u64
    }

    /// Returns `true` if a block at `height` has been accepted.
    pub fn has_block(&self, height: u64) -> bool {
        height <= self.height()
    }

    /// Returns the header at `height`.
    pub fn get_header(&self, height: u64) -> Result<Header, ChainError> {
        let headers = self.read_headers();
        usize::try_from(height)
            .ok()
            .and_then(|i| headers.get(i))
            .cloned()
            .ok_or(ChainError::HeightOutOfRange {
                requested: height,
                height: headers.len().saturating_sub(1) as u64,
            })
    }

    /// Returns the header of the current tip.
    pub fn current_header(&self) -> Header {
        self.read_headers()
            .last()
            .cloned()
            .unwrap_or_else(|| unreachable!("header list always holds the genesis header"))
    }

    /// Returns the hash of the current tip.
    pub fn tip(&self) -> Hash {
        self.current_header().hash()
    }

    /// Retrieves an accepted block from storage by header hash.
    pub fn get_block(&self, hash: Hash) -> Result<Block, ChainError> {
        Ok(self.storage.get(hash)?)
    }

    /// Validates `block` against the current tip and appends it.
    ///
    /// Validation and append happen under the same write lock, so two
    /// concurrent submissions for the same height cannot both succeed. On any
    /// error the chain is left untouched. The block is persisted before its
    /// header becomes visible to readers.
    pub fn add_block(&self, block: Block) -> Result<(), ChainError> {
        let mut headers = self.write_headers();

        self.validator.validate_block(headers.as_slice(), &block)?;
        self.storage.put(&block)?;
        headers.push(block.header().clone());

        info!(
            "Adding block to the chain: height={} hash={} transactions={}",
            block.height(),
            block.hash(),
            block.transactions.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::{HEADER_VERSION, data_hash};
    use crate::core::validator::ChainView;
    use crate::utils::test_utils::utils::{
        create_genesis, new_key, new_tx, random_hash, signed_block,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AcceptAllValidator;
    impl Validator for AcceptAllValidator {
        fn validate_block<C: ChainView + ?Sized>(
            &self,
            _: &C,
            _: &Block,
        ) -> Result<(), BlockValidatorError> {
            Ok(())
        }
    }

    struct RejectAllValidator;
    impl Validator for RejectAllValidator {
        fn validate_block<C: ChainView + ?Sized>(
            &self,
            _: &C,
            block: &Block,
        ) -> Result<(), BlockValidatorError> {
            Err(BlockValidatorError::MissingValidatorSignature(block.hash()))
        }
    }

    /// Accepts the genesis put, fails every later one.
    #[derive(Default)]
    struct FailingStorage {
        inner: MemoryStorage,
        puts: AtomicUsize,
    }

    impl Storage for FailingStorage {
        fn put(&self, block: &Block) -> Result<(), StorageError> {
            if self.puts.fetch_add(1, Ordering::SeqCst) == 0 {
                return self.inner.put(block);
            }
            Err(StorageError::WriteFailed {
                hash: block.hash(),
                reason: "disk full".into(),
            })
        }

        fn get(&self, hash: Hash) -> Result<Block, StorageError> {
            self.inner.get(hash)
        }
    }

    fn next_block<V: Validator, S: Storage>(chain: &Blockchain<V, S>) -> Block {
        signed_block(chain.height() + 1, chain.tip(), vec![new_tx(b"payload")])
    }

    #[test]
    fn new_creates_blockchain_with_genesis() {
        let genesis = create_genesis();
        let hash = genesis.hash();
        let bc = Blockchain::new(genesis.clone()).unwrap();

        assert_eq!(bc.height(), 0);
        assert!(bc.has_block(0));
        assert!(!bc.has_block(1));
        assert_eq!(bc.tip(), hash);
        assert_eq!(bc.get_header(0).unwrap(), *genesis.header());
        assert_eq!(bc.get_block(hash).unwrap(), genesis);
    }

    #[test]
    fn genesis_is_not_validated() {
        let mut genesis = create_genesis();
        genesis.signature = None;

        let bc = with_validator(RejectAllValidator, genesis);
        assert_eq!(bc.height(), 0);
    }

    fn with_validator<V: Validator>(validator: V, genesis: Block) -> Blockchain<V> {
        Blockchain::with_validator_and_storage(genesis, validator, MemoryStorage::new()).unwrap()
    }

    #[test]
    fn height_increases_with_blocks() {
        let bc = Blockchain::new(create_genesis()).unwrap();

        for expected in 1..=10 {
            let block = next_block(&bc);
            let hash = block.hash();
            bc.add_block(block).unwrap();

            assert_eq!(bc.height(), expected);
            assert_eq!(bc.tip(), hash);
            assert_eq!(bc.current_header().height, expected);
        }
    }

    #[test]
    fn get_header_out_of_range() {
        let bc = Blockchain::new(create_genesis()).unwrap();

        assert_eq!(
            bc.get_header(1),
            Err(ChainError::HeightOutOfRange {
                requested: 1,
                height: 0
            })
        );
        assert!(bc.get_header(u64::MAX).is_err());
    }

    #[test]
    fn add_block_respects_validator() {
        let genesis = create_genesis();
        let accept_bc = with_validator(AcceptAllValidator, genesis.clone());
        let reject_bc = with_validator(RejectAllValidator, genesis.clone());

        let block = signed_block(1, genesis.hash(), vec![]);

        assert!(accept_bc.add_block(block.clone()).is_ok());
        assert!(matches!(
            reject_bc.add_block(block),
            Err(ChainError::Rejected(_))
        ));
        assert_eq!(accept_bc.height(), 1);
        assert_eq!(reject_bc.height(), 0);
    }

    #[test]
    fn genesis_then_duplicate_then_gap() {
        let genesis = create_genesis();
        let bc = Blockchain::new(genesis.clone()).unwrap();

        let block1 = signed_block(1, genesis.hash(), vec![new_tx(b"first")]);
        bc.add_block(block1.clone()).unwrap();
        assert_eq!(bc.height(), 1);

        let rival = signed_block(1, genesis.hash(), vec![new_tx(b"second")]);
        assert_eq!(
            bc.add_block(rival.clone()),
            Err(ChainError::Rejected(BlockValidatorError::DuplicateBlock {
                height: 1,
                hash: rival.hash()
            }))
        );
        assert!(matches!(
            bc.add_block(block1),
            Err(ChainError::Rejected(BlockValidatorError::DuplicateBlock { .. }))
        ));

        let far = signed_block(69, bc.tip(), vec![]);
        assert_eq!(
            bc.add_block(far),
            Err(ChainError::Rejected(BlockValidatorError::HeightMismatch {
                expected: 2,
                actual: 69
            }))
        );
        assert_eq!(bc.height(), 1);
    }

    #[test]
    fn add_block_with_wrong_previous_hash() {
        let bc = Blockchain::new(create_genesis()).unwrap();
        let block = signed_block(1, random_hash(), vec![]);

        assert!(matches!(
            bc.add_block(block),
            Err(ChainError::Rejected(BlockValidatorError::PrevHashMismatch { .. }))
        ));
        assert_eq!(bc.height(), 0);
    }

    #[test]
    fn valid_signatures_with_tampered_data_hash_rejected() {
        let bc = Blockchain::new(create_genesis()).unwrap();
        let txs = vec![new_tx(b"a"), new_tx(b"b")];

        let mut block = Block::new(
            Header {
                version: HEADER_VERSION,
                prev_block_hash: bc.tip(),
                data_hash: data_hash(&txs[..1]),
                timestamp: 1,
                height: 1,
            },
            txs,
        );
        block.sign(&new_key()).unwrap();

        assert!(matches!(
            bc.add_block(block),
            Err(ChainError::Rejected(BlockValidatorError::DataHashMismatch { .. }))
        ));
    }

    #[test]
    fn unsigned_block_rejected() {
        let bc = Blockchain::new(create_genesis()).unwrap();
        let mut block = next_block(&bc);
        block.signature = None;

        assert_eq!(
            bc.add_block(block.clone()),
            Err(ChainError::Rejected(
                BlockValidatorError::MissingValidatorSignature(block.hash())
            ))
        );
    }

    #[test]
    fn storage_failure_leaves_chain_unchanged() {
        let genesis = create_genesis();
        let bc = Blockchain::with_validator_and_storage(
            genesis.clone(),
            BlockValidator,
            FailingStorage::default(),
        )
        .unwrap();

        let block = next_block(&bc);
        let hash = block.hash();
        assert!(matches!(
            bc.add_block(block),
            Err(ChainError::Storage(StorageError::WriteFailed { .. }))
        ));
        assert_eq!(bc.height(), 0);
        assert_eq!(bc.tip(), genesis.hash());
        assert_eq!(
            bc.get_block(hash),
            Err(ChainError::Storage(StorageError::NotFound(hash)))
        );
    }

    #[test]
    fn accepted_blocks_are_retrievable() {
        let bc = Blockchain::new(create_genesis()).unwrap();
        let block = next_block(&bc);
        bc.add_block(block.clone()).unwrap();

        let stored = bc.get_block(block.hash()).unwrap();
        assert_eq!(stored, block);
        assert_eq!(*stored.header(), bc.get_header(1).unwrap());
    }

    #[test]
    fn large_block_is_retrievable() {
        let bc = Blockchain::new(create_genesis()).unwrap();
        let block = signed_block(1, bc.tip(), vec![new_tx(&vec![1u8; 1_500_000])]);
        let hash = block.hash();
        bc.add_block(block.clone()).unwrap();

        assert_eq!(bc.get_block(hash).unwrap(), block);
    }

    #[test]
    fn concurrent_add_block_admits_exactly_one() {
        let bc = Blockchain::new(create_genesis()).unwrap();
        let tip = bc.tip();
        let candidates: Vec<Block> = (0..8)
            .map(|i| signed_block(1, tip, vec![new_tx(&[i])]))
            .collect();

        let accepted = AtomicUsize::new(0);
        std::thread::scope(|s| {
            for block in &candidates {
                let (bc, accepted) = (&bc, &accepted);
                s.spawn(move || match bc.add_block(block.clone()) {
                    Ok(()) => {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(err) => assert!(matches!(
                        err,
                        ChainError::Rejected(BlockValidatorError::DuplicateBlock { height: 1, .. })
                    )),
                });
            }
        });

        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(bc.height(), 1);
    }

    #[test]
    fn readers_never_see_height_without_header() {
        let bc = Blockchain::new(create_genesis()).unwrap();

        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..30 {
                    bc.add_block(next_block(&bc)).unwrap();
                }
            });

            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..200 {
                        let height = bc.height();
                        let header = bc.get_header(height).unwrap();
                        assert_eq!(header.height, height);
                        assert!(bc.get_block(header.hash()).is_ok());
                    }
                });
            }
        });

        assert_eq!(bc.height(), 30);
    }
}
