//! Block producer.
//!
//! Collects verified transactions into the pool and, on validator nodes,
//! periodically seals them into a signed block on top of the current tip.

use crate::core::block::{Block, HEADER_VERSION, Header, data_hash};
use crate::core::blockchain::{Blockchain, ChainError};
use crate::core::transaction::{Transaction, TransactionError};
use crate::core::validator::{BlockValidator, Validator};
use crate::crypto::key_pair::{CryptoError, PrivateKey};
use crate::node::txpool::{TxPool, TxPoolError};
use crate::storage::memory_storage::MemoryStorage;
use crate::storage::storage_trait::Storage;
use crate::types::hash::Hash;
use crate::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc::Receiver;
use tokio::sync::oneshot;
use tokio::time::{Instant, interval_at};

/// Default interval between produced blocks.
pub const BLOCK_TIME: Duration = Duration::from_secs(5);

/// Configuration options for the server.
pub struct ServerOps {
    /// If set, this node becomes a validator node.
    pub private_key: Option<PrivateKey>,
    /// The max capacity of the transaction pool hosted on this node.
    pub transaction_pool_capacity: Option<usize>,
    /// How often new blocks are created.
    pub block_time: Duration,
}

impl Default for ServerOps {
    fn default() -> Self {
        Self {
            private_key: None,
            transaction_pool_capacity: None,
            block_time: BLOCK_TIME,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("node is not a validator and cannot produce blocks")]
    NotValidator,

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Pool(#[from] TxPoolError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Current Unix time in nanoseconds, 0 if the clock is before the epoch.
fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Node that owns a transaction pool and feeds blocks into a shared chain.
pub struct Server<V: Validator = BlockValidator, S: Storage = MemoryStorage> {
    options: ServerOps,
    chain: Arc<Blockchain<V, S>>,
    tx_pool: TxPool,
}

impl<V: Validator, S: Storage> Server<V, S> {
    /// Creates a new server with the specified configuration.
    pub fn new(options: ServerOps, chain: Arc<Blockchain<V, S>>) -> Self {
        let tx_pool = TxPool::new(options.transaction_pool_capacity);
        Self {
            options,
            chain,
            tx_pool,
        }
    }

    pub fn is_validator(&self) -> bool {
        self.options.private_key.is_some()
    }

    pub fn chain(&self) -> &Arc<Blockchain<V, S>> {
        &self.chain
    }

    pub fn tx_pool(&self) -> &TxPool {
        &self.tx_pool
    }

    /// Verifies a transaction and adds it to the pool.
    ///
    /// Transactions already pooled are accepted without re-verification.
    pub fn process_transaction(&self, mut transaction: Transaction) -> Result<(), ServerError> {
        let hash = transaction.hash();
        if self.tx_pool.contains(hash) {
            debug!("Transaction already in the pool: hash={hash}");
            return Ok(());
        }

        transaction.verify()?;
        transaction.set_first_seen(i64::try_from(unix_nanos()).unwrap_or(i64::MAX));
        self.tx_pool.add(transaction)?;

        info!(
            "Adding new transaction to the pool: hash={hash} pool_size={}",
            self.tx_pool.len()
        );
        Ok(())
    }

    /// Seals every pooled transaction into a block on the current tip.
    ///
    /// Once the chain accepts the block, exactly the sealed transactions leave
    /// the pool; anything admitted after the snapshot stays queued. On failure
    /// the whole pool stays queued for the next attempt.
    pub fn create_new_block(&self) -> Result<Hash, ServerError> {
        let key = self
            .options
            .private_key
            .as_ref()
            .ok_or(ServerError::NotValidator)?;

        let tip = self.chain.current_header();
        let transactions = self.tx_pool.transactions();
        let header = Header {
            version: HEADER_VERSION,
            prev_block_hash: tip.hash(),
            data_hash: data_hash(&transactions),
            timestamp: unix_nanos(),
            height: tip.height + 1,
        };

        let included: Vec<Hash> = transactions.iter().map(Transaction::hash).collect();

        let mut block = Block::new(header, transactions);
        block.sign(key)?;
        let hash = block.hash();

        self.chain.add_block(block)?;
        self.tx_pool.remove_batch(&included);

        info!(
            "Created new block: height={} hash={hash} transactions={}",
            tip.height + 1,
            included.len()
        );
        Ok(hash)
    }

    /// Runs the event loop until `shutdown` fires or its sender is dropped.
    ///
    /// Incoming transactions are processed as they arrive. On validator nodes
    /// a block is produced every `block_time`, starting one period after the
    /// call. Rejections are logged and the loop continues; only an unusable
    /// randomness source ends it with an error.
    pub async fn run(
        &self,
        mut rx: Receiver<Transaction>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Result<(), ServerError> {
        let period = self.options.block_time;
        let mut ticker = interval_at(Instant::now() + period, period);

        info!(
            "Server started: validator={} block_time_ms={}",
            self.is_validator(),
            period.as_millis()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(transaction) = rx.recv() => {
                    if let Err(e) = self.process_transaction(transaction) {
                        warn!("Transaction rejected: {e}");
                    }
                }
                _ = ticker.tick() => {
                    if !self.is_validator() {
                        continue;
                    }
                    match self.create_new_block() {
                        Ok(_) => {}
                        Err(ServerError::Crypto(e @ CryptoError::RandomnessUnavailable(_))) => {
                            error!("Stopping block production: {e}");
                            return Err(e.into());
                        }
                        Err(e) => warn!("Block production failed: {e}"),
                    }
                }
            }
        }

        info!("Server shut down: height={}", self.chain.height());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validator::{BlockValidatorError, ChainView};
    use crate::storage::storage_trait::StorageError;
    use crate::utils::test_utils::utils::{create_genesis, new_key, new_tx};
    use std::sync::{OnceLock, Weak};
    use tokio::sync::mpsc::channel;
    use tokio::time::{sleep, timeout};

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

    /// Stores blocks in memory and submits `late` to the server's pool while
    /// a produced block is being persisted.
    struct AdmittingStorage {
        inner: MemoryStorage,
        server: Arc<OnceLock<Weak<Server<BlockValidator, AdmittingStorage>>>>,
        late: Transaction,
    }

    impl Storage for AdmittingStorage {
        fn put(&self, block: &Block) -> Result<(), StorageError> {
            self.inner.put(block)?;
            if let Some(server) = self.server.get().and_then(Weak::upgrade) {
                server.process_transaction(self.late.clone()).unwrap();
            }
            Ok(())
        }

        fn get(&self, hash: Hash) -> Result<Block, StorageError> {
            self.inner.get(hash)
        }
    }

    fn validator_ops(block_time: Duration) -> ServerOps {
        ServerOps {
            private_key: Some(new_key()),
            transaction_pool_capacity: None,
            block_time,
        }
    }

    fn new_server(options: ServerOps) -> Server {
        Server::new(options, Arc::new(Blockchain::new(create_genesis()).unwrap()))
    }

    fn chain_transactions(server: &Server) -> usize {
        let chain = server.chain();
        (1..=chain.height())
            .map(|h| {
                let header = chain.get_header(h).unwrap();
                chain.get_block(header.hash()).unwrap().transactions.len()
            })
            .sum()
    }

    #[test]
    fn process_transaction_pools_verified_transactions() {
        let server = new_server(ServerOps::default());
        let tx = new_tx(b"hello");
        let hash = tx.hash();

        server.process_transaction(tx.clone()).unwrap();
        assert!(server.tx_pool().contains(hash));
        assert!(server.tx_pool().transactions()[0].first_seen() > 0);

        server.process_transaction(tx).unwrap();
        assert_eq!(server.tx_pool().len(), 1);
    }

    #[test]
    fn process_transaction_rejects_unsigned() {
        let server = new_server(ServerOps::default());
        let tx = Transaction::new(&b"unsigned"[..]);

        assert!(matches!(
            server.process_transaction(tx),
            Err(ServerError::Transaction(TransactionError::Unsigned(_)))
        ));
        assert!(server.tx_pool().is_empty());
    }

    #[test]
    fn process_transaction_reports_full_pool() {
        let server = new_server(ServerOps {
            transaction_pool_capacity: Some(1),
            ..ServerOps::default()
        });

        server.process_transaction(new_tx(b"1")).unwrap();
        assert!(matches!(
            server.process_transaction(new_tx(b"2")),
            Err(ServerError::Pool(TxPoolError::PoolFull { .. }))
        ));
    }

    #[test]
    fn non_validator_cannot_create_blocks() {
        let server = new_server(ServerOps::default());
        assert!(!server.is_validator());
        assert!(matches!(
            server.create_new_block(),
            Err(ServerError::NotValidator)
        ));
    }

    #[test]
    fn create_new_block_seals_pool_in_order() {
        let server = new_server(validator_ops(BLOCK_TIME));
        let txs: Vec<Transaction> = (0..5u8).map(|i| new_tx(&[i])).collect();
        for tx in &txs {
            server.process_transaction(tx.clone()).unwrap();
        }

        let hash = server.create_new_block().unwrap();
        let chain = server.chain();
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.tip(), hash);
        assert!(server.tx_pool().is_empty());

        let block = chain.get_block(hash).unwrap();
        let hashes: Vec<Hash> = block.transactions.iter().map(Transaction::hash).collect();
        let expected: Vec<Hash> = txs.iter().map(Transaction::hash).collect();
        assert_eq!(hashes, expected);
        assert_eq!(block.header().version, HEADER_VERSION);
        assert!(block.verify().is_ok());
    }

    #[test]
    fn transactions_admitted_during_sealing_stay_pooled() {
        let late = new_tx(b"late");
        let handle = Arc::new(OnceLock::new());
        let storage = AdmittingStorage {
            inner: MemoryStorage::new(),
            server: handle.clone(),
            late: late.clone(),
        };
        let chain =
            Blockchain::with_validator_and_storage(create_genesis(), BlockValidator, storage)
                .unwrap();
        let server = Arc::new(Server::new(validator_ops(BLOCK_TIME), Arc::new(chain)));
        assert!(handle.set(Arc::downgrade(&server)).is_ok());

        let sealed = new_tx(b"sealed");
        server.process_transaction(sealed.clone()).unwrap();
        let hash = server.create_new_block().unwrap();

        let block = server.chain().get_block(hash).unwrap();
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].hash(), sealed.hash());

        assert!(!server.tx_pool().contains(sealed.hash()));
        assert!(server.tx_pool().contains(late.hash()));
        assert_eq!(server.tx_pool().len(), 1);
    }

    #[test]
    fn create_new_block_with_empty_pool() {
        let server = new_server(validator_ops(BLOCK_TIME));

        server.create_new_block().unwrap();
        server.create_new_block().unwrap();
        assert_eq!(server.chain().height(), 2);
    }

    #[test]
    fn rejected_block_keeps_pool() {
        let chain = Blockchain::with_validator_and_storage(
            create_genesis(),
            RejectAllValidator,
            MemoryStorage::new(),
        )
        .unwrap();
        let server = Server::new(validator_ops(BLOCK_TIME), Arc::new(chain));
        server.process_transaction(new_tx(b"pending")).unwrap();

        assert!(matches!(
            server.create_new_block(),
            Err(ServerError::Chain(ChainError::Rejected(_)))
        ));
        assert_eq!(server.tx_pool().len(), 1);
        assert_eq!(server.chain().height(), 0);
    }

    #[tokio::test]
    async fn run_produces_blocks_until_shutdown() {
        let server = Arc::new(new_server(validator_ops(Duration::from_millis(20))));
        let (sx, rx) = channel(16);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let runner = server.clone();
        let handle = tokio::spawn(async move { runner.run(rx, shutdown_rx).await });

        for i in 0..3u8 {
            sx.send(new_tx(&[i])).await.unwrap();
        }
        sx.send(Transaction::new(&b"unsigned"[..])).await.unwrap();

        timeout(Duration::from_secs(5), async {
            while chain_transactions(&server) < 3 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("transactions were never sealed");

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(chain_transactions(&server), 3);
        assert!(server.tx_pool().is_empty());
    }

    #[tokio::test]
    async fn non_validator_run_only_pools() {
        let server = Arc::new(new_server(ServerOps {
            block_time: Duration::from_millis(10),
            ..ServerOps::default()
        }));
        let (sx, rx) = channel(16);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let runner = server.clone();
        let handle = tokio::spawn(async move { runner.run(rx, shutdown_rx).await });

        sx.send(new_tx(b"queued")).await.unwrap();
        timeout(Duration::from_secs(5), async {
            while server.tx_pool().is_empty() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("transaction was never pooled");
        sleep(Duration::from_millis(50)).await;

        drop(shutdown_tx);
        handle.await.unwrap().unwrap();

        assert_eq!(server.chain().height(), 0);
        assert_eq!(server.tx_pool().len(), 1);
    }
}
