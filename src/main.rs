//! Single-node ledger demo.
//!
//! Starts a block producer on a fresh chain and feeds it randomly generated,
//! signed transactions until Ctrl+C.
//!
//! # Usage
//! ```text
//! ledger-node
//! ```
//!
//! Settings come from the environment, see [`ledger::config`].

use ledger::config::NodeConfig;
use ledger::core::block::{Block, HEADER_VERSION, Header, data_hash};
use ledger::core::blockchain::Blockchain;
use ledger::core::transaction::Transaction;
use ledger::crypto::key_pair::{CryptoError, PrivateKey};
use ledger::node::server::Server;
use ledger::types::hash::Hash;
use ledger::utils::log;
use ledger::{error, info, warn};
use rand_core::{OsRng, RngCore};
use std::process;
use std::sync::Arc;
use tokio::sync::mpsc::{Sender, channel};
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

/// Size of the random payload carried by demo transactions.
const DEMO_PAYLOAD_LEN: usize = 32;

#[tokio::main]
async fn main() {
    let config = NodeConfig::from_env().unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });
    log::set_level(config.log_level);

    let validator_key = config.validator.then(|| or_exit(PrivateKey::generate()));
    if let Some(key) = &validator_key {
        info!("Running as validator: address={}", key.public_key().address());
    }

    let genesis = or_exit(genesis_block());
    let chain = match Blockchain::new(genesis) {
        Ok(chain) => Arc::new(chain),
        Err(e) => {
            error!("Failed to initialize chain: {e}");
            process::exit(1);
        }
    };

    let server = Arc::new(Server::new(config.server_ops(validator_key), chain));
    let (sx, rx) = channel::<Transaction>(1024);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let runner = server.clone();
    let mut server_handle = tokio::spawn(async move { runner.run(rx, shutdown_rx).await });
    let feeder = tokio::spawn(feed_transactions(sx, config.tx_interval));

    let finished = tokio::select! {
        res = &mut server_handle => Some(res),
        sig = tokio::signal::ctrl_c() => {
            if let Err(e) = sig {
                warn!("Failed to listen for Ctrl+C: {e}");
            }
            None
        }
    };

    let result = match finished {
        Some(res) => res,
        None => {
            info!("Ctrl+C received, shutting down...");
            let _ = shutdown_tx.send(());
            server_handle.await
        }
    };
    feeder.abort();

    match result {
        Ok(Ok(())) => info!(
            "Node stopped: height={} tip={}",
            server.chain().height(),
            server.chain().tip()
        ),
        Ok(Err(e)) => {
            error!("Server stopped: {e}");
            process::exit(1);
        }
        Err(e) => {
            error!("Server task failed: {e}");
            process::exit(1);
        }
    }
}

/// Unwraps a crypto result, exiting when the randomness source is unusable.
fn or_exit<T>(result: Result<T, CryptoError>) -> T {
    result.unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1);
    })
}

/// Builds the signed, empty height-0 block.
fn genesis_block() -> Result<Block, CryptoError> {
    let header = Header {
        version: HEADER_VERSION,
        prev_block_hash: Hash::zero(),
        data_hash: data_hash(&[]),
        timestamp: 0,
        height: 0,
    };
    let mut genesis = Block::new(header, vec![]);
    genesis.sign(&PrivateKey::generate()?)?;
    Ok(genesis)
}

fn random_transaction(key: &PrivateKey) -> Result<Transaction, CryptoError> {
    let mut data = vec![0u8; DEMO_PAYLOAD_LEN];
    OsRng
        .try_fill_bytes(&mut data)
        .map_err(|e| CryptoError::RandomnessUnavailable(e.to_string()))?;

    let mut tx = Transaction::new(data);
    tx.sign(key)?;
    Ok(tx)
}

/// Submits a random transaction every `interval` until the server hangs up.
async fn feed_transactions(sx: Sender<Transaction>, interval: Duration) {
    let key = or_exit(PrivateKey::generate());
    loop {
        let tx = or_exit(random_transaction(&key));
        if sx.send(tx).await.is_err() {
            return;
        }
        sleep(interval).await;
    }
}
