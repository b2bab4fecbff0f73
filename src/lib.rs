//! Hash-chained ledger library.
//!
//! Provides signed transactions, blocks linked by header hashes, a
//! single-writer chain with pluggable validation, a pending transaction pool
//! and a timed block producer.

pub mod config;
pub mod core;
pub mod crypto;
pub mod node;
pub mod storage;
pub mod types;
pub mod utils;
