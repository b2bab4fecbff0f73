//! Block persistence.
//!
//! - [`storage_trait`]: the [`Storage`](storage_trait::Storage) trait the ledger writes through
//! - [`memory_storage`]: concurrent in-memory implementation keyed by block hash

pub mod memory_storage;
pub mod storage_trait;
