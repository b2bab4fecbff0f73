//! Core value types shared by every ledger component.
//!
//! - `Hash`: fixed-size 32-byte SHA3-256 hashes and the incremental builder
//! - `Address`: 20-byte identifiers derived from public keys
//! - `encoding`: the deterministic binary codec used for hashing and storage

pub mod address;
pub mod encoding;
pub mod hash;
