//! Core ledger data structures.
//!
//! - `Transaction`: signed arbitrary payload
//! - `Block` / `Header`: ordered transactions sealed by a producer signature
//! - `Blockchain`: append-only header chain guarded by a validator
//! - `Validator`: pluggable acceptance rules

pub mod block;
pub mod blockchain;
pub mod transaction;
pub mod validator;
