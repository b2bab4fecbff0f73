//! Node runtime: pending transaction pool and the block producer.

pub mod server;
pub mod txpool;
