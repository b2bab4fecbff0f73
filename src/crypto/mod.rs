//! Key generation, ECDSA signing and address derivation.

pub mod key_pair;
