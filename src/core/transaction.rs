//! Signed unit of data submitted by clients.

use crate::crypto::key_pair::{CryptoError, PrivateKey, PublicKey, Signature};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::Hash;
use bytes::Bytes;
use thiserror::Error;

/// Reasons a transaction fails verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("transaction {0} is not signed")]
    Unsigned(Hash),

    #[error("invalid signature on transaction {0}")]
    InvalidSignature(Hash),
}

/// A transaction carrying an arbitrary payload.
///
/// A transaction is signed iff both `from` and `signature` are present.
/// Its identity hash covers `data` only, so it is the same before and after
/// signing and changes as soon as the payload does.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    /// Arbitrary payload. `Bytes` keeps clones cheap when the same
    /// transaction sits in the pool and in a block under assembly.
    pub data: Bytes,
    /// Signer's public key.
    pub from: Option<PublicKey>,
    /// ECDSA signature over [`Transaction::hash`].
    pub signature: Option<Signature>,
    /// Unix nanoseconds at which this node first admitted the transaction, 0 if never.
    first_seen: i64,
}

impl Transaction {
    /// Creates an unsigned transaction.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// SHA3-256 of the payload.
    pub fn hash(&self) -> Hash {
        Hash::digest(&self.data)
    }

    /// Signs the payload hash, replacing any previous signature.
    pub fn sign(&mut self, key: &PrivateKey) -> Result<(), CryptoError> {
        let signature = key.sign(&self.hash())?;
        self.from = Some(key.public_key());
        self.signature = Some(signature);
        Ok(())
    }

    /// Checks that the transaction is signed and that the signature matches its payload.
    pub fn verify(&self) -> Result<(), TransactionError> {
        let hash = self.hash();
        let (Some(from), Some(signature)) = (&self.from, &self.signature) else {
            return Err(TransactionError::Unsigned(hash));
        };

        if !from.verify(&hash, signature) {
            return Err(TransactionError::InvalidSignature(hash));
        }
        Ok(())
    }

    pub fn is_signed(&self) -> bool {
        self.from.is_some() && self.signature.is_some()
    }

    pub fn first_seen(&self) -> i64 {
        self.first_seen
    }

    pub fn set_first_seen(&mut self, unix_nanos: i64) {
        self.first_seen = unix_nanos;
    }
}

impl Encode for Transaction {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.data.encode(out);
        self.from.encode(out);
        self.signature.encode(out);
        self.first_seen.encode(out);
    }
}

impl Decode for Transaction {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            data: Bytes::decode(input)?,
            from: Option::<PublicKey>::decode(input)?,
            signature: Option::<Signature>::decode(input)?,
            first_seen: i64::decode(input)?,
        })
    }
}
