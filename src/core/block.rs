//! Block and header structures.

use crate::core::transaction::Transaction;
use crate::core::validator::BlockValidatorError;
use crate::crypto::key_pair::{CryptoError, PrivateKey, PublicKey, Signature};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::{Hash, HashCache};

/// Current header format version.
pub const HEADER_VERSION: u32 = 1;

/// Block header containing chain-linking metadata and the transaction commitment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Header format version.
    pub version: u32,
    /// Hash of the parent header; zero for genesis.
    pub prev_block_hash: Hash,
    /// Commitment over the ordered transaction hashes, see [`data_hash`].
    pub data_hash: Hash,
    /// Unix timestamp in nanoseconds.
    pub timestamp: u64,
    /// Position in the chain (genesis = 0).
    pub height: u64,
}

impl Header {
    /// Computes the block identity hash.
    ///
    /// Covers a domain separator and every fixed-size header field, so it can
    /// never collide with a transaction hash over the same bytes.
    pub fn hash(&self) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"BLOCK_HEADER");
        self.encode(&mut h);
        h.finalize()
    }
}

impl Encode for Header {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.version.encode(out);
        self.prev_block_hash.encode(out);
        self.data_hash.encode(out);
        self.timestamp.encode(out);
        self.height.encode(out);
    }
}

impl Decode for Header {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            version: u32::decode(input)?,
            prev_block_hash: Hash::decode(input)?,
            data_hash: Hash::decode(input)?,
            timestamp: u64::decode(input)?,
            height: u64::decode(input)?,
        })
    }
}

/// Commitment over a transaction list: SHA3-256 of the concatenated
/// transaction hashes in order.
///
/// An empty list hashes to SHA3-256 of the empty input.
pub fn data_hash(transactions: &[Transaction]) -> Hash {
    let mut h = Hash::sha3();
    for tx in transactions {
        h.update(tx.hash().as_slice());
    }
    h.finalize()
}

/// Ordered container of transactions plus the producer's signature over the header.
///
/// The header is only reachable mutably through [`Block::header_mut`], which
/// drops the memoized hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    header: Header,
    pub transactions: Vec<Transaction>,
    /// Public key of the producer that signed the header.
    pub validator: Option<PublicKey>,
    /// Producer signature over [`Header::hash`].
    pub signature: Option<Signature>,

    /// Lazily computed header hash.
    cached_hash: HashCache,
}

impl Block {
    /// Creates an unsigned block.
    pub fn new(header: Header, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
            validator: None,
            signature: None,
            cached_hash: HashCache::new(),
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Mutable header access; invalidates the cached hash.
    pub fn header_mut(&mut self) -> &mut Header {
        self.cached_hash.invalidate();
        &mut self.header
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    /// Returns the header hash, computing and caching it on first call.
    pub fn hash(&self) -> Hash {
        self.cached_hash.get_or_compute(|| self.header.hash())
    }

    /// Signs the header hash with the producer key.
    pub fn sign(&mut self, key: &PrivateKey) -> Result<(), CryptoError> {
        let signature = key.sign(&self.hash())?;
        self.validator = Some(key.public_key());
        self.signature = Some(signature);
        Ok(())
    }

    /// Verifies the block's cryptographic integrity.
    ///
    /// Checks, stopping at the first failure:
    /// - a producer signature is present,
    /// - it is valid for the header hash,
    /// - every transaction verifies,
    /// - the header's data hash matches the transactions.
    pub fn verify(&self) -> Result<(), BlockValidatorError> {
        let hash = self.hash();
        let (Some(validator), Some(signature)) = (&self.validator, &self.signature) else {
            return Err(BlockValidatorError::MissingValidatorSignature(hash));
        };

        if !validator.verify(&hash, signature) {
            return Err(BlockValidatorError::InvalidValidatorSignature {
                hash,
                validator: validator.address(),
            });
        }

        for (index, tx) in self.transactions.iter().enumerate() {
            tx.verify()
                .map_err(|source| BlockValidatorError::InvalidTransaction {
                    index,
                    block: hash,
                    source,
                })?;
        }

        let actual = data_hash(&self.transactions);
        if actual != self.header.data_hash {
            return Err(BlockValidatorError::DataHashMismatch {
                block: hash,
                expected: self.header.data_hash,
                actual,
            });
        }

        Ok(())
    }
}

impl Encode for Block {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.header.encode(out);
        self.transactions.encode(out);
        self.validator.encode(out);
        self.signature.encode(out);
    }
}

impl Decode for Block {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut block = Block::new(Header::decode(input)?, Vec::<Transaction>::decode(input)?);
        block.validator = Option::<PublicKey>::decode(input)?;
        block.signature = Option::<Signature>::decode(input)?;
        Ok(block)
    }
}
