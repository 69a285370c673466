use serde::{Deserialize, Serialize};

use crate::crypto::{hash_blake3, merkle_root, Address, Hash};
use crate::error::CoreError;
use crate::serialize;
use crate::types::extra::{filter_seals, HeaderExtra, Salt, ValidatorSeal};

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Hash of the previous block (zeros for genesis)
    pub parent_hash: Hash,
    /// Block height (0 for genesis)
    pub height: u64,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
    /// Proposer address
    pub coinbase: Address,
    /// Merkle root of transactions
    pub tx_root: Hash,
    /// Opaque to consensus, carried for the execution layer
    pub state_root: Hash,
    /// Encoded [`HeaderExtra`], empty only for headers built outside consensus
    pub extra: Vec<u8>,
}

impl BlockHeader {
    /// Hash of the header with the proposer seal and committed seals stripped
    pub fn hash(&self) -> Result<Hash, CoreError> {
        let hashable = BlockHeader {
            extra: filter_seals(&self.extra)?,
            ..self.clone()
        };
        let bytes = serialize::to_bytes(&hashable)?;
        Ok(hash_blake3(&bytes))
    }

    pub fn decode_extra(&self) -> Result<HeaderExtra, CoreError> {
        HeaderExtra::decode(&self.extra)
    }
}

/// A complete block. Transactions are opaque byte strings to consensus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Vec<u8>>,
}

impl Block {
    pub fn new(header: BlockHeader, txs: Vec<Vec<u8>>) -> Self {
        Block { header, txs }
    }

    /// Genesis block announcing the initial validator list
    pub fn genesis(validators: Vec<Address>, timestamp: u64) -> Result<Self, CoreError> {
        let extra = HeaderExtra::new(validators, Salt::default()).encode()?;
        Ok(Block {
            header: BlockHeader {
                parent_hash: Hash::ZERO,
                height: 0,
                timestamp,
                coinbase: Address::default(),
                tx_root: Hash::ZERO,
                state_root: Hash::ZERO,
                extra,
            },
            txs: Vec::new(),
        })
    }

    pub fn hash(&self) -> Result<Hash, CoreError> {
        self.header.hash()
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash
    }

    pub fn coinbase(&self) -> Address {
        self.header.coinbase
    }

    pub fn extra(&self) -> Result<HeaderExtra, CoreError> {
        self.header.decode_extra()
    }

    /// Epoch and round the block was proposed in
    pub fn salt(&self) -> Result<Salt, CoreError> {
        Ok(self.extra()?.salt)
    }

    /// Copy of this block carrying a different header extension
    pub fn with_extra(&self, extra: &HeaderExtra) -> Result<Block, CoreError> {
        let mut block = self.clone();
        block.header.extra = extra.encode()?;
        Ok(block)
    }

    /// Sealed copy carrying the aggregated committed seals
    pub fn with_committed_seals(&self, seals: &[ValidatorSeal]) -> Result<Block, CoreError> {
        let mut extra = self.extra()?;
        extra.committed_seals = seals.to_vec();
        self.with_extra(&extra)
    }

    /// Copy carrying the extension of another sealed form of this block
    pub fn with_forwarded_extra(&self, extra: &[u8]) -> Result<Block, CoreError> {
        let mut block = self.clone();
        block.header.extra = extra.to_vec();
        if block.hash()? != self.hash()? {
            return Err(CoreError::InvalidExtra(
                "forwarded extra belongs to another block".into(),
            ));
        }
        Ok(block)
    }

    /// Compute the merkle root of transactions
    pub fn compute_tx_root(&self) -> Hash {
        let leaves: Vec<Hash> = self.txs.iter().map(|tx| hash_blake3(tx)).collect();
        merkle_root(&leaves)
    }

    pub fn verify_tx_root(&self) -> bool {
        self.compute_tx_root() == self.header.tx_root
    }
}
