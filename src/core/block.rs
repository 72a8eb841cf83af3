// Block domain types: a header whose hash carries the proof of work, and
// the ordered transaction list the header commits to through the Merkle
// root. The coinbase transaction is always at index 0.

use crate::core::codec;
use crate::core::merkle;
use crate::core::transaction::{Transaction, HASH_LEN};
use crate::error::{ChainError, Result};
use crate::utils::double_sha256_digest;
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

/// The hashed portion of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub version: u32,
    #[serde(with = "crate::utils::hex_bytes")]
    pub previous_block_hash: Vec<u8>,
    #[serde(with = "crate::utils::hex_bytes")]
    pub transactions_hash: Vec<u8>,
    pub timestamp: u32,
    pub difficulty: u32,
    pub nonce: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Double SHA-256 of the canonical header encoding.
    pub fn hash(&self) -> Result<Vec<u8>> {
        Ok(double_sha256_digest(&codec::block_header_bytes(
            &self.header,
        )?))
    }

    pub fn hash_hex(&self) -> Result<String> {
        Ok(HEXLOWER.encode(&self.hash()?))
    }

    /// Merkle root over the hashes of this block's transactions, in block
    /// order. Fails on an empty transaction list.
    pub fn compute_transactions_hash(&self) -> Result<Vec<u8>> {
        let mut hashes = Vec::with_capacity(self.transactions.len());
        for tx in &self.transactions {
            hashes.push(tx.hash()?);
        }
        merkle::merkle_root(&hashes)
    }

    /// True when the block hash starts with at least `difficulty` zero hex
    /// characters.
    pub fn meets_difficulty(&self, difficulty: u32) -> Result<bool> {
        Ok(hash_meets_difficulty(&self.hash_hex()?, difficulty))
    }
}

/// Leading-zero-hex-character proof-of-work target. Difficulty 0 accepts
/// every hash; difficulty beyond the hash width accepts none but the
/// all-zero hash.
pub fn hash_meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    let required = difficulty as usize;
    hash_hex.len() >= required.min(HASH_LEN * 2)
        && hash_hex
            .chars()
            .take(required)
            .all(|c| c == '0')
}

/// Decode a 64-character lowercase hex block or transaction hash.
pub fn decode_hash_hex(hex: &str) -> Result<Vec<u8>> {
    let bytes = HEXLOWER
        .decode(hex.as_bytes())
        .map_err(|e| ChainError::MalformedEncoding(format!("Bad hash hex: {e}")))?;
    if bytes.len() != HASH_LEN {
        return Err(ChainError::MalformedEncoding(format!(
            "Hash must be {} hex characters, got {}",
            HASH_LEN * 2,
            hex.len()
        )));
    }
    Ok(bytes)
}
