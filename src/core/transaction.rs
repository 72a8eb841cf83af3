// Transaction domain types for the UTXO ledger.
// A transaction consumes outputs of earlier confirmed transactions and
// creates new ones; the coinbase transaction of a block mints new value
// through a sentinel input that references nothing spendable.

use crate::core::codec;
use crate::error::Result;
use crate::utils::double_sha256_digest;
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

/// Width of every transaction and block hash in bytes (64 hex characters).
pub const HASH_LEN: usize = 32;

/// Referenced-output hash carried by a coinbase input.
pub const COINBASE_REFERENCED_HASH: [u8; HASH_LEN] = [0u8; HASH_LEN];

/// Referenced-output index carried by a coinbase input.
pub const COINBASE_REFERENCED_INDEX: i32 = -1;

/// A reference to a previous transaction output plus the unlock script
/// that proves the right to spend it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(rename_all = "camelCase")]
pub struct TxInput {
    #[serde(with = "crate::utils::hex_bytes")]
    pub referenced_output_hash: Vec<u8>,
    pub referenced_output_index: i32,
    pub unlock_script: String,
}

impl TxInput {
    pub fn new(referenced_output_hash: Vec<u8>, referenced_output_index: i32) -> TxInput {
        TxInput {
            referenced_output_hash,
            referenced_output_index,
            unlock_script: String::new(),
        }
    }

    /// The sentinel input of a coinbase transaction. The unlock script slot
    /// carries an arbitrary message instead of a proof.
    pub fn coinbase(message: &str) -> TxInput {
        TxInput {
            referenced_output_hash: COINBASE_REFERENCED_HASH.to_vec(),
            referenced_output_index: COINBASE_REFERENCED_INDEX,
            unlock_script: message.to_string(),
        }
    }

    /// True when both sentinel markers are present: an all-zero referenced
    /// hash and index -1.
    pub fn is_coinbase(&self) -> bool {
        self.referenced_output_index == COINBASE_REFERENCED_INDEX
            && self.referenced_output_hash.iter().all(|b| *b == 0)
    }

    /// `hash#index` rendering used in error messages and store keys.
    pub fn outpoint(&self) -> String {
        format!(
            "{}#{}",
            HEXLOWER.encode(&self.referenced_output_hash),
            self.referenced_output_index
        )
    }
}

/// A spendable amount locked to an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(rename_all = "camelCase")]
pub struct TxOutput {
    pub value: u32,
    pub lock_script: String,
}

impl TxOutput {
    pub fn new(value: u32, lock_script: String) -> TxOutput {
        TxOutput { value, lock_script }
    }
}

/// A transfer of value. The hash is always derived from the canonical
/// encoding, never stored on the domain type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Transaction {
        Transaction {
            version: 1,
            inputs,
            outputs,
        }
    }

    /// Double SHA-256 of the canonical encoding.
    pub fn hash(&self) -> Result<Vec<u8>> {
        Ok(double_sha256_digest(&codec::transaction_bytes(self)?))
    }

    pub fn hash_hex(&self) -> Result<String> {
        Ok(HEXLOWER.encode(&self.hash()?))
    }

    /// The message a signature covers: the canonical encoding with unlock
    /// scripts blanked so a signature never covers itself.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        codec::signing_bytes(self)
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }
}
