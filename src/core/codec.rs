//! Canonical binary encoding
//!
//! The byte layout here is the wire contract: hashes and signatures are
//! computed over these exact bytes, so any change breaks interoperability.
//! All integers are big-endian. The referenced-output index is written as a
//! signed 32-bit two's complement value so the coinbase sentinel -1 encodes
//! as 0xFFFFFFFF.

use crate::core::block::BlockHeader;
use crate::core::transaction::{Transaction, TxInput, TxOutput, HASH_LEN};
use crate::error::{ChainError, Result};

/// Bounded reader over an encoded buffer. Every read is length-checked so a
/// truncated encoding fails instead of reading out of bounds.
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> ByteReader<'a> {
        ByteReader { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                ChainError::MalformedEncoding(format!(
                    "Truncated input: need {len} bytes at offset {}",
                    self.pos
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Rejects over-length input: decoding must consume every byte.
    fn finish(&self) -> Result<()> {
        if self.pos != self.bytes.len() {
            return Err(ChainError::MalformedEncoding(format!(
                "{} trailing bytes after decoded value",
                self.bytes.len() - self.pos
            )));
        }
        Ok(())
    }
}

fn check_hash_width(hash: &[u8], what: &str) -> Result<()> {
    if hash.len() != HASH_LEN {
        return Err(ChainError::MalformedEncoding(format!(
            "{what} must be {HASH_LEN} bytes, got {}",
            hash.len()
        )));
    }
    Ok(())
}

fn script_len(script: &str, what: &str) -> Result<u32> {
    u32::try_from(script.len()).map_err(|_| {
        ChainError::MalformedEncoding(format!("{what} longer than a 4-byte length field"))
    })
}

fn count_field(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| ChainError::MalformedEncoding(format!("{what} count exceeds u32")))
}

fn encode(tx: &Transaction, with_unlock_scripts: bool) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&tx.version.to_be_bytes());

    out.extend_from_slice(&count_field(tx.inputs.len(), "input")?.to_be_bytes());
    for input in &tx.inputs {
        check_hash_width(&input.referenced_output_hash, "referenced output hash")?;
        out.extend_from_slice(&input.referenced_output_hash);
        out.extend_from_slice(&input.referenced_output_index.to_be_bytes());
        if with_unlock_scripts {
            out.extend_from_slice(&script_len(&input.unlock_script, "unlock script")?.to_be_bytes());
            out.extend_from_slice(input.unlock_script.as_bytes());
        } else {
            // Sighash form: zero length, no script bytes.
            out.extend_from_slice(&0u32.to_be_bytes());
        }
    }

    out.extend_from_slice(&count_field(tx.outputs.len(), "output")?.to_be_bytes());
    for output in &tx.outputs {
        out.extend_from_slice(&output.value.to_be_bytes());
        out.extend_from_slice(&script_len(&output.lock_script, "lock script")?.to_be_bytes());
        out.extend_from_slice(output.lock_script.as_bytes());
    }

    Ok(out)
}

/// Full canonical encoding, the preimage of the transaction hash.
pub fn transaction_bytes(tx: &Transaction) -> Result<Vec<u8>> {
    encode(tx, true)
}

/// Sighash encoding: unlock scripts replaced by zero-length fields so a
/// signature covers everything except itself.
pub fn signing_bytes(tx: &Transaction) -> Result<Vec<u8>> {
    encode(tx, false)
}

/// Exact inverse of [`transaction_bytes`]. Fails on truncated or over-length
/// input.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction> {
    let mut reader = ByteReader::new(bytes);

    let version = reader.read_u32()?;

    let input_count = reader.read_u32()? as usize;
    let mut inputs = Vec::with_capacity(input_count.min(1024));
    for _ in 0..input_count {
        let referenced_output_hash = reader.take(HASH_LEN)?.to_vec();
        let referenced_output_index = reader.read_i32()?;
        let unlock_len = reader.read_u32()? as usize;
        let unlock_script = String::from_utf8(reader.take(unlock_len)?.to_vec())
            .map_err(|e| ChainError::MalformedEncoding(format!("Unlock script not UTF-8: {e}")))?;
        inputs.push(TxInput {
            referenced_output_hash,
            referenced_output_index,
            unlock_script,
        });
    }

    let output_count = reader.read_u32()? as usize;
    let mut outputs = Vec::with_capacity(output_count.min(1024));
    for _ in 0..output_count {
        let value = reader.read_u32()?;
        let lock_len = reader.read_u32()? as usize;
        let lock_script = String::from_utf8(reader.take(lock_len)?.to_vec())
            .map_err(|e| ChainError::MalformedEncoding(format!("Lock script not UTF-8: {e}")))?;
        outputs.push(TxOutput { value, lock_script });
    }

    reader.finish()?;

    Ok(Transaction {
        version,
        inputs,
        outputs,
    })
}

/// Header encoding, the preimage of the block hash. The trailing 4-byte
/// transaction-count field is fixed at zero, a legacy placeholder kept for
/// hash compatibility.
pub fn block_header_bytes(header: &BlockHeader) -> Result<Vec<u8>> {
    check_hash_width(&header.previous_block_hash, "previous block hash")?;
    check_hash_width(&header.transactions_hash, "transactions hash")?;

    let mut out = Vec::with_capacity(4 + HASH_LEN * 2 + 16);
    out.extend_from_slice(&header.version.to_be_bytes());
    out.extend_from_slice(&header.previous_block_hash);
    out.extend_from_slice(&header.transactions_hash);
    out.extend_from_slice(&header.timestamp.to_be_bytes());
    out.extend_from_slice(&header.difficulty.to_be_bytes());
    out.extend_from_slice(&header.nonce.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    Ok(out)
}

/// Exact inverse of [`block_header_bytes`].
pub fn decode_block_header(bytes: &[u8]) -> Result<BlockHeader> {
    let mut reader = ByteReader::new(bytes);

    let version = reader.read_u32()?;
    let previous_block_hash = reader.take(HASH_LEN)?.to_vec();
    let transactions_hash = reader.take(HASH_LEN)?.to_vec();
    let timestamp = reader.read_u32()?;
    let difficulty = reader.read_u32()?;
    let nonce = reader.read_u32()?;
    let placeholder = reader.read_u32()?;
    if placeholder != 0 {
        return Err(ChainError::MalformedEncoding(format!(
            "Header transaction-count placeholder must be zero, got {placeholder}"
        )));
    }
    reader.finish()?;

    Ok(BlockHeader {
        version,
        previous_block_hash,
        transactions_hash,
        timestamp,
        difficulty,
        nonce,
    })
}
