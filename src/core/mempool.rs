//! Transaction validation and pool admission
//!
//! `submit` runs the full ordered pipeline: structural checks first, then
//! economic checks against confirmed state, then signature verification,
//! and finally the atomic pool insert. The insert re-runs every
//! state-dependent check inside the store transaction, so two concurrent
//! submissions of conflicting spends can never both land.

use crate::core::script::{LockScript, UnlockScript};
use crate::core::transaction::{Transaction, TxOutput};
use crate::error::{ChainError, Result};
use crate::events::{ChainEvent, EventSink};
use crate::storage::{ChainStore, StoredTransaction};
use crate::utils::ecdsa_p256_verify;
use crate::wallet::address_from_public_key;
use data_encoding::HEXLOWER;
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// Upper bound on the canonical encoding of one transaction.
pub const MAX_TRANSACTION_SIZE: usize = 1024 * 1024;

/// Exclusive upper bound on any value total.
pub const MAX_MONEY: u64 = 1 << 32;

pub struct Mempool {
    store: Arc<ChainStore>,
    events: Arc<dyn EventSink>,
}

impl Mempool {
    pub fn new(store: Arc<ChainStore>, events: Arc<dyn EventSink>) -> Mempool {
        Mempool { store, events }
    }

    /// Validate an ordinary transaction and admit it into the pool.
    /// All-or-nothing: the first failing check rejects the transaction and
    /// nothing is written.
    pub fn submit(&self, tx: &Transaction) -> Result<StoredTransaction> {
        let (hash_hex, total_output) = check_shape(tx)?;

        // Either sentinel half on its own is still a mint attempt: a
        // negative index or the all-zero referenced hash.
        for input in &tx.inputs {
            if input.referenced_output_index < 0
                || input.referenced_output_hash.iter().all(|b| *b == 0)
            {
                return Err(ChainError::IllegalCoinbaseInput(
                    "Ordinary transactions cannot carry the mint sentinel".to_string(),
                ));
            }
        }
        for input in &tx.inputs {
            UnlockScript::parse(&input.unlock_script)?;
        }
        for output in &tx.outputs {
            LockScript::parse(&output.lock_script)?;
        }
        check_duplicate_inputs(tx)?;

        if self.store.find_transaction(&hash_hex)?.is_some() {
            return Err(ChainError::DuplicateTransaction(hash_hex));
        }

        let referenced = self.resolve_referenced_outputs(tx)?;

        let total_input: u64 = referenced.iter().map(|out| out.value as u64).sum();
        if total_input >= MAX_MONEY {
            return Err(ChainError::ValueRange(format!(
                "Total input {total_input} exceeds the money range"
            )));
        }
        if total_input < total_output {
            return Err(ChainError::InsufficientFunds {
                total_input,
                total_output,
            });
        }
        let fee = (total_input - total_output) as u32;

        self.verify_unlock_scripts(tx, &referenced)?;

        let record = StoredTransaction::pooled(tx, hash_hex, fee)?;
        self.store.insert_pooled_transaction(&record)?;
        debug!("Pooled transaction {} with fee {fee}", record.hash);

        if let Err(e) = self.events.notify(ChainEvent::TransactionAccepted {
            hash: record.hash.clone(),
        }) {
            warn!("Dropped transaction event for {}: {e}", record.hash);
        }
        Ok(record)
    }

    /// Look up every referenced output among confirmed transactions and
    /// check it is not spent or reserved. Returns the outputs in input
    /// order.
    fn resolve_referenced_outputs(&self, tx: &Transaction) -> Result<Vec<TxOutput>> {
        let mut resolved = Vec::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            let out_hash = HEXLOWER.encode(&input.referenced_output_hash);
            let index = input.referenced_output_index as u32;
            let outpoint = input.outpoint();

            if self.store.pool_reservation(&out_hash, index)?.is_some() {
                return Err(ChainError::PoolConflict(outpoint));
            }
            if self.store.spender_of(&out_hash, index)?.is_some() {
                return Err(ChainError::AlreadySpent(outpoint));
            }

            let referenced = self
                .store
                .find_transaction(&out_hash)?
                .filter(|record| !record.is_pooled())
                .ok_or_else(|| ChainError::UnspentOutputNotFound(outpoint.clone()))?;
            let output = referenced
                .outputs
                .get(index as usize)
                .ok_or(ChainError::UnspentOutputNotFound(outpoint))?;
            resolved.push(output.clone());
        }
        Ok(resolved)
    }

    /// Check each unlock script against the lock script of the output it
    /// spends: the public key must hash to the lock address and the
    /// signature must verify over the sighash.
    fn verify_unlock_scripts(&self, tx: &Transaction, referenced: &[TxOutput]) -> Result<()> {
        let sighash = tx.signing_bytes()?;
        for (input, output) in tx.inputs.iter().zip(referenced) {
            let unlock = UnlockScript::parse(&input.unlock_script)?;
            let lock = LockScript::parse(&output.lock_script)?;

            let derived = address_from_public_key(&unlock.public_key);
            if derived != lock.address {
                return Err(ChainError::AddressMismatch(format!(
                    "Output {} is locked to {}, key hashes to {derived}",
                    input.outpoint(),
                    lock.address
                )));
            }
            if !ecdsa_p256_verify(&unlock.public_key, &unlock.signature, &sighash) {
                return Err(ChainError::InvalidSignature(format!(
                    "Input {} signature does not verify",
                    input.outpoint()
                )));
            }
        }
        Ok(())
    }
}

/// Structural and output-value checks shared with block validation: version,
/// non-empty lists, encoded size, positive in-range output values. Returns
/// the transaction hash and the output total.
pub fn check_shape(tx: &Transaction) -> Result<(String, u64)> {
    if tx.version != 1 {
        return Err(ChainError::UnsupportedVersion(tx.version));
    }
    if tx.inputs.is_empty() {
        return Err(ChainError::EmptyList("Transaction inputs".to_string()));
    }
    if tx.outputs.is_empty() {
        return Err(ChainError::EmptyList("Transaction outputs".to_string()));
    }

    let encoded = crate::core::codec::transaction_bytes(tx)?;
    if encoded.len() > MAX_TRANSACTION_SIZE {
        return Err(ChainError::Oversize {
            size: encoded.len(),
            limit: MAX_TRANSACTION_SIZE,
        });
    }

    let mut total_output: u64 = 0;
    for output in &tx.outputs {
        if output.value == 0 {
            return Err(ChainError::ValueRange(
                "Output values must be positive".to_string(),
            ));
        }
        total_output += output.value as u64;
    }
    if total_output >= MAX_MONEY {
        return Err(ChainError::ValueRange(format!(
            "Total output {total_output} exceeds the money range"
        )));
    }

    Ok((tx.hash_hex()?, total_output))
}

fn check_duplicate_inputs(tx: &Transaction) -> Result<()> {
    let mut seen = HashSet::new();
    for input in &tx.inputs {
        let outpoint = input.outpoint();
        if !seen.insert(outpoint.clone()) {
            return Err(ChainError::DuplicateInput(outpoint));
        }
    }
    Ok(())
}
