//! Proof-of-work block assembly
//!
//! The miner runs on its own thread. Each round pulls pooled transactions,
//! builds a candidate block whose coinbase claims the reward plus collected
//! fees, searches nonces until the hash meets the difficulty, and submits
//! the result through the chain pipeline. The cancellation flag is checked
//! on every nonce so a shutdown never waits for the search to finish.

use crate::core::block::{hash_meets_difficulty, Block, BlockHeader};
use crate::core::chain::Chain;
use crate::core::merkle::merkle_root;
use crate::core::transaction::{Transaction, TxInput, TxOutput};
use crate::error::{ChainError, Result};
use crate::utils::current_timestamp;
use data_encoding::HEXLOWER;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Nonces between cooperative yields during the search.
const YIELD_STRIDE: u32 = 256;

pub struct Miner {
    chain: Arc<Chain>,
    coinbase_message: String,
    max_transactions_per_block: usize,
    interval: Duration,
    cancel: Arc<AtomicBool>,
}

impl Miner {
    pub fn new(
        chain: Arc<Chain>,
        coinbase_message: String,
        max_transactions_per_block: usize,
        interval: Duration,
    ) -> Miner {
        Miner {
            chain,
            coinbase_message,
            max_transactions_per_block,
            interval,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag that stops both the round loop and an in-flight nonce
    /// search.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Assemble and solve a block on top of `previous_block_hash`. The
    /// coinbase is prepended with `coinbase_message` in its unlock slot.
    /// Fails with `MiningCancelled` when the token flips mid-search.
    pub fn generate_block(
        &self,
        previous_block_hash: Vec<u8>,
        coinbase_message: &str,
        coinbase_outputs: Vec<TxOutput>,
        transactions: Vec<Transaction>,
    ) -> Result<Block> {
        let coinbase = Transaction::new(vec![TxInput::coinbase(coinbase_message)], coinbase_outputs);

        let mut all = Vec::with_capacity(transactions.len() + 1);
        all.push(coinbase);
        all.extend(transactions);

        let mut hashes = Vec::with_capacity(all.len());
        for tx in &all {
            hashes.push(tx.hash()?);
        }
        let transactions_hash = merkle_root(&hashes)?;

        let difficulty = self.chain.min_difficulty();
        let mut block = Block {
            header: BlockHeader {
                version: 1,
                previous_block_hash,
                transactions_hash,
                timestamp: current_timestamp()?,
                difficulty,
                nonce: 0,
            },
            transactions: all,
        };

        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(ChainError::MiningCancelled);
            }
            if hash_meets_difficulty(&block.hash_hex()?, difficulty) {
                return Ok(block);
            }
            block.header.nonce = block.header.nonce.wrapping_add(1);
            if block.header.nonce % YIELD_STRIDE == 0 {
                thread::yield_now();
            }
        }
    }

    /// One mining round: returns the committed block, or `None` when there
    /// is no tip yet to build on.
    pub fn mine_once(&self) -> Result<Option<crate::storage::StoredBlock>> {
        let store = self.chain.store();
        let Some(tip) = store.tip_block()? else {
            debug!("No tip yet, skipping mining round");
            return Ok(None);
        };

        let mut pooled = store.pooled_transactions()?;
        pooled.sort_by(|a, b| b.fee.cmp(&a.fee));
        pooled.truncate(self.max_transactions_per_block.saturating_sub(1));

        let fees: u64 = pooled.iter().map(|record| record.fee as u64).sum();
        let payout = u32::try_from(self.chain.block_reward() as u64 + fees).map_err(|_| {
            ChainError::ValueRange("Coinbase payout overflows the money range".to_string())
        })?;

        let lock_script = self.reward_lock_script()?;
        let transactions: Vec<Transaction> =
            pooled.iter().map(|record| record.to_transaction()).collect();

        // The height tag keeps every mint's bytes unique: without it two
        // empty blocks would carry the same coinbase hash and the second
        // would be rejected as a duplicate transaction.
        let message = format!("{} {}", self.coinbase_message, tip.height + 1);

        let block = self.generate_block(
            HEXLOWER
                .decode(tip.hash.as_bytes())
                .map_err(|e| ChainError::Database(format!("Bad tip hash encoding: {e}")))?,
            &message,
            vec![TxOutput::new(payout, lock_script)],
            transactions,
        )?;

        let record = self.chain.submit(&block)?;
        info!(
            "Mined block {} at height {} paying {payout}",
            record.hash, record.height
        );
        Ok(Some(record))
    }

    /// Reward destination: the lock script of the genesis coinbase output.
    fn reward_lock_script(&self) -> Result<String> {
        let store = self.chain.store();
        let genesis = store
            .find_block_by_height(0)?
            .ok_or_else(|| ChainError::Database("Missing genesis block".to_string()))?;
        let coinbase_hash = genesis.transaction_hashes.first().ok_or_else(|| {
            ChainError::Database("Genesis block has no transactions".to_string())
        })?;
        let coinbase = store.find_transaction(coinbase_hash)?.ok_or_else(|| {
            ChainError::Database(format!("Missing genesis coinbase {coinbase_hash}"))
        })?;
        let output = coinbase.outputs.first().ok_or_else(|| {
            ChainError::Database("Genesis coinbase has no outputs".to_string())
        })?;
        Ok(output.lock_script.clone())
    }

    /// Round loop. A failed round is logged and the loop keeps going;
    /// only the cancellation flag stops it.
    pub fn run(&self) {
        info!(
            "Miner started, interval {:?}, difficulty {}",
            self.interval,
            self.chain.min_difficulty()
        );
        while !self.cancel.load(Ordering::Relaxed) {
            thread::sleep(self.interval);
            if self.cancel.load(Ordering::Relaxed) {
                break;
            }
            match self.mine_once() {
                Ok(Some(_)) => {}
                Ok(None) => {}
                Err(ChainError::MiningCancelled) => break,
                Err(e) => error!("Mining round failed: {e}"),
            }
        }
        info!("Miner stopped");
    }

    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run())
    }
}
