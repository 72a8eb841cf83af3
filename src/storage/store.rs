use crate::core::transaction::{Transaction, TxInput, TxOutput, HASH_LEN};
use crate::error::{ChainError, Result};
use crate::utils::{deserialize, serialize};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;

const BLOCKS_TREE: &str = "blocks";
const TRANSACTIONS_TREE: &str = "transactions";
const TIP_BLOCK_HASH_KEY: &str = "tip_block_hash";

/// A transaction as persisted. `block_hash`/`index` are `None` while the
/// transaction is pooled and set when a block confirms it. `cache` holds a
/// denormalized JSON rendering rebuilt on every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(rename_all = "camelCase")]
pub struct StoredTransaction {
    pub hash: String,
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub fee: u32,
    pub block_hash: Option<String>,
    pub index: Option<u32>,
    #[serde(skip)]
    pub cache: String,
}

impl StoredTransaction {
    /// Build a pooled record from a validated transaction.
    pub fn pooled(tx: &Transaction, hash: String, fee: u32) -> Result<StoredTransaction> {
        let mut record = StoredTransaction {
            hash,
            version: tx.version,
            inputs: tx.inputs.clone(),
            outputs: tx.outputs.clone(),
            fee,
            block_hash: None,
            index: None,
            cache: String::new(),
        };
        record.rebuild_cache()?;
        Ok(record)
    }

    pub fn is_pooled(&self) -> bool {
        self.block_hash.is_none()
    }

    pub fn to_transaction(&self) -> Transaction {
        Transaction {
            version: self.version,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }

    pub fn rebuild_cache(&mut self) -> Result<()> {
        self.cache = serde_json::to_string(self)
            .map_err(|e| ChainError::Serialization(format!("Transaction cache: {e}")))?;
        Ok(())
    }
}

/// A block as persisted. Transactions are stored by reference; the full
/// bodies live in the transaction tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlock {
    pub hash: String,
    pub version: u32,
    pub previous_block_hash: String,
    pub transactions_hash: String,
    pub timestamp: u32,
    pub difficulty: u32,
    pub nonce: u32,
    pub height: u64,
    pub transaction_hashes: Vec<String>,
    #[serde(skip)]
    pub cache: String,
}

impl StoredBlock {
    pub fn rebuild_cache(&mut self) -> Result<()> {
        self.cache = serde_json::to_string(self)
            .map_err(|e| ChainError::Serialization(format!("Block cache: {e}")))?;
        Ok(())
    }
}

fn tx_key(hash_hex: &str) -> String {
    format!("tx:{hash_hex}")
}

fn spent_key(out_hash_hex: &str, index: u32) -> String {
    format!("spent:{out_hash_hex}:{index}")
}

fn poolref_key(out_hash_hex: &str, index: u32) -> String {
    format!("poolref:{out_hash_hex}:{index}")
}

fn height_key(height: u64) -> String {
    // Fixed-width keys keep sled's lexicographic order equal to numeric order
    format!("height:{height:016x}")
}

fn genesis_predecessor_hex() -> String {
    "0".repeat(HASH_LEN * 2)
}

/// The outpoints a transaction's inputs reference, as `(hash hex, index)`
/// pairs. Fails on a negative index, which only the coinbase sentinel uses.
fn referenced_outpoints(inputs: &[TxInput]) -> Result<Vec<(String, u32)>> {
    let mut outpoints = Vec::with_capacity(inputs.len());
    for input in inputs {
        let index = u32::try_from(input.referenced_output_index).map_err(|_| {
            ChainError::IllegalCoinbaseInput(format!(
                "Input {} has a negative referenced index",
                input.outpoint()
            ))
        })?;
        outpoints.push((HEXLOWER.encode(&input.referenced_output_hash), index));
    }
    Ok(outpoints)
}

type Abort = ConflictableTransactionError<ChainError>;

fn abort(err: ChainError) -> Abort {
    ConflictableTransactionError::Abort(err)
}

fn unwrap_transaction_error(err: TransactionError<ChainError>) -> ChainError {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => ChainError::Database(err.to_string()),
    }
}

pub struct ChainStore {
    db: sled::Db,
    blocks: sled::Tree,
    txs: sled::Tree,
}

impl ChainStore {
    pub fn open(path: &Path) -> Result<ChainStore> {
        let db = sled::open(path)
            .map_err(|e| ChainError::Database(format!("Failed to open database: {e}")))?;
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| ChainError::Database(format!("Failed to open blocks tree: {e}")))?;
        let txs = db
            .open_tree(TRANSACTIONS_TREE)
            .map_err(|e| ChainError::Database(format!("Failed to open transactions tree: {e}")))?;
        Ok(ChainStore { db, blocks, txs })
    }

    /// Force buffered writes to disk. Commits are durable on their own;
    /// this is for orderly shutdown.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // ---- queries ----

    pub fn tip_hash(&self) -> Result<Option<String>> {
        match self.blocks.get(TIP_BLOCK_HASH_KEY)? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes.to_vec()).map_err(|e| {
                ChainError::Database(format!("Invalid tip hash encoding: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    pub fn tip_block(&self) -> Result<Option<StoredBlock>> {
        match self.tip_hash()? {
            Some(hash) => self.find_block(&hash),
            None => Ok(None),
        }
    }

    pub fn height(&self) -> Result<Option<u64>> {
        Ok(self.tip_block()?.map(|block| block.height))
    }

    pub fn find_block(&self, hash_hex: &str) -> Result<Option<StoredBlock>> {
        match self.blocks.get(hash_hex)? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn find_block_by_height(&self, height: u64) -> Result<Option<StoredBlock>> {
        match self.blocks.get(height_key(height))? {
            Some(bytes) => {
                let hash = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    ChainError::Database(format!("Invalid height index entry: {e}"))
                })?;
                self.find_block(&hash)
            }
            None => Ok(None),
        }
    }

    /// Blocks in ascending height order, `offset` blocks skipped, at most
    /// `limit` returned.
    pub fn list_blocks(&self, offset: u64, limit: usize) -> Result<Vec<StoredBlock>> {
        let mut result = Vec::new();
        for item in self.blocks.scan_prefix("height:").skip(offset as usize) {
            if result.len() >= limit {
                break;
            }
            let (_, value) = item?;
            let hash = String::from_utf8(value.to_vec())
                .map_err(|e| ChainError::Database(format!("Invalid height index entry: {e}")))?;
            let block = self.find_block(&hash)?.ok_or_else(|| {
                ChainError::Database(format!("Height index points at missing block {hash}"))
            })?;
            result.push(block);
        }
        Ok(result)
    }

    pub fn find_transaction(&self, hash_hex: &str) -> Result<Option<StoredTransaction>> {
        match self.txs.get(tx_key(hash_hex))? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All pooled transactions, in no particular order.
    pub fn pooled_transactions(&self) -> Result<Vec<StoredTransaction>> {
        let mut pooled = Vec::new();
        for item in self.txs.scan_prefix("tx:") {
            let (_, value) = item?;
            let record: StoredTransaction = deserialize(&value)?;
            if record.is_pooled() {
                pooled.push(record);
            }
        }
        Ok(pooled)
    }

    /// Hash of the confirmed transaction that spent the outpoint, if any.
    pub fn spender_of(&self, out_hash_hex: &str, index: u32) -> Result<Option<String>> {
        match self.txs.get(spent_key(out_hash_hex, index))? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes.to_vec()).map_err(|e| {
                ChainError::Database(format!("Invalid spent index entry: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// Hash of the pooled transaction holding a reservation on the outpoint,
    /// if any.
    pub fn pool_reservation(&self, out_hash_hex: &str, index: u32) -> Result<Option<String>> {
        match self.txs.get(poolref_key(out_hash_hex, index))? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes.to_vec()).map_err(|e| {
                ChainError::Database(format!("Invalid reservation entry: {e}"))
            })?)),
            None => Ok(None),
        }
    }

    // ---- atomic updates ----

    /// Admit a validated transaction into the pool. The duplicate, spent,
    /// reservation and referenced-output checks run again inside the sled
    /// transaction: the pure validation happened outside it, and another
    /// writer may have changed state in between.
    pub fn insert_pooled_transaction(&self, record: &StoredTransaction) -> Result<()> {
        let outpoints = referenced_outpoints(&record.inputs)?;
        let encoded = serialize(record)?;
        let key = tx_key(&record.hash);

        self.txs
            .transaction(|txs| {
                if txs.get(key.as_bytes())?.is_some() {
                    return Err(abort(ChainError::DuplicateTransaction(record.hash.clone())));
                }

                for (out_hash, index) in &outpoints {
                    let outpoint = format!("{out_hash}#{index}");
                    if txs.get(poolref_key(out_hash, *index).as_bytes())?.is_some() {
                        return Err(abort(ChainError::PoolConflict(outpoint)));
                    }
                    if txs.get(spent_key(out_hash, *index).as_bytes())?.is_some() {
                        return Err(abort(ChainError::AlreadySpent(outpoint)));
                    }
                    let referenced = txs.get(tx_key(out_hash).as_bytes())?.ok_or_else(|| {
                        abort(ChainError::UnspentOutputNotFound(outpoint.clone()))
                    })?;
                    let referenced: StoredTransaction =
                        deserialize(&referenced).map_err(abort)?;
                    if referenced.is_pooled() || *index as usize >= referenced.outputs.len() {
                        return Err(abort(ChainError::UnspentOutputNotFound(outpoint)));
                    }
                }

                for (out_hash, index) in &outpoints {
                    txs.insert(
                        poolref_key(out_hash, *index).as_bytes(),
                        record.hash.as_bytes(),
                    )?;
                }
                txs.insert(key.as_bytes(), encoded.as_slice())?;
                Ok(())
            })
            .map_err(unwrap_transaction_error)
    }

    /// Commit a validated block: persist its coinbase, flip the embedded
    /// pooled transactions to confirmed, move their reservations to spent
    /// marks and advance the tip. One sled transaction over both trees, so
    /// either everything lands or nothing does. Duplicate-block, linkage,
    /// coinbase-hash-uniqueness and pool-membership checks run again
    /// inside it.
    pub fn commit_block(
        &self,
        block: &StoredBlock,
        coinbase: &StoredTransaction,
        embedded_hashes: &[String],
    ) -> Result<()> {
        let block_bytes = serialize(block)?;

        (&self.blocks, &self.txs)
            .transaction(|(blocks, txs)| {
                if blocks.get(block.hash.as_bytes())?.is_some() {
                    return Err(abort(ChainError::DuplicateBlock(block.hash.clone())));
                }

                match blocks.get(TIP_BLOCK_HASH_KEY.as_bytes())? {
                    Some(tip) => {
                        let tip = String::from_utf8(tip.to_vec()).map_err(|e| {
                            abort(ChainError::Database(format!("Invalid tip encoding: {e}")))
                        })?;
                        if tip != block.previous_block_hash {
                            return Err(abort(ChainError::ChainLinkage {
                                expected: tip,
                                got: block.previous_block_hash.clone(),
                            }));
                        }
                    }
                    None => {
                        if block.previous_block_hash != genesis_predecessor_hex() {
                            return Err(abort(ChainError::ChainLinkage {
                                expected: genesis_predecessor_hex(),
                                got: block.previous_block_hash.clone(),
                            }));
                        }
                    }
                }

                // Coinbase is minted here, never pooled first. Its hash
                // still has to be new: a byte-identical mint in an earlier
                // block would otherwise be silently overwritten.
                if txs.get(tx_key(&coinbase.hash).as_bytes())?.is_some() {
                    return Err(abort(ChainError::DuplicateTransaction(
                        coinbase.hash.clone(),
                    )));
                }
                let mut coinbase = coinbase.clone();
                coinbase.block_hash = Some(block.hash.clone());
                coinbase.index = Some(0);
                coinbase.rebuild_cache().map_err(abort)?;
                txs.insert(
                    tx_key(&coinbase.hash).as_bytes(),
                    serialize(&coinbase).map_err(abort)?.as_slice(),
                )?;

                for (position, tx_hash) in embedded_hashes.iter().enumerate() {
                    let bytes = txs.get(tx_key(tx_hash).as_bytes())?.ok_or_else(|| {
                        abort(ChainError::UnknownTransaction(tx_hash.clone()))
                    })?;
                    let mut record: StoredTransaction = deserialize(&bytes).map_err(abort)?;
                    if !record.is_pooled() {
                        return Err(abort(ChainError::UnknownTransaction(tx_hash.clone())));
                    }

                    record.block_hash = Some(block.hash.clone());
                    record.index = Some(position as u32 + 1);
                    record.rebuild_cache().map_err(abort)?;
                    txs.insert(
                        tx_key(tx_hash).as_bytes(),
                        serialize(&record).map_err(abort)?.as_slice(),
                    )?;

                    let outpoints = referenced_outpoints(&record.inputs).map_err(abort)?;
                    for (out_hash, index) in &outpoints {
                        txs.remove(poolref_key(out_hash, *index).as_bytes())?;
                        txs.insert(
                            spent_key(out_hash, *index).as_bytes(),
                            tx_hash.as_bytes(),
                        )?;
                    }
                }

                blocks.insert(block.hash.as_bytes(), block_bytes.as_slice())?;
                blocks.insert(
                    height_key(block.height).as_bytes(),
                    block.hash.as_bytes(),
                )?;
                blocks.insert(TIP_BLOCK_HASH_KEY.as_bytes(), block.hash.as_bytes())?;
                Ok(())
            })
            .map_err(unwrap_transaction_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::TxInput;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, ChainStore) {
        let dir = TempDir::new().unwrap();
        let store = ChainStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn coinbase_record(hash: &str, value: u32) -> StoredTransaction {
        let tx = Transaction::new(
            vec![TxInput::coinbase("mint")],
            vec![TxOutput::new(value, "ADD 00ab".to_string())],
        );
        StoredTransaction::pooled(&tx, hash.to_string(), 0).unwrap()
    }

    fn block_record(hash: &str, previous: &str, height: u64, tx_hashes: Vec<String>) -> StoredBlock {
        let mut block = StoredBlock {
            hash: hash.to_string(),
            version: 1,
            previous_block_hash: previous.to_string(),
            transactions_hash: "11".repeat(HASH_LEN),
            timestamp: 1_700_000_000,
            difficulty: 0,
            nonce: 0,
            height,
            transaction_hashes: tx_hashes,
            cache: String::new(),
        };
        block.rebuild_cache().unwrap();
        block
    }

    fn commit_genesis(store: &ChainStore) -> (StoredBlock, StoredTransaction) {
        let coinbase = coinbase_record(&"aa".repeat(HASH_LEN), 281_190);
        let block = block_record(
            &"b0".repeat(HASH_LEN),
            &"0".repeat(HASH_LEN * 2),
            0,
            vec![coinbase.hash.clone()],
        );
        store.commit_block(&block, &coinbase, &[]).unwrap();
        (block, coinbase)
    }

    #[test]
    fn test_empty_store_has_no_tip() {
        let (_dir, store) = open_store();
        assert_eq!(store.tip_hash().unwrap(), None);
        assert_eq!(store.height().unwrap(), None);
        assert!(store.pooled_transactions().unwrap().is_empty());
    }

    #[test]
    fn test_genesis_commit_sets_tip_and_confirms_coinbase() {
        let (_dir, store) = open_store();
        let (block, coinbase) = commit_genesis(&store);

        assert_eq!(store.tip_hash().unwrap(), Some(block.hash.clone()));
        assert_eq!(store.height().unwrap(), Some(0));

        let stored = store.find_transaction(&coinbase.hash).unwrap().unwrap();
        assert_eq!(stored.block_hash, Some(block.hash.clone()));
        assert_eq!(stored.index, Some(0));
        assert!(stored.cache.contains(&coinbase.hash));

        let by_height = store.find_block_by_height(0).unwrap().unwrap();
        assert_eq!(by_height.hash, block.hash);
    }

    #[test]
    fn test_duplicate_coinbase_hash_is_rejected() {
        let (_dir, store) = open_store();
        let (genesis, genesis_coinbase) = commit_genesis(&store);

        // Same coinbase bytes, hence the same hash, in a new block.
        let block = block_record(
            &"b1".repeat(HASH_LEN),
            &genesis.hash,
            1,
            vec![genesis_coinbase.hash.clone()],
        );
        let result = store.commit_block(&block, &genesis_coinbase, &[]);
        assert!(matches!(result, Err(ChainError::DuplicateTransaction(_))));

        // The first block's record is untouched.
        let stored = store
            .find_transaction(&genesis_coinbase.hash)
            .unwrap()
            .unwrap();
        assert_eq!(stored.block_hash, Some(genesis.hash.clone()));
        assert_eq!(store.tip_hash().unwrap(), Some(genesis.hash));
    }

    #[test]
    fn test_duplicate_block_is_rejected() {
        let (_dir, store) = open_store();
        let (block, coinbase) = commit_genesis(&store);
        let result = store.commit_block(&block, &coinbase, &[]);
        assert!(matches!(result, Err(ChainError::DuplicateBlock(_))));
    }

    #[test]
    fn test_block_must_extend_tip() {
        let (_dir, store) = open_store();
        commit_genesis(&store);

        let coinbase = coinbase_record(&"bb".repeat(HASH_LEN), 281_190);
        let block = block_record(
            &"b1".repeat(HASH_LEN),
            &"99".repeat(HASH_LEN),
            1,
            vec![coinbase.hash.clone()],
        );
        let result = store.commit_block(&block, &coinbase, &[]);
        assert!(matches!(result, Err(ChainError::ChainLinkage { .. })));
    }

    #[test]
    fn test_pooled_transaction_lifecycle() {
        let (_dir, store) = open_store();
        let (genesis, genesis_coinbase) = commit_genesis(&store);

        // Spend the genesis coinbase output from the pool.
        let spend = Transaction::new(
            vec![TxInput {
                referenced_output_hash: HEXLOWER
                    .decode(genesis_coinbase.hash.as_bytes())
                    .unwrap(),
                referenced_output_index: 0,
                unlock_script: "PUB 01 SIG 02".to_string(),
            }],
            vec![TxOutput::new(281_150, "ADD 00cd".to_string())],
        );
        let record =
            StoredTransaction::pooled(&spend, "cc".repeat(HASH_LEN), 40).unwrap();
        store.insert_pooled_transaction(&record).unwrap();

        assert_eq!(store.pooled_transactions().unwrap().len(), 1);
        assert_eq!(
            store
                .pool_reservation(&genesis_coinbase.hash, 0)
                .unwrap()
                .as_deref(),
            Some(record.hash.as_str())
        );

        // A second pooled spend of the same output conflicts.
        let rival = StoredTransaction::pooled(&spend, "dd".repeat(HASH_LEN), 40).unwrap();
        assert!(matches!(
            store.insert_pooled_transaction(&rival),
            Err(ChainError::PoolConflict(_))
        ));

        // Confirming the block flips the record and moves the reservation
        // to a spent mark.
        let next_coinbase = coinbase_record(&"ee".repeat(HASH_LEN), 281_230);
        let block = block_record(
            &"b1".repeat(HASH_LEN),
            &genesis.hash,
            1,
            vec![next_coinbase.hash.clone(), record.hash.clone()],
        );
        store
            .commit_block(&block, &next_coinbase, &[record.hash.clone()])
            .unwrap();

        let confirmed = store.find_transaction(&record.hash).unwrap().unwrap();
        assert_eq!(confirmed.block_hash, Some(block.hash.clone()));
        assert_eq!(confirmed.index, Some(1));
        assert!(store.pooled_transactions().unwrap().is_empty());
        assert_eq!(
            store.pool_reservation(&genesis_coinbase.hash, 0).unwrap(),
            None
        );
        assert_eq!(
            store.spender_of(&genesis_coinbase.hash, 0).unwrap().as_deref(),
            Some(record.hash.as_str())
        );

        // Spent outputs stay spent: a fresh spend of the same outpoint fails.
        let late = StoredTransaction::pooled(&spend, "ff".repeat(HASH_LEN), 40).unwrap();
        assert!(matches!(
            store.insert_pooled_transaction(&late),
            Err(ChainError::AlreadySpent(_))
        ));
    }

    #[test]
    fn test_duplicate_pooled_transaction_is_rejected() {
        let (_dir, store) = open_store();
        let (_, genesis_coinbase) = commit_genesis(&store);

        let spend = Transaction::new(
            vec![TxInput {
                referenced_output_hash: HEXLOWER
                    .decode(genesis_coinbase.hash.as_bytes())
                    .unwrap(),
                referenced_output_index: 0,
                unlock_script: "PUB 01 SIG 02".to_string(),
            }],
            vec![TxOutput::new(281_190, "ADD 00cd".to_string())],
        );
        let record = StoredTransaction::pooled(&spend, "cc".repeat(HASH_LEN), 0).unwrap();
        store.insert_pooled_transaction(&record).unwrap();
        assert!(matches!(
            store.insert_pooled_transaction(&record),
            Err(ChainError::DuplicateTransaction(_))
        ));
    }

    #[test]
    fn test_reference_to_unknown_output_is_rejected() {
        let (_dir, store) = open_store();
        commit_genesis(&store);

        let spend = Transaction::new(
            vec![TxInput::new(vec![0x12; HASH_LEN], 0)],
            vec![TxOutput::new(5, "ADD 00cd".to_string())],
        );
        let record = StoredTransaction::pooled(&spend, "cc".repeat(HASH_LEN), 0).unwrap();
        assert!(matches!(
            store.insert_pooled_transaction(&record),
            Err(ChainError::UnspentOutputNotFound(_))
        ));
    }

    #[test]
    fn test_block_listing_respects_offset_and_limit() {
        let (_dir, store) = open_store();
        let (mut previous, _) = commit_genesis(&store);

        for height in 1..=4u64 {
            let coinbase = coinbase_record(&format!("{height:02x}").repeat(HASH_LEN), 281_190);
            let block = block_record(
                &format!("c{height}").repeat(HASH_LEN),
                &previous.hash,
                height,
                vec![coinbase.hash.clone()],
            );
            store.commit_block(&block, &coinbase, &[]).unwrap();
            previous = block;
        }

        let all = store.list_blocks(0, 10).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].height, 0);
        assert_eq!(all[4].height, 4);

        let page = store.list_blocks(2, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].height, 2);
        assert_eq!(page[1].height, 3);
        assert_eq!(store.height().unwrap(), Some(4));
    }
}
