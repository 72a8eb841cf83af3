//! Ledger core: domain types, canonical encoding and the validation
//! pipelines

pub mod block;
pub mod chain;
pub mod codec;
pub mod mempool;
pub mod merkle;
pub mod miner;
pub mod script;
pub mod transaction;

pub use block::{Block, BlockHeader};
pub use chain::Chain;
pub use mempool::Mempool;
pub use miner::Miner;
pub use transaction::{Transaction, TxInput, TxOutput};
