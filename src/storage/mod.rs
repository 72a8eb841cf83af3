//! Persistent ledger storage
//!
//! A single sled database with two trees: one for blocks and chain
//! metadata, one for transactions and their spent/reservation indexes.
//! All multi-key updates go through sled transactions so a crash never
//! leaves the ledger half-written.

pub mod store;

pub use store::{ChainStore, StoredBlock, StoredTransaction};
