//! # Forge Chain
//!
//! A minimal proof-of-work UTXO ledger. Transactions enter a pending pool,
//! a background miner assembles them into blocks, and a fixed rule set
//! validates both before they join a single linear chain.
//!
//! ## Layout
//! - `core/`: domain types, canonical encoding, Merkle root, the
//!   transaction and block validation pipelines, the miner
//! - `storage/`: sled-backed store with atomic multi-row commits
//! - `wallet/`: ECDSA P-256 keys, addresses, transaction signing
//! - `events/`: post-commit notification sink
//! - `config/`: TOML settings with environment overrides
//! - `utils/`: hashing, signatures, bincode helpers
//! - `cli/`: command definitions for the node binary

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod storage;
pub mod utils;
pub mod wallet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Settings, GLOBAL_SETTINGS};
pub use core::{Block, BlockHeader, Chain, Mempool, Miner, Transaction, TxInput, TxOutput};
pub use error::{ChainError, ErrorCategory, Result};
pub use events::{ChainEvent, ChannelSink, EventSink, NullSink};
pub use storage::{ChainStore, StoredBlock, StoredTransaction};
pub use utils::{
    current_timestamp, double_sha256_digest, ecdsa_p256_sign, ecdsa_p256_verify, new_key_pair,
    sha256_digest,
};
pub use wallet::{address_from_public_key, lock_script_for, sign_transaction, Keypair};
