//! Error handling for the ledger
//!
//! Every validation pipeline step fails with a dedicated variant so callers
//! can tell structural problems apart from state conflicts that may resolve
//! on retry.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// How a rejection should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input, never retried
    Structural,
    /// Money-range or conservation violations, rejected
    Economic,
    /// Safe to retry once the conflicting condition changes
    StateConflict,
    /// Script or signature failures, never retried with the same input
    Cryptographic,
    /// Store, serialization and other environment failures
    Internal,
}

#[derive(Debug, Clone)]
pub enum ChainError {
    /// Transaction or block version is not 1
    UnsupportedVersion(u32),
    /// Inputs, outputs or block transaction list is empty
    EmptyList(String),
    /// Canonical encoding exceeds the size limit
    Oversize { size: usize, limit: usize },
    /// Output or input value outside the legal money range
    ValueRange(String),
    /// Ordinary transaction uses the coinbase sentinel input
    IllegalCoinbaseInput(String),
    /// Lock or unlock script does not match the fixed grammar
    ScriptFormat(String),
    /// Transaction hash already known in pool or chain
    DuplicateTransaction(String),
    /// Another pooled transaction references the same output
    PoolConflict(String),
    /// Referenced output missing or not on a confirmed transaction
    UnspentOutputNotFound(String),
    /// Referenced output already consumed by a confirmed input
    AlreadySpent(String),
    /// Two inputs of one transaction reference the same output
    DuplicateInput(String),
    /// Total input below total output
    InsufficientFunds { total_input: u64, total_output: u64 },
    /// Lock-script address does not match the unlock public key
    AddressMismatch(String),
    /// Signature does not verify against the sighash
    InvalidSignature(String),
    /// Truncated or over-length canonical encoding
    MalformedEncoding(String),
    /// Merkle root requested over an empty hash list
    EmptyInput(String),
    /// Block hash already known
    DuplicateBlock(String),
    /// Block hash does not satisfy the claimed difficulty
    ProofOfWork(String),
    /// Coinbase placement or sentinel rules violated
    CoinbaseStructure(String),
    /// Recomputed transactions hash differs from the header
    MerkleMismatch(String),
    /// Block does not extend the current tip
    ChainLinkage { expected: String, got: String },
    /// Claimed difficulty below the system floor
    DifficultyFloor { claimed: u32, floor: u32 },
    /// Block embeds a transaction that is not pooled
    UnknownTransaction(String),
    /// Coinbase output sum exceeds reward plus collected fees
    CoinbaseOverpay { total_output: u64, allowed: u64 },
    /// Proof-of-work search stopped by its cancellation token
    MiningCancelled,
    /// Store failures
    Database(String),
    /// Record encode/decode failures
    Serialization(String),
    /// Key generation or signing failures
    Crypto(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(String),
    /// Anything else that should never surface to a caller
    Internal(String),
}

impl ChainError {
    /// Rejection category per the validation design: structural errors are
    /// final, state conflicts may succeed on a later retry.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChainError::UnsupportedVersion(_)
            | ChainError::EmptyList(_)
            | ChainError::Oversize { .. }
            | ChainError::IllegalCoinbaseInput(_)
            | ChainError::MalformedEncoding(_)
            | ChainError::EmptyInput(_)
            | ChainError::CoinbaseStructure(_)
            | ChainError::MerkleMismatch(_)
            | ChainError::ProofOfWork(_)
            | ChainError::DifficultyFloor { .. } => ErrorCategory::Structural,
            ChainError::ValueRange(_)
            | ChainError::InsufficientFunds { .. }
            | ChainError::CoinbaseOverpay { .. } => ErrorCategory::Economic,
            ChainError::DuplicateTransaction(_)
            | ChainError::PoolConflict(_)
            | ChainError::UnspentOutputNotFound(_)
            | ChainError::AlreadySpent(_)
            | ChainError::DuplicateInput(_)
            | ChainError::DuplicateBlock(_)
            | ChainError::ChainLinkage { .. }
            | ChainError::UnknownTransaction(_) => ErrorCategory::StateConflict,
            ChainError::ScriptFormat(_)
            | ChainError::AddressMismatch(_)
            | ChainError::InvalidSignature(_) => ErrorCategory::Cryptographic,
            ChainError::MiningCancelled
            | ChainError::Database(_)
            | ChainError::Serialization(_)
            | ChainError::Crypto(_)
            | ChainError::Config(_)
            | ChainError::Io(_)
            | ChainError::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::UnsupportedVersion(v) => {
                write!(f, "Unsupported version {v}, only version 1 is accepted")
            }
            ChainError::EmptyList(what) => write!(f, "{what} cannot be empty"),
            ChainError::Oversize { size, limit } => {
                write!(f, "Encoded size {size} exceeds limit of {limit} bytes")
            }
            ChainError::ValueRange(msg) => write!(f, "Value out of range: {msg}"),
            ChainError::IllegalCoinbaseInput(msg) => {
                write!(f, "Coinbase input not allowed here: {msg}")
            }
            ChainError::ScriptFormat(msg) => write!(f, "Malformed script: {msg}"),
            ChainError::DuplicateTransaction(hash) => {
                write!(f, "Transaction {hash} already exists in pool or chain")
            }
            ChainError::PoolConflict(outpoint) => {
                write!(
                    f,
                    "Output {outpoint} is already referenced by a pooled transaction"
                )
            }
            ChainError::UnspentOutputNotFound(outpoint) => {
                write!(
                    f,
                    "Referenced output {outpoint} not found among confirmed outputs"
                )
            }
            ChainError::AlreadySpent(outpoint) => {
                write!(f, "Referenced output {outpoint} was already spent")
            }
            ChainError::DuplicateInput(outpoint) => {
                write!(
                    f,
                    "Output {outpoint} is referenced twice by the same transaction"
                )
            }
            ChainError::InsufficientFunds {
                total_input,
                total_output,
            } => write!(
                f,
                "Total input {total_input} is below total output {total_output}"
            ),
            ChainError::AddressMismatch(msg) => {
                write!(f, "Lock-script address does not match public key: {msg}")
            }
            ChainError::InvalidSignature(msg) => write!(f, "Invalid signature: {msg}"),
            ChainError::MalformedEncoding(msg) => write!(f, "Malformed encoding: {msg}"),
            ChainError::EmptyInput(msg) => write!(f, "Empty input: {msg}"),
            ChainError::DuplicateBlock(hash) => write!(f, "Block {hash} already exists"),
            ChainError::ProofOfWork(msg) => write!(f, "Proof of work not satisfied: {msg}"),
            ChainError::CoinbaseStructure(msg) => write!(f, "Invalid coinbase structure: {msg}"),
            ChainError::MerkleMismatch(msg) => {
                write!(f, "Transactions hash mismatch: {msg}")
            }
            ChainError::ChainLinkage { expected, got } => write!(
                f,
                "Block must extend the current tip {expected}, got predecessor {got}"
            ),
            ChainError::DifficultyFloor { claimed, floor } => write!(
                f,
                "Block difficulty {claimed} is below the system floor {floor}"
            ),
            ChainError::UnknownTransaction(msg) => {
                write!(
                    f,
                    "Block references transactions missing from the pool: {msg}"
                )
            }
            ChainError::CoinbaseOverpay {
                total_output,
                allowed,
            } => write!(
                f,
                "Coinbase pays {total_output} but only {allowed} is allowed"
            ),
            ChainError::MiningCancelled => write!(f, "Proof-of-work search was cancelled"),
            ChainError::Database(msg) => write!(f, "Database error: {msg}"),
            ChainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            ChainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            ChainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            ChainError::Io(msg) => write!(f, "I/O error: {msg}"),
            ChainError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<sled::Error> for ChainError {
    fn from(err: sled::Error) -> Self {
        ChainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for ChainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for ChainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        ChainError::Serialization(err.to_string())
    }
}
