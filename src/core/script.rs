//! Lock and unlock script grammars
//!
//! Scripts are single-line ASCII commands split on single spaces. A lock
//! script binds an output to an address, an unlock script presents the
//! public key and signature that satisfy it. Parsing is strict: exact
//! token counts, exact keywords, no extra whitespace.

use crate::error::{ChainError, Result};
use data_encoding::HEXLOWER;

/// `ADD <addressHex>` — locks an output to the SHA-256 of a public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockScript {
    pub address: String,
}

impl LockScript {
    pub fn parse(script: &str) -> Result<LockScript> {
        let tokens: Vec<&str> = script.split(' ').collect();
        if tokens.len() != 2 || tokens[0] != "ADD" {
            return Err(ChainError::ScriptFormat(format!(
                "Lock script must be 'ADD <address>', got {script:?}"
            )));
        }
        let address = tokens[1];
        decode_hex(address, "lock script address")?;
        Ok(LockScript {
            address: address.to_string(),
        })
    }

    pub fn render(address: &str) -> String {
        format!("ADD {address}")
    }
}

/// `PUB <publicKeyHex> SIG <signatureHex>` — spends an output by proving
/// knowledge of the key whose hash is the lock address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockScript {
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl UnlockScript {
    pub fn parse(script: &str) -> Result<UnlockScript> {
        let tokens: Vec<&str> = script.split(' ').collect();
        if tokens.len() != 4 || tokens[0] != "PUB" || tokens[2] != "SIG" {
            return Err(ChainError::ScriptFormat(format!(
                "Unlock script must be 'PUB <key> SIG <sig>', got {script:?}"
            )));
        }
        Ok(UnlockScript {
            public_key: decode_hex(tokens[1], "unlock script public key")?,
            signature: decode_hex(tokens[3], "unlock script signature")?,
        })
    }

    pub fn render(public_key: &[u8], signature: &[u8]) -> String {
        format!(
            "PUB {} SIG {}",
            HEXLOWER.encode(public_key),
            HEXLOWER.encode(signature)
        )
    }
}

fn decode_hex(hex: &str, what: &str) -> Result<Vec<u8>> {
    if hex.is_empty() {
        return Err(ChainError::ScriptFormat(format!("Empty {what}")));
    }
    HEXLOWER
        .decode(hex.as_bytes())
        .map_err(|e| ChainError::ScriptFormat(format!("Bad hex in {what}: {e}")))
}
