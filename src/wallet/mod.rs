//! Key management and transaction signing
//!
//! An address is the lowercase hex SHA-256 of an ECDSA P-256 public key.
//! Signing fills every input's unlock script with the same `PUB .. SIG ..`
//! proof computed over the transaction's sighash.

use crate::core::script::{LockScript, UnlockScript};
use crate::core::transaction::Transaction;
use crate::error::Result;
use crate::utils::{ecdsa_p256_sign, new_key_pair, public_key_from_pkcs8, sha256_digest};
use data_encoding::HEXLOWER;

pub struct Keypair {
    /// PKCS#8 v1 document holding the private key
    pub pkcs8: Vec<u8>,
    pub public_key: Vec<u8>,
    pub address: String,
}

impl Keypair {
    pub fn generate() -> Result<Keypair> {
        let pkcs8 = new_key_pair()?;
        let public_key = public_key_from_pkcs8(&pkcs8)?;
        let address = address_from_public_key(&public_key);
        Ok(Keypair {
            pkcs8,
            public_key,
            address,
        })
    }

    pub fn from_pkcs8(pkcs8: Vec<u8>) -> Result<Keypair> {
        let public_key = public_key_from_pkcs8(&pkcs8)?;
        let address = address_from_public_key(&public_key);
        Ok(Keypair {
            pkcs8,
            public_key,
            address,
        })
    }
}

pub fn address_from_public_key(public_key: &[u8]) -> String {
    HEXLOWER.encode(&sha256_digest(public_key))
}

/// Lock script that sends value to `address`.
pub fn lock_script_for(address: &str) -> String {
    LockScript::render(address)
}

/// Sign every input of `tx` with `keys`. The signature covers the sighash,
/// the encoding with all unlock scripts blanked, so filling the scripts
/// afterwards does not invalidate it.
pub fn sign_transaction(tx: &mut Transaction, keys: &Keypair) -> Result<()> {
    let sighash = tx.signing_bytes()?;
    let signature = ecdsa_p256_sign(&keys.pkcs8, &sighash)?;
    let unlock = UnlockScript::render(&keys.public_key, &signature);
    for input in &mut tx.inputs {
        input.unlock_script = unlock.clone();
    }
    Ok(())
}
