//! Cryptographic primitives and serialization helpers

pub mod crypto;
pub mod hex_bytes;
pub mod serialization;

pub use crypto::{
    current_timestamp, double_sha256_digest, ecdsa_p256_sign, ecdsa_p256_verify, new_key_pair,
    public_key_from_pkcs8, sha256_digest,
};
pub use serialization::{deserialize, serialize};
