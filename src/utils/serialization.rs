// Bincode 2.x helpers shared by all store records
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};

/// Encode a store record with bincode's standard configuration
pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| ChainError::Serialization(format!("Encoding failed: {e}")))
}

/// Decode a store record with bincode's standard configuration
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, _) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| ChainError::Serialization(format!("Decoding failed: {e}")))?;
    Ok(data)
}
