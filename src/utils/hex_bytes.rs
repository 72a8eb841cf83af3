//! Serde adapter that renders byte hashes as lowercase hex in JSON caches

use data_encoding::HEXLOWER;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&HEXLOWER.encode(bytes))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let hex = String::deserialize(deserializer)?;
    HEXLOWER
        .decode(hex.as_bytes())
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        hash: Vec<u8>,
    }

    #[test]
    fn test_hex_round_trip() {
        let wrapper = Wrapper {
            hash: vec![0x00, 0xff, 0x10],
        };
        let json = serde_json::to_string(&wrapper).unwrap();
        assert!(json.contains("00ff10"));

        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(wrapper, back);
    }

    #[test]
    fn test_rejects_invalid_hex() {
        let result: Result<Wrapper, _> = serde_json::from_str(r#"{"hash":"zz"}"#);
        assert!(result.is_err());
    }
}
