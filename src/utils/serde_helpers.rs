use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serializer};

/// Serialize bytes as hex string
pub fn as_hex<S>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&hex::encode(bytes))
}

/// Deserialize hex string into bytes
pub fn from_hex<'de, D>(d: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(d)?;
    hex::decode(&s).map_err(D::Error::custom)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(serialize_with = "super::as_hex", deserialize_with = "super::from_hex")]
        data: Vec<u8>,
    }

    #[test]
    fn test_hex_round_trip() {
        let w = Wrapper { data: vec![0xde, 0xad, 0xbe, 0xef] };
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("deadbeef"));
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data, w.data);
    }
}
