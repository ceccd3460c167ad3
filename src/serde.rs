//! Custom serde helpers.

/// (De)serializes a [`std::time::Duration`] as a number of seconds.
pub mod duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serializes the duration as seconds.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_secs().serialize(serializer)
    }

    /// Deserializes the duration from seconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

/// (De)serializes a `u64` as a `0x`-prefixed hexadecimal string.
///
/// The ledger's JSON-RPC represents all integers this way.
pub mod hex_u64 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    /// Serializes the value as `0x`-prefixed hex.
    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    /// Deserializes the value from `0x`-prefixed hex.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| Error::custom(format!("expected 0x-prefixed hex, got {s:?}")))?;
        u64::from_str_radix(digits, 16).map_err(Error::custom)
    }
}

/// (De)serializes a `u32` as a `0x`-prefixed hexadecimal string.
pub mod hex_u32 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    /// Serializes the value as `0x`-prefixed hex.
    pub fn serialize<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    /// Deserializes the value from `0x`-prefixed hex.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| Error::custom(format!("expected 0x-prefixed hex, got {s:?}")))?;
        u32::from_str_radix(digits, 16).map_err(Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Capacity(#[serde(with = "super::hex_u64")] u64);

    #[test]
    fn hex_u64_roundtrip() {
        let json = serde_json::to_string(&Capacity(31_600_000_000)).unwrap();
        assert_eq!(json, "\"0x75b9fd700\"");
        assert_eq!(serde_json::from_str::<Capacity>(&json).unwrap(), Capacity(31_600_000_000));
    }

    #[test]
    fn hex_u64_rejects_missing_prefix() {
        assert!(serde_json::from_str::<Capacity>("\"75b9fd700\"").is_err());
    }
}
