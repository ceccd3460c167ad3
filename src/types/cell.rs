//! Core cell-model ledger types.
//!
//! These mirror the JSON shapes of the ledger's RPC and indexer: 32-byte
//! hashes and byte strings are `0x`-prefixed hex, integers are hex strings.

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// A 32-byte hash, rendered as `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct H256(pub [u8; 32]);

impl H256 {
    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for H256 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").ok_or_else(|| format!("missing 0x prefix: {s:?}"))?;
        let bytes = hex::decode(digits).map_err(|err| err.to_string())?;
        let bytes: [u8; 32] =
            bytes.try_into().map_err(|b: Vec<u8>| format!("expected 32 bytes, got {}", b.len()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for H256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?.parse().map_err(D::Error::custom)
    }
}

/// A variable-length byte string, rendered as `0x`-prefixed hex.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct JsonBytes(pub Vec<u8>);

impl JsonBytes {
    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the byte string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for JsonBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for JsonBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl Serialize for JsonBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

impl<'de> Deserialize<'de> for JsonBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits =
            s.strip_prefix("0x").ok_or_else(|| D::Error::custom("missing 0x prefix"))?;
        Ok(Self(hex::decode(digits).map_err(D::Error::custom)?))
    }
}

/// How a script's code hash is matched against on-chain code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptHashType {
    /// Matched against cell data hash.
    Data,
    /// Matched against type script hash.
    #[default]
    Type,
    /// Matched against cell data hash, VM version 1.
    Data1,
    /// Matched against cell data hash, VM version 2.
    Data2,
}

/// A lock or type script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Script {
    /// Hash identifying the script code.
    pub code_hash: H256,
    /// How `code_hash` is matched.
    pub hash_type: ScriptHashType,
    /// Script arguments.
    pub args: JsonBytes,
}

/// Reference to a transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// Hash of the creating transaction.
    pub tx_hash: H256,
    /// Output index within that transaction.
    #[serde(with = "crate::serde::hex_u32")]
    pub index: u32,
}

impl OutPoint {
    /// Dedup/identity key used for pool bookkeeping.
    pub fn key(&self) -> String {
        format!("{}:{}", self.tx_hash, self.index)
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.index)
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOutput {
    /// Capacity in shannons.
    #[serde(with = "crate::serde::hex_u64")]
    pub capacity: u64,
    /// Ownership lock script.
    pub lock: Script,
    /// Optional type script.
    #[serde(rename = "type")]
    pub type_script: Option<Script>,
}

/// A live cell as returned by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Location of the cell.
    pub out_point: OutPoint,
    /// The output itself.
    pub output: CellOutput,
    /// Cell data.
    pub data: JsonBytes,
    /// Block in which the cell was created.
    #[serde(with = "crate::serde::hex_u64")]
    pub block_number: u64,
}

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInput {
    /// The consumed output.
    pub previous_output: OutPoint,
    /// Relative/absolute time lock constraint.
    #[serde(with = "crate::serde::hex_u64")]
    pub since: u64,
}

/// Dependency resolution mode for a cell dep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepType {
    /// Plain code dependency.
    #[default]
    Code,
    /// Dependency group.
    DepGroup,
}

/// A cell dependency of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDep {
    /// Location of the dependency cell.
    pub out_point: OutPoint,
    /// Resolution mode.
    pub dep_type: DepType,
}

/// A raw (possibly unsigned) ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Transaction format version.
    #[serde(with = "crate::serde::hex_u32")]
    pub version: u32,
    /// Cell dependencies.
    pub cell_deps: Vec<CellDep>,
    /// Consumed outputs.
    pub inputs: Vec<CellInput>,
    /// Created outputs.
    pub outputs: Vec<CellOutput>,
    /// Data of the created outputs, index-aligned with `outputs`.
    pub outputs_data: Vec<JsonBytes>,
    /// Witnesses, index-aligned with `inputs` where applicable.
    pub witnesses: Vec<JsonBytes>,
}

impl RawTransaction {
    /// Sum of output capacities, in shannons.
    pub fn outputs_capacity(&self) -> u64 {
        self.outputs.iter().map(|output| output.capacity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h256_roundtrip() {
        let hash: H256 =
            "0x9bd7e06f3ecf4be0f2fcd2188b23f1b9fcc88e5d4b65a8637b17723bbda3cce8".parse().unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(serde_json::from_str::<H256>(&json).unwrap(), hash);
    }

    #[test]
    fn h256_rejects_bad_length() {
        assert!("0x1234".parse::<H256>().is_err());
        assert!("9bd7".parse::<H256>().is_err());
    }

    #[test]
    fn out_point_key_format() {
        let out_point = OutPoint { tx_hash: H256([0xab; 32]), index: 3 };
        assert_eq!(
            out_point.key(),
            "0xabababababababababababababababababababababababababababababababab:3"
        );
    }

    #[test]
    fn cell_output_hex_capacity() {
        let output = CellOutput {
            capacity: 31_600_000_000,
            lock: Script::default(),
            type_script: None,
        };
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["capacity"], "0x75b9fd700");
        assert_eq!(serde_json::from_value::<CellOutput>(value).unwrap(), output);
    }
}
