//! Time-lock cells and asset classification.

use super::{Cell, JsonBytes, Script, ScriptHashType, H256};
use crate::error::RelayError;
use bitcoin::{hashes::Hash, Txid};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The asset category carried by a time-lock cell.
///
/// Each kind requires a distinct unlock-transaction shape, so unlock batches
/// are partitioned by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Fungible-token-bearing cell (xUDT-style type script).
    Fungible,
    /// NFT- or cluster-bearing cell.
    Nft,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fungible => f.write_str("fungible"),
            Self::Nft => f.write_str("nft"),
        }
    }
}

/// Decoded lock args of a time-lock cell.
///
/// Layout: `after: u32 LE | btc_txid: 32 bytes | owner_lock: code_hash 32 |
/// hash_type 1 | args_len u32 LE | args`. The txid is stored in internal
/// (little-endian) byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeLockArgs {
    /// Required confirmation depth of the referenced Bitcoin transaction.
    pub after: u32,
    /// The Bitcoin transaction whose confirmation releases the cell.
    pub btc_txid: Txid,
    /// Lock script the cell is released to.
    pub owner_lock: Script,
}

impl TimeLockArgs {
    /// Decodes time-lock args from raw script args.
    pub fn decode(args: &[u8]) -> Result<Self, RelayError> {
        // after(4) + txid(32) + code_hash(32) + hash_type(1) + args_len(4)
        const MIN_LEN: usize = 73;
        if args.len() < MIN_LEN {
            return Err(RelayError::Validation(format!(
                "time-lock args too short: {} bytes",
                args.len()
            )));
        }

        let after = u32::from_le_bytes(args[0..4].try_into().expect("sliced to 4 bytes"));
        let btc_txid = Txid::from_slice(&args[4..36])
            .map_err(|err| RelayError::Validation(format!("bad btc txid in lock args: {err}")))?;

        let mut code_hash = [0u8; 32];
        code_hash.copy_from_slice(&args[36..68]);
        let hash_type = match args[68] {
            0 => ScriptHashType::Data,
            1 => ScriptHashType::Type,
            2 => ScriptHashType::Data1,
            4 => ScriptHashType::Data2,
            other => {
                return Err(RelayError::Validation(format!("bad owner lock hash type: {other}")))
            }
        };
        let args_len =
            u32::from_le_bytes(args[69..73].try_into().expect("sliced to 4 bytes")) as usize;
        let rest = &args[MIN_LEN..];
        if rest.len() != args_len {
            return Err(RelayError::Validation(format!(
                "owner lock args length mismatch: declared {args_len}, got {}",
                rest.len()
            )));
        }

        Ok(Self {
            after,
            btc_txid,
            owner_lock: Script {
                code_hash: H256(code_hash),
                hash_type,
                args: JsonBytes(rest.to_vec()),
            },
        })
    }

    /// Encodes the args back to their binary layout.
    pub fn encode(&self) -> Vec<u8> {
        let owner_args = self.owner_lock.args.as_bytes();
        let mut out = Vec::with_capacity(73 + owner_args.len());
        out.extend_from_slice(&self.after.to_le_bytes());
        out.extend_from_slice(self.btc_txid.as_byte_array());
        out.extend_from_slice(self.owner_lock.code_hash.as_bytes());
        out.push(match self.owner_lock.hash_type {
            ScriptHashType::Data => 0,
            ScriptHashType::Type => 1,
            ScriptHashType::Data1 => 2,
            ScriptHashType::Data2 => 4,
        });
        out.extend_from_slice(&(owner_args.len() as u32).to_le_bytes());
        out.extend_from_slice(owner_args);
        out
    }
}

/// A time-lock cell with its decoded args and asset classification.
#[derive(Debug, Clone)]
pub struct TimeLockCell {
    /// The underlying live cell.
    pub cell: Cell,
    /// Decoded lock args.
    pub args: TimeLockArgs,
    /// Asset category, derived from the cell's type script.
    pub kind: AssetKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_lock() -> Script {
        Script {
            code_hash: H256([0x11; 32]),
            hash_type: ScriptHashType::Type,
            args: JsonBytes(vec![0xaa, 0xbb, 0xcc]),
        }
    }

    #[test]
    fn time_lock_args_roundtrip() {
        let args = TimeLockArgs {
            after: 6,
            btc_txid: Txid::from_slice(&[0x42; 32]).unwrap(),
            owner_lock: owner_lock(),
        };
        let encoded = args.encode();
        assert_eq!(TimeLockArgs::decode(&encoded).unwrap(), args);
    }

    #[test]
    fn decode_rejects_short_args() {
        let err = TimeLockArgs::decode(&[0u8; 10]).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn decode_rejects_trailing_garbage() {
        let mut encoded = TimeLockArgs {
            after: 6,
            btc_txid: Txid::from_slice(&[0x42; 32]).unwrap(),
            owner_lock: owner_lock(),
        }
        .encode();
        encoded.push(0xff);
        assert!(TimeLockArgs::decode(&encoded).unwrap_err().is_validation());
    }
}
