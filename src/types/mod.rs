//! Relay types.

mod cell;
pub use cell::{
    Cell, CellDep, CellInput, CellOutput, DepType, JsonBytes, OutPoint, RawTransaction, Script,
    ScriptHashType, H256,
};

mod rgbpp;
pub use rgbpp::{AssetKind, TimeLockArgs, TimeLockCell};
