//! # RGB++ Settlement Relay
//!
//! Library for the implementation of the RGB++ settlement relay: a fee-cell
//! paymaster, an asynchronous settlement queue, and a time-lock unlocker
//! sharing one durable queue store.

pub mod cli;
pub mod clients;
pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod paymaster;
pub mod serde;
pub mod settlement;
pub mod signers;
pub mod spawn;
pub mod storage;
pub mod types;
pub mod unlocker;
