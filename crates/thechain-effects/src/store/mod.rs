//! Store handlers
//!
//! Implementations of the `ChainStore` / `StoreTxn` contract defined in
//! `thechain-core`.

pub mod memory;

pub use memory::MemoryChainStore;
