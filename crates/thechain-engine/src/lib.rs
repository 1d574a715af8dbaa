//! # The Chain Engine - Layer 3: Chain Integrity
//!
//! Ticket lifecycle, chain graph, removal cascade and expiration sweeping on
//! top of the effect traits from `thechain-core`.
//!
//! # Architecture
//!
//! - `graph` - tip detection, attach, detach/revert, neighbourhood
//! - `lifecycle` - issue, claim, expire, cancel
//! - `cascade` - strike thresholds and the upward removal walk
//! - `badges` - recovery badge
//! - `engine` - `ChainEngine`, one store transaction per operation
//! - `sweeper` - periodic expiry and expiring-soon warnings
//! - `runtime` - background task registry
//!
//! The step modules operate on a borrowed `StoreTxn` and never commit;
//! `ChainEngine` owns transaction boundaries and notification delivery.

#![forbid(unsafe_code)]

pub mod badges;
pub mod cascade;
pub mod context;
pub mod engine;
pub mod graph;
pub mod lifecycle;
pub mod runtime;
pub mod sweeper;

pub use context::{OperationContext, Outbox};
pub use engine::{ChainEffects, ChainEngine};
pub use graph::{DetachOutcome, Neighbours};
pub use lifecycle::{ClaimResult, ExpireOutcome};
pub use runtime::TaskRegistry;
pub use sweeper::{ExpirationSweeper, SweepReport};
