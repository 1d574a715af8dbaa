//! Effect traits for the chain core
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effects
//! - **Implementation**: `thechain-effects`
//! - **Usage**: `thechain-engine` receives every effect as an injected trait
//!   object; nothing in the engine reaches for a global clock, store or key.

/// Transactional persistence for members, tickets and invitation records
pub mod store;

/// Wall-clock time
pub mod time;

/// Fire-and-forget notifications
pub mod notification;

pub use notification::{Notification, NotificationEffects, NotifyError};
pub use store::{ChainStore, StoreError, StoreTxn};
pub use time::TimeEffects;
