//! # The Chain Effects - Layer 2: Effect Handlers
//!
//! Implementations of the effect traits declared in `thechain-core`:
//!
//! - `store::MemoryChainStore`: transactional in-memory store with an undo log
//! - `time::SystemClock` / `time::SimulatedClock`
//! - `notification::TracingNotifier` / `notification::RecordingNotifier`
//!
//! This is the only crate in the workspace that reads the system clock.

#![forbid(unsafe_code)]

/// Notification handlers
pub mod notification;

/// Store handlers
pub mod store;

/// Clock handlers
pub mod time;

pub use notification::{RecordingNotifier, TracingNotifier};
pub use store::MemoryChainStore;
pub use time::{SimulatedClock, SystemClock};
