//! Clock handlers
//!
//! Standard implementations of the `TimeEffects` trait defined in
//! `thechain-core`.

pub mod real;
pub mod simulated;

pub use real::SystemClock;
pub use simulated::SimulatedClock;
