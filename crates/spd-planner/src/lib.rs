//! spd-planner — runs derivation cycles.
//!
//! A cycle fetches the performance profiles and the forecast, reconciles the
//! forecast with the stored one, derives critical intervals, builds and
//! evaluates candidate policies, stores the winner and hands it to the
//! scheduler. Cycles are started by a timer ([`Planner::run`]) or on demand
//! through the HTTP API. A failed cycle is logged and reported to its
//! caller; it never stops the service.

pub mod cycle;
pub mod error;

pub use cycle::{CycleOutcome, Planner};
pub use error::{CycleError, CycleResult};
