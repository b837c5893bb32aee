//! spd-derivation — from critical intervals to a selected scaling policy.
//!
//! # Pipeline
//!
//! ```text
//! ProcessedForecast ─► PolicyDispatcher ─► [Policy; n] ─► PolicyEvaluator ─► Policy
//!                          │
//!                          ├─ Naive               (fixed over-provisioning, current VM type)
//!                          ├─ SmallStepRepacking  (cheapest single VM type per interval)
//!                          └─ IntegerProgramming  (reserved, reports unimplemented)
//! ```
//!
//! Each strategy walks the intervals in time order, picks the performance
//! profile, sizes the replica count and packs the replicas onto VMs using
//! the helpers in [`sizer`]. The evaluator prices every candidate with the
//! [`PriceModel`](spd_core::PriceModel) and keeps the cheapest.
//!
//! VM packing is a single-type greedy heuristic, not an optimal bin packing.
//! When a type's capacity does not exceed the replica count it gets
//! `floor(replicas / capacity)` instances, which can leave replicas without
//! a slot.

pub mod dispatch;
pub mod error;
pub mod evaluate;
pub mod sizer;
pub mod strategy;

pub use dispatch::PolicyDispatcher;
pub use error::{DerivationError, DerivationResult};
pub use evaluate::PolicyEvaluator;
pub use strategy::{
    DerivationContext, IntegerProgramming, NaivePolicy, PolicyBuilder, SmallStepRepack, Strategy,
};
