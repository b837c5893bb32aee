//! spd-forecast — what the planner does with a freshly fetched forecast.
//!
//! Two stages run before any policy is derived:
//!
//! 1. [`ForecastReconciler`] decides whether the incoming forecast differs
//!    enough from the stored one to matter (RMSE above a threshold) and where
//!    the first difference lies. Only the part of the forecast from that
//!    point onward is handed on.
//! 2. A [`WindowStrategy`] cuts the effective forecast into contiguous
//!    critical intervals, each carrying the demand it must be provisioned
//!    for.
//!
//! ```text
//!   fetched ──► reconcile ──► effective ──► derive windows ──► intervals
//!                  │
//!                  └─ Unchanged: stop, nothing to derive
//! ```

pub mod error;
pub mod reconcile;
pub mod window;

pub use error::{ForecastError, ForecastResult};
pub use reconcile::{ForecastReconciler, ReconcileOutcome, Reconciliation, rmse};
pub use window::{PeakValley, SmallStepOverProvision, WindowDerivation, WindowStrategy, adjust_time};
