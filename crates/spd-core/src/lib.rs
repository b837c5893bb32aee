//! spd-core — configuration and shared vocabulary for the SPD workspace.
//!
//! - [`SystemConfiguration`] is parsed from `spd.toml`.
//! - [`PriceModel`] maps VM types to prices per [`BillingUnit`] and is loaded
//!   independently of the VM catalogue.
//! - [`Algorithm`], [`Granularity`] and [`WindowStrategyKind`] are the
//!   enumerated choices the configuration selects from.

pub mod config;
pub mod error;
pub mod prices;
pub mod types;

pub use config::{Component, DerivationSettings, ForecastingComponent, SystemConfiguration};
pub use error::{ConfigError, ConfigResult};
pub use prices::{BillingUnit, PriceModel};
pub use types::*;
