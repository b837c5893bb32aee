//! spd.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Algorithm, Granularity, WindowStrategyKind};

/// Parameters read from `spd.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfiguration {
    /// Name of the service whose replicas are scaled.
    pub main_service_name: String,
    #[serde(default)]
    pub preferred_algorithm: Algorithm,
    /// Seconds between two timer-driven derivation cycles.
    #[serde(default = "default_pulling_interval")]
    pub pulling_interval_secs: u64,
    pub forecasting: ForecastingComponent,
    pub performance_profiles: Component,
    pub scheduler: Component,
    #[serde(default)]
    pub derivation: DerivationSettings,
}

/// An external component SPD talks to over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub endpoint: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastingComponent {
    pub endpoint: String,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Tuning knobs of the derivation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationSettings {
    /// RMSE above which a new forecast replaces the stored one.
    pub rmse_threshold: f64,
    pub window_strategy: WindowStrategyKind,
    /// Relative drift tolerated inside one small-step interval.
    pub step_fraction: f64,
    /// Minimum prominence of a valley used as a peak/valley boundary.
    pub min_prominence: f64,
    /// Percentage of forecast demand provisioned by the naive strategy.
    pub over_provision_percent: f64,
}

impl Default for DerivationSettings {
    fn default() -> Self {
        Self {
            rmse_threshold: 1.0,
            window_strategy: WindowStrategyKind::SmallStep,
            step_fraction: 0.1,
            min_prominence: 1.0,
            over_provision_percent: 100.0,
        }
    }
}

fn default_pulling_interval() -> u64 {
    24 * 3600
}

fn default_timeout() -> u64 {
    30
}

impl SystemConfiguration {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Parse and validate a configuration document. `what` names the source
    /// in error messages.
    pub fn from_toml_str(content: &str, what: &str) -> ConfigResult<Self> {
        let config: SystemConfiguration =
            toml::from_str(content).map_err(|source| ConfigError::Parse {
                what: what.to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.main_service_name.trim().is_empty() {
            return Err(ConfigError::Invalid("main_service_name is empty".into()));
        }
        if self.derivation.rmse_threshold < 0.0 {
            return Err(ConfigError::Invalid("rmse_threshold must be >= 0".into()));
        }
        if self.derivation.over_provision_percent <= 0.0 {
            return Err(ConfigError::Invalid(
                "over_provision_percent must be > 0".into(),
            ));
        }
        if self.pulling_interval_secs == 0 {
            return Err(ConfigError::Invalid("pulling_interval_secs must be > 0".into()));
        }
        Ok(())
    }
}
