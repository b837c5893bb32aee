//! Price model — unit price per VM type and billing unit.
//!
//! Loaded once at startup from a TOML prices file, or from the built-in
//! table when no file is given. An explicitly supplied file that cannot be
//! parsed is an error the daemon treats as fatal.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

const BUILTIN_PRICES: &str = include_str!("../default-prices.toml");

/// Period one listed price pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingUnit {
    Second,
    Minute,
    #[default]
    Hour,
}

impl BillingUnit {
    pub fn seconds(self) -> f64 {
        match self {
            BillingUnit::Second => 1.0,
            BillingUnit::Minute => 60.0,
            BillingUnit::Hour => 3600.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceModel {
    #[serde(default)]
    pub billing_unit: BillingUnit,
    pub prices: BTreeMap<String, f64>,
}

impl PriceModel {
    /// Load from `path`, or the built-in table when `path` is `None`.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Self::builtin(),
        }
    }

    pub fn builtin() -> ConfigResult<Self> {
        Self::from_toml_str(BUILTIN_PRICES, "built-in prices")
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    pub fn from_toml_str(content: &str, what: &str) -> ConfigResult<Self> {
        let model: PriceModel = toml::from_str(content).map_err(|source| ConfigError::Parse {
            what: what.to_string(),
            source,
        })?;
        if let Some((vm_type, price)) = model.prices.iter().find(|(_, p)| **p < 0.0) {
            return Err(ConfigError::Invalid(format!(
                "negative price {price} for {vm_type}"
            )));
        }
        Ok(model)
    }

    /// Unit price of a VM type, if known.
    pub fn price(&self, vm_type: &str) -> Option<f64> {
        self.prices.get(vm_type).copied()
    }

    /// Price of running one instance of `vm_type` for `seconds`.
    pub fn price_for(&self, vm_type: &str, seconds: f64) -> Option<f64> {
        self.price(vm_type).map(|p| p * seconds / self.billing_unit.seconds())
    }
}
