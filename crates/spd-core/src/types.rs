//! Enumerated choices shared across SPD crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Policy derivation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Fixed over-provisioning on the running VM type.
    Naive,
    /// Interval-local repacking onto the cheapest single VM type.
    #[default]
    SmallStepRepacking,
    /// Reserved for an exact solver. Not implemented.
    IntegerProgramming,
    /// Run every strategy and let the evaluator pick.
    All,
}

impl Algorithm {
    /// The concrete strategies this choice expands to.
    pub fn strategies(self) -> &'static [Algorithm] {
        match self {
            Algorithm::Naive => &[Algorithm::Naive],
            Algorithm::SmallStepRepacking => &[Algorithm::SmallStepRepacking],
            Algorithm::IntegerProgramming => &[Algorithm::IntegerProgramming],
            Algorithm::All => &[
                Algorithm::Naive,
                Algorithm::SmallStepRepacking,
                Algorithm::IntegerProgramming,
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Naive => "naive",
            Algorithm::SmallStepRepacking => "small-step-repacking",
            Algorithm::IntegerProgramming => "integer-programming",
            Algorithm::All => "all",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling granularity of the forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Granularity {
    #[default]
    #[serde(rename = "h")]
    Hour,
    #[serde(rename = "m")]
    Minute,
    #[serde(rename = "s")]
    Second,
}

impl Granularity {
    /// Length of one sample in seconds.
    pub fn seconds(self) -> i64 {
        match self {
            Granularity::Hour => 3600,
            Granularity::Minute => 60,
            Granularity::Second => 1,
        }
    }
}

/// How the forecast horizon is cut into critical intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowStrategyKind {
    #[default]
    SmallStep,
    PeakValley,
}
