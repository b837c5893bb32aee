use spd_core::Algorithm;
use spd_derivation::DerivationError;
use spd_forecast::ForecastError;
use spd_state::StateError;
use thiserror::Error;

pub type CycleResult<T> = Result<T, CycleError>;

/// Why a derivation cycle stopped.
#[derive(Debug, Error)]
pub enum CycleError {
    /// A component was unreachable or sent something unusable.
    #[error("{stage} fetch failed: {reason}")]
    Fetch {
        stage: &'static str,
        endpoint: String,
        reason: String,
    },

    #[error("store: {0}")]
    Store(#[from] StateError),

    #[error("{0}")]
    InfeasibleAllocation(String),

    #[error("no policy could be derived")]
    NoPolicy,

    #[error("strategy {0} is not implemented")]
    UnimplementedStrategy(Algorithm),

    #[error("no price for VM type {0}")]
    UnknownVmType(String),
}

impl CycleError {
    pub(crate) fn fetch(stage: &'static str, err: spd_clients::ClientError) -> Self {
        Self::Fetch {
            stage,
            endpoint: err.endpoint().to_string(),
            reason: err.to_string(),
        }
    }

    /// Short label of the failing stage, for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Fetch { stage, .. } => stage,
            Self::Store(_) => "store",
            Self::InfeasibleAllocation(_)
            | Self::NoPolicy
            | Self::UnimplementedStrategy(_) => "derivation",
            Self::UnknownVmType(_) => "evaluation",
        }
    }
}

impl From<DerivationError> for CycleError {
    fn from(err: DerivationError) -> Self {
        match err {
            DerivationError::InfeasibleAllocation(msg) => Self::InfeasibleAllocation(msg),
            DerivationError::UnimplementedStrategy(a) => Self::UnimplementedStrategy(a),
            DerivationError::NoPolicy => Self::NoPolicy,
            DerivationError::UnknownVmType(t) => Self::UnknownVmType(t),
        }
    }
}

impl From<ForecastError> for CycleError {
    fn from(err: ForecastError) -> Self {
        match err {
            ForecastError::Store(e) => Self::Store(e),
            ForecastError::Invalid(reason) => Self::Fetch {
                stage: "forecast",
                endpoint: String::new(),
                reason,
            },
        }
    }
}
