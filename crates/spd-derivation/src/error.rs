use spd_core::Algorithm;
use thiserror::Error;

pub type DerivationResult<T> = Result<T, DerivationError>;

#[derive(Debug, Error)]
pub enum DerivationError {
    /// No VM type (or no usable performance profile) can host the replicas.
    #[error("infeasible allocation: {0}")]
    InfeasibleAllocation(String),

    #[error("strategy {0} is not implemented")]
    UnimplementedStrategy(Algorithm),

    #[error("no policy could be derived")]
    NoPolicy,

    #[error("no price for VM type {0}")]
    UnknownVmType(String),
}
