use spd_state::StateError;
use thiserror::Error;

pub type ForecastResult<T> = Result<T, ForecastError>;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("forecast store: {0}")]
    Store(#[from] StateError),

    #[error("invalid forecast: {0}")]
    Invalid(String),
}
