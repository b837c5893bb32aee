use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Failure to reach a component or to understand its answer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid endpoint {endpoint}: {reason}")]
    Endpoint { endpoint: String, reason: String },

    #[error("request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("{endpoint} answered {status}")]
    Status { endpoint: String, status: u16 },

    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    /// The endpoint the failed call was addressed to.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Endpoint { endpoint, .. }
            | Self::Request { endpoint, .. }
            | Self::Timeout { endpoint }
            | Self::Status { endpoint, .. }
            | Self::Decode { endpoint, .. } => endpoint,
        }
    }
}
