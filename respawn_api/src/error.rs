use thiserror::Error;

use crate::types::error_types::Error as ApiError;

/// A unified error type for this library.
#[derive(Debug, Error)]
pub enum RevoltError {
    /// HTTP request failed (network or protocol issue).
    #[error("Reqwest Error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// HTTP returned a non-2xx status with a structured error body.
    #[error("API Error: {0:?}")]
    ApiError(ApiError),

    /// The server returned an error code we couldn't parse as `ApiError`.
    #[error("Non-success HTTP status {code}, body: {body}")]
    HttpStatus { code: u16, body: String },

    /// Serde (de)serialization error.
    #[error("Serde JSON error: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// Gateway transport failure (connect, send, close).
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A configured endpoint is not a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Other error: {0}")]
    Other(String),
}

impl RevoltError {
    /// True when retrying the same request cannot succeed, e.g. the channel
    /// is gone or the bot lacks permission to post there.
    pub fn is_permanent(&self) -> bool {
        match self {
            RevoltError::ApiError(err) => err.kind.is_permanent(),
            RevoltError::HttpStatus { code, .. } => matches!(code, 401 | 403 | 404),
            _ => false,
        }
    }
}

/// Convert an `Error` object from the schema into a `RevoltError::ApiError`.
pub fn handle_api_error(err: ApiError) -> RevoltError {
    RevoltError::ApiError(err)
}
