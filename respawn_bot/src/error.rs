use std::path::PathBuf;

use respawn_api::RevoltError;
use thiserror::Error;

/// Errors surfaced to whoever invoked a timer operation. Neither variant is
/// fatal; the facade turns them into a chat reply.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimerError {
    #[error("no active timer for **{name}**")]
    NotFound { name: String },

    #[error("{0}")]
    Validation(String),
}

impl TimerError {
    pub fn not_found(name: &str) -> Self {
        TimerError::NotFound {
            name: name.to_string(),
        }
    }
}

/// Storage read/write failures. Logged and swallowed by the stores.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Notification delivery failures. Logged and swallowed by the engine.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("chat API error: {0}")]
    Api(#[from] RevoltError),
}

/// Startup configuration problems; the only errors that end the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON config in '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config validation: {0}")]
    Invalid(String),
}
