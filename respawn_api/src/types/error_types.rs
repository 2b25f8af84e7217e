use serde::{Deserialize, Serialize};

/// The top-level error object with a location and a typed variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    #[serde(default)]
    pub location: String,
    #[serde(flatten)]
    pub kind: ErrorKind,
}

/// Error variants the message endpoints can return.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "PascalCase")]
pub enum ErrorKind {
    UnknownUser,
    UnknownChannel,
    UnknownMessage,
    UnknownServer,
    EmptyMessage,
    PayloadTooLarge,
    TooManyEmbeds { max: u32 },
    TooManyReplies { max: u32 },
    MissingPermission { permission: String },
    NotElevated,
    InternalError,
    InvalidOperation,
    InvalidSession,
    DuplicateNonce,
    NotFound,
    FailedValidation { error: String },
    #[serde(other)]
    Unrecognised,
}

impl ErrorKind {
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ErrorKind::UnknownChannel
                | ErrorKind::UnknownServer
                | ErrorKind::MissingPermission { .. }
                | ErrorKind::InvalidSession
                | ErrorKind::NotFound
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_permission_is_permanent() {
        let raw = r#"{"type":"MissingPermission","permission":"SendMessage","location":"x"}"#;
        let err: Error = serde_json::from_str(raw).expect("parse");
        assert!(err.kind.is_permanent());
    }

    #[test]
    fn unrecognised_kinds_still_parse() {
        let raw = r#"{"type":"VosoUnavailable"}"#;
        let err: Error = serde_json::from_str(raw).expect("parse");
        assert!(matches!(err.kind, ErrorKind::Unrecognised));
        assert!(!err.kind.is_permanent());
    }
}
