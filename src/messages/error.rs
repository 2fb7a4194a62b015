//! Decode error types

use thiserror::Error;

/// Errors raised while decoding an inbound frame or payload
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload bytes were not UTF-8
    #[error("Payload is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    /// JSON frame or payload failed to parse
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parsed but has the wrong shape
    #[error("Unexpected frame shape: {0}")]
    Shape(String),

    /// Non-JSON payload that is not `type,rest`
    #[error("Malformed compact payload: {0:?}")]
    Compact(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DecodeError::Compact("nocomma".to_string());
        assert_eq!(err.to_string(), "Malformed compact payload: \"nocomma\"");

        let err = DecodeError::Shape("expected object".to_string());
        assert_eq!(err.to_string(), "Unexpected frame shape: expected object");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: DecodeError = json_err.into();
        assert!(matches!(err, DecodeError::Json(_)));
    }
}
