//! Error types for the quickpay-rs library.
//!
//! A checksum mismatch is deliberately not an error: [`ParsedResponse::is_valid`]
//! returns `false` so that "untrusted reply" stays an ordinary branch in the caller.
//!
//! [`ParsedResponse::is_valid`]: crate::response::ParsedResponse::is_valid

use thiserror::Error;

/// Main error type for QuickPay operations.
#[derive(Error, Debug)]
pub enum QuickpayError {
    /// No merchant id or secret could be resolved, or a configuration value is malformed
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Error raised by the HTTP client (connect, TLS, timeout, body read)
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The gateway could not be reached or answered with a non-success status
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The reply body could not be parsed into the expected field structure
    #[error("Protocol error: {message}. Response: {body}")]
    ProtocolError {
        /// What went wrong while parsing
        message: String,
        /// The raw body as received, kept for diagnostics
        body: String,
    },

    /// Error form-encoding a request body
    #[error("Encoding error: {0}")]
    EncodingError(#[from] serde_urlencoded::ser::Error),

    /// Error parsing an endpoint URL
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
}

impl QuickpayError {
    /// Builds a [`QuickpayError::ProtocolError`] from any parse failure and the offending body.
    pub fn protocol(err: impl std::fmt::Display, body: impl Into<String>) -> Self {
        QuickpayError::ProtocolError {
            message: err.to_string(),
            body: body.into(),
        }
    }

    /// Returns true for failures that happened while talking to the gateway.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            QuickpayError::HttpError(_) | QuickpayError::TransportError(_)
        )
    }
}

/// Result type alias for QuickPay operations.
pub type Result<T> = std::result::Result<T, QuickpayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuickpayError::ConfigurationError("no merchant id".to_string());
        assert_eq!(err.to_string(), "Configuration error: no merchant id");
    }

    #[test]
    fn test_protocol_error_keeps_body() {
        let err = QuickpayError::protocol("unexpected end of file", "<response><amount>");
        match &err {
            QuickpayError::ProtocolError { message, body } => {
                assert_eq!(message, "unexpected end of file");
                assert_eq!(body, "<response><amount>");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(err.to_string().contains("<response><amount>"));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_error_conversion() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: QuickpayError = url_err.into();
        assert!(matches!(err, QuickpayError::UrlParseError(_)));
    }

    #[test]
    fn test_transport_classification() {
        assert!(QuickpayError::TransportError("connection refused".into()).is_transport());
        assert!(!QuickpayError::ConfigurationError("x".into()).is_transport());
    }
}
