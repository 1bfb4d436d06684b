//! Error types for the Paygate SDK

use thiserror::Error;

/// Machine-readable error categories.
///
/// Every failure the SDK reports carries exactly one code, so callers can
/// branch without parsing messages (retry on `NetworkError`, surface
/// `GatewayError` messages to the end user, treat `ValidationError` as a
/// programming error, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaygateErrorCode {
    /// A request was rejected locally before any network call was made
    /// (malformed card number, non-positive amount, bad device id, ...).
    ValidationError,
    /// An operation other than initialization was called on a client whose
    /// session has not been set up yet.
    NotInitialized,
    /// The gateway could not be reached, or its response could not be read.
    NetworkError,
    /// The gateway rejected the merchant public key or declined the request
    /// outright (HTTP 401/403).
    AuthenticationError,
    /// The requested transaction or preauthorization is unknown to the
    /// gateway for this merchant/device scope (HTTP 404).
    NotFound,
    /// Too many requests (HTTP 429). Back off before retrying.
    RateLimited,
    /// Any other gateway-reported failure, e.g. a used-up token or an
    /// invalid payment method. The message carries the gateway's reason.
    GatewayError,
}

/// Error returned by all SDK operations.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct PaygateError {
    code: PaygateErrorCode,
    message: String,
    http_status: Option<u16>,
}

impl PaygateError {
    pub fn new(code: PaygateErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            http_status: None,
        }
    }

    /// Error from a gateway response, keeping the HTTP status around.
    pub fn with_status(code: PaygateErrorCode, message: impl Into<String>, status: u16) -> Self {
        Self {
            code,
            message: message.into(),
            http_status: Some(status),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::new(PaygateErrorCode::ValidationError, message)
    }

    pub(crate) fn network(message: impl Into<String>) -> Self {
        Self::new(PaygateErrorCode::NetworkError, message)
    }

    pub(crate) fn not_initialized() -> Self {
        Self::new(
            PaygateErrorCode::NotInitialized,
            "Client is not initialized. Call initialize() first.",
        )
    }

    /// The error category.
    pub fn code(&self) -> PaygateErrorCode {
        self.code
    }

    /// Human-readable description, including the gateway's reason when the
    /// failure was reported remotely.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status of the gateway response, if the error came from one.
    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    /// True for transport-level failures that may succeed on retry.
    pub fn is_network(&self) -> bool {
        self.code == PaygateErrorCode::NetworkError
    }
}

/// Map a gateway HTTP status to an error code.
pub(crate) fn map_status_to_error_code(status: u16) -> PaygateErrorCode {
    match status {
        401 | 403 => PaygateErrorCode::AuthenticationError,
        404 => PaygateErrorCode::NotFound,
        429 => PaygateErrorCode::RateLimited,
        _ => PaygateErrorCode::GatewayError,
    }
}

pub type Result<T> = std::result::Result<T, PaygateError>;
