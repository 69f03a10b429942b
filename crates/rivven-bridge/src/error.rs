//! Bridge error types
//!
//! The codec layer never recovers from these locally; every failure is
//! surfaced to the caller and mapped to a transport status at the HTTP edge.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Numeric error codes carried in HTTP error bodies
pub mod error_codes {
    // Content type
    pub const MALFORMED_CONTENT_TYPE: u32 = 40001;
    pub const MISSING_CONTENT_TYPE: u32 = 40002;
    pub const UNSUPPORTED_CONTENT_TYPE: u32 = 40003;

    // Payload
    pub const ENCODING_ERROR: u32 = 40004;
    pub const DECODING_ERROR: u32 = 40005;
    pub const INVALID_REQUEST: u32 = 40006;
    pub const VALIDATION_FAILED: u32 = 40007;

    // Upstream
    pub const SCHEMA_RESOLUTION: u32 = 50201;

    // Internal
    pub const UNSUPPORTED_OPERATION: u32 = 50001;
    pub const CONFIG_ERROR: u32 = 50002;
}

/// Errors raised by the codec and dispatch layer
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Malformed content type '{value}': {reason}")]
    MalformedContentType { value: String, reason: String },

    #[error("Content type header missing")]
    MissingContentType,

    #[error("Content type not supported: {0}")]
    UnsupportedContentType(String),

    #[error("Schema resolution failed for {target}: {source}")]
    SchemaResolution {
        target: String,
        #[source]
        source: RegistryError,
    },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request validation failed: {}", summarize(.0))]
    Validation(Vec<FieldViolation>),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    pub(crate) fn malformed(value: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::MalformedContentType {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn resolution(target: impl Into<String>, source: RegistryError) -> Self {
        BridgeError::SchemaResolution {
            target: target.into(),
            source,
        }
    }

    /// Get the numeric error code
    pub fn error_code(&self) -> u32 {
        match self {
            BridgeError::MalformedContentType { .. } => error_codes::MALFORMED_CONTENT_TYPE,
            BridgeError::MissingContentType => error_codes::MISSING_CONTENT_TYPE,
            BridgeError::UnsupportedContentType(_) => error_codes::UNSUPPORTED_CONTENT_TYPE,
            BridgeError::SchemaResolution { .. } => error_codes::SCHEMA_RESOLUTION,
            BridgeError::Encoding(_) => error_codes::ENCODING_ERROR,
            BridgeError::Decoding(_) => error_codes::DECODING_ERROR,
            BridgeError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            BridgeError::Validation(_) => error_codes::VALIDATION_FAILED,
            BridgeError::UnsupportedOperation(_) => error_codes::UNSUPPORTED_OPERATION,
            BridgeError::Config(_) => error_codes::CONFIG_ERROR,
        }
    }

    /// Get the HTTP status code
    pub fn http_status(&self) -> u16 {
        match self {
            BridgeError::MalformedContentType { .. }
            | BridgeError::MissingContentType
            | BridgeError::UnsupportedContentType(_)
            | BridgeError::Encoding(_)
            | BridgeError::Decoding(_)
            | BridgeError::InvalidRequest(_)
            | BridgeError::Validation(_) => 400,
            BridgeError::SchemaResolution { .. } => 502,
            BridgeError::UnsupportedOperation(_) | BridgeError::Config(_) => 500,
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::MalformedContentType { .. } => "malformed_content_type",
            BridgeError::MissingContentType => "missing_content_type",
            BridgeError::UnsupportedContentType(_) => "unsupported_content_type",
            BridgeError::SchemaResolution { .. } => "schema_resolution",
            BridgeError::Encoding(_) => "encoding",
            BridgeError::Decoding(_) => "decoding",
            BridgeError::InvalidRequest(_) => "invalid_request",
            BridgeError::Validation(_) => "validation",
            BridgeError::UnsupportedOperation(_) => "unsupported_operation",
            BridgeError::Config(_) => "config",
        }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// A single rejected request field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    pub object: String,
    pub field: String,
    pub rejected_value: serde_json::Value,
    pub message: String,
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{} {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors talking to the schema registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Registry returned {status} (error code {error_code}): {message}")]
    Status {
        status: u16,
        error_code: u32,
        message: String,
    },

    #[error("Invalid registry response: {0}")]
    Parse(String),

    #[error("Registry call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RegistryError::Parse(err.to_string())
        } else {
            RegistryError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Parse(err.to_string())
    }
}

/// Result type for registry calls
pub type RegistryResult<T> = Result<T, RegistryError>;
