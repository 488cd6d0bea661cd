//! Error handling for the chunked uploader
//!
//! This module defines the error types surfaced by the upload driver and
//! the helpers used to build and classify them.

use crate::transport::TransportErrorKind;
use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, UploadError>;

/// Error types that can occur while driving an upload
#[derive(Error, Debug)]
pub enum UploadError {
    /// The transaction header carries no identifier, so it was never signed
    #[error("Transaction is not signed")]
    NotSigned,

    /// A persisted upload could not be understood
    #[error("Serialized upload does not match expected format: {message}")]
    MalformedState { message: String },

    /// The payload supplied on resume does not hash to the persisted data root
    #[error("Data mismatch: uploader expects data root {expected}, payload has {actual}")]
    DataMismatch { expected: String, actual: String },

    /// The header could not be fetched from the network
    #[error("Transaction {id} not found: {message}")]
    HeaderNotFound { id: String, message: String },

    /// A chunk failed its inclusion proof check and was not sent
    #[error("Unable to validate chunk {index}: {message}")]
    ChunkValidationFailed { index: usize, message: String },

    /// The network rejected or dropped a request; the next step retries it
    #[error("Unable to upload transaction: {status}, {message}")]
    RetryableTransport { status: u16, message: String },

    /// The network permanently rejected a chunk
    #[error("Fatal error uploading chunk {index}: {message}")]
    FatalChunkUpload {
        index: usize,
        kind: TransportErrorKind,
        message: String,
    },

    /// Too many consecutive failures; the upload gave up
    #[error("Unable to complete upload: {status}:{message}")]
    UploadAbandoned { status: u16, message: String },

    /// Every chunk has already been delivered
    #[error("Upload is already complete")]
    AlreadyComplete,

    /// Invalid parameter
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UploadError {
    /// Create a new malformed state error
    pub fn malformed_state(message: impl Into<String>) -> Self {
        UploadError::MalformedState {
            message: message.into(),
        }
    }

    /// Create a new data mismatch error
    pub fn data_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        UploadError::DataMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new header lookup error
    pub fn header_not_found(id: impl Into<String>, message: impl Into<String>) -> Self {
        UploadError::HeaderNotFound {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create a new chunk validation error
    pub fn chunk_validation(index: usize, message: impl Into<String>) -> Self {
        UploadError::ChunkValidationFailed {
            index,
            message: message.into(),
        }
    }

    /// Create a new retryable transport error
    pub fn retryable(status: u16, message: impl Into<String>) -> Self {
        UploadError::RetryableTransport {
            status,
            message: message.into(),
        }
    }

    /// Create a new abandoned upload error
    pub fn abandoned(status: u16, message: impl Into<String>) -> Self {
        UploadError::UploadAbandoned {
            status,
            message: message.into(),
        }
    }

    /// Create a new invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        UploadError::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Whether calling the step again may succeed without restarting
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::RetryableTransport { .. })
    }

    /// Whether the upload can never finish with this transaction
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            UploadError::FatalChunkUpload { .. } | UploadError::UploadAbandoned { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChunkRejection;

    #[test]
    fn test_error_creation() {
        let err = UploadError::malformed_state("bad json");
        assert!(matches!(err, UploadError::MalformedState { .. }));

        let err = UploadError::data_mismatch("abc", "def");
        assert!(matches!(err, UploadError::DataMismatch { .. }));

        let err = UploadError::chunk_validation(3, "bad proof");
        assert!(matches!(err, UploadError::ChunkValidationFailed { index: 3, .. }));
    }

    #[test]
    fn test_error_display() {
        let err = UploadError::abandoned(502, "bad gateway");
        assert_eq!(err.to_string(), "Unable to complete upload: 502:bad gateway");

        let err = UploadError::retryable(500, "connection reset");
        assert_eq!(
            err.to_string(),
            "Unable to upload transaction: 500, connection reset"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(UploadError::retryable(0, "timeout").is_retryable());
        assert!(!UploadError::NotSigned.is_retryable());

        let fatal = UploadError::FatalChunkUpload {
            index: 2,
            kind: TransportErrorKind::Rejected(ChunkRejection::InvalidProof),
            message: "invalid_proof".into(),
        };
        assert!(fatal.is_permanent());
        assert!(UploadError::abandoned(0, "").is_permanent());
        assert!(!UploadError::AlreadyComplete.is_permanent());
    }
}
