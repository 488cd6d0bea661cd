//! Transport error classification
//!
//! The network reports chunk rejections as short error strings. They are
//! parsed once at the transport boundary into [`TransportErrorKind`] so the
//! uploader can match on them structurally; the raw text is kept for
//! diagnostics and persisted state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reasons the network gives for permanently refusing a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkRejection {
    InvalidJson,
    ChunkTooBig,
    DataPathTooBig,
    OffsetTooBig,
    DataSizeTooBig,
    ChunkProofRatioNotAttractive,
    InvalidProof,
}

impl ChunkRejection {
    pub const ALL: [ChunkRejection; 7] = [
        ChunkRejection::InvalidJson,
        ChunkRejection::ChunkTooBig,
        ChunkRejection::DataPathTooBig,
        ChunkRejection::OffsetTooBig,
        ChunkRejection::DataSizeTooBig,
        ChunkRejection::ChunkProofRatioNotAttractive,
        ChunkRejection::InvalidProof,
    ];

    /// The text the network uses for this rejection
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkRejection::InvalidJson => "invalid_json",
            ChunkRejection::ChunkTooBig => "chunk_too_big",
            ChunkRejection::DataPathTooBig => "data_path_too_big",
            ChunkRejection::OffsetTooBig => "offset_too_big",
            ChunkRejection::DataSizeTooBig => "data_size_too_big",
            ChunkRejection::ChunkProofRatioNotAttractive => "chunk_proof_ratio_not_attractive",
            ChunkRejection::InvalidProof => "invalid_proof",
        }
    }

    /// Parse a network error string into a rejection reason
    pub fn from_text(text: &str) -> Option<Self> {
        let text = text.trim();
        Self::ALL.into_iter().find(|r| r.as_str() == text)
    }
}

impl fmt::Display for ChunkRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// Connection, timeout or other I/O failure
    Network,
    /// The network answered with an error the uploader does not recognise
    Status,
    /// The network refused the chunk for good
    Rejected(ChunkRejection),
}

impl TransportErrorKind {
    /// Fatal kinds abandon the upload immediately instead of retrying
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportErrorKind::Rejected(_))
    }
}

/// An error reported by the transport, with the raw text preserved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a network failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    /// Classify an error string returned by the network
    pub fn from_response_text(text: impl Into<String>) -> Self {
        let message = text.into();
        let kind = match ChunkRejection::from_text(&message) {
            Some(rejection) => TransportErrorKind::Rejected(rejection),
            None => TransportErrorKind::Status,
        };
        Self { kind, message }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

impl From<ChunkRejection> for TransportError {
    fn from(rejection: ChunkRejection) -> Self {
        Self::new(TransportErrorKind::Rejected(rejection), rejection.as_str())
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}
