//! Network collaborator used by the uploader
//!
//! The uploader never speaks HTTP itself. Implementations of [`Transport`]
//! post the header and chunks and look headers up by ID; routing, peer
//! selection and socket timeouts are theirs to decide.

pub mod error;

pub use error::{ChunkRejection, TransportError, TransportErrorKind};

use crate::types::{ChunkSubmission, TransactionHeader, TxId};
use async_trait::async_trait;

/// Outcome of a submission request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub body: String,
    pub status: u16,
    pub error: Option<TransportError>,
}

impl TransportResponse {
    /// A response with the given status and no error
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            status,
            error: None,
        }
    }

    /// A 200 response with an empty body
    pub fn ok() -> Self {
        Self::new(200, "")
    }

    /// A failed response carrying `error`
    pub fn failed(status: u16, error: TransportError) -> Self {
        Self {
            body: error.message.clone(),
            status,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network operations the uploader depends on
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post a transaction header, possibly with its payload inline
    async fn submit_header(&self, header: &TransactionHeader) -> TransportResponse;

    /// Post a single chunk with its inclusion proof
    async fn submit_chunk(&self, chunk: &ChunkSubmission) -> TransportResponse;

    /// Look a transaction header up by ID
    async fn fetch_header(&self, id: &TxId) -> Result<TransactionHeader, TransportError>;
}
