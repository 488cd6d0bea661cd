//! Upload state and its persisted form
//!
//! [`UploadState`] is the working state of one upload. [`PersistedUpload`]
//! is the snapshot callers store to resume later; it never contains the
//! payload, so resuming requires the same bytes to be supplied again.

use crate::error::{Result, UploadError};
use crate::transport::{TransportError, TransportErrorKind};
use crate::types::TransactionHeader;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Working state of a single upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadState {
    /// Next chunk to submit; only advances on a confirmed 200
    pub chunk_index: usize,
    /// Set once the header has been accepted, never reset
    pub header_posted: bool,
    pub last_request_end_millis: i64,
    pub last_response_status: u16,
    /// Error text of the most recent request, empty when it succeeded
    pub last_response_error: String,
    pub last_error_kind: Option<TransportErrorKind>,
    /// Steps in a row that started after a failed request
    pub consecutive_errors: u32,
}

impl UploadState {
    /// State for an upload that has not posted anything yet
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_error(&self) -> bool {
        !self.last_response_error.is_empty()
    }

    /// Snapshot this state together with `header`
    ///
    /// The header's inline payload and chunk manifest are dropped.
    pub fn to_persisted(&self, header: &TransactionHeader) -> PersistedUpload {
        let mut transaction_header = header.without_data();
        transaction_header.chunks = None;

        PersistedUpload {
            chunk_index: self.chunk_index,
            header_posted: self.header_posted,
            transaction_header,
            last_request_end_time_millis: self.last_request_end_millis,
            last_response_status: self.last_response_status,
            last_response_error_text: self.last_response_error.clone(),
        }
    }

    /// Restore the scalar fields of a snapshot
    ///
    /// The error kind is re-derived from the stored text; the consecutive
    /// error count starts over.
    pub fn from_persisted(persisted: &PersistedUpload) -> Self {
        let last_error_kind = (!persisted.last_response_error_text.is_empty()).then(|| {
            TransportError::from_response_text(persisted.last_response_error_text.as_str()).kind
        });

        Self {
            chunk_index: persisted.chunk_index,
            header_posted: persisted.header_posted,
            last_request_end_millis: persisted.last_request_end_time_millis,
            last_response_status: persisted.last_response_status,
            last_response_error: persisted.last_response_error_text.clone(),
            last_error_kind,
            consecutive_errors: 0,
        }
    }
}

/// Serializable snapshot of an upload, without payload bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedUpload {
    pub chunk_index: usize,
    pub header_posted: bool,
    pub transaction_header: TransactionHeader,
    pub last_request_end_time_millis: i64,
    pub last_response_status: u16,
    #[serde(default)]
    pub last_response_error_text: String,
}

impl PersistedUpload {
    /// Snapshot for a header that is already on the network
    ///
    /// Only chunk upload may remain, starting from the first chunk.
    pub fn from_remote_header(header: TransactionHeader) -> Self {
        let mut transaction_header = header.without_data();
        transaction_header.chunks = None;

        Self {
            chunk_index: 0,
            header_posted: true,
            transaction_header,
            last_request_end_time_millis: 0,
            last_response_status: 0,
            last_response_error_text: String::new(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot
    ///
    /// # Errors
    ///
    /// Returns `MalformedState` if the JSON does not describe an upload.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| UploadError::malformed_state(e.to_string()))
    }

    /// Write the snapshot to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read a snapshot previously written with [`PersistedUpload::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
