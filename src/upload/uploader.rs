//! Entry points for starting and resuming uploads
//!
//! An [`Uploader`] bundles the transport, chunker, jitter source and
//! configuration shared by every upload it creates. Each call hands back an
//! independent [`TransactionUpload`]; many can run concurrently without any
//! shared mutable state.

use crate::chunker::{Chunker, MerkleChunker};
use crate::error::{Result, UploadError};
use crate::transport::Transport;
use crate::types::{TransactionHeader, TxId};
use crate::upload::backoff::{JitterSource, ThreadRngJitter};
use crate::upload::session::TransactionUpload;
use crate::upload::state::{PersistedUpload, UploadState};
use crate::upload::types::UploadConfig;
use log::{debug, warn};
use std::sync::Arc;

/// Where an upload starts from
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// A freshly signed header
    Header(TransactionHeader),
    /// A snapshot saved from an earlier attempt
    Persisted(PersistedUpload),
    /// A header already on the network, looked up by ID
    RemoteId(TxId),
}

/// Factory for [`TransactionUpload`]s
#[derive(Clone)]
pub struct Uploader {
    transport: Arc<dyn Transport>,
    chunker: Arc<dyn Chunker>,
    jitter: Arc<dyn JitterSource>,
    config: UploadConfig,
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Uploader {
    /// Create an uploader with the reference [`MerkleChunker`] and default config
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            chunker: Arc::new(MerkleChunker::new()),
            jitter: Arc::new(ThreadRngJitter),
            config: UploadConfig::default(),
        }
    }

    pub fn with_chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if the configuration does not validate.
    pub fn with_config(mut self, config: UploadConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Start uploading a signed transaction
    ///
    /// The chunk manifest is computed from `payload` unless the header
    /// already carries one.
    ///
    /// # Arguments
    ///
    /// * `header` - The signed transaction header
    /// * `payload` - The transaction's data
    ///
    /// # Errors
    ///
    /// - `NotSigned` if the header has no ID
    /// - `DataMismatch` if the header commits to a different data root than `payload`
    pub fn begin_upload(
        &self,
        header: TransactionHeader,
        payload: impl Into<Vec<u8>>,
    ) -> Result<TransactionUpload> {
        if !header.is_signed() {
            return Err(UploadError::NotSigned);
        }
        let payload = payload.into();

        let mut prepared = header.without_data();
        if prepared.chunks.is_none() {
            warn!("Transaction {} chunks not prepared", header.id);
            self.chunker.prepare_manifest(&mut prepared, &payload)?;

            if !header.data_root.is_empty() && prepared.data_root != header.data_root {
                return Err(UploadError::data_mismatch(
                    header.data_root,
                    prepared.data_root,
                ));
            }
        }

        debug!(
            "Beginning upload of {} ({} bytes, {} chunks)",
            prepared.id,
            payload.len(),
            prepared.chunk_count()
        );
        Ok(self.assemble(prepared, payload, UploadState::new()))
    }

    /// Resume an upload from a snapshot
    ///
    /// The manifest is recomputed from `payload` and must produce the same
    /// data root as the snapshot; this is what catches resuming with the
    /// wrong file.
    ///
    /// # Arguments
    ///
    /// * `persisted` - Snapshot from [`TransactionUpload::to_persisted`] or
    ///   [`Uploader::resume_from_remote_id`]
    /// * `payload` - The same bytes the upload was started with
    ///
    /// # Errors
    ///
    /// - `NotSigned` if the snapshot's header has no ID
    /// - `DataMismatch` if `payload` does not hash to the snapshot's data root
    /// - `MalformedState` if the snapshot claims more chunks than `payload` has
    pub fn resume_upload(
        &self,
        persisted: &PersistedUpload,
        payload: impl Into<Vec<u8>>,
    ) -> Result<TransactionUpload> {
        let expected = &persisted.transaction_header;
        if !expected.is_signed() {
            return Err(UploadError::NotSigned);
        }
        let payload = payload.into();

        let mut header = expected.without_data();
        self.chunker.prepare_manifest(&mut header, &payload)?;

        if header.data_root != expected.data_root {
            return Err(UploadError::data_mismatch(
                expected.data_root.clone(),
                header.data_root,
            ));
        }

        if persisted.chunk_index > header.chunk_count() {
            return Err(UploadError::malformed_state(format!(
                "chunk index {} exceeds {} chunks",
                persisted.chunk_index,
                header.chunk_count()
            )));
        }

        debug!(
            "Resuming upload of {} at chunk {}/{}",
            header.id,
            persisted.chunk_index,
            header.chunk_count()
        );
        Ok(self.assemble(header, payload, UploadState::from_persisted(persisted)))
    }

    /// Resume an upload from a JSON snapshot
    ///
    /// # Errors
    ///
    /// Returns `MalformedState` if `json` cannot be parsed, otherwise the
    /// errors of [`Uploader::resume_upload`].
    pub fn resume_upload_json(
        &self,
        json: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<TransactionUpload> {
        let persisted = PersistedUpload::from_json(json)?;
        self.resume_upload(&persisted, payload)
    }

    /// Build a snapshot for a transaction whose header is already on the network
    ///
    /// The result still has to go through [`Uploader::resume_upload`] with the
    /// payload before any chunk can be sent.
    ///
    /// # Errors
    ///
    /// Returns `HeaderNotFound` if the header cannot be fetched.
    pub async fn resume_from_remote_id(&self, id: &TxId) -> Result<PersistedUpload> {
        let header = self
            .transport
            .fetch_header(id)
            .await
            .map_err(|e| UploadError::header_not_found(id.as_str(), e.message))?;

        Ok(PersistedUpload::from_remote_header(header))
    }

    /// Create an upload from any [`UploadSource`]
    pub async fn create(
        &self,
        source: UploadSource,
        payload: impl Into<Vec<u8>>,
    ) -> Result<TransactionUpload> {
        match source {
            UploadSource::Header(header) => self.begin_upload(header, payload),
            UploadSource::Persisted(persisted) => self.resume_upload(&persisted, payload),
            UploadSource::RemoteId(id) => {
                let persisted = self.resume_from_remote_id(&id).await?;
                self.resume_upload(&persisted, payload)
            }
        }
    }

    fn assemble(
        &self,
        header: TransactionHeader,
        payload: Vec<u8>,
        state: UploadState,
    ) -> TransactionUpload {
        TransactionUpload::new(
            self.transport.clone(),
            self.chunker.clone(),
            self.jitter.clone(),
            self.config.clone(),
            header,
            payload,
            state,
        )
    }
}
