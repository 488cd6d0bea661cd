//! Per-transaction upload state machine
//!
//! A [`TransactionUpload`] posts the header on its first step and one chunk
//! on every step after that. Chunks go out strictly in order: the index only
//! moves after the network confirms the current chunk with a 200.

use crate::chunker::Chunker;
use crate::error::{Result, UploadError};
use crate::transport::{Transport, TransportResponse};
use crate::types::{b64_decode, TransactionHeader};
use crate::upload::backoff::{retry_delay, JitterSource};
use crate::upload::state::{PersistedUpload, UploadState};
use crate::upload::types::{UploadConfig, UploadProgress};
use log::{debug, error, info, warn};
use std::sync::Arc;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One upload in progress
pub struct TransactionUpload {
    transport: Arc<dyn Transport>,
    chunker: Arc<dyn Chunker>,
    jitter: Arc<dyn JitterSource>,
    config: UploadConfig,
    header: TransactionHeader,
    payload: Vec<u8>,
    state: UploadState,
}

impl std::fmt::Debug for TransactionUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionUpload")
            .field("id", &self.header.id)
            .field("payload_len", &self.payload.len())
            .field("total_chunks", &self.total_chunks())
            .field("state", &self.state)
            .field("config", &self.config)
            .finish()
    }
}

impl TransactionUpload {
    /// Assemble an upload from an already-prepared header
    ///
    /// `header` must carry its chunk manifest and no inline payload.
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        chunker: Arc<dyn Chunker>,
        jitter: Arc<dyn JitterSource>,
        config: UploadConfig,
        header: TransactionHeader,
        payload: Vec<u8>,
        state: UploadState,
    ) -> Self {
        Self {
            transport,
            chunker,
            jitter,
            config,
            header,
            payload,
            state,
        }
    }

    /// The header being uploaded, without inline payload
    pub fn header(&self) -> &TransactionHeader {
        &self.header
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Number of chunks in the manifest, or 0 when there is none
    pub fn total_chunks(&self) -> usize {
        self.header.chunk_count()
    }

    /// Chunks accepted so far; an inline header post counts its chunk, so a
    /// zero-chunk upload reports 0 even once complete
    pub fn uploaded_chunks(&self) -> usize {
        self.state.chunk_index
    }

    /// Whole percent of chunks uploaded, truncated; 0 when there are no chunks
    pub fn percent_complete(&self) -> u32 {
        self.progress().percentage
    }

    pub fn progress(&self) -> UploadProgress {
        UploadProgress::new(self.uploaded_chunks(), self.total_chunks())
    }

    /// True once the header is posted and every chunk has been accepted
    pub fn is_complete(&self) -> bool {
        let total = self.total_chunks();
        self.state.header_posted && (self.state.chunk_index == total || total == 0)
    }

    pub fn last_response_status(&self) -> u16 {
        self.state.last_response_status
    }

    pub fn last_response_error(&self) -> &str {
        &self.state.last_response_error
    }

    /// Snapshot for storage; see [`PersistedUpload`]
    pub fn to_persisted(&self) -> PersistedUpload {
        self.state.to_persisted(&self.header)
    }

    /// Perform the next unit of work
    ///
    /// The first successful call posts the header. Every later call submits
    /// the chunk at the current index. After a failed request the call first
    /// sleeps for the jittered retry delay.
    ///
    /// # Errors
    ///
    /// - `AlreadyComplete` if nothing is left to upload
    /// - `UploadAbandoned` once the consecutive error ceiling is reached
    /// - `RetryableTransport` if posting the header failed; call again
    /// - `ChunkValidationFailed` if the chunk's proof does not match the data root
    /// - `FatalChunkUpload` if the network permanently rejected the chunk
    ///
    /// Other failed chunk submissions are recorded in the state and retried
    /// on the next call.
    pub async fn upload_next_chunk(&mut self) -> Result<()> {
        let result = self.step().await;
        self.report_progress();
        result
    }

    /// Call [`upload_next_chunk`](Self::upload_next_chunk) until the upload
    /// completes or a request fails
    ///
    /// A failed request stops the loop rather than being retried here; the
    /// caller decides whether to call again.
    ///
    /// # Returns
    ///
    /// The final progress once the upload is complete
    pub async fn run_to_completion(&mut self) -> Result<UploadProgress> {
        while !self.is_complete() {
            let before = (self.state.chunk_index, self.state.header_posted);
            self.upload_next_chunk().await?;

            if self.is_complete() {
                break;
            }

            let status = self.state.last_response_status;
            if !(200..300).contains(&status) {
                return Err(UploadError::retryable(
                    status,
                    self.state.last_response_error.clone(),
                ));
            }
            if before == (self.state.chunk_index, self.state.header_posted) {
                return Err(UploadError::retryable(
                    status,
                    format!("no progress after status {}", status),
                ));
            }
        }

        Ok(self.progress())
    }

    async fn step(&mut self) -> Result<()> {
        if self.is_complete() {
            return Err(UploadError::AlreadyComplete);
        }

        // only chunk rejections are fatal; a failed header is always retried
        let fatal = self
            .state
            .last_error_kind
            .filter(|kind| self.state.header_posted && kind.is_fatal());
        if let Some(kind) = fatal {
            return Err(UploadError::FatalChunkUpload {
                index: self.state.chunk_index,
                kind,
                message: self.state.last_response_error.clone(),
            });
        }

        if self.state.has_error() {
            self.state.consecutive_errors += 1;
        } else {
            self.state.consecutive_errors = 0;
        }

        if self.state.consecutive_errors >= self.config.max_consecutive_errors {
            error!(
                "Abandoning upload of {} after {} consecutive errors",
                self.header.id, self.state.consecutive_errors
            );
            return Err(UploadError::abandoned(
                self.state.last_response_status,
                self.state.last_response_error.clone(),
            ));
        }

        if self.state.has_error() {
            let delay = retry_delay(
                self.config.error_delay,
                self.state.last_request_end_millis,
                now_millis(),
                self.config.jitter_ratio,
                self.jitter.sample(),
            );
            if !delay.is_zero() {
                debug!("Retrying in {:?} after: {}", delay, self.state.last_response_error);
                tokio::time::sleep(delay).await;
            }
        }

        self.state.last_response_error.clear();
        self.state.last_error_kind = None;

        if !self.state.header_posted {
            return self.post_header().await;
        }

        self.post_chunk().await
    }

    async fn post_header(&mut self) -> Result<()> {
        let total = self.total_chunks();
        let inline = total <= self.config.max_chunks_in_body;

        // the retained header never holds the payload, only the request copy does
        let request = if inline {
            self.header.with_inline_data(&self.payload)
        } else {
            self.header.without_data()
        };

        debug!(
            "Posting transaction {} ({} chunks, inline: {})",
            self.header.id, total, inline
        );
        let response = self.transport.submit_header(&request).await;
        debug!(
            "Transaction {} response: status {}, body: {}",
            self.header.id, response.status, response.body
        );
        self.record_response(&response);

        if response.is_success() {
            self.state.header_posted = true;
            if inline {
                self.state.chunk_index = total;
            }
            info!("Transaction {} posted", self.header.id);
            return Ok(());
        }

        match response.error {
            Some(err) => {
                warn!(
                    "Unable to post transaction {}: {}, {}",
                    self.header.id, response.status, err
                );
                self.state.last_response_error = err.message.clone();
                self.state.last_error_kind = Some(err.kind);
                Err(UploadError::retryable(response.status, err.message))
            }
            None => {
                warn!(
                    "Transaction {} not accepted: status {}",
                    self.header.id, response.status
                );
                Ok(())
            }
        }
    }

    async fn post_chunk(&mut self) -> Result<()> {
        let index = self.state.chunk_index;
        let submission = self.chunker.chunk_at(&self.header, index, &self.payload)?;

        let proof = b64_decode(&submission.data_path)
            .map_err(|e| UploadError::chunk_validation(index, format!("data path: {}", e)))?;
        let offset: u64 = submission
            .offset
            .parse()
            .map_err(|e| UploadError::chunk_validation(index, format!("offset: {}", e)))?;
        let data_size: u64 = submission
            .data_size
            .parse()
            .map_err(|e| UploadError::chunk_validation(index, format!("data size: {}", e)))?;
        let data_root = b64_decode(&self.header.data_root)
            .map_err(|e| UploadError::chunk_validation(index, format!("data root: {}", e)))?;

        if !self
            .chunker
            .validate_inclusion(&data_root, offset, 0, data_size, &proof)
        {
            return Err(UploadError::chunk_validation(
                index,
                "inclusion proof does not match the data root",
            ));
        }

        debug!(
            "Posting chunk {}/{} of {}",
            index + 1,
            self.total_chunks(),
            self.header.id
        );
        let response = self.transport.submit_chunk(&submission).await;
        debug!(
            "Chunk {} response: status {}, body: {}",
            index, response.status, response.body
        );
        self.record_response(&response);

        if response.status == 200 {
            self.state.chunk_index += 1;
            return Ok(());
        }

        if let Some(err) = response.error {
            self.state.last_response_error = err.message.clone();
            self.state.last_error_kind = Some(err.kind);

            if err.is_fatal() {
                error!("Fatal error uploading chunk {}: {}", index, err);
                return Err(UploadError::FatalChunkUpload {
                    index,
                    kind: err.kind,
                    message: err.message,
                });
            }
            warn!(
                "Chunk {} failed with status {}: {}",
                index, response.status, err
            );
        }

        Ok(())
    }

    fn record_response(&mut self, response: &TransportResponse) {
        self.state.last_request_end_millis = now_millis();
        self.state.last_response_status = response.status;
    }

    fn report_progress(&self) {
        let progress = self.progress();
        if progress.total_chunks > 0 {
            info!(
                "{}% complete, {}/{}",
                progress.percentage, progress.uploaded_chunks, progress.total_chunks
            );
        }
        if let Some(ref callback) = self.config.on_progress {
            callback(progress);
        }
    }
}
