//! Shared helpers for the uploader integration tests
//!
//! [`ScriptedTransport`] answers requests from per-endpoint queues and
//! records everything it was sent. An empty queue answers 200.

#![allow(dead_code)]

use async_trait::async_trait;
use chunked_uploader::chunker::MerkleChunker;
use chunked_uploader::transport::{Transport, TransportError, TransportResponse};
use chunked_uploader::types::{ChunkSubmission, TransactionHeader, TxId};
use chunked_uploader::upload::{FixedJitter, UploadConfig, Uploader};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TX_ID: &str = "eIgnDk4vSKPe0lYB6yhCHDV1dOw3JgYHGocfj7WGrjQ";

/// Chunk size used by the test chunker
pub const CHUNK: usize = 64;

#[derive(Default)]
pub struct ScriptedTransport {
    header_responses: Mutex<VecDeque<TransportResponse>>,
    chunk_responses: Mutex<VecDeque<TransportResponse>>,
    headers: Mutex<Vec<TransactionHeader>>,
    chunks: Mutex<Vec<ChunkSubmission>>,
    remote: Mutex<HashMap<String, TransactionHeader>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_header_response(&self, response: TransportResponse) {
        self.header_responses.lock().unwrap().push_back(response);
    }

    pub fn push_chunk_response(&self, response: TransportResponse) {
        self.chunk_responses.lock().unwrap().push_back(response);
    }

    pub fn push_chunk_responses(&self, response: TransportResponse, count: usize) {
        let mut queue = self.chunk_responses.lock().unwrap();
        for _ in 0..count {
            queue.push_back(response.clone());
        }
    }

    pub fn insert_remote(&self, header: TransactionHeader) {
        self.remote.lock().unwrap().insert(header.id.clone(), header);
    }

    pub fn headers(&self) -> Vec<TransactionHeader> {
        self.headers.lock().unwrap().clone()
    }

    pub fn chunks(&self) -> Vec<ChunkSubmission> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn header_calls(&self) -> usize {
        self.headers.lock().unwrap().len()
    }

    pub fn chunk_calls(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    /// Offsets of every chunk submitted, in order
    pub fn chunk_offsets(&self) -> Vec<u64> {
        self.chunks()
            .iter()
            .map(|c| c.offset.parse().unwrap())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn submit_header(&self, header: &TransactionHeader) -> TransportResponse {
        self.headers.lock().unwrap().push(header.clone());
        self.header_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(TransportResponse::ok)
    }

    async fn submit_chunk(&self, chunk: &ChunkSubmission) -> TransportResponse {
        self.chunks.lock().unwrap().push(chunk.clone());
        self.chunk_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(TransportResponse::ok)
    }

    async fn fetch_header(&self, id: &TxId) -> Result<TransactionHeader, TransportError> {
        self.remote
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| TransportError::from_response_text("Not Found"))
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic payload of `len` bytes
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub fn signed_header() -> TransactionHeader {
    signed_header_with_id(TX_ID)
}

pub fn signed_header_with_id(id: &str) -> TransactionHeader {
    TransactionHeader {
        id: id.to_string(),
        owner: "b3duZXI".into(),
        signature: "c2lnbmF0dXJl".into(),
        ..Default::default()
    }
}

pub fn small_chunker() -> Arc<MerkleChunker> {
    Arc::new(MerkleChunker::with_chunk_sizes(CHUNK, 8).unwrap())
}

/// Config with no retry delay so failing steps run back to back
pub fn fast_config() -> UploadConfig {
    UploadConfig::new().error_delay(Duration::ZERO)
}

pub fn uploader(transport: Arc<ScriptedTransport>) -> Uploader {
    Uploader::new(transport)
        .with_chunker(small_chunker())
        .with_jitter(Arc::new(FixedJitter(0.0)))
        .with_config(fast_config())
        .unwrap()
}

pub fn server_error() -> TransportResponse {
    TransportResponse::failed(500, TransportError::from_response_text("internal error"))
}
