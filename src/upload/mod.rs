//! Resumable chunked uploads
//!
//! This module drives a signed transaction onto the network: the header
//! first, then each chunk in order, retrying failed requests with jittered
//! backoff and allowing the upload to be persisted and resumed.

pub mod backoff;
pub mod session;
pub mod state;
pub mod types;
pub mod uploader;

pub use backoff::{retry_delay, FixedJitter, JitterSource, ThreadRngJitter};
pub use session::TransactionUpload;
pub use state::{PersistedUpload, UploadState};
pub use types::{
    UploadConfig, UploadProgress, ERROR_DELAY, JITTER_RATIO, MAX_CHUNKS_IN_BODY,
    MAX_CONSECUTIVE_ERRORS,
};
pub use uploader::{UploadSource, Uploader};
