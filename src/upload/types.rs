use crate::error::{Result, UploadError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;

/// Largest chunk count that is posted inline with the header
pub const MAX_CHUNKS_IN_BODY: usize = 1;

/// Base delay before retrying after a failed request
pub const ERROR_DELAY: Duration = Duration::from_millis(40_000);

/// Consecutive failed steps after which the upload is abandoned
pub const MAX_CONSECUTIVE_ERRORS: u32 = 100;

/// Largest fraction of the retry delay removed at random
pub const JITTER_RATIO: f64 = 0.3;

fn serialize_duration_as_millis<S>(
    value: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(value.as_millis() as u64)
}

fn deserialize_duration_from_millis<'de, D>(
    deserializer: D,
) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Snapshot of how far an upload has progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub uploaded_chunks: usize,
    pub total_chunks: usize,
    /// Whole percent, truncated towards zero
    pub percentage: u32,
}

impl UploadProgress {
    pub fn new(uploaded_chunks: usize, total_chunks: usize) -> Self {
        let percentage = if total_chunks > 0 {
            (uploaded_chunks.min(total_chunks) as u64 * 100 / total_chunks as u64) as u32
        } else {
            0
        };

        Self {
            uploaded_chunks,
            total_chunks,
            percentage,
        }
    }
}

/// Tunables for an upload
///
/// The defaults are the network's protocol constants; overriding them is
/// mostly useful in tests.
#[derive(Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Payloads with at most this many chunks are posted inline with the header
    #[serde(rename = "max-chunks-in-body")]
    pub max_chunks_in_body: usize,

    /// Base retry delay, serialized in milliseconds
    #[serde(
        rename = "error-delay-ms",
        serialize_with = "serialize_duration_as_millis",
        deserialize_with = "deserialize_duration_from_millis"
    )]
    pub error_delay: Duration,

    #[serde(rename = "max-consecutive-errors")]
    pub max_consecutive_errors: u32,

    /// Fraction of the delay that may be shaved off at random (0.0 - 1.0)
    #[serde(rename = "jitter-ratio")]
    pub jitter_ratio: f64,

    #[serde(skip)]
    pub on_progress: Option<Arc<dyn Fn(UploadProgress) + Send + Sync>>,
}

impl std::fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadConfig")
            .field("max_chunks_in_body", &self.max_chunks_in_body)
            .field("error_delay", &self.error_delay)
            .field("max_consecutive_errors", &self.max_consecutive_errors)
            .field("jitter_ratio", &self.jitter_ratio)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_chunks_in_body: MAX_CHUNKS_IN_BODY,
            error_delay: ERROR_DELAY,
            max_consecutive_errors: MAX_CONSECUTIVE_ERRORS,
            jitter_ratio: JITTER_RATIO,
            on_progress: None,
        }
    }
}

impl UploadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_chunks_in_body(mut self, chunks: usize) -> Self {
        self.max_chunks_in_body = chunks;
        self
    }

    pub fn error_delay(mut self, delay: Duration) -> Self {
        self.error_delay = delay;
        self
    }

    pub fn max_consecutive_errors(mut self, errors: u32) -> Self {
        self.max_consecutive_errors = errors;
        self
    }

    pub fn jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio;
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(UploadProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_consecutive_errors == 0 {
            return Err(UploadError::invalid_parameter(
                "max_consecutive_errors",
                "Error ceiling must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(UploadError::invalid_parameter(
                "jitter_ratio",
                "Jitter ratio must be between 0 and 1",
            ));
        }

        Ok(())
    }
}
