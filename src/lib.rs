pub mod chunker;
pub mod error;
pub mod transport;
pub mod types;
pub mod upload;

pub use chunker::{validate_path, Chunker, MerkleChunker, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};

pub use error::{Result, UploadError};

pub use transport::{
    ChunkRejection, Transport, TransportError, TransportErrorKind, TransportResponse,
};

pub use types::{ChunkManifest, ChunkSubmission, Tag, TransactionHeader, TxId};

pub use upload::{
    FixedJitter, JitterSource, PersistedUpload, ThreadRngJitter, TransactionUpload, UploadConfig,
    UploadProgress, UploadSource, UploadState, Uploader,
};
