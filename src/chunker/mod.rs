//! Chunking collaborator used by the uploader
//!
//! A [`Chunker`] partitions a payload, commits to it with a Merkle data root
//! and hands out each chunk together with its inclusion proof. The uploader
//! only consumes this structure; [`MerkleChunker`] is the reference
//! implementation.

pub mod merkle;

pub use merkle::{validate_path, MerkleChunker, PathBounds};

use crate::error::Result;
use crate::types::{ChunkSubmission, TransactionHeader};

/// Largest chunk the network accepts
pub const MAX_CHUNK_SIZE: usize = 256 * 1024;

/// Smallest trailing chunk before the last two chunks are rebalanced
pub const MIN_CHUNK_SIZE: usize = 32 * 1024;

/// Size of a hash inside an inclusion proof
pub const HASH_SIZE: usize = 32;

/// Size of a byte-offset note inside an inclusion proof
pub const NOTE_SIZE: usize = 32;

/// Derives chunk manifests and inclusion proofs from raw payload bytes
pub trait Chunker: Send + Sync {
    /// Populate `data_root`, `data_size` and the chunk manifest on `header`
    ///
    /// Must be deterministic: identical bytes always produce the identical
    /// data root.
    fn prepare_manifest(&self, header: &mut TransactionHeader, payload: &[u8]) -> Result<()>;

    /// Build the submission for chunk `index`
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is missing, `index` is out of range,
    /// or the payload is shorter than the manifest describes.
    fn chunk_at(
        &self,
        header: &TransactionHeader,
        index: usize,
        payload: &[u8],
    ) -> Result<ChunkSubmission>;

    /// Check that `proof` places the byte at `offset` inside `[left_bound, right_bound)`
    /// under `data_root`
    fn validate_inclusion(
        &self,
        data_root: &[u8],
        offset: u64,
        left_bound: u64,
        right_bound: u64,
        proof: &[u8],
    ) -> bool;
}
