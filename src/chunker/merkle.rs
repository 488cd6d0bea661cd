//! Merkle chunking with per-chunk inclusion proofs.
//!
//! The payload is cut into fixed-size chunks, each chunk becomes a leaf
//! committing to its hash and the end of its byte range, and branches commit
//! to both children plus the byte offset where the left child ends. A proof
//! is the list of branches from the root down to one leaf, so a verifier can
//! walk it by comparing the target offset with each split point.
//!
//! # Proof layout
//!
//! ```text
//! branch: left_id (32) | right_id (32) | split offset note (32)
//! ...
//! leaf:   data_hash (32) | max byte range note (32)
//! ```

use super::{Chunker, HASH_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, NOTE_SIZE};
use crate::error::{Result, UploadError};
use crate::types::{
    b64_encode, ChunkDescriptor, ChunkManifest, ChunkProof, ChunkSubmission, TransactionHeader,
};
use sha2::{Digest, Sha256};

/// Reference [`Chunker`] producing SHA-256 Merkle manifests.
#[derive(Debug, Clone)]
pub struct MerkleChunker {
    max_chunk_size: usize,
    min_chunk_size: usize,
}

/// Byte range a validated proof resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathBounds {
    pub offset: u64,
    pub left_bound: u64,
    pub right_bound: u64,
}

impl PathBounds {
    pub fn chunk_size(&self) -> u64 {
        self.right_bound - self.left_bound
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        id: [u8; 32],
        data_hash: [u8; 32],
        max_byte_range: u64,
    },
    Branch {
        id: [u8; 32],
        byte_range: u64,
        max_byte_range: u64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn id(&self) -> &[u8; 32] {
        match self {
            Node::Leaf { id, .. } | Node::Branch { id, .. } => id,
        }
    }

    fn max_byte_range(&self) -> u64 {
        match self {
            Node::Leaf { max_byte_range, .. } | Node::Branch { max_byte_range, .. } => {
                *max_byte_range
            }
        }
    }
}

impl Default for MerkleChunker {
    fn default() -> Self {
        Self {
            max_chunk_size: MAX_CHUNK_SIZE,
            min_chunk_size: MIN_CHUNK_SIZE,
        }
    }
}

impl MerkleChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use non-standard chunk sizes.
    ///
    /// Manifests built this way are only accepted by networks configured
    /// with the same sizes; mostly useful to keep test payloads small.
    pub fn with_chunk_sizes(max_chunk_size: usize, min_chunk_size: usize) -> Result<Self> {
        if max_chunk_size == 0 {
            return Err(UploadError::invalid_parameter(
                "max_chunk_size",
                "Chunk size must be greater than 0",
            ));
        }
        if min_chunk_size > max_chunk_size {
            return Err(UploadError::invalid_parameter(
                "min_chunk_size",
                "Minimum chunk size cannot exceed the maximum",
            ));
        }
        Ok(Self {
            max_chunk_size,
            min_chunk_size,
        })
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Split `data` into chunk descriptors.
    ///
    /// A trailing piece smaller than the minimum chunk size is avoided by
    /// splitting the last two pieces evenly. When the payload is an exact
    /// multiple of the chunk size the final descriptor is empty; it takes
    /// part in the tree but is dropped from the manifest.
    pub fn chunk_data(&self, data: &[u8]) -> Vec<ChunkDescriptor> {
        let mut chunks = Vec::with_capacity(data.len() / self.max_chunk_size + 1);
        let mut rest = data;
        let mut cursor = 0u64;

        while rest.len() >= self.max_chunk_size {
            let mut chunk_size = self.max_chunk_size;
            let next_size = rest.len() - self.max_chunk_size;
            if next_size > 0 && next_size < self.min_chunk_size {
                chunk_size = rest.len().div_ceil(2);
            }

            let (chunk, tail) = rest.split_at(chunk_size);
            chunks.push(ChunkDescriptor {
                data_hash: sha256(&[chunk]),
                min_byte_range: cursor,
                max_byte_range: cursor + chunk.len() as u64,
            });
            cursor += chunk.len() as u64;
            rest = tail;
        }

        chunks.push(ChunkDescriptor {
            data_hash: sha256(&[rest]),
            min_byte_range: cursor,
            max_byte_range: cursor + rest.len() as u64,
        });
        chunks
    }

    /// Build the full manifest for `data`.
    pub fn build_manifest(&self, data: &[u8]) -> ChunkManifest {
        if data.is_empty() {
            return ChunkManifest::default();
        }

        let mut chunks = self.chunk_data(data);
        let leaves = chunks.iter().map(leaf).collect::<Vec<_>>();
        let Some(root) = build_layers(leaves) else {
            return ChunkManifest::default();
        };

        let mut proofs = Vec::with_capacity(chunks.len());
        collect_proofs(&root, Vec::new(), &mut proofs);

        if chunks.last().is_some_and(ChunkDescriptor::is_empty) {
            chunks.pop();
            proofs.pop();
        }

        ChunkManifest {
            data_root: root.id().to_vec(),
            chunks,
            proofs,
        }
    }
}

impl Chunker for MerkleChunker {
    fn prepare_manifest(&self, header: &mut TransactionHeader, payload: &[u8]) -> Result<()> {
        let manifest = self.build_manifest(payload);
        header.data_size = payload.len().to_string();
        header.data_root = if manifest.data_root.is_empty() {
            String::new()
        } else {
            b64_encode(&manifest.data_root)
        };
        header.chunks = Some(manifest);
        Ok(())
    }

    fn chunk_at(
        &self,
        header: &TransactionHeader,
        index: usize,
        payload: &[u8],
    ) -> Result<ChunkSubmission> {
        let manifest = header
            .chunks
            .as_ref()
            .ok_or_else(|| UploadError::chunk_validation(index, "Chunks have not been prepared"))?;

        let (chunk, proof) = manifest
            .chunks
            .get(index)
            .zip(manifest.proofs.get(index))
            .ok_or_else(|| {
                UploadError::chunk_validation(
                    index,
                    format!("Chunk index out of range (total {})", manifest.len()),
                )
            })?;

        let data = payload
            .get(chunk.min_byte_range as usize..chunk.max_byte_range as usize)
            .ok_or_else(|| {
                UploadError::chunk_validation(
                    index,
                    format!(
                        "Payload of {} bytes does not cover range {}..{}",
                        payload.len(),
                        chunk.min_byte_range,
                        chunk.max_byte_range
                    ),
                )
            })?;

        Ok(ChunkSubmission {
            data_root: header.data_root.clone(),
            data_size: header.data_size.clone(),
            data_path: b64_encode(&proof.proof),
            offset: proof.offset.to_string(),
            chunk: b64_encode(data),
        })
    }

    fn validate_inclusion(
        &self,
        data_root: &[u8],
        offset: u64,
        left_bound: u64,
        right_bound: u64,
        proof: &[u8],
    ) -> bool {
        validate_path(data_root, offset, left_bound, right_bound, proof).is_some()
    }
}

/// Walk `path` from `root` towards the leaf covering byte `dest`.
///
/// Returns the bounds of the chunk the proof ends in, or `None` when any
/// hash along the way does not match.
pub fn validate_path(
    root: &[u8],
    dest: u64,
    left_bound: u64,
    right_bound: u64,
    path: &[u8],
) -> Option<PathBounds> {
    if right_bound == 0 {
        return None;
    }

    let dest = dest.min(right_bound - 1);
    let mut id = root;
    let mut left_bound = left_bound;
    let mut right_bound = right_bound;
    let mut path = path;

    loop {
        if path.len() == HASH_SIZE + NOTE_SIZE {
            let (data_hash, end_note) = path.split_at(HASH_SIZE);
            let leaf_id = sha256(&[&sha256(&[data_hash]), &sha256(&[end_note])]);
            return (leaf_id.as_slice() == id).then(|| PathBounds {
                offset: right_bound - 1,
                left_bound,
                right_bound,
            });
        }

        if path.len() < 2 * HASH_SIZE + NOTE_SIZE {
            return None;
        }

        let (left_id, rest) = path.split_at(HASH_SIZE);
        let (right_id, rest) = rest.split_at(HASH_SIZE);
        let (split_note, rest) = rest.split_at(NOTE_SIZE);

        let branch_id = sha256(&[
            &sha256(&[left_id]),
            &sha256(&[right_id]),
            &sha256(&[split_note]),
        ]);
        if branch_id.as_slice() != id {
            return None;
        }

        let split = note_to_int(split_note)?;
        if dest < split {
            id = left_id;
            right_bound = right_bound.min(split);
        } else {
            id = right_id;
            left_bound = left_bound.max(split);
        }
        path = rest;
    }
}

fn leaf(chunk: &ChunkDescriptor) -> Node {
    let id = sha256(&[
        &sha256(&[&chunk.data_hash]),
        &sha256(&[&int_to_note(chunk.max_byte_range)]),
    ]);
    Node::Leaf {
        id,
        data_hash: chunk.data_hash,
        max_byte_range: chunk.max_byte_range,
    }
}

fn branch(left: Node, right: Node) -> Node {
    let byte_range = left.max_byte_range();
    let id = sha256(&[
        &sha256(&[left.id()]),
        &sha256(&[right.id()]),
        &sha256(&[&int_to_note(byte_range)]),
    ]);
    Node::Branch {
        id,
        byte_range,
        max_byte_range: right.max_byte_range(),
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn build_layers(mut nodes: Vec<Node>) -> Option<Node> {
    while nodes.len() > 1 {
        let mut next = Vec::with_capacity(nodes.len().div_ceil(2));
        let mut iter = nodes.into_iter();
        while let Some(left) = iter.next() {
            match iter.next() {
                Some(right) => next.push(branch(left, right)),
                // odd node is promoted as-is
                None => next.push(left),
            }
        }
        nodes = next;
    }
    nodes.pop()
}

fn collect_proofs(node: &Node, prefix: Vec<u8>, proofs: &mut Vec<ChunkProof>) {
    match node {
        Node::Leaf {
            data_hash,
            max_byte_range,
            ..
        } => {
            let mut proof = prefix;
            proof.extend_from_slice(data_hash);
            proof.extend_from_slice(&int_to_note(*max_byte_range));
            proofs.push(ChunkProof {
                offset: max_byte_range.saturating_sub(1),
                proof,
            });
        }
        Node::Branch {
            byte_range,
            left,
            right,
            ..
        } => {
            let mut partial = prefix;
            partial.extend_from_slice(left.id());
            partial.extend_from_slice(right.id());
            partial.extend_from_slice(&int_to_note(*byte_range));
            collect_proofs(left, partial.clone(), proofs);
            collect_proofs(right, partial, proofs);
        }
    }
}

fn sha256<T: AsRef<[u8]>>(parts: &[T]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref());
    }
    hasher.finalize().into()
}

/// Big-endian 32-byte encoding of an offset.
fn int_to_note(value: u64) -> [u8; NOTE_SIZE] {
    let mut note = [0u8; NOTE_SIZE];
    note[NOTE_SIZE - 8..].copy_from_slice(&value.to_be_bytes());
    note
}

fn note_to_int(note: &[u8]) -> Option<u64> {
    let (high, low) = note.split_at(NOTE_SIZE - 8);
    if high.iter().any(|b| *b != 0) {
        return None;
    }
    Some(u64::from_be_bytes(low.try_into().ok()?))
}
