//! Type-safe wrappers for transaction headers and chunk metadata

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Length of a base64url-encoded 32-byte identifier
const TX_ID_LEN: usize = 43;

/// Encode bytes the way the network expects them on the wire (base64url, unpadded)
pub fn b64_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode a base64url (unpadded) string
pub fn b64_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(data)
}

/// Transaction identifier
///
/// The identifier is the base64url encoding of the hash of the transaction
/// signature and is only known once the transaction has been signed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    /// Wrap `id` as-is; use `from_str()` to check the format
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Returns the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the ID and returns the inner String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl FromStr for TxId {
    type Err = TxIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != TX_ID_LEN {
            return Err(TxIdError::InvalidLength(s.len()));
        }

        if !s
            .chars()
            .all(|c| matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_'))
        {
            return Err(TxIdError::InvalidEncoding(
                "Invalid base64url encoding".into(),
            ));
        }

        Ok(TxId(s.to_string()))
    }
}

impl Display for TxId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TxId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<TxId> for String {
    fn from(id: TxId) -> Self {
        id.0
    }
}

/// A name/value tag attached to a transaction, base64url-encoded on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    /// Create a tag from plain-text name and value
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: b64_encode(name.as_bytes()),
            value: b64_encode(value.as_bytes()),
        }
    }

    /// Decode the tag back to plain text
    pub fn decode(&self) -> Result<(String, String), TagError> {
        let name = b64_decode(&self.name).map_err(|e| TagError(e.to_string()))?;
        let value = b64_decode(&self.value).map_err(|e| TagError(e.to_string()))?;
        Ok((
            String::from_utf8_lossy(&name).into_owned(),
            String::from_utf8_lossy(&value).into_owned(),
        ))
    }
}

/// Byte range and hash of one chunk of the payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub data_hash: [u8; 32],
    pub min_byte_range: u64,
    pub max_byte_range: u64,
}

impl ChunkDescriptor {
    pub fn len(&self) -> u64 {
        self.max_byte_range - self.min_byte_range
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Merkle inclusion proof for one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkProof {
    /// Last byte offset covered by the chunk
    pub offset: u64,
    pub proof: Vec<u8>,
}

/// The partitioning of a payload, its Merkle root and per-chunk proofs
///
/// `chunks` and `proofs` are index-aligned.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkManifest {
    pub data_root: Vec<u8>,
    pub chunks: Vec<ChunkDescriptor>,
    pub proofs: Vec<ChunkProof>,
}

impl ChunkManifest {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Signed transaction header
///
/// Everything except `data` and the local chunk manifest is covered by the
/// signature and must not be changed once `id` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHeader {
    pub format: u8,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub last_tx: String,
    pub owner: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub quantity: String,
    /// Inline payload, base64url-encoded; empty unless posted in-body
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub data_size: String,
    #[serde(default)]
    pub data_root: String,
    #[serde(default)]
    pub reward: String,
    #[serde(default)]
    pub signature: String,
    /// Local chunk manifest; never serialized, recomputed from the payload
    #[serde(skip)]
    pub chunks: Option<ChunkManifest>,
}

impl Default for TransactionHeader {
    fn default() -> Self {
        Self {
            format: 2,
            id: String::new(),
            last_tx: String::new(),
            owner: String::new(),
            tags: Vec::new(),
            target: String::new(),
            quantity: "0".into(),
            data: String::new(),
            data_size: "0".into(),
            data_root: String::new(),
            reward: "0".into(),
            signature: String::new(),
            chunks: None,
        }
    }
}

impl TransactionHeader {
    /// A header is signed once it has an identifier
    pub fn is_signed(&self) -> bool {
        !self.id.is_empty()
    }

    /// Number of chunks in the manifest, or 0 when not prepared
    pub fn chunk_count(&self) -> usize {
        self.chunks.as_ref().map(ChunkManifest::len).unwrap_or(0)
    }

    /// Copy of the header with the inline payload cleared
    pub fn without_data(&self) -> Self {
        Self {
            data: String::new(),
            ..self.clone()
        }
    }

    /// Copy of the header carrying `payload` inline
    pub fn with_inline_data(&self, payload: &[u8]) -> Self {
        Self {
            data: b64_encode(payload),
            ..self.clone()
        }
    }
}

/// Request body for submitting a single chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSubmission {
    pub data_root: String,
    pub data_size: String,
    pub data_path: String,
    pub offset: String,
    pub chunk: String,
}

// Error types

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxIdError {
    InvalidLength(usize),
    InvalidEncoding(String),
}

impl fmt::Display for TxIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TxIdError::InvalidLength(len) => write!(
                f,
                "Invalid transaction ID length: expected {}, got {}",
                TX_ID_LEN, len
            ),
            TxIdError::InvalidEncoding(msg) => {
                write!(f, "Invalid transaction ID encoding: {}", msg)
            }
        }
    }
}

impl std::error::Error for TxIdError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagError(String);

impl fmt::Display for TagError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid tag encoding: {}", self.0)
    }
}

impl std::error::Error for TagError {}
