//! Wire/cache types, grounded on `fsManager.go`'s `FileData`/`FileInfo`
//! split (spec.md §3: FileBlob/FileInfo).

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// An immutable snapshot of a file's bytes — the value stored under
/// `bucket:{b}:file:{p}` and produced by a cache-miss object-store read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBlob {
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    pub content_type: String,
    pub modified_at: i64,
}

/// Metadata projection of a `FileBlob`, returned by listing operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub content_type: String,
    pub modified_at: i64,
}

impl FileInfo {
    pub fn from_blob(path: impl Into<String>, blob: &FileBlob) -> Self {
        Self {
            path: path.into(),
            size: blob.content.len() as u64,
            content_type: blob.content_type.clone(),
            modified_at: blob.modified_at,
        }
    }
}

/// One file of a bulk import/export batch (the original's `FileContentsBase`).
#[derive(Debug, Clone)]
pub struct FileContentsBase {
    pub path: String,
    pub content: Vec<u8>,
}

/// Serializes `Vec<u8>` as a base64 string, matching how Go's
/// `encoding/json` marshals a `[]byte` field — not wire-compatible with the
/// original service (this cache format is internal to this repo), just the
/// same "bytes as base64 in JSON" idiom.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_blob_roundtrips_through_json() {
        let blob = FileBlob {
            content: b"hello world".to_vec(),
            content_type: "text/plain".to_owned(),
            modified_at: 1_700_000_000,
        };
        let json = serde_json::to_string(&blob).unwrap();
        let decoded: FileBlob = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.content, blob.content);
        assert_eq!(decoded.content_type, blob.content_type);
    }
}
