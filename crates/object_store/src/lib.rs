//! Object store client: put/get/delete/list over a durable blob backend,
//! plus presigned retrieval URLs.

mod local;
mod s3;

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
pub use local::LocalDirObjectStore;
pub use s3::S3ObjectStore;

#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<SystemTime>,
}

#[derive(Debug, Clone)]
pub struct ObjectContent {
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    pub last_modified: Option<SystemTime>,
}

/// Distinguishes "the key doesn't exist" from any other failure, per
/// spec.md §4.2 — callers (the flush sweep especially) need to tell these
/// apart without string-matching an error message.
#[derive(thiserror::Error, Debug)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ObjectStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ObjectStoreError::NotFound(_))
    }
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    async fn get_object(&self, key: &str) -> ObjectStoreResult<ObjectContent>;
    async fn put_object(
        &self,
        key: &str,
        content: Vec<u8>,
        content_type: Option<&str>,
    ) -> ObjectStoreResult<()>;
    async fn delete_object(&self, key: &str) -> ObjectStoreResult<()>;
    async fn list_objects(&self, prefix: &str) -> ObjectStoreResult<Vec<ObjectMeta>>;
    /// A signed URL valid for `ttl`, suitable for anonymous GET retrieval.
    async fn presign(&self, key: &str, ttl: Duration) -> ObjectStoreResult<String>;
}
