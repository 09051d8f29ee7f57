//! Coordination store client: key-value operations with TTL, atomic
//! create-if-absent, and cursor-paged scan.
//!
//! Connection loss propagates as an error to callers — the core treats
//! coordination unavailability as a degraded read, never panics on it.

mod in_memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
pub use in_memory::InMemoryCoordinationStore;
pub use redis_store::RedisCoordinationStore;

/// A page of scanned keys plus the cursor to continue from, or `None` when
/// the scan is complete. Implementations must never block on a full-namespace
/// enumeration — each call does one SCAN round-trip (or local equivalent).
pub struct ScanPage {
    pub keys: Vec<String>,
    pub cursor: u64,
}

#[async_trait]
pub trait CoordinationStore: Send + Sync + std::fmt::Debug {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;
    async fn del(&self, key: &str) -> anyhow::Result<()>;
    async fn exists(&self, key: &str) -> anyhow::Result<bool>;
    /// Atomic create-if-absent. Returns whether this call created the key.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<bool>;
    /// One page of a cursor-paged scan over keys matching `pattern`
    /// (a Redis-style glob, e.g. `"flush:*"`). Pass cursor `0` to start a
    /// fresh scan; a returned cursor of `0` means the scan is complete.
    async fn scan(&self, pattern: &str, cursor: u64, page_size: u32) -> anyhow::Result<ScanPage>;
}

/// Drains a full scan by repeatedly calling `scan` until the cursor returns
/// to zero. Still never does a single blocking full-namespace call — it's
/// just a convenience wrapper for callers that want all matching keys.
pub async fn scan_all(store: &dyn CoordinationStore, pattern: &str) -> anyhow::Result<Vec<String>> {
    let mut cursor = 0u64;
    let mut keys = Vec::new();
    loop {
        let page = store.scan(pattern, cursor, 100).await?;
        keys.extend(page.keys);
        cursor = page.cursor;
        if cursor == 0 {
            break;
        }
    }
    Ok(keys)
}

pub mod keys {
    //! Key builders for the four coordination-store key families (spec §3).

    pub fn bucket_file(bucket_id: &str, path: &str) -> String {
        format!("bucket:{bucket_id}:file:{path}")
    }

    pub fn bucket_file_prefix(bucket_id: &str) -> String {
        format!("bucket:{bucket_id}:file:")
    }

    pub fn flush(bucket_id: &str, path: &str) -> String {
        format!("flush:{bucket_id}:{path}")
    }

    pub fn lock(bucket_id: &str, path: &str) -> String {
        format!("lock:{bucket_id}:{path}")
    }

    pub fn zip(object_key: &str) -> String {
        format!("zip:{object_key}")
    }

    /// Parses a `flush:{bucket}:{path}` key back into (bucket, path),
    /// reassembling any `:` characters the path itself contained (spec.md
    /// §9 Open Question 4 / §4.4 step 1).
    pub fn parse_flush_key(key: &str) -> Option<(&str, &str)> {
        let rest = key.strip_prefix("flush:")?;
        let (bucket, path) = rest.split_once(':')?;
        Some((bucket, path))
    }

    /// Parses a `zip:{key}` coordination key back into the raw object key.
    pub fn parse_zip_key(key: &str) -> Option<&str> {
        key.strip_prefix("zip:")
    }
}

#[cfg(test)]
mod key_tests {
    use super::keys::*;

    #[test]
    fn flush_key_roundtrip_with_colon_in_path() {
        let key = flush("my-bucket", "src/a:b.ts");
        assert_eq!(parse_flush_key(&key), Some(("my-bucket", "src/a:b.ts")));
    }

    #[test]
    fn zip_key_roundtrip() {
        let key = zip("zips/abc123.zip");
        assert_eq!(parse_zip_key(&key), Some("zips/abc123.zip"));
    }
}
