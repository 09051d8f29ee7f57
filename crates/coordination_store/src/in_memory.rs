use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{CoordinationStore, ScanPage};

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process coordination store fake, grounded on the teacher's
/// `LocalDirStorage` role: a real implementation of the trait, used directly
/// in tests and for single-process local development, with no external
/// service dependency. Expiry is checked lazily on access, not swept.
#[derive(Default)]
pub struct InMemoryCoordinationStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl std::fmt::Debug for InMemoryCoordinationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCoordinationStore").finish()
    }
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(entry: &Entry) -> bool {
        entry.expires_at > Instant::now()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entries = self.entries.lock();
        Ok(entries
            .get(key)
            .filter(|e| Self::live(e))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        self.entries.lock().insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self
            .entries
            .lock()
            .get(key)
            .is_some_and(Self::live))
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(Self::live) {
            return Ok(false);
        }
        entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn scan(&self, pattern: &str, cursor: u64, page_size: u32) -> anyhow::Result<ScanPage> {
        // Patterns used in this workspace are always a literal prefix + `*`.
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let entries = self.entries.lock();
        let mut matching: Vec<&String> = entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && Self::live(e))
            .map(|(k, _)| k)
            .collect();
        matching.sort();
        let start = cursor as usize;
        let end = (start + page_size as usize).min(matching.len());
        let keys = matching[start.min(matching.len())..end]
            .iter()
            .map(|s| (*s).clone())
            .collect();
        let next_cursor = if end >= matching.len() { 0 } else { end as u64 };
        Ok(ScanPage {
            keys,
            cursor: next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn set_nx_is_atomic_create() {
        let store = InMemoryCoordinationStore::new();
        assert!(store.set_nx("lock:a", "1", Duration::from_secs(60)).await.unwrap());
        assert!(!store.set_nx("lock:a", "1", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let store = InMemoryCoordinationStore::new();
        store.set("k", "v", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn scan_pages_through_all_matches() {
        let store = InMemoryCoordinationStore::new();
        for i in 0..5 {
            store
                .set(&format!("flush:b:{i}"), "1", Duration::from_secs(60))
                .await
                .unwrap();
        }
        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let page = store.scan("flush:*", cursor, 2).await.unwrap();
            seen.extend(page.keys);
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(seen.len(), 5);
    }
}
