use std::{
    fs,
    path::PathBuf,
    time::{Duration, SystemTime},
};

use anyhow::Context as _;
use async_trait::async_trait;
use tempfile::TempDir;

use crate::{ObjectContent, ObjectMeta, ObjectStore, ObjectStoreError, ObjectStoreResult};

/// Local-disk object store, grounded on `storage::LocalDirStorage` — a real
/// implementation rather than a mock, backed by a directory tree that
/// mirrors object keys ("/" in a key becomes a subdirectory). Used for local
/// development and in tests in place of S3.
pub struct LocalDirObjectStore {
    dir: PathBuf,
    _temp_dir: Option<TempDir>,
}

impl std::fmt::Debug for LocalDirObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDirObjectStore")
            .field("dir", &self.dir)
            .finish()
    }
}

impl LocalDirObjectStore {
    /// Storage backed by a fresh temporary directory, deleted on drop.
    pub fn new_tempdir() -> anyhow::Result<Self> {
        let temp_dir = TempDir::new()?;
        Ok(Self {
            dir: temp_dir.path().to_owned(),
            _temp_dir: Some(temp_dir),
        })
    }

    pub fn new_at_path(dir: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            _temp_dir: None,
        })
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn content_type_path_for_key(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.content-type"))
    }
}

#[async_trait]
impl ObjectStore for LocalDirObjectStore {
    async fn get_object(&self, key: &str) -> ObjectStoreResult<ObjectContent> {
        let path = self.path_for_key(key);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(key.to_owned()))
            },
            Err(e) => return Err(ObjectStoreError::Other(e.into())),
        };
        let content_type = fs::read_to_string(self.content_type_path_for_key(key)).ok();
        let last_modified = fs::metadata(&path)
            .ok()
            .and_then(|m| m.modified().ok());
        Ok(ObjectContent {
            content,
            content_type,
            last_modified,
        })
    }

    async fn put_object(
        &self,
        key: &str,
        content: Vec<u8>,
        content_type: Option<&str>,
    ) -> ObjectStoreResult<()> {
        let path = self.path_for_key(key);
        fs::create_dir_all(path.parent().expect("object path must have a parent")).context(
            "LocalDirObjectStore file creation failed. Perhaps the object key isn't valid?",
        )?;
        fs::write(&path, content).context(
            "LocalDirObjectStore file creation failed. Perhaps the object key isn't valid?",
        )?;
        let content_type_path = self.content_type_path_for_key(key);
        match content_type {
            Some(content_type) => fs::write(content_type_path, content_type)?,
            None => {
                let _ = fs::remove_file(content_type_path);
            },
        }
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> ObjectStoreResult<()> {
        let path = self.path_for_key(key);
        match fs::remove_file(&path) {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(key.to_owned()))
            },
            Err(e) => return Err(ObjectStoreError::Other(e.into())),
        }
        let _ = fs::remove_file(self.content_type_path_for_key(key));
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> ObjectStoreResult<Vec<ObjectMeta>> {
        let mut objects = Vec::new();
        walk(&self.dir, &self.dir, prefix, &mut objects)
            .map_err(|e| ObjectStoreError::Other(e))?;
        Ok(objects)
    }

    async fn presign(&self, key: &str, _ttl: Duration) -> ObjectStoreResult<String> {
        let path = self.path_for_key(key);
        if !path.exists() {
            return Err(ObjectStoreError::NotFound(key.to_owned()));
        }
        Ok(format!("file://{}", path.display()))
    }
}

fn walk(
    root: &std::path::Path,
    dir: &std::path::Path,
    prefix: &str,
    out: &mut Vec<ObjectMeta>,
) -> anyhow::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, prefix, out)?;
            continue;
        }
        if path.extension().is_some_and(|ext| ext == "content-type") {
            continue;
        }
        let key = path
            .strip_prefix(root)?
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");
        if !key.starts_with(prefix) {
            continue;
        }
        let metadata = entry.metadata()?;
        let content_type =
            fs::read_to_string(root.join(format!("{key}.content-type"))).ok();
        out.push(ObjectMeta {
            key,
            size: metadata.len(),
            content_type,
            last_modified: metadata.modified().ok().map(SystemTime::from),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips_content_and_type() {
        let store = LocalDirObjectStore::new_tempdir().unwrap();
        store
            .put_object("a/b.txt", b"hello".to_vec(), Some("text/plain"))
            .await
            .unwrap();
        let content = store.get_object("a/b.txt").await.unwrap();
        assert_eq!(content.content, b"hello");
        assert_eq!(content.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn get_missing_key_is_not_found() {
        let store = LocalDirObjectStore::new_tempdir().unwrap();
        let err = store.get_object("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_missing_key_is_not_found() {
        let store = LocalDirObjectStore::new_tempdir().unwrap();
        store
            .put_object("a", b"1".to_vec(), None)
            .await
            .unwrap();
        store.delete_object("a").await.unwrap();
        let err = store.delete_object("a").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_objects_filters_by_prefix() {
        let store = LocalDirObjectStore::new_tempdir().unwrap();
        store.put_object("repo/a.txt", b"1".to_vec(), None).await.unwrap();
        store.put_object("repo/dir/b.txt", b"2".to_vec(), None).await.unwrap();
        store.put_object("other/c.txt", b"3".to_vec(), None).await.unwrap();
        let mut keys: Vec<String> = store
            .list_objects("repo/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["repo/a.txt", "repo/dir/b.txt"]);
    }
}
