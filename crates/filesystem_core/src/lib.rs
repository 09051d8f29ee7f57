//! The FileSystemManager: a write-behind cache over a durable object store,
//! mediated by a coordination (KV+TTL) store. Grounded on
//! `original_source/apps/code-bucket/pkg/fs/{fsManager,routines,options}.go`.
//!
//! Background sweeps and bulk operations are split into a plain-data `Core`
//! (coordination + object-store clients, no task handles) so they can be
//! cloned as an `Arc<Core>` into spawned tasks and queue jobs without
//! dragging the semaphore or background-task bookkeeping along.

pub mod model;
mod options;
mod routines;
mod zip;

use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use coordination_store::{keys, scan_all, CoordinationStore};
use errors_fs::{FsError, FsResult};
use futures::FutureExt;
use job_queue::BlockingJobQueue;
pub use model::{FileBlob, FileContentsBase, FileInfo, DEFAULT_CONTENT_TYPE};
use object_store::ObjectStore;
pub use options::FileSystemManagerOptions;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

pub const FLUSH_DELAY: Duration = Duration::from_secs(5 * 60);
pub const FLUSH_SWEEP: Duration = Duration::from_secs(60);
pub const CLEANUP_SWEEP: Duration = Duration::from_secs(10 * 60);
pub const ZIP_TTL: Duration = Duration::from_secs(3 * 24 * 60 * 60);
pub const MAX_CACHE_SIZE: u64 = 1024 * 1024;
pub const IMPORT_PARALLELISM: usize = 15;
const FLUSH_POOL_WIDTH: usize = 10;
const LOCK_TTL: Duration = Duration::from_secs(5 * 60);
/// `fsManager.go`'s `GetBucketFilesAsZip` presigns for 5 days even though
/// `ZIP_TTL` (the coordination-store bookkeeping window) is 3 — the
/// download link is allowed to outlive the cleanup sweep's own tracking.
const ZIP_PRESIGN_TTL: Duration = Duration::from_secs(5 * 24 * 60 * 60);

pub(crate) fn object_key(bucket_id: &str, path: &str) -> String {
    format!("{bucket_id}/{path}")
}

pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn systemtime_to_unix(t: Option<SystemTime>) -> i64 {
    t.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or_else(now_unix)
}

fn validate_bucket_and_path(bucket_id: &str, path: &str) -> FsResult<()> {
    if bucket_id.is_empty() {
        return Err(FsError::invalid_argument("bucket id must not be empty"));
    }
    if path.is_empty() {
        return Err(FsError::invalid_argument("path must not be empty"));
    }
    Ok(())
}

/// A lazily-pulled source of `(path, content)` pairs, implemented over
/// `archive_reader`'s archive iterator at the call site (spec.md §4.5) —
/// kept as a trait here so the core doesn't depend on the archive format.
#[async_trait]
pub trait ArchiveSource: Send {
    async fn next_file(&mut self) -> anyhow::Result<Option<(String, Vec<u8>)>>;
}

pub(crate) struct Core {
    pub(crate) coordination: Arc<dyn CoordinationStore>,
    pub(crate) objects: Arc<dyn ObjectStore>,
}

impl Core {
    async fn get_file(&self, bucket_id: &str, path: &str) -> FsResult<(FileInfo, FileBlob)> {
        validate_bucket_and_path(bucket_id, path)?;
        let cache_key = keys::bucket_file(bucket_id, path);

        if let Ok(Some(json)) = self.coordination.get(&cache_key).await {
            if let Ok(blob) = serde_json::from_str::<FileBlob>(&json) {
                let info = FileInfo::from_blob(path, &blob);
                return Ok((info, blob));
            }
        }

        let key = object_key(bucket_id, path);
        let content = match self.objects.get_object(&key).await {
            Ok(content) => content,
            Err(err) if err.is_not_found() => {
                return Err(FsError::not_found(format!("file not found: {bucket_id}/{path}")))
            },
            Err(err) => return Err(FsError::internal(err)),
        };

        let blob = FileBlob {
            content_type: content
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned()),
            modified_at: systemtime_to_unix(content.last_modified),
            content: content.content,
        };

        if blob.content.len() as u64 <= MAX_CACHE_SIZE {
            if let Ok(json) = serde_json::to_string(&blob) {
                // Failure to warm the cache is non-fatal (spec.md §4.4 GetFile step 3).
                let _ = self.coordination.set(&cache_key, &json, FLUSH_DELAY * 2).await;
            }
        }

        let info = FileInfo::from_blob(path, &blob);
        Ok((info, blob))
    }

    async fn put_file(
        &self,
        bucket_id: &str,
        path: &str,
        content: Vec<u8>,
        content_type: Option<String>,
    ) -> FsResult<()> {
        validate_bucket_and_path(bucket_id, path)?;
        let content_type = content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned());

        if content.len() as u64 > MAX_CACHE_SIZE {
            let key = object_key(bucket_id, path);
            self.objects
                .put_object(&key, content, Some(&content_type))
                .await
                .map_err(FsError::internal)?;
            return Ok(());
        }

        let blob = FileBlob {
            content,
            content_type,
            modified_at: now_unix(),
        };
        let json = serde_json::to_string(&blob).map_err(FsError::internal)?;
        let cache_key = keys::bucket_file(bucket_id, path);
        self.coordination
            .set(&cache_key, &json, FLUSH_DELAY * 2)
            .await
            .map_err(FsError::internal)?;

        let flush_key = keys::flush(bucket_id, path);
        self.coordination
            .set(&flush_key, &now_unix().to_string(), FLUSH_DELAY * 2)
            .await
            .map_err(FsError::internal)?;

        Ok(())
    }

    async fn delete_file(&self, bucket_id: &str, path: &str) -> FsResult<()> {
        validate_bucket_and_path(bucket_id, path)?;
        let cache_key = keys::bucket_file(bucket_id, path);
        if self.coordination.exists(&cache_key).await.unwrap_or(false) {
            let _ = self.coordination.del(&cache_key).await;
        }

        let key = object_key(bucket_id, path);
        match self.objects.delete_object(&key).await {
            Ok(()) => Ok(()),
            // Open Question 1 (spec.md §9): the original returns the
            // object-store error verbatim and both transports map it to a
            // not-found response (spec.md §6's "404 if the path does not
            // exist"), so NotFound propagates rather than being swallowed.
            Err(err) if err.is_not_found() => {
                Err(FsError::not_found(format!("file not found: {bucket_id}/{path}")))
            },
            Err(err) => Err(FsError::internal(err)),
        }
    }

    async fn list_files(&self, bucket_id: &str, prefix: &str) -> FsResult<Vec<FileInfo>> {
        if bucket_id.is_empty() {
            return Err(FsError::invalid_argument("bucket id must not be empty"));
        }

        let mut seen = HashSet::new();
        let mut files = Vec::new();

        let cache_prefix = keys::bucket_file_prefix(bucket_id);
        let pattern = format!("{cache_prefix}*");
        if let Ok(cache_keys) = scan_all(self.coordination.as_ref(), &pattern).await {
            for key in cache_keys {
                let Some(file_path) = key.strip_prefix(&cache_prefix) else {
                    continue;
                };
                if !prefix.is_empty() && !file_path.starts_with(prefix) {
                    continue;
                }
                let Ok(Some(json)) = self.coordination.get(&key).await else {
                    continue;
                };
                let Ok(blob) = serde_json::from_str::<FileBlob>(&json) else {
                    continue;
                };
                files.push(FileInfo::from_blob(file_path, &blob));
                seen.insert(file_path.to_owned());
            }
        }

        let bucket_object_prefix = format!("{bucket_id}/");
        let object_prefix = format!("{bucket_object_prefix}{prefix}");
        if let Ok(objects) = self.objects.list_objects(&object_prefix).await {
            for object in objects {
                let Some(file_path) = object.key.strip_prefix(&bucket_object_prefix) else {
                    continue;
                };
                if seen.contains(file_path) {
                    continue;
                }
                files.push(FileInfo {
                    path: file_path.to_owned(),
                    size: object.size,
                    content_type: object
                        .content_type
                        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned()),
                    modified_at: systemtime_to_unix(object.last_modified),
                });
            }
        }

        Ok(files)
    }

    async fn flush_file_to_object_store(&self, bucket_id: &str, path: &str) -> FsResult<()> {
        let cache_key = keys::bucket_file(bucket_id, path);
        let Some(json) = self.coordination.get(&cache_key).await.map_err(FsError::internal)? else {
            return Ok(());
        };
        let blob: FileBlob = serde_json::from_str(&json).map_err(FsError::internal)?;
        let key = object_key(bucket_id, path);
        self.objects
            .put_object(&key, blob.content, Some(&blob.content_type))
            .await
            .map_err(FsError::internal)?;
        Ok(())
    }
}

/// Owning handle for the file store core: the data-path `Core`, the
/// process-wide import semaphore, and the two background sweep tasks.
/// Constructed explicitly via `start`; no hidden singleton (spec.md §9
/// "Global-ish state").
pub struct FileSystemManager {
    core: Arc<Core>,
    import_semaphore: Arc<Semaphore>,
    cancellation: CancellationToken,
    flush_task: tokio::task::JoinHandle<()>,
    cleanup_task: tokio::task::JoinHandle<()>,
}

impl FileSystemManager {
    pub fn start(options: FileSystemManagerOptions) -> Self {
        let core = Arc::new(Core {
            coordination: options.coordination,
            objects: options.objects,
        });
        let cancellation = CancellationToken::new();

        let flush_task = tokio::spawn(routines::run_flush_sweep(core.clone(), cancellation.clone()));
        let cleanup_task = tokio::spawn(routines::run_cleanup_sweep(core.clone(), cancellation.clone()));

        Self {
            core,
            import_semaphore: Arc::new(Semaphore::new(IMPORT_PARALLELISM)),
            cancellation,
            flush_task,
            cleanup_task,
        }
    }

    pub async fn get_file(&self, bucket_id: &str, path: &str) -> FsResult<(FileInfo, FileBlob)> {
        self.core.get_file(bucket_id, path).await
    }

    pub async fn put_file(
        &self,
        bucket_id: &str,
        path: &str,
        content: Vec<u8>,
        content_type: Option<String>,
    ) -> FsResult<()> {
        self.core.put_file(bucket_id, path, content, content_type).await
    }

    pub async fn delete_file(&self, bucket_id: &str, path: &str) -> FsResult<()> {
        self.core.delete_file(bucket_id, path).await
    }

    pub async fn list_files(&self, bucket_id: &str, prefix: &str) -> FsResult<Vec<FileInfo>> {
        self.core.list_files(bucket_id, prefix).await
    }

    /// Puts every entry through a fresh `IMPORT_PARALLELISM`-wide queue,
    /// returning the first error seen (spec.md §4.4 BulkSet).
    pub async fn bulk_set(&self, bucket_id: &str, contents: Vec<FileContentsBase>) -> FsResult<()> {
        let queue = BlockingJobQueue::new(IMPORT_PARALLELISM);
        for file in contents {
            let core = self.core.clone();
            let bucket_id = bucket_id.to_owned();
            queue
                .add_and_block_if_full(
                    async move {
                        core.put_file(&bucket_id, &file.path, file.content, None)
                            .await
                            .map_err(anyhow::Error::from)
                    }
                    .boxed(),
                )
                .await;
        }
        queue.wait().await.map_err(FsError::internal)
    }

    /// Copies every file from `source_bucket` into `dest_bucket`, gated by
    /// the process-wide import semaphore. NotFound mid-copy is skipped
    /// silently (spec.md §4.4 Clone / §9 Open Question 2); other errors are
    /// captured and returned after the queue drains.
    pub async fn clone_bucket(
        &self,
        source_bucket: &str,
        dest_bucket: &str,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let _permit = self.acquire_import_permit(cancel).await?;

        let files = self.core.list_files(source_bucket, "").await?;
        let queue = BlockingJobQueue::new(IMPORT_PARALLELISM);
        for file in files {
            let core = self.core.clone();
            let source_bucket = source_bucket.to_owned();
            let dest_bucket = dest_bucket.to_owned();
            queue
                .add_and_block_if_full(
                    async move {
                        match core.get_file(&source_bucket, &file.path).await {
                            Ok((info, blob)) => core
                                .put_file(&dest_bucket, &file.path, blob.content, Some(info.content_type))
                                .await
                                .map_err(anyhow::Error::from),
                            Err(err) if err.is_not_found() => Ok(()),
                            Err(err) => Err(err.into()),
                        }
                    }
                    .boxed(),
                )
                .await;
        }
        queue.wait().await.map_err(FsError::internal)
    }

    /// Pulls files from `source` and Puts each as `application/octet-stream`
    /// into `dest_bucket`, gated by the same import semaphore as `clone_bucket`
    /// (spec.md §4.4 ImportArchive).
    pub async fn import_archive(
        &self,
        dest_bucket: &str,
        mut source: Box<dyn ArchiveSource>,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let _permit = self.acquire_import_permit(cancel).await?;

        let queue = BlockingJobQueue::new(IMPORT_PARALLELISM);
        while let Some((path, content)) = source.next_file().await.map_err(FsError::internal)? {
            let core = self.core.clone();
            let dest_bucket = dest_bucket.to_owned();
            queue
                .add_and_block_if_full(
                    async move {
                        core.put_file(&dest_bucket, &path, content, None)
                            .await
                            .map_err(anyhow::Error::from)
                    }
                    .boxed(),
                )
                .await;
        }
        queue.wait().await.map_err(FsError::internal)
    }

    /// Materializes a content-addressed ZIP of every file under `prefix`
    /// and returns a presigned download URL plus its expiry (spec.md §4.4
    /// ZipOf). Per-file read failures are skipped; the archive reflects
    /// whatever succeeded.
    pub async fn zip_of(&self, bucket_id: &str, prefix: &str) -> FsResult<(String, i64)> {
        let files = self.core.list_files(bucket_id, prefix).await?;
        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            if let Ok((_, blob)) = self.core.get_file(bucket_id, &file.path).await {
                entries.push((file.path, blob.content));
            }
        }

        let materialized = zip::build_zip(entries).await.map_err(FsError::internal)?;
        let object_key = format!("zips/{}.zip", materialized.sha256_hex);
        self.core
            .objects
            .put_object(&object_key, materialized.content, Some("application/zip"))
            .await
            .map_err(FsError::internal)?;

        let url = self
            .core
            .objects
            .presign(&object_key, ZIP_PRESIGN_TTL)
            .await
            .map_err(FsError::internal)?;

        let zip_key = keys::zip(&object_key);
        // Best-effort: a missed cleanup-bookkeeping write just means this
        // zip survives until the next identical request refreshes it.
        let _ = self
            .core
            .coordination
            .set(&zip_key, &now_unix().to_string(), ZIP_TTL * 2)
            .await;

        let expires_at = now_unix() + ZIP_PRESIGN_TTL.as_secs() as i64;
        Ok((url, expires_at))
    }

    async fn acquire_import_permit(&self, cancel: &CancellationToken) -> FsResult<OwnedSemaphorePermit> {
        if cancel.is_cancelled() {
            return Err(FsError::canceled("import canceled"));
        }
        tokio::select! {
            permit = self.import_semaphore.clone().acquire_owned() => {
                permit.map_err(FsError::internal)
            },
            _ = cancel.cancelled() => Err(FsError::canceled("import canceled")),
        }
    }

    /// Flushes every pending write synchronously, then stops the background
    /// sweepers — mirrors `Close()`'s "flush, then stop" order.
    pub async fn shutdown(self) {
        routines::flush_sweep_once(&self.core).await;
        self.cancellation.cancel();
        let _ = self.flush_task.await;
        let _ = self.cleanup_task.await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use coordination_store::InMemoryCoordinationStore;
    use object_store::LocalDirObjectStore;

    use super::*;

    fn test_manager() -> FileSystemManager {
        let coordination: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let objects: Arc<dyn ObjectStore> = Arc::new(LocalDirObjectStore::new_tempdir().unwrap());
        FileSystemManager::start(FileSystemManagerOptions::new(coordination, objects))
    }

    #[tokio::test]
    async fn put_then_get_small_file_roundtrips() {
        let fsm = test_manager();
        fsm.put_file("b", "a.txt", b"hi".to_vec(), Some("text/plain".to_owned()))
            .await
            .unwrap();
        let (info, blob) = fsm.get_file("b", "a.txt").await.unwrap();
        assert_eq!(blob.content, b"hi");
        assert_eq!(blob.content_type, "text/plain");
        assert_eq!(info.size, 2);
    }

    #[tokio::test]
    async fn put_large_file_bypasses_cache() {
        let fsm = test_manager();
        let content = vec![7u8; (MAX_CACHE_SIZE + 1) as usize];
        fsm.put_file("b", "big.bin", content.clone(), None).await.unwrap();

        let cache_key = coordination_store::keys::bucket_file("b", "big.bin");
        assert!(fsm.core.coordination.get(&cache_key).await.unwrap().is_none());

        let (_, blob) = fsm.get_file("b", "big.bin").await.unwrap();
        assert_eq!(blob.content, content);
    }

    #[tokio::test]
    async fn get_missing_file_is_not_found() {
        let fsm = test_manager();
        let err = fsm.get_file("b", "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_missing_file_is_not_found() {
        let fsm = test_manager();
        let err = fsm.delete_file("b", "never-existed").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_files_unions_cache_and_object_store_without_duplicates() {
        let fsm = test_manager();
        fsm.put_file("b", "small.txt", b"x".to_vec(), None).await.unwrap();
        let big = vec![1u8; (MAX_CACHE_SIZE + 1) as usize];
        fsm.put_file("b", "big.bin", big, None).await.unwrap();

        let mut paths: Vec<String> = fsm
            .list_files("b", "")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["big.bin", "small.txt"]);
    }

    #[tokio::test]
    async fn bulk_set_writes_every_entry() {
        let fsm = test_manager();
        let contents = vec![
            FileContentsBase { path: "a".to_owned(), content: b"1".to_vec() },
            FileContentsBase { path: "b".to_owned(), content: b"2".to_vec() },
            FileContentsBase { path: "c".to_owned(), content: b"3".to_vec() },
        ];
        fsm.bulk_set("b2", contents).await.unwrap();
        assert_eq!(fsm.list_files("b2", "").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn clone_bucket_copies_all_files() {
        let fsm = test_manager();
        fsm.put_file("src", "a.txt", b"hello".to_vec(), Some("text/plain".to_owned()))
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        fsm.clone_bucket("src", "dst", &cancel).await.unwrap();
        let (_, blob) = fsm.get_file("dst", "a.txt").await.unwrap();
        assert_eq!(blob.content, b"hello");
    }

    #[tokio::test]
    async fn clone_bucket_honors_cancellation() {
        let fsm = test_manager();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fsm.clone_bucket("src", "dst", &cancel).await.unwrap_err();
        assert!(matches!(err.kind, errors_fs::ErrorKind::Canceled));
    }

    #[tokio::test]
    async fn zip_of_is_deterministic_for_identical_contents() {
        let fsm = test_manager();
        fsm.put_file("b", "a.txt", b"hello".to_vec(), None).await.unwrap();
        let (url1, _) = fsm.zip_of("b", "").await.unwrap();
        let (url2, _) = fsm.zip_of("b", "").await.unwrap();
        assert_eq!(url1, url2);
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_writes() {
        let fsm = test_manager();
        fsm.put_file("b", "a.txt", b"hi".to_vec(), None).await.unwrap();
        fsm.shutdown().await;
    }
}
