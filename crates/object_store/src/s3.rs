use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::{
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};

use crate::{ObjectContent, ObjectMeta, ObjectStore, ObjectStoreError, ObjectStoreResult};

/// S3-backed object store, grounded on `aws_s3::storage::S3Storage`'s
/// client-construction and presigning idiom, narrowed to whole-blob
/// put/get/delete/list — the FileSystemManager never streams a blob through
/// the cache (spec.md §1 Non-goals), so there's no multipart/part-size
/// machinery here.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl S3ObjectStore {
    pub async fn new(bucket: String, endpoint: Option<String>) -> anyhow::Result<Self> {
        let mut loader = aws_config::from_env();
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        let client = Client::new(&config);
        Ok(Self { client, bucket })
    }

    pub fn from_client(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, key: &str) -> ObjectStoreResult<ObjectContent> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;
        let output = match result {
            Ok(output) => output,
            Err(err) => {
                if is_not_found(&err) {
                    return Err(ObjectStoreError::NotFound(key.to_owned()));
                }
                return Err(ObjectStoreError::Other(err.into()));
            },
        };
        let content_type = output.content_type.clone();
        let last_modified = output
            .last_modified
            .and_then(|t| t.try_into().ok());
        let content = output
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Other(e.into()))?
            .to_vec();
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
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(content));
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }
        request
            .send()
            .await
            .map_err(|e| ObjectStoreError::Other(e.into()))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> ObjectStoreResult<()> {
        // S3's DeleteObject doesn't error on a missing key, but
        // DeleteFile's NotFound (spec.md §9 Open Question 1, §6 "404 if
        // the path does not exist") needs a real signal, so check first.
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;
        if let Err(err) = head {
            if is_not_found(&err) {
                return Err(ObjectStoreError::NotFound(key.to_owned()));
            }
            return Err(ObjectStoreError::Other(err.into()));
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Other(e.into()))?;
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> ObjectStoreResult<Vec<ObjectMeta>> {
        let mut objects = Vec::new();
        let mut continuation_token = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }
            let output = request
                .send()
                .await
                .map_err(|e| ObjectStoreError::Other(e.into()))?;
            for object in output.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                objects.push(ObjectMeta {
                    key: key.to_owned(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    // ListObjectsV2 doesn't return content-type; callers
                    // accept the octet-stream default rather than issuing a
                    // HEAD per object (spec.md §4.4 "ListFiles" policy).
                    content_type: None,
                    last_modified: object.last_modified().and_then(|t| (*t).try_into().ok()),
                });
            }
            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(str::to_owned);
            } else {
                break;
            }
        }
        Ok(objects)
    }

    async fn presign(&self, key: &str, ttl: Duration) -> ObjectStoreResult<String> {
        let presigning_config = PresigningConfig::builder()
            .expires_in(ttl)
            .build()
            .map_err(|e| ObjectStoreError::Other(e.into()))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| ObjectStoreError::Other(e.into()))?;
        Ok(presigned.uri().to_owned())
    }
}

fn is_not_found<E>(err: &aws_sdk_s3::error::SdkError<E, aws_smithy_runtime_api::client::orchestrator::HttpResponse>) -> bool
where
    E: std::error::Error + Send + Sync + 'static,
{
    if let aws_sdk_s3::error::SdkError::ServiceError(service_err) = err {
        return service_err.raw().status().as_u16() == 404;
    }
    false
}
