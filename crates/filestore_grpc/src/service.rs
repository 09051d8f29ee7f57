//! `CodeBucketRpcService`: the tonic-generated `CodeBucket` trait
//! implemented over a shared `FileSystemManager`, grounded 1:1 on
//! `internal/service/rpc.go`'s `RcpService` methods.

use std::sync::Arc;

use errors_fs::FsError;
use filesystem_core::{model::FileContentsBase, FileSystemManager};
use source_host::{FileToUpload, GitHubSourceHost, GitLabSourceHost, SourceHost};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use crate::{
    pb::{self, code_bucket_server::CodeBucket, source_host_ref::Host},
    source_adapter::ArchiveArchiveSource,
};

pub struct CodeBucketRpcService {
    fsm: Arc<FileSystemManager>,
    verifier: Arc<token_verifier::TokenVerifier>,
}

impl CodeBucketRpcService {
    pub fn new(fsm: Arc<FileSystemManager>, verifier: Arc<token_verifier::TokenVerifier>) -> Self {
        Self { fsm, verifier }
    }
}

fn status_from(err: FsError) -> Status {
    Status::new(err.kind.grpc_code(), err.source.to_string())
}

fn require_non_empty(value: &str, field: &str) -> Result<(), Status> {
    if value.is_empty() {
        return Err(Status::invalid_argument(format!("{field} is required")));
    }
    Ok(())
}

fn source_host_from(source: Option<pb::SourceHostRef>, token: String) -> Result<Box<dyn SourceHost>, Status> {
    match source.and_then(|s| s.host) {
        Some(Host::Github(gh)) => Ok(Box::new(GitHubSourceHost::new(gh.owner, gh.repo, Some(token)))),
        Some(Host::Gitlab(gl)) => Ok(Box::new(GitLabSourceHost::new(
            gl.gitlab_api_url,
            gl.project_id,
            Some(token),
        ))),
        None => Err(Status::invalid_argument("source host reference is required")),
    }
}

fn core_file_info_to_pb(info: filesystem_core::model::FileInfo) -> pb::FileInfo {
    pb::FileInfo {
        path: info.path,
        size: info.size,
        content_type: info.content_type,
        modified_at: info.modified_at,
    }
}

#[tonic::async_trait]
impl CodeBucket for CodeBucketRpcService {
    async fn clone_bucket(
        &self,
        request: Request<pb::CloneBucketRequest>,
    ) -> Result<Response<pb::CreateBucketResponse>, Status> {
        let req = request.into_inner();
        let cancel = CancellationToken::new();
        self.fsm
            .clone_bucket(&req.source_bucket_id, &req.new_bucket_id, &cancel)
            .await
            .map_err(status_from)?;
        Ok(Response::new(pb::CreateBucketResponse {}))
    }

    async fn create_bucket_from_archive_url(
        &self,
        request: Request<pb::CreateBucketFromArchiveUrlRequest>,
    ) -> Result<Response<pb::CreateBucketResponse>, Status> {
        let req = request.into_inner();
        let bytes = archive_reader::download_zip(&req.zip_url, &req.headers)
            .await
            .map_err(|e| Status::internal(format!("failed to download zip: {e}")))?;
        let archive = archive_reader::ZipArchive::open(bytes, &req.path)
            .await
            .map_err(|e| Status::internal(format!("failed to open zip: {e}")))?;

        let cancel = CancellationToken::new();
        self.fsm
            .import_archive(&req.new_bucket_id, Box::new(ArchiveArchiveSource::new(archive)), &cancel)
            .await
            .map_err(status_from)?;
        Ok(Response::new(pb::CreateBucketResponse {}))
    }

    async fn create_bucket_from_source_host(
        &self,
        request: Request<pb::CreateBucketFromSourceHostRequest>,
    ) -> Result<Response<pb::CreateBucketResponse>, Status> {
        let req = request.into_inner();
        let host = source_host_from(req.source, req.token)?;
        let archive = host
            .download_repo(&req.git_ref, &req.path)
            .await
            .map_err(|e| Status::internal(format!("failed to download repository: {e}")))?;

        let cancel = CancellationToken::new();
        self.fsm
            .import_archive(&req.new_bucket_id, Box::new(ArchiveArchiveSource::new(archive)), &cancel)
            .await
            .map_err(status_from)?;
        Ok(Response::new(pb::CreateBucketResponse {}))
    }

    async fn create_bucket_from_contents(
        &self,
        request: Request<pb::CreateBucketFromContentsRequest>,
    ) -> Result<Response<pb::CreateBucketResponse>, Status> {
        let req = request.into_inner();
        let contents = req
            .contents
            .into_iter()
            .map(|c| FileContentsBase {
                path: c.path,
                content: c.content,
            })
            .collect();
        self.fsm
            .bulk_set(&req.new_bucket_id, contents)
            .await
            .map_err(status_from)?;
        Ok(Response::new(pb::CreateBucketResponse {}))
    }

    async fn export_bucket_to_source_host(
        &self,
        request: Request<pb::ExportBucketToSourceHostRequest>,
    ) -> Result<Response<pb::ExportBucketToSourceHostResponse>, Status> {
        let req = request.into_inner();
        let host = source_host_from(req.source, req.token)?;

        let files = self
            .fsm
            .list_files(&req.bucket_id, "")
            .await
            .map_err(status_from)?;
        let mut to_upload = Vec::with_capacity(files.len());
        for file in files {
            // Mirrors rpc.go's ExportBucketToGithub/Gitlab: a per-file read
            // failure is skipped rather than aborting the export.
            if let Ok((_, blob)) = self.fsm.get_file(&req.bucket_id, &file.path).await {
                to_upload.push(FileToUpload {
                    path: file.path,
                    content: blob.content,
                });
            }
        }

        host.upload_to_repo(&req.path, to_upload)
            .await
            .map_err(|e| Status::internal(format!("failed to upload to source host: {e}")))?;
        Ok(Response::new(pb::ExportBucketToSourceHostResponse {}))
    }

    async fn get_bucket_file(
        &self,
        request: Request<pb::GetBucketFileRequest>,
    ) -> Result<Response<pb::GetBucketFileResponse>, Status> {
        let req = request.into_inner();
        let (info, blob) = self
            .fsm
            .get_file(&req.bucket_id, &req.path)
            .await
            .map_err(status_from)?;
        Ok(Response::new(pb::GetBucketFileResponse {
            content: Some(pb::FileContent {
                file_info: Some(core_file_info_to_pb(info)),
                content: blob.content,
            }),
        }))
    }

    async fn get_bucket_files(
        &self,
        request: Request<pb::GetBucketFilesRequest>,
    ) -> Result<Response<pb::GetBucketFilesResponse>, Status> {
        let req = request.into_inner();
        let files = self
            .fsm
            .list_files(&req.bucket_id, &req.prefix)
            .await
            .map_err(status_from)?;
        Ok(Response::new(pb::GetBucketFilesResponse {
            files: files.into_iter().map(core_file_info_to_pb).collect(),
        }))
    }

    async fn get_bucket_files_with_content(
        &self,
        request: Request<pb::GetBucketFilesRequest>,
    ) -> Result<Response<pb::GetBucketFilesWithContentResponse>, Status> {
        let req = request.into_inner();
        let files = self
            .fsm
            .list_files(&req.bucket_id, &req.prefix)
            .await
            .map_err(status_from)?;

        let mut pb_files = Vec::with_capacity(files.len());
        for file in files {
            let Ok((info, blob)) = self.fsm.get_file(&req.bucket_id, &file.path).await else {
                continue;
            };
            pb_files.push(pb::FileContent {
                file_info: Some(core_file_info_to_pb(info)),
                content: blob.content,
            });
        }
        Ok(Response::new(pb::GetBucketFilesWithContentResponse { files: pb_files }))
    }

    async fn get_bucket_files_as_zip(
        &self,
        request: Request<pb::GetBucketFilesAsZipRequest>,
    ) -> Result<Response<pb::GetBucketFilesAsZipResponse>, Status> {
        let req = request.into_inner();
        let (download_url, expires_at) = self
            .fsm
            .zip_of(&req.bucket_id, &req.prefix)
            .await
            .map_err(status_from)?;
        Ok(Response::new(pb::GetBucketFilesAsZipResponse {
            download_url,
            expires_at,
        }))
    }

    async fn set_bucket_file(
        &self,
        request: Request<pb::SetBucketFileRequest>,
    ) -> Result<Response<pb::SetBucketFileResponse>, Status> {
        let req = request.into_inner();
        require_non_empty(&req.bucket_id, "bucket_id")?;
        require_non_empty(&req.path, "path")?;
        self.fsm
            .put_file(&req.bucket_id, &req.path, req.content, None)
            .await
            .map_err(status_from)?;
        Ok(Response::new(pb::SetBucketFileResponse {}))
    }

    async fn set_bucket_files(
        &self,
        request: Request<pb::SetBucketFilesRequest>,
    ) -> Result<Response<pb::SetBucketFilesResponse>, Status> {
        let req = request.into_inner();
        require_non_empty(&req.bucket_id, "bucket_id")?;
        if req.files.is_empty() {
            return Err(Status::invalid_argument("at least one file is required"));
        }
        let mut contents = Vec::with_capacity(req.files.len());
        for file in req.files {
            require_non_empty(&file.path, "file path")?;
            contents.push(FileContentsBase {
                path: file.path,
                content: file.content,
            });
        }
        self.fsm
            .bulk_set(&req.bucket_id, contents)
            .await
            .map_err(status_from)?;
        Ok(Response::new(pb::SetBucketFilesResponse {}))
    }

    async fn delete_bucket_file(
        &self,
        request: Request<pb::DeleteBucketFileRequest>,
    ) -> Result<Response<pb::DeleteBucketFileResponse>, Status> {
        let req = request.into_inner();
        require_non_empty(&req.bucket_id, "bucket_id")?;
        require_non_empty(&req.path, "path")?;
        self.fsm
            .delete_file(&req.bucket_id, &req.path)
            .await
            .map_err(status_from)?;
        Ok(Response::new(pb::DeleteBucketFileResponse {}))
    }

    async fn get_bucket_token(
        &self,
        request: Request<pb::GetBucketTokenRequest>,
    ) -> Result<Response<pb::GetBucketTokenResponse>, Status> {
        let req = request.into_inner();
        if req.expires_in_seconds <= 0 {
            return Err(Status::invalid_argument("expires_in_seconds must be greater than 0"));
        }
        let token = self
            .verifier
            .mint(
                &req.bucket_id,
                req.is_read_only,
                std::time::Duration::from_secs(req.expires_in_seconds as u64),
            )
            .map_err(status_from)?;
        Ok(Response::new(pb::GetBucketTokenResponse { token }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use coordination_store::{CoordinationStore, InMemoryCoordinationStore};
    use filesystem_core::FileSystemManagerOptions;
    use object_store::{LocalDirObjectStore, ObjectStore};

    use super::*;

    fn test_service() -> CodeBucketRpcService {
        let coordination: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let objects: Arc<dyn ObjectStore> = Arc::new(LocalDirObjectStore::new_tempdir().unwrap());
        let fsm = Arc::new(FileSystemManager::start(FileSystemManagerOptions::new(
            coordination,
            objects,
        )));
        let verifier = Arc::new(token_verifier::TokenVerifier::new(b"secret".to_vec()));
        CodeBucketRpcService::new(fsm, verifier)
    }

    #[tokio::test]
    async fn set_then_get_bucket_file_roundtrips() {
        let service = test_service();
        service
            .set_bucket_file(Request::new(pb::SetBucketFileRequest {
                bucket_id: "b".to_owned(),
                path: "a.txt".to_owned(),
                content: b"hello".to_vec(),
            }))
            .await
            .unwrap();

        let response = service
            .get_bucket_file(Request::new(pb::GetBucketFileRequest {
                bucket_id: "b".to_owned(),
                path: "a.txt".to_owned(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.content.unwrap().content, b"hello");
    }

    #[tokio::test]
    async fn set_bucket_file_rejects_empty_path() {
        let service = test_service();
        let err = service
            .set_bucket_file(Request::new(pb::SetBucketFileRequest {
                bucket_id: "b".to_owned(),
                path: String::new(),
                content: b"hello".to_vec(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn get_bucket_token_rejects_zero_expiry() {
        let service = test_service();
        let err = service
            .get_bucket_token(Request::new(pb::GetBucketTokenRequest {
                bucket_id: "b".to_owned(),
                is_read_only: false,
                expires_in_seconds: 0,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn delete_missing_bucket_file_is_not_found() {
        let service = test_service();
        let err = service
            .delete_bucket_file(Request::new(pb::DeleteBucketFileRequest {
                bucket_id: "b".to_owned(),
                path: "never-existed".to_owned(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::NotFound);
    }
}
