use archive_reader::ZipArchive;
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::{join_repo_path, FileToUpload, Headers, SourceHost};

const DEFAULT_BRANCH: &str = "main";

pub struct GitLabSourceHost {
    client: Client,
    api_url: String,
    project_id: i64,
    token: Option<String>,
}

impl GitLabSourceHost {
    pub fn new(api_url: impl Into<String>, project_id: i64, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
            project_id,
            token,
        }
    }

    fn headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert("Accept".to_owned(), "*/*".to_owned());
        if let Some(token) = &self.token {
            headers.insert("Authorization".to_owned(), format!("Bearer {token}"));
        }
        headers
    }

    async fn file_exists(&self, full_path: &str, token: &str) -> anyhow::Result<bool> {
        let encoded_path = full_path.replace('/', "%2F");
        let url = format!(
            "{}/projects/{}/repository/files/{encoded_path}",
            self.api_url, self.project_id
        );
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {token}"))
            .query(&[("ref", DEFAULT_BRANCH)])
            .send()
            .await?;
        Ok(response.status() == StatusCode::OK)
    }
}

#[derive(Serialize)]
struct FileAction {
    action: &'static str,
    file_path: String,
    content: String,
}

#[derive(Serialize)]
struct CommitRequest {
    branch: String,
    commit_message: String,
    actions: Vec<FileAction>,
}

#[async_trait]
impl SourceHost for GitLabSourceHost {
    async fn download_repo(&self, repo_ref: &str, sub_path: &str) -> anyhow::Result<ZipArchive> {
        let url = format!(
            "{}/projects/{}/repository/archive.zip?sha={repo_ref}",
            self.api_url, self.project_id
        );
        let bytes = archive_reader::download_zip(&url, &self.headers()).await?;
        ZipArchive::open(bytes, sub_path).await
    }

    async fn upload_to_repo(&self, target_path: &str, files: Vec<FileToUpload>) -> anyhow::Result<()> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("GitLab token is required"))?
            .clone();

        let file_count = files.len();
        let mut actions = Vec::with_capacity(file_count);
        for file in files {
            let full_path = join_repo_path(target_path, &file.path);
            let action = if self.file_exists(&full_path, &token).await? {
                "update"
            } else {
                "create"
            };
            actions.push(FileAction {
                action,
                file_path: full_path,
                content: base64::engine::general_purpose::STANDARD.encode(&file.content),
            });
        }

        let commit_request = CommitRequest {
            branch: DEFAULT_BRANCH.to_owned(),
            commit_message: format!("Upload {file_count} files"),
            actions,
        };

        let commit_url = format!(
            "{}/projects/{}/repository/commits",
            self.api_url, self.project_id
        );
        let response = self
            .client
            .post(&commit_url)
            .header("Authorization", format!("Bearer {token}"))
            .json(&commit_request)
            .send()
            .await?;
        if !matches!(response.status(), StatusCode::OK | StatusCode::CREATED) {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("failed to create commit (status {status}): {body}");
        }
        Ok(())
    }
}
