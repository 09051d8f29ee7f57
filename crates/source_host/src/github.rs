use archive_reader::ZipArchive;
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{join_repo_path, FileToUpload, Headers, SourceHost};

const API_BASE: &str = "https://api.github.com";
const DEFAULT_BRANCH: &str = "main";

pub struct GitHubSourceHost {
    client: Client,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl GitHubSourceHost {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            owner: owner.into(),
            repo: repo.into(),
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

    async fn latest_file_sha(&self, file_url: &str) -> anyhow::Result<Option<String>> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("GitHub token is required"))?;
        let response = self
            .client
            .get(file_url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/vnd.github+json")
            .query(&[("ref", DEFAULT_BRANCH)])
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Ok(None);
        }
        let content: ContentResponse = response.json().await?;
        Ok(Some(content.sha))
    }
}

#[derive(Serialize)]
struct ContentRequest {
    message: String,
    content: String,
    branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
}

#[async_trait]
impl SourceHost for GitHubSourceHost {
    async fn download_repo(&self, repo_ref: &str, sub_path: &str) -> anyhow::Result<ZipArchive> {
        let url = format!(
            "{API_BASE}/repos/{}/{}/zipball/{repo_ref}",
            self.owner, self.repo
        );
        let bytes = archive_reader::download_zip(&url, &self.headers()).await?;
        ZipArchive::open(bytes, sub_path).await
    }

    async fn upload_to_repo(&self, target_path: &str, files: Vec<FileToUpload>) -> anyhow::Result<()> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("GitHub token is required"))?
            .clone();

        for file in files {
            let full_path = join_repo_path(target_path, &file.path);
            let file_url = format!(
                "{API_BASE}/repos/{}/{}/contents/{full_path}",
                self.owner, self.repo
            );

            let existing_sha = self.latest_file_sha(&file_url).await?;
            let request = ContentRequest {
                message: format!("Upload {full_path}"),
                content: base64::engine::general_purpose::STANDARD.encode(&file.content),
                branch: DEFAULT_BRANCH.to_owned(),
                sha: existing_sha,
            };

            let response = self
                .client
                .put(&file_url)
                .header("Authorization", format!("Bearer {token}"))
                .header("Accept", "application/vnd.github+json")
                .json(&request)
                .send()
                .await?;
            if !matches!(response.status(), StatusCode::OK | StatusCode::CREATED) {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("failed to upload file {full_path} (status {status}): {body}");
            }
        }
        Ok(())
    }
}
