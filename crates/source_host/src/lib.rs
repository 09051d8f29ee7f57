//! Code-host archive download and contents-API upload, grounded on
//! `pkg/github/github.go` and `pkg/gitlab/gitlab.go`. Both hosts speak the
//! same shape — download a zip archive of a ref, upload a batch of files
//! through their contents/commit API — so they share the [`SourceHost`]
//! trait and differ only in endpoint shape and auth header.

mod github;
mod gitlab;

use std::collections::HashMap;

use archive_reader::ZipArchive;
use async_trait::async_trait;

pub use github::GitHubSourceHost;
pub use gitlab::GitLabSourceHost;

pub struct FileToUpload {
    pub path: String,
    pub content: Vec<u8>,
}

#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Downloads the archive for `repo_ref` and opens it, already descended
    /// into `sub_path`.
    async fn download_repo(&self, repo_ref: &str, sub_path: &str) -> anyhow::Result<ZipArchive>;

    /// Uploads `files` into `target_path` on the host's default branch.
    async fn upload_to_repo(&self, target_path: &str, files: Vec<FileToUpload>) -> anyhow::Result<()>;
}

pub(crate) fn join_repo_path(target_path: &str, file_path: &str) -> String {
    let joined = format!("{}/{}", target_path.trim_end_matches('/'), file_path);
    joined.trim_start_matches('/').to_owned()
}

pub(crate) type Headers = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_repo_path_strips_leading_and_double_slashes() {
        assert_eq!(join_repo_path("", "a/b.txt"), "a/b.txt");
        assert_eq!(join_repo_path("sub/", "a/b.txt"), "sub/a/b.txt");
        assert_eq!(join_repo_path("/sub", "a/b.txt"), "sub/a/b.txt");
    }
}
