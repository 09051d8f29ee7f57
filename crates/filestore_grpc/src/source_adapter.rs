//! Adapts `archive_reader::ZipArchive`'s random-access entry list to
//! `filesystem_core::ArchiveSource`'s pull-one-at-a-time shape, keeping the
//! core crate free of an `archive_reader` dependency.

use archive_reader::ZipArchive;
use async_trait::async_trait;
use filesystem_core::ArchiveSource;

pub struct ArchiveArchiveSource {
    archive: ZipArchive,
    next_index: usize,
}

impl ArchiveArchiveSource {
    pub fn new(archive: ZipArchive) -> Self {
        Self {
            archive,
            next_index: 0,
        }
    }
}

#[async_trait]
impl ArchiveSource for ArchiveArchiveSource {
    async fn next_file(&mut self) -> anyhow::Result<Option<(String, Vec<u8>)>> {
        let Some(entry) = self.archive.entries().get(self.next_index).cloned() else {
            return Ok(None);
        };
        self.next_index += 1;
        let content = self.archive.read(&entry).await?;
        Ok(Some((entry.path, content)))
    }
}

#[cfg(test)]
mod tests {
    use async_zip::{tokio::write::ZipFileWriter, Compression, ZipEntryBuilder};

    use super::*;

    async fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = ZipFileWriter::with_tokio(&mut buf);
        for (name, content) in files {
            let builder = ZipEntryBuilder::new((*name).into(), Compression::Deflate);
            writer.write_entry_whole(builder, content).await.unwrap();
        }
        writer.close().await.unwrap();
        buf
    }

    #[tokio::test]
    async fn pulls_every_entry_then_exhausts() {
        let bytes = build_archive(&[("repo-x/a.txt", b"1"), ("repo-x/b.txt", b"2")]).await;
        let archive = ZipArchive::open(bytes, "").await.unwrap();
        let mut source = ArchiveArchiveSource::new(archive);

        let mut seen = Vec::new();
        while let Some((path, content)) = source.next_file().await.unwrap() {
            seen.push((path, content));
        }
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("a.txt".to_owned(), b"1".to_vec()),
                ("b.txt".to_owned(), b"2".to_vec()),
            ]
        );
        assert!(source.next_file().await.unwrap().is_none());
    }
}
