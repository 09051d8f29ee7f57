//! Archive ingestion: download a zip (typically a code-host codeload
//! archive), extract its central directory into memory, and iterate the
//! files under a chosen subpath. Grounded on
//! `zip-importer/{reader.go,iterator.go}`; zip parsing itself delegates to
//! `async_zip_reader`, which already wraps the sync `zip` crate in a
//! background thread for seekable reads.

mod download;

use std::io::Cursor;

use async_zip_reader::ZipReader;
pub use download::download_zip;

/// One file inside the archive, named relative to the chosen subpath.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: String,
    index: usize,
}

/// An opened archive, already descended into its single top-level directory
/// (code-host archives wrap contents in a `{repo}-{sha}/` prefix) and
/// filtered down to the requested subpath.
pub struct ZipArchive {
    reader: ZipReader,
    entries: Vec<ArchiveEntry>,
}

impl ZipArchive {
    pub async fn open(bytes: Vec<u8>, sub_path: &str) -> anyhow::Result<Self> {
        let mut reader = ZipReader::new(Cursor::new(bytes)).await?;
        let names = reader.file_names().await?;
        let top_dir = names
            .iter()
            .find_map(|n| n.split('/').next().filter(|s| !s.is_empty()))
            .ok_or_else(|| anyhow::anyhow!("archive is empty"))?;

        let sub_path = sub_path.trim_matches('/');
        let prefix = if sub_path.is_empty() {
            format!("{top_dir}/")
        } else {
            format!("{top_dir}/{sub_path}/")
        };

        let mut entries = Vec::new();
        for (index, name) in names.iter().enumerate() {
            if name.ends_with('/') || !name.starts_with(&prefix) {
                continue;
            }
            let relative = &name[prefix.len()..];
            // Mirrors the path-prefix guard in reader.go's unzip: an entry
            // whose relative path escapes the subtree is dropped rather than
            // trusted.
            if relative.is_empty() || relative.split('/').any(|segment| segment == "..") {
                continue;
            }
            entries.push(ArchiveEntry {
                path: relative.to_owned(),
                index,
            });
        }
        Ok(Self { reader, entries })
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads the full content of `entry`. The archive is single-threaded
    /// internally, so entries must be read one at a time.
    pub async fn read(&mut self, entry: &ArchiveEntry) -> anyhow::Result<Vec<u8>> {
        let zip_entry = self.reader.by_index(entry.index).await?;
        let mut buf = Vec::new();
        let mut content = zip_entry.read();
        tokio::io::AsyncReadExt::read_to_end(&mut content, &mut buf).await?;
        Ok(buf)
    }
}
