//! Scoped staging files for downloaded images
//!
//! A [`StagedImage`] owns a temporary file that is removed when the value is
//! dropped, on success, failure and cancellation alike.

use bytes::Bytes;
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::providers::{ImageFetcher, ProviderResult};

#[derive(Debug)]
pub struct StagedImage {
    file: NamedTempFile,
}

impl StagedImage {
    /// Create an empty staging file in `dir`, or the system temp dir
    pub fn create(dir: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("explora-").suffix(".img");

        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Stream `url` into the staging file through `fetcher`
    pub async fn fill_from(&self, fetcher: &dyn ImageFetcher, url: &str) -> ProviderResult<u64> {
        let handle = self.file.as_file().try_clone()?;
        let mut sink = tokio::fs::File::from_std(handle);
        fetcher.fetch_into(url, &mut sink).await
    }

    /// Read the staged bytes back for upload
    pub async fn read(&self) -> io::Result<Bytes> {
        tokio::fs::read(self.path()).await.map(Bytes::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedImage::create(Some(dir.path())).unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        assert!(path.starts_with(dir.path()));

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_read_back_written_bytes() {
        let staged = StagedImage::create(None).unwrap();
        tokio::fs::write(staged.path(), b"\x89PNG").await.unwrap();
        assert_eq!(staged.read().await.unwrap(), Bytes::from_static(b"\x89PNG"));
    }
}
