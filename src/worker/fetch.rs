use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::core::models::ObjectLocation;
use crate::errors::FetchError;
use crate::storage::BlobStore;

/// Wall-clock budget for a single object download.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// A fetched object in local temporary storage.
///
/// The backing file is deleted when the handle is dropped, whichever way the
/// handling call exits.
#[derive(Debug)]
pub struct Artifact {
    file: NamedTempFile,
    len: u64,
}

impl Artifact {
    /// Size measured from the written stream.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Opens an independent reader positioned at the start of the artifact.
    pub fn open(&self) -> std::io::Result<tokio::fs::File> {
        self.file.reopen().map(tokio::fs::File::from_std)
    }
}

pub struct ArtifactFetcher {
    store: Arc<dyn BlobStore>,
    timeout: Duration,
    temp_dir: Option<PathBuf>,
}

impl ArtifactFetcher {
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self::with_timeout(store, FETCH_TIMEOUT)
    }

    #[must_use]
    pub fn with_timeout(store: Arc<dyn BlobStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            temp_dir: None,
        }
    }

    /// Keeps temporary artifacts under `dir` instead of the system temp dir.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Streams the object at `location` into a temporary file.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Timeout` when the download exceeds the budget, or
    /// the store / IO error otherwise. The partial file is removed either way.
    pub async fn fetch(&self, location: &ObjectLocation) -> Result<Artifact, FetchError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("download-").suffix(".mp4");
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let len = tokio::time::timeout(self.timeout, self.copy_into(location, &file))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;

        info!(object = %location, bytes = len, "Fetched artifact");
        Ok(Artifact { file, len })
    }

    async fn copy_into(
        &self,
        location: &ObjectLocation,
        file: &NamedTempFile,
    ) -> Result<u64, FetchError> {
        let mut reader = self
            .store
            .get_object(&location.bucket, &location.key)
            .await?;
        let mut out = tokio::fs::File::from_std(file.reopen()?);

        let copied = tokio::io::copy(&mut reader, &mut out).await?;
        out.flush().await?;

        let len = out.seek(SeekFrom::End(0)).await?;
        debug!(object = %location, copied, len, "Artifact stream written");
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BlobStoreError;
    use crate::storage::ObjectStream;
    use async_trait::async_trait;
    use tokio::io::AsyncReadExt;

    struct StaticStore(Vec<u8>);

    #[async_trait]
    impl BlobStore for StaticStore {
        async fn get_object(&self, _: &str, _: &str) -> Result<ObjectStream, BlobStoreError> {
            Ok(Box::pin(std::io::Cursor::new(self.0.clone())))
        }
    }

    struct StalledStore;

    #[async_trait]
    impl BlobStore for StalledStore {
        async fn get_object(&self, _: &str, _: &str) -> Result<ObjectStream, BlobStoreError> {
            std::future::pending().await
        }
    }

    fn location() -> ObjectLocation {
        ObjectLocation {
            bucket: "b".into(),
            key: "k".into(),
        }
    }

    #[tokio::test]
    async fn artifact_can_be_reread_from_start() {
        let fetcher = ArtifactFetcher::new(Arc::new(StaticStore(b"video bytes".to_vec())));
        let artifact = fetcher.fetch(&location()).await.unwrap();
        assert_eq!(artifact.len(), 11);

        for _ in 0..2 {
            let mut contents = Vec::new();
            artifact
                .open()
                .unwrap()
                .read_to_end(&mut contents)
                .await
                .unwrap();
            assert_eq!(contents, b"video bytes");
        }
    }

    #[tokio::test]
    async fn dropping_the_artifact_removes_the_file() {
        let fetcher = ArtifactFetcher::new(Arc::new(StaticStore(vec![0; 16])));
        let artifact = fetcher.fetch(&location()).await.unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());

        drop(artifact);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn fetches_into_the_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher =
            ArtifactFetcher::new(Arc::new(StaticStore(vec![1; 8]))).in_dir(dir.path());

        let artifact = fetcher.fetch(&location()).await.unwrap();
        assert_eq!(artifact.path().parent(), Some(dir.path()));

        drop(artifact);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_fetch_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ArtifactFetcher::with_timeout(Arc::new(StalledStore), Duration::from_secs(3))
            .in_dir(dir.path());

        assert!(fetcher.fetch(&location()).await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out() {
        let fetcher = ArtifactFetcher::with_timeout(Arc::new(StalledStore), Duration::from_secs(3));
        let err = fetcher.fetch(&location()).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(d) if d == Duration::from_secs(3)));
    }
}
