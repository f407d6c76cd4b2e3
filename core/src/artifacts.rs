//! Mirror a downloadable artifact into an object store bucket.
//!
//! The upload is skipped when the stored object already carries the expected
//! MD5 as its ETag. Otherwise the artifact is staged in a temporary file and
//! streamed from there, so its size is not bounded by memory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::Level;
use reqwest::Url;
use serde_json::json;
use tokio::io::AsyncWriteExt;

use crate::errors::{DeployError, Result, ServiceResult};
use crate::logging::log_event;

const MODULE: &str = "deckhand::artifacts";
const SERVER_SIDE_ENCRYPTION: &str = "AES256";
const CACHE_CONTROL: &str = "no-cache, no-store";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUpload {
    pub bucket: String,
    pub key: String,
    /// Local file holding the object body.
    pub path: PathBuf,
    pub content_length: u64,
    pub server_side_encryption: String,
    pub cache_control: String,
}

#[async_trait]
pub trait ObjectStoreApi: Send + Sync {
    /// ETag of the object, `None` when it does not exist.
    async fn object_etag(&self, bucket: &str, key: &str) -> ServiceResult<Option<String>>;

    async fn put_object(&self, upload: ObjectUpload) -> ServiceResult<()>;
}

#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Writes the artifact at `url` to `destination` and returns its size.
    async fn fetch_to(&self, url: &str, destination: &Path) -> Result<u64>;
}

/// Fetches `http`, `https` and `file` URLs.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("deckhand/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| DeployError::InvalidRequest(format!("failed to construct HTTP client: {err}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch_to(&self, url: &str, destination: &Path) -> Result<u64> {
        let parsed = Url::parse(url)
            .map_err(|err| DeployError::InvalidRequest(format!("invalid artifact url {url}: {err}")))?;

        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| DeployError::InvalidRequest(format!("invalid file url {url}")))?;
            return Ok(tokio::fs::copy(path, destination).await?);
        }

        let download = |source| DeployError::Download {
            url: url.to_string(),
            source,
        };
        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(download)?;

        let mut file = tokio::fs::File::create(destination).await?;
        let mut written = 0;
        while let Some(chunk) = response.chunk().await.map_err(download)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Skipped,
    Uploaded,
}

pub struct ArtifactLoader {
    store: Arc<dyn ObjectStoreApi>,
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl ArtifactLoader {
    pub fn new(store: Arc<dyn ObjectStoreApi>, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self { store, fetcher }
    }

    pub async fn load_if_not_present(&self, url: &str, md5: &str, bucket: &str, key: &str) -> Result<LoadOutcome> {
        if self.is_target_present(md5, bucket, key).await? {
            log::info!(target: MODULE, "Object s3://{bucket}/{key} already there with matching hash, skipping.");
            return Ok(LoadOutcome::Skipped);
        }
        log::info!(target: MODULE, "Object s3://{bucket}/{key} not found or hash does not match.");

        log::info!(target: MODULE, "Downloading from URL {url}...");
        let staging = tempfile::Builder::new().prefix("deckhand-artifact-").tempfile()?;
        let size = self.fetcher.fetch_to(url, staging.path()).await?;

        log::info!(target: MODULE, "Uploading {key} to s3://{bucket}...");
        self.store
            .put_object(ObjectUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                path: staging.path().to_path_buf(),
                content_length: size,
                server_side_encryption: SERVER_SIDE_ENCRYPTION.to_string(),
                cache_control: CACHE_CONTROL.to_string(),
            })
            .await?;
        log_event(
            Level::Info,
            Some("S3-0100"),
            MODULE,
            "artifact uploaded",
            Some(json!({ "url": url, "bucket": bucket, "key": key, "bytes": size })),
        );
        Ok(LoadOutcome::Uploaded)
    }

    async fn is_target_present(&self, md5: &str, bucket: &str, key: &str) -> Result<bool> {
        Ok(self
            .store
            .object_etag(bucket, key)
            .await?
            .is_some_and(|etag| etag_matches(&etag, md5)))
    }
}

fn etag_matches(etag: &str, md5: &str) -> bool {
    etag.trim_matches('"').eq_ignore_ascii_case(md5.trim_matches('"'))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Mutex;

    use super::*;

    const MD5: &str = "d8e8fca2dc0f896fd7cb4cb0031ba249";
    const BUCKET: &str = "test-bucket";
    const KEY: &str = "prefix/key";
    const CONTENT: &str = "test\n";

    #[derive(Default)]
    struct FakeBucket {
        etags: HashMap<String, String>,
        /// Each upload with the body its file held at upload time.
        uploads: Mutex<Vec<(ObjectUpload, Vec<u8>)>>,
    }

    #[async_trait]
    impl ObjectStoreApi for FakeBucket {
        async fn object_etag(&self, bucket: &str, key: &str) -> ServiceResult<Option<String>> {
            assert_eq!(bucket, BUCKET);
            Ok(self.etags.get(key).cloned())
        }

        async fn put_object(&self, upload: ObjectUpload) -> ServiceResult<()> {
            let body = std::fs::read(&upload.path).unwrap();
            self.uploads.lock().unwrap().push((upload, body));
            Ok(())
        }
    }

    fn testfile() -> (tempfile::NamedTempFile, String) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONTENT.as_bytes()).unwrap();
        let url = Url::from_file_path(file.path()).unwrap().to_string();
        (file, url)
    }

    fn loader(bucket: &Arc<FakeBucket>) -> ArtifactLoader {
        ArtifactLoader::new(bucket.clone(), Arc::new(HttpFetcher::default()))
    }

    #[tokio::test]
    async fn loads_the_file_if_it_is_not_present() {
        let (_file, url) = testfile();
        let bucket = Arc::new(FakeBucket::default());

        let outcome = loader(&bucket)
            .load_if_not_present(&url, MD5, BUCKET, KEY)
            .await
            .unwrap();

        assert_eq!(outcome, LoadOutcome::Uploaded);
        let uploads = bucket.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        let (upload, body) = &uploads[0];
        assert_eq!(upload.key, KEY);
        assert_eq!(body, CONTENT.as_bytes());
        assert_eq!(upload.content_length, CONTENT.len() as u64);
        assert_eq!(upload.server_side_encryption, "AES256");
        assert_eq!(upload.cache_control, "no-cache, no-store");
    }

    #[tokio::test]
    async fn replaces_an_object_with_another_hash() {
        let (_file, url) = testfile();
        let bucket = Arc::new(FakeBucket {
            etags: HashMap::from([(KEY.to_string(), "\"0123456789abcdef\"".to_string())]),
            ..FakeBucket::default()
        });

        let outcome = loader(&bucket)
            .load_if_not_present(&url, MD5, BUCKET, KEY)
            .await
            .unwrap();

        assert_eq!(outcome, LoadOutcome::Uploaded);
        assert_eq!(bucket.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn skips_an_object_with_a_matching_hash() {
        let bucket = Arc::new(FakeBucket {
            etags: HashMap::from([(KEY.to_string(), format!("\"{}\"", MD5.to_uppercase()))]),
            ..FakeBucket::default()
        });

        let outcome = loader(&bucket)
            .load_if_not_present("file:///does/not/matter", MD5, BUCKET, KEY)
            .await
            .unwrap();

        assert_eq!(outcome, LoadOutcome::Skipped);
        assert!(bucket.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fails_for_a_missing_local_file() {
        let bucket = Arc::new(FakeBucket::default());

        let err = loader(&bucket)
            .load_if_not_present("file:///does/not/exist/artifact", MD5, BUCKET, KEY)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Io(_)));
        assert!(bucket.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stages_the_download_in_a_file_removed_after_upload() {
        let (_file, url) = testfile();
        let bucket = Arc::new(FakeBucket::default());

        loader(&bucket)
            .load_if_not_present(&url, MD5, BUCKET, KEY)
            .await
            .unwrap();

        let uploads = bucket.uploads.lock().unwrap();
        let (upload, _) = &uploads[0];
        assert_ne!(upload.path, Url::parse(&url).unwrap().to_file_path().unwrap());
        assert!(upload
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("deckhand-artifact-")));
        assert!(!upload.path.exists());
    }

    #[tokio::test]
    async fn file_urls_are_copied_to_the_destination() {
        let (_file, url) = testfile();
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("artifact");

        let size = HttpFetcher::default().fetch_to(&url, &destination).await.unwrap();

        assert_eq!(size, CONTENT.len() as u64);
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), CONTENT);
    }
}
