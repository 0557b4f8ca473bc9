//! Read-only object store clients used to fetch the raw dataset

use crate::config::{ObjectStoreConfig, ObjectStoreKind};
use crate::error::{PipelineError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable holding an OAuth bearer token for Cloud Storage
pub const GCS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Fetches one object into a local file
pub trait ObjectStore: Send + Sync {
    /// Download `object` from `bucket` to `dest`, returning the bytes written
    fn fetch(&self, bucket: &str, object: &str, dest: &Path) -> Result<u64>;

    fn name(&self) -> &'static str;
}

/// Build the store selected by `object_store.kind`
pub fn from_config(config: &ObjectStoreConfig) -> Result<Box<dyn ObjectStore>> {
    match config.kind {
        ObjectStoreKind::Gcs => Ok(Box::new(GcsObjectStore::new(
            &config.endpoint,
            Duration::from_secs(config.timeout_secs),
        )?)),
        ObjectStoreKind::Local => {
            let root = config.root.clone().ok_or_else(|| {
                PipelineError::config("object_store.root", "required when object_store.kind is local")
            })?;
            Ok(Box::new(LocalObjectStore::new(root)))
        }
    }
}

/// Google Cloud Storage over the JSON API (`alt=media` download)
pub struct GcsObjectStore {
    endpoint: url::Url,
    client: reqwest::blocking::Client,
    token: Option<String>,
}

impl GcsObjectStore {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = url::Url::parse(endpoint)
            .map_err(|e| PipelineError::config("object_store.endpoint", e.to_string()))?;
        match endpoint.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(PipelineError::config(
                    "object_store.endpoint",
                    format!("unsupported URL scheme '{scheme}'"),
                ))
            }
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::config("object_store", format!("HTTP client: {e}")))?;
        let token = std::env::var(GCS_TOKEN_ENV).ok().filter(|t| !t.is_empty());
        Ok(Self { endpoint, client, token })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o/{object}?alt=media`, with the
    /// object name percent-encoded as a single path segment
    pub fn object_url(&self, bucket: &str, object: &str) -> Result<url::Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| PipelineError::config("object_store.endpoint", "cannot be a base URL"))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o", object]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }
}

impl ObjectStore for GcsObjectStore {
    fn fetch(&self, bucket: &str, object: &str, dest: &Path) -> Result<u64> {
        let url = self.object_url(bucket, object)?;
        debug!(%url, "Requesting object");

        let mut request = self.client.get(url.as_str());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let remote = format!("gs://{bucket}/{object}");
        let response = request
            .send()
            .map_err(|e| PipelineError::io(&remote, std::io::Error::other(e.to_string())))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::io(
                &remote,
                std::io::Error::other(format!("HTTP {status}")),
            ));
        }
        let bytes = response
            .bytes()
            .map_err(|e| PipelineError::io(&remote, std::io::Error::other(e.to_string())))?;

        let mut file = std::fs::File::create(dest).map_err(|e| PipelineError::io(dest, e))?;
        file.write_all(&bytes).map_err(|e| PipelineError::io(dest, e))?;
        info!(%remote, bytes = bytes.len(), "Object downloaded");
        Ok(bytes.len() as u64)
    }

    fn name(&self) -> &'static str {
        "gcs"
    }
}

/// A local directory standing in for a bucket store: `root/bucket/object`
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ObjectStore for LocalObjectStore {
    fn fetch(&self, bucket: &str, object: &str, dest: &Path) -> Result<u64> {
        let source = self.root.join(bucket).join(object);
        let bytes = std::fs::copy(&source, dest).map_err(|e| PipelineError::io(&source, e))?;
        info!(source = %source.display(), bytes, "Object copied");
        Ok(bytes)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcs_object_url_encodes_object_name() {
        let store = GcsObjectStore::new("https://storage.googleapis.com", Duration::from_secs(5)).unwrap();
        let url = store.object_url("my-bucket", "data/Hotel Reservations.csv").unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/my-bucket/o/data%2FHotel%20Reservations.csv?alt=media"
        );
    }

    #[test]
    fn test_gcs_rejects_non_http_endpoint() {
        assert!(GcsObjectStore::new("ftp://example.com", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_local_store_copies_object() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("bucket")).unwrap();
        std::fs::write(root.path().join("bucket").join("file.csv"), "a,b\n1,2\n").unwrap();

        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("raw.csv");
        let store = LocalObjectStore::new(root.path());
        let bytes = store.fetch("bucket", "file.csv", &dest).unwrap();
        assert_eq!(bytes, 8);
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn test_local_store_missing_object_is_io_error() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(root.path());
        let err = store.fetch("bucket", "nope.csv", &root.path().join("x.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
