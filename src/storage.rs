use crate::config::StorageConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

/// A downloaded video held in scratch storage.
///
/// The scratch file is removed when this value is dropped, so cleanup
/// happens on every exit path of a request.
pub struct DownloadedVideo {
    path: PathBuf,
    _temp_file: NamedTempFile,
}

impl DownloadedVideo {
    pub(crate) fn from_temp_file(temp_file: NamedTempFile) -> Self {
        let path = temp_file.path().to_path_buf();
        Self {
            path,
            _temp_file: temp_file,
        }
    }

    /// Path to the downloaded video
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Object storage operations the request handler depends on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download one object into scratch storage
    async fn download_object(&self, bucket: &str, key: &str) -> Result<DownloadedVideo>;

    /// Upload bytes as an object with the given content type
    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;
}

/// S3-backed object store (also speaks to MinIO/LocalStack via a custom endpoint)
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new object store from configuration
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, "object store initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn download_object(&self, bucket: &str, key: &str) -> Result<DownloadedVideo> {
        // The scratch file exists before the fetch starts, so it is cleaned
        // up even when the download fails partway.
        let temp_file = tempfile::Builder::new()
            .suffix(".mp4")
            .tempfile()
            .context("failed to create scratch file for video download")?;

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed to fetch object {bucket}/{key}"))?;

        let body = response
            .body
            .collect()
            .await
            .context("failed to read object body")?;
        let bytes = body.into_bytes();

        let mut file = File::create(temp_file.path())
            .await
            .context("failed to open scratch file for writing")?;
        file.write_all(&bytes)
            .await
            .context("failed to write video to scratch file")?;
        file.flush().await.context("failed to flush scratch file")?;

        debug!(
            bucket,
            key,
            size_bytes = bytes.len(),
            path = %temp_file.path().display(),
            "downloaded video to scratch storage"
        );

        Ok(DownloadedVideo::from_temp_file(temp_file))
    }

    #[instrument(skip(self, bytes))]
    async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let size_bytes = bytes.len();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("failed to upload object {bucket}/{key}"))?;

        info!(bucket, key, size_bytes, "object uploaded");

        Ok(())
    }
}
