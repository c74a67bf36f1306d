//! Blob store access.
//!
//! The pipeline only ever reads objects the worker has already uploaded, so
//! the capability is a single streaming `get_object`.

use std::pin::Pin;

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use tokio::io::AsyncRead;
use tracing::info;

use crate::core::config::BlobStoreConfig;
use crate::errors::BlobStoreError;

/// Byte stream of a stored object.
pub type ObjectStream = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream, BlobStoreError>;
}

/// S3-compatible store (MinIO in the default deployment).
pub struct S3BlobStore {
    client: S3Client,
}

impl S3BlobStore {
    pub async fn from_config(config: &BlobStoreConfig) -> Self {
        let shared_config = aws_config::from_env()
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(
                config.access_key_id.clone(),
                config.secret_access_key.clone(),
                None,
                None,
                "shortsbot-static",
            ))
            .endpoint_url(&config.endpoint_url)
            .load()
            .await;

        // MinIO serves buckets by path, not by virtual host.
        let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(true)
            .build();

        info!(
            endpoint = %config.endpoint_url,
            bucket = %config.bucket,
            "Blob store client initialized"
        );
        Self {
            client: S3Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream, BlobStoreError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_get_error(e, bucket, key))?;

        Ok(Box::pin(output.body.into_async_read()))
    }
}

fn map_get_error<R>(error: SdkError<GetObjectError, R>, bucket: &str, key: &str) -> BlobStoreError
where
    R: std::fmt::Debug,
{
    match error.as_service_error() {
        Some(GetObjectError::NoSuchKey(_)) => BlobStoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        _ => BlobStoreError::Storage(format!("get {}/{}: {}", bucket, key, error)),
    }
}
