//! S3-compatible storage backend.
//!
//! This module provides a storage backend implementation for S3-compatible
//! services including AWS S3, Backblaze B2, Tigris (Fly.io), and others.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file (or the
//! `FERRY_DESTINATION__KEY_ID`/`FERRY_DESTINATION__KEY_SECRET` environment
//! variables).

use crate::{
    ObjectInfo, StorageBackend,
    error::{ErrorKind, Result},
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
};
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests; the transfer scheduler
/// already bounds concurrency far below this.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// S3-compatible storage backend.
///
/// Stores objects in an S3 bucket under the exact key it is given. One
/// backend (and therefore one client and connection pool) is shared by
/// every transfer worker.
///
/// # Examples
///
/// ```no_run
/// use ferry_storage::backend::S3Backend;
///
/// # fn example() {
/// let backend = S3Backend::new(
///     "kinetics",
///     "kinetics-600",
///     "us-east-1",
///     None::<String>,
///     "access_key_id",
///     "secret_access_key",
/// );
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in display/logging)
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        let region = Region::new(region.into());
        let credentials = Credentials::new(key_id, key_secret, None, None, "ferry-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(region)
            // Connection-level retries only; whole-upload retries are the
            // pipeline's job.
            .retry_config(RetryConfig::standard().with_max_attempts(2))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self::from_client(name, Client::from_conf(config_builder.build()), bucket)
    }

    /// Wrap an already configured client.
    pub fn from_client(name: impl Into<String>, client: Client, bucket: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
            bucket: bucket.into(),
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        }
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    /// Classify any SDK failure that isn't a modelled "not found".
    fn classify<E>(err: &SdkError<E>, key: &str) -> ErrorKind
    where
        E: std::error::Error + 'static,
    {
        let message = format!("{}: {}", key, DisplayErrorContext(err));
        match err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ErrorKind::Network(message),
            SdkError::ServiceError(_) | SdkError::ResponseError(_) => {
                match err.raw_response().map(|r| r.status().as_u16()) {
                    Some(404) => ErrorKind::NotFound(key.to_string()),
                    Some(401 | 403) => ErrorKind::PermissionDenied(message),
                    Some(429 | 500..=599) => ErrorKind::Network(message),
                    _ => ErrorKind::BackendError(message),
                }
            },
            _ => ErrorKind::BackendError(message),
        }
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stat(&self, key: &str) -> Result<ObjectInfo> {
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => Ok(ObjectInfo::new(key, output.content_length().unwrap_or(0).max(0) as u64)),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                exn::bail!(ErrorKind::NotFound(key.to_string()))
            },
            Err(err) => {
                let kind = Self::classify(&err, key);
                Err(exn::Exn::from(err).raise(kind))
            },
        }
    }

    async fn upload(&self, local: &Path, key: &str) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        let body = ByteStream::from_path(local)
            .await
            .or_raise(|| ErrorKind::BackendError(format!("cannot stream {}", local.display())))?;
        // PutObject is atomic: the object only appears once the whole body
        // has been received.
        match self.client.put_object().bucket(&self.bucket).key(key).body(body).send().await {
            Ok(_) => {
                tracing::debug!(backend = %self.name, bucket = %self.bucket, key, "Uploaded object");
                Ok(())
            },
            Err(err) => {
                let kind = Self::classify(&err, key);
                Err(exn::Exn::from(err).raise(kind))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::operation::head_object::{HeadObjectError, HeadObjectOutput};
    use aws_sdk_s3::operation::put_object::PutObjectOutput;
    use aws_sdk_s3::types::error::NotFound;
    use aws_smithy_mocks::{mock, mock_client};

    #[tokio::test]
    async fn test_stat_existing_object() {
        let rule = mock!(Client::head_object)
            .match_requests(|req| req.bucket() == Some("kinetics-600") && req.key() == Some("labels/running/vid1.mp4"))
            .then_output(|| HeadObjectOutput::builder().content_length(1024).build());
        let client = mock_client!(aws_sdk_s3, [&rule]);
        let backend = S3Backend::from_client("s3", client, "kinetics-600");

        let info = backend.stat("labels/running/vid1.mp4").await.unwrap();
        assert_eq!(info.key, "labels/running/vid1.mp4");
        assert_eq!(info.size, 1024);
    }

    #[tokio::test]
    async fn test_stat_missing_object_is_not_found() {
        let rule = mock!(Client::head_object).then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));
        let client = mock_client!(aws_sdk_s3, [&rule]);
        let backend = S3Backend::from_client("s3", client, "kinetics-600");

        let err = backend.stat("labels/running/vid1.mp4").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upload_puts_object_under_exact_key() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("abc_vid1.mp4");
        std::fs::write(&local, b"video bytes").unwrap();
        let rule = mock!(Client::put_object)
            .match_requests(|req| req.key() == Some("labels/running/vid1.mp4"))
            .then_output(|| PutObjectOutput::builder().build());
        let client = mock_client!(aws_sdk_s3, [&rule]);
        let backend = S3Backend::from_client("s3", client, "kinetics-600");

        backend.upload(&local, "labels/running/vid1.mp4").await.unwrap();
        assert_eq!(rule.num_calls(), 1);
        assert!(local.exists());
    }
}
