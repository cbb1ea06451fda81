//! S3 backend implementation
//!
//! Reads inputs with (optionally ranged) `GetObject` and streams branch
//! outputs with `PutObject`, switching to a multipart upload once the body
//! outgrows a single part.

use super::error::{BackendError, BackendResult};
use super::location::Location;
use super::types::{ObjectRef, ObjectTarget, ReadStream, UploadBody};
use super::ObjectStore;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as AwsS3Client;
use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Minimum multipart chunk size required by S3
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Default multipart chunk size
pub const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;

const READ_CHUNK_SIZE: usize = 1024 * 1024; // 1 MB chunks

/// S3 client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    /// AWS region (e.g., "us-east-1")
    pub region: Option<String>,

    /// Custom endpoint URL (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,

    /// AWS access key ID (optional - uses credential chain if not provided)
    pub access_key: Option<String>,

    /// AWS secret access key (optional - uses credential chain if not provided)
    pub secret_key: Option<String>,

    /// Path-style addressing (required for MinIO, LocalStack)
    pub force_path_style: bool,

    /// Part size for multipart uploads
    pub part_size: usize,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
            force_path_style: false,
            part_size: DEFAULT_PART_SIZE,
            timeout_seconds: 300,
        }
    }
}

impl S3Settings {
    pub fn validate(&self) -> BackendResult<()> {
        if self.part_size < MIN_PART_SIZE {
            return Err(BackendError::InvalidConfig {
                backend: "s3".to_string(),
                message: format!(
                    "part_size must be at least {} bytes, got {}",
                    MIN_PART_SIZE, self.part_size
                ),
            });
        }
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(BackendError::InvalidConfig {
                backend: "s3".to_string(),
                message: "access_key and secret_key must be set together".to_string(),
            });
        }
        Ok(())
    }
}

/// S3 backend
///
/// Not bound to a bucket: sources name their bucket in the location and
/// uploads name it in the target.
#[derive(Clone)]
pub struct S3Backend {
    client: AwsS3Client,
    part_size: usize,
}

impl S3Backend {
    /// Create a new S3 backend from settings
    pub async fn new(settings: &S3Settings) -> BackendResult<Self> {
        settings.validate()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        let region_provider = if let Some(region_str) = &settings.region {
            RegionProviderChain::first_try(Region::new(region_str.clone()))
        } else {
            RegionProviderChain::default_provider()
        };
        loader = loader.region(region_provider);

        if let (Some(access_key), Some(secret_key)) = (&settings.access_key, &settings.secret_key)
        {
            let credentials =
                Credentials::new(access_key, secret_key, None, None, "switchyard-explicit");
            loader = loader.credentials_provider(credentials);
        }

        let aws_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);

        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if settings.force_path_style {
            builder = builder.force_path_style(true);
        }

        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(settings.timeout_seconds))
            .build();
        builder = builder.timeout_config(timeout_config);

        Ok(Self {
            client: AwsS3Client::from_conf(builder.build()),
            part_size: settings.part_size,
        })
    }

    async fn put_single(&self, target: &ObjectTarget, data: Bytes) -> BackendResult<()> {
        self.client
            .put_object()
            .bucket(&target.container)
            .key(&target.key)
            .content_type(&target.content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| upload_failed(format!("Failed to put object: {}", e)))?;
        Ok(())
    }

    async fn initiate_multipart(&self, target: &ObjectTarget) -> BackendResult<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&target.container)
            .key(&target.key)
            .content_type(&target.content_type)
            .send()
            .await
            .map_err(|e| upload_failed(format!("Failed to initiate multipart upload: {}", e)))?;

        response
            .upload_id()
            .map(|s| s.to_string())
            .ok_or_else(|| upload_failed("No upload ID returned".to_string()))
    }

    async fn upload_part(
        &self,
        target: &ObjectTarget,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> BackendResult<CompletedPart> {
        let response = self
            .client
            .upload_part()
            .bucket(&target.container)
            .key(&target.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| upload_failed(format!("Failed to upload part {}: {}", part_number, e)))?;

        let etag = response
            .e_tag()
            .ok_or_else(|| upload_failed(format!("No ETag returned for part {}", part_number)))?;

        Ok(CompletedPart::builder()
            .part_number(part_number)
            .e_tag(etag)
            .build())
    }

    async fn complete_multipart(
        &self,
        target: &ObjectTarget,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> BackendResult<()> {
        let multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&target.container)
            .key(&target.key)
            .upload_id(upload_id)
            .multipart_upload(multipart_upload)
            .send()
            .await
            .map_err(|e| upload_failed(format!("Failed to complete multipart upload: {}", e)))?;
        Ok(())
    }

    async fn abort_multipart(&self, target: &ObjectTarget, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&target.container)
            .key(&target.key)
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(key = %target.key, "Failed to abort multipart upload: {}", e);
        }
    }

    /// Upload parts as the body fills them; any part but the last is `part_size`
    async fn upload_multipart(
        &self,
        target: &ObjectTarget,
        upload_id: &str,
        first_part: Bytes,
        mut buffer: BytesMut,
        body: &mut UploadBody,
    ) -> BackendResult<()> {
        let mut parts = vec![self.upload_part(target, upload_id, 1, first_part).await?];
        let mut part_number = 2i32;

        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk);
            while buffer.len() >= self.part_size {
                let data = buffer.split_to(self.part_size).freeze();
                parts.push(self.upload_part(target, upload_id, part_number, data).await?);
                part_number += 1;
            }
        }
        if !buffer.is_empty() {
            parts.push(
                self.upload_part(target, upload_id, part_number, buffer.freeze())
                    .await?,
            );
        }

        self.complete_multipart(target, upload_id, parts).await
    }
}

fn upload_failed(message: String) -> BackendError {
    BackendError::UploadFailed {
        backend: "s3".to_string(),
        message,
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    async fn read(&self, location: &Location) -> BackendResult<ReadStream> {
        let (bucket, key, range) = match location {
            Location::S3 { bucket, key, range } => (bucket, key, range),
            other => {
                return Err(BackendError::Unsupported {
                    backend: "s3".to_string(),
                    operation: format!("read {}", other.scheme()),
                })
            }
        };

        let mut request = self.client.get_object().bucket(bucket).key(key);
        if let Some(range) = range {
            request = request.range(range.to_http_header());
        }

        let output = request.send().await.map_err(|e| {
            if e.to_string().contains("NoSuchKey") || e.to_string().contains("404") {
                BackendError::NotFound {
                    location: location.to_string(),
                    backend: "s3".to_string(),
                }
            } else {
                BackendError::Other {
                    backend: "s3".to_string(),
                    message: format!("Failed to get object: {}", e),
                }
            }
        })?;

        let reader = output.body.into_async_read();
        let stream = stream::unfold(
            (reader, vec![0u8; READ_CHUNK_SIZE]),
            |(mut reader, mut buffer)| async move {
                match reader.read(&mut buffer).await {
                    Ok(0) => None, // EOF
                    Ok(n) => {
                        let data = Bytes::copy_from_slice(&buffer[..n]);
                        Some((Ok(data), (reader, buffer)))
                    }
                    Err(e) => Some((Err(e), (reader, buffer))),
                }
            },
        );

        Ok(Box::pin(stream))
    }

    async fn upload(&self, target: &ObjectTarget, mut body: UploadBody) -> BackendResult<ObjectRef> {
        let mut buffer = BytesMut::new();

        // Small outputs never leave the first part and go up with a single PutObject
        while buffer.len() < self.part_size {
            match body.next().await {
                Some(chunk) => buffer.extend_from_slice(&chunk),
                None => {
                    self.put_single(target, buffer.freeze()).await?;
                    return Ok(self.object_ref(target));
                }
            }
        }

        let first_part = buffer.split_to(self.part_size).freeze();
        let upload_id = self.initiate_multipart(target).await?;
        if let Err(e) = self
            .upload_multipart(target, &upload_id, first_part, buffer, &mut body)
            .await
        {
            self.abort_multipart(target, &upload_id).await;
            return Err(e);
        }

        Ok(self.object_ref(target))
    }

    fn object_ref(&self, target: &ObjectTarget) -> ObjectRef {
        ObjectRef::new("s3", &target.container, &target.key)
    }

    fn backend_name(&self) -> &str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    //! These tests require a running S3-compatible service (AWS S3, MinIO, LocalStack, etc.)
    //!
    //! - `S3_TEST_BUCKET`: Bucket name for testing
    //! - `S3_TEST_ENDPOINT`: Custom endpoint for MinIO/LocalStack (optional)
    //! - `S3_TESTS_ENABLED`: Set to "1" to enable integration tests

    use super::*;
    use std::env;

    fn s3_tests_enabled() -> bool {
        env::var("S3_TESTS_ENABLED").unwrap_or_default() == "1"
    }

    fn test_settings() -> S3Settings {
        let mut settings = S3Settings {
            region: env::var("S3_TEST_REGION").ok(),
            endpoint: env::var("S3_TEST_ENDPOINT").ok(),
            ..Default::default()
        };
        if settings.endpoint.is_some() {
            settings.force_path_style = true;
        }
        settings
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = S3Settings::default();
        assert!(settings.validate().is_ok());

        settings.part_size = 1024;
        assert!(settings.validate().is_err());

        settings.part_size = MIN_PART_SIZE;
        settings.access_key = Some("key".to_string());
        assert!(settings.validate().is_err());
    }

    #[tokio::test]
    #[ignore]
    async fn test_upload_then_read_back() {
        if !s3_tests_enabled() {
            println!("Skipping S3 integration test - set S3_TESTS_ENABLED=1 to run");
            return;
        }

        let bucket =
            env::var("S3_TEST_BUCKET").unwrap_or_else(|_| "switchyard-test-bucket".to_string());
        let backend = S3Backend::new(&test_settings()).await.unwrap();
        let target = ObjectTarget::new(&bucket, format!("tests/{}", uuid::Uuid::new_v4()));
        let body: UploadBody = Box::pin(stream::iter(vec![Bytes::from_static(b"[{\"id\":1}]")]));

        let object = backend.upload(&target, body).await.unwrap();
        let location = Location::parse(&object.uri()).unwrap();
        let chunks: Vec<_> = backend.read(&location).await.unwrap().collect().await;
        let data: Vec<u8> = chunks
            .into_iter()
            .flat_map(|c| c.unwrap().to_vec())
            .collect();
        assert_eq!(data, b"[{\"id\":1}]");
    }
}
