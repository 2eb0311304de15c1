use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures_util::stream;
use tracing::debug;

use crate::core::config::StorageConfig;
use crate::core::error::StoreError;

use super::{GetObjectOutput, ObjectBody, ObjectEntry, ObjectMeta, ObjectStore};

// ---------------------------------------------------------------------------
// S3ObjectStore
// ---------------------------------------------------------------------------

/// Production storage backend wrapping `aws-sdk-s3`.
///
/// Supports both AWS S3 and S3-compatible stores (MinIO, DigitalOcean Spaces,
/// etc.) via configurable endpoint and path-style addressing. Every call is
/// bounded by the configured request timeout; nothing is retried here.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    request_timeout: Duration,
    request_timeout_secs: u64,
}

impl S3ObjectStore {
    /// Create a new S3ObjectStore from configuration.
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "movievault-config",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(config.path_style);

        if !config.endpoint.is_empty() {
            s3_config_builder = s3_config_builder.endpoint_url(&config.endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Self {
            client,
            bucket: config.bucket.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            request_timeout_secs: config.request_timeout_secs,
        }
    }

    /// Probe the bucket at startup. A gateway that cannot reach its store
    /// must fail loudly at boot, not on the first request.
    pub async fn startup_check(&self) -> Result<(), StoreError> {
        self.list("movies/").await?;
        debug!(bucket = %self.bucket, "storage startup check passed");
        Ok(())
    }

    async fn with_timeout<T, F>(&self, key: &str, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                key: key.to_string(),
                timeout_secs: self.request_timeout_secs,
            }),
        }
    }

    /// Wrap an SDK body into the trait's pull-based stream. Chunks are read
    /// from the socket only as the consumer polls, so downstream stalls
    /// propagate upstream and memory stays bounded for multi-GB objects.
    fn body_stream(key: String, body: ByteStream) -> ObjectBody {
        Box::pin(stream::try_unfold(
            (body, key, 0u64),
            |(mut body, key, offset)| async move {
                match body.try_next().await {
                    Ok(Some(chunk)) => {
                        let next_offset = offset + chunk.len() as u64;
                        Ok(Some((chunk, (body, key, next_offset))))
                    }
                    Ok(None) => Ok(None),
                    Err(e) => Err(StoreError::Read {
                        key,
                        offset,
                        reason: e.to_string(),
                    }),
                }
            },
        ))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        payload: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let fut = async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(payload))
                .content_type(content_type)
                .set_metadata(Some(metadata))
                .send()
                .await
                .map_err(|e| StoreError::PutFailed {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(())
        };
        self.with_timeout(key, fut).await
    }

    async fn get(&self, key: &str) -> Result<GetObjectOutput, StoreError> {
        let fut = async {
            match self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
            {
                Ok(output) => {
                    let total_size = output.content_length.unwrap_or(0).max(0) as u64;
                    let content_type = output
                        .content_type
                        .unwrap_or_else(|| "application/octet-stream".to_string());
                    let metadata = output.metadata.unwrap_or_default();

                    Ok(GetObjectOutput {
                        body: Self::body_stream(key.to_string(), output.body),
                        metadata,
                        total_size,
                        content_type,
                    })
                }
                Err(e) => {
                    if e.as_service_error()
                        .map(|se| se.is_no_such_key())
                        .unwrap_or(false)
                    {
                        return Err(StoreError::NotFound {
                            key: key.to_string(),
                        });
                    }
                    Err(StoreError::GetFailed {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        };
        self.with_timeout(key, fut).await
    }

    async fn stat(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        let fut = async {
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
            {
                Ok(output) => Ok(ObjectMeta {
                    metadata: output.metadata.unwrap_or_default(),
                    total_size: output.content_length.unwrap_or(0).max(0) as u64,
                    content_type: output
                        .content_type
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                }),
                Err(e) => {
                    if e.as_service_error()
                        .map(|se| se.is_not_found())
                        .unwrap_or(false)
                    {
                        return Err(StoreError::NotFound {
                            key: key.to_string(),
                        });
                    }
                    Err(StoreError::GetFailed {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        };
        self.with_timeout(key, fut).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        // S3 DeleteObject succeeds on absent keys, so probe first to honor
        // the NotFound contract for repeat deletes.
        self.stat(key).await?;

        let fut = async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| StoreError::DeleteFailed {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(())
        };
        self.with_timeout(key, fut).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StoreError> {
        let fut = async {
            let mut entries = Vec::new();
            let mut continuation_token: Option<String> = None;

            loop {
                let mut req = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(prefix);

                if let Some(token) = &continuation_token {
                    req = req.continuation_token(token);
                }

                let output = req.send().await.map_err(|e| StoreError::ListFailed {
                    prefix: prefix.to_string(),
                    reason: e.to_string(),
                })?;

                if let Some(contents) = output.contents {
                    for obj in contents {
                        entries.push(ObjectEntry {
                            key: obj.key.unwrap_or_default(),
                            size: obj.size.unwrap_or(0).max(0) as u64,
                        });
                    }
                }

                if output.is_truncated.unwrap_or(false) {
                    continuation_token = output.next_continuation_token;
                } else {
                    break;
                }
            }

            Ok(entries)
        };
        self.with_timeout(prefix, fut).await
    }
}
