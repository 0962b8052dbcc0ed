//! S3 storage backend.
//!
//! Works against AWS S3 or any S3-compatible provider (MinIO, Spaces) via a
//! custom endpoint, in which case path-style addressing is forced.

use crate::storage::{StorageBackend, StorageError, StorageResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use std::time::Instant;

#[derive(Clone)]
pub struct S3Backend {
    client: Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
}

impl S3Backend {
    pub async fn new(bucket: String, region: String, endpoint_url: Option<String>) -> Self {
        let region_provider =
            RegionProviderChain::first_try(aws_config::Region::new(region.clone()));
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let client = if let Some(endpoint) = &endpoint_url {
            let s3_config = aws_sdk_s3::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .force_path_style(true)
                .build();
            Client::from_conf(s3_config)
        } else {
            Client::new(&config)
        };

        Self {
            client,
            bucket,
            region,
            endpoint_url,
        }
    }

    fn key(&self, name: &str, prefix: &str) -> String {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix.trim_end_matches('/'), name)
        }
    }

    /// Public URL: virtual-hosted style for AWS, path style for custom
    /// endpoints.
    fn url(&self, key: &str) -> String {
        match &self.endpoint_url {
            Some(endpoint) => {
                format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key)
            }
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn kind(&self) -> &'static str {
        "s3"
    }

    async fn upload(
        &self,
        data: Bytes,
        name: &str,
        prefix: &str,
        content_type: Option<&str>,
    ) -> StorageResult<String> {
        let key = self.key(name, prefix);
        let size = data.len();
        let start = Instant::now();

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data));
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request.send().await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                "s3 upload failed"
            );
            StorageError::Upload(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "s3 upload complete"
        );

        Ok(self.url(&key))
    }

    async fn download(&self, name: &str, prefix: &str) -> StorageResult<Bytes> {
        let key = self.key(name, prefix);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(key.clone())
                } else {
                    tracing::error!(error = %e, bucket = %self.bucket, key = %key, "s3 download failed");
                    StorageError::Download(e.to_string())
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Download(e.to_string()))?;

        Ok(data.into_bytes())
    }

    async fn delete(&self, name: &str, prefix: &str) -> StorageResult<()> {
        let key = self.key(name, prefix);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, key = %key, "s3 delete failed");
                StorageError::Delete(e.to_string())
            })?;

        Ok(())
    }
}
