//! Swappable storage backend abstraction.
//!
//! The service talks to object storage through `StorageBackend`; the only
//! shipped implementation is S3 (and S3-compatible providers via a custom
//! endpoint). Records remember which backend kind uploaded them, and
//! downloads refuse records produced by a different backend.

pub mod s3;

pub use s3::S3Backend;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("delete failed: {0}")]
    Delete(String),
    #[error("object `{0}` not found in backend")]
    NotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Remote object storage. `prefix` is the namespaced directory computed
/// from the upload target; `name` is the derived filename.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend kind tag stored on upload responses, e.g. `s3`.
    fn kind(&self) -> &'static str;

    /// Upload bytes and return the public URL of the object.
    async fn upload(
        &self,
        data: Bytes,
        name: &str,
        prefix: &str,
        content_type: Option<&str>,
    ) -> StorageResult<String>;

    /// Fetch the object's bytes.
    async fn download(&self, name: &str, prefix: &str) -> StorageResult<Bytes>;

    /// Remove the object.
    async fn delete(&self, name: &str, prefix: &str) -> StorageResult<()>;
}
