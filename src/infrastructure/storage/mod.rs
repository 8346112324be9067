pub mod memory;
pub mod s3;

use crate::modules::transcode::error::StorageError;
use async_trait::async_trait;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncRead;

pub use memory::MemoryBlobStore;
pub use s3::StorageService;

/// A ranged read handed back to the HTTP layer for proxied streaming.
pub struct BlobDownload {
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub content_range: Option<String>,
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct BlobInfo {
    pub name: String,
    pub size: i64,
    pub last_modified: Option<String>,
}

/// Gateway to the content store holding input and output media,
/// addressed by object name. Workers read inputs and persist outputs
/// through it; the dispatcher only asks whether an input exists.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Download an object into a local file.
    async fn fetch_to_path(&self, name: &str, dest: &Path) -> Result<(), StorageError>;

    /// Upload a local file under the given object name.
    async fn store_from_path(
        &self,
        name: &str,
        src: &Path,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Ranged streaming read; `range` is a raw `Range` header value
    /// passed through to the backend.
    async fn download(
        &self,
        name: &str,
        range: Option<String>,
    ) -> Result<BlobDownload, StorageError>;

    async fn list(&self) -> Result<Vec<BlobInfo>, StorageError>;
}
