use crate::infrastructure::storage::{BlobDownload, BlobInfo, BlobStore};
use crate::modules::transcode::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use tokio::sync::Mutex;

struct StoredObject {
    bytes: Bytes,
    content_type: String,
}

/// In-process blob store for tests and local development. Range
/// requests are answered with the full object (no `Content-Range`),
/// which every client treats as a plain 200.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, name: &str, bytes: Bytes, content_type: &str) {
        self.objects.lock().await.insert(
            name.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.objects.lock().await.contains_key(name))
    }

    async fn fetch_to_path(&self, name: &str, dest: &Path) -> Result<(), StorageError> {
        let objects = self.objects.lock().await;
        let object = objects
            .get(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        tokio::fs::write(dest, &object.bytes)
            .await
            .map_err(|e| StorageError::Gateway(e.to_string()))
    }

    async fn store_from_path(
        &self,
        name: &str,
        src: &Path,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let bytes = tokio::fs::read(src)
            .await
            .map_err(|e| StorageError::Gateway(e.to_string()))?;
        self.insert(name, Bytes::from(bytes), content_type).await;
        Ok(())
    }

    async fn download(
        &self,
        name: &str,
        _range: Option<String>,
    ) -> Result<BlobDownload, StorageError> {
        let objects = self.objects.lock().await;
        let object = objects
            .get(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        Ok(BlobDownload {
            content_type: Some(object.content_type.clone()),
            content_length: Some(object.bytes.len() as i64),
            content_range: None,
            reader: Box::pin(Cursor::new(object.bytes.to_vec())),
        })
    }

    async fn list(&self) -> Result<Vec<BlobInfo>, StorageError> {
        let objects = self.objects.lock().await;
        let mut infos: Vec<BlobInfo> = objects
            .iter()
            .map(|(name, object)| BlobInfo {
                name: name.clone(),
                size: object.bytes.len() as i64,
                last_modified: None,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }
}
