use crate::infrastructure::storage::{BlobDownload, BlobInfo, BlobStore};
use crate::modules::transcode::error::StorageError;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;
use tracing::info;

#[derive(Clone)]
pub struct StorageService {
    client: Client,
    bucket: String,
}

impl StorageService {
    pub async fn new(endpoint: &str, bucket: &str, access_key: &str, secret_key: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(config);

        info!("✅ Connected to S3 (MinIO)");

        Self {
            client,
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for StorageService {
    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(context)) if context.err().is_not_found() => Ok(false),
            Err(e) => Err(StorageError::Gateway(e.to_string())),
        }
    }

    async fn fetch_to_path(&self, name: &str, dest: &Path) -> Result<(), StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(context) if context.err().is_no_such_key() => {
                    StorageError::NotFound(name.to_string())
                }
                other => StorageError::Gateway(other.to_string()),
            })?;

        let mut reader = resp.body.into_async_read();
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| StorageError::Gateway(e.to_string()))?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| StorageError::Gateway(e.to_string()))?;
        Ok(())
    }

    async fn store_from_path(
        &self,
        name: &str,
        src: &Path,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| StorageError::Gateway(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Gateway(e.to_string()))?;
        Ok(())
    }

    async fn download(
        &self,
        name: &str,
        range: Option<String>,
    ) -> Result<BlobDownload, StorageError> {
        let mut req = self.client.get_object().bucket(&self.bucket).key(name);
        if let Some(r) = range {
            req = req.range(r);
        }

        let resp = req.send().await.map_err(|e| match e {
            SdkError::ServiceError(context) if context.err().is_no_such_key() => {
                StorageError::NotFound(name.to_string())
            }
            other => StorageError::Gateway(other.to_string()),
        })?;

        Ok(BlobDownload {
            content_type: resp.content_type().map(str::to_string),
            content_length: resp.content_length(),
            content_range: resp.content_range().map(str::to_string),
            reader: Box::pin(resp.body.into_async_read()),
        })
    }

    async fn list(&self) -> Result<Vec<BlobInfo>, StorageError> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::Gateway(e.to_string()))?;

        Ok(resp
            .contents()
            .iter()
            .filter_map(|obj| {
                Some(BlobInfo {
                    name: obj.key()?.to_string(),
                    size: obj.size().unwrap_or(0),
                    last_modified: obj.last_modified().map(|d| d.to_string()),
                })
            })
            .collect())
    }
}
