use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use super::{ObjectStore, StorageError};

const MAX_OBJECT_SIZE: usize = 50 * 1024 * 1024;

/// Object store backed by a single S3 bucket.
#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String) -> Self {
        Self {
            client,
            bucket_name,
        }
    }

    pub fn content_type_for(key: &str) -> &'static str {
        let ext = key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("gif") => "image/gif",
            Some("bmp") => "image/bmp",
            Some("tiff") => "image/tiff",
            _ => "application/octet-stream",
        }
    }

    pub fn validate_object_size(data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_OBJECT_SIZE {
            return Err(StorageError::FileTooLarge(data.len()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Service {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound(format!("{}/{}", self.bucket_name, key))
                } else {
                    log::error!("S3 get_object failed for {}/{}: {:?}", self.bucket_name, key, e);
                    StorageError::S3(e.to_string())
                }
            })?;

        let body = result
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        S3Service::validate_object_size(&data)?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(S3Service::content_type_for(key))
            .send()
            .await
            .map_err(|e| {
                log::error!("S3 put_object failed for {}/{}: {:?}", self.bucket_name, key, e);
                StorageError::S3(e.to_string())
            })?;

        Ok(())
    }
}
