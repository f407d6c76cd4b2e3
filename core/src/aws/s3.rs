use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;
use aws_sdk_s3::Client;

use super::service_error;
use crate::artifacts::{ObjectStoreApi, ObjectUpload};
use crate::errors::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct S3Client {
    client: Client,
}

impl S3Client {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl ObjectStoreApi for S3Client {
    async fn object_etag(&self, bucket: &str, key: &str) -> ServiceResult<Option<String>> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(Some(output.e_tag().unwrap_or_default().to_string())),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(err) => Err(service_error(err)),
        }
    }

    async fn put_object(&self, upload: ObjectUpload) -> ServiceResult<()> {
        let body = ByteStream::from_path(&upload.path).await.map_err(|err| {
            ServiceError::new(format!("reading {} failed: {err}", upload.path.display()))
        })?;
        let content_length = i64::try_from(upload.content_length)
            .map_err(|_| ServiceError::new(format!("{} is too large to upload", upload.path.display())))?;
        self.client
            .put_object()
            .bucket(upload.bucket)
            .key(upload.key)
            .content_length(content_length)
            .body(body)
            .server_side_encryption(ServerSideEncryption::from(upload.server_side_encryption.as_str()))
            .cache_control(upload.cache_control)
            .send()
            .await
            .map_err(service_error)?;
        Ok(())
    }
}
