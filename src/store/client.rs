use super::{is_supported_image_key, ObjectMetadata, ObjectStore, ObjectSummary};
use crate::models::Config;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Region, types::ObjectCannedAcl, Client as S3Client};
use tracing::{debug, info};

pub struct S3Store {
    client: S3Client,
    bucket: String,
    dry_run: bool,
}

impl S3Store {
    pub async fn new(config: &Config) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        // Explicit keys win over the default provider chain
        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = aws_sdk_s3::config::Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                None,
                None,
                "image-shrinker-env",
            );
            loader = loader.credentials_provider(credentials);
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let shared_config = loader.load().await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.endpoint.is_some() {
            // Most S3-compatible stores only support path-style addressing
            s3_config = s3_config.force_path_style(true);
        }

        if config.dry_run {
            info!("DRY_RUN enabled, uploads will be skipped");
        }

        Ok(Self {
            client: S3Client::from_conf(s3_config.build()),
            bucket: config.bucket.clone(),
            dry_run: config.dry_run,
        })
    }
}

fn http_status<E>(err: &SdkError<E>) -> Option<u16> {
    err.raw_response().map(|response| response.status().as_u16())
}

fn access_or_store_error<E>(key: &str, action: &str, err: SdkError<E>) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    if http_status(&err) == Some(403) {
        return Error::Access {
            key: key.to_string(),
            message: format!("Failed to {}: {}", action, err),
        };
    }
    Error::store(key, format!("Failed to {}: {}", action, err))
}

fn classify_get_error(key: &str, err: SdkError<GetObjectError>) -> Error {
    if let SdkError::ServiceError(service) = &err {
        if service.err().is_no_such_key() {
            return Error::NotFound(key.to_string());
        }
    }
    access_or_store_error(key, "download object", err)
}

fn classify_head_error(key: &str, err: SdkError<HeadObjectError>) -> Error {
    if let SdkError::ServiceError(service) = &err {
        if service.err().is_not_found() {
            return Error::NotFound(key.to_string());
        }
    }
    access_or_store_error(key, "read object metadata", err)
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectSummary>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        let mut seen = 0usize;
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| access_or_store_error(prefix, "list objects", e))?;
            for object in page.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                seen += 1;
                if is_supported_image_key(key) {
                    objects.push(ObjectSummary {
                        key: key.to_string(),
                        size_bytes: object.size().unwrap_or(0),
                    });
                }
            }
        }

        info!(
            "Found {} image files in {} ({} objects listed)",
            objects.len(),
            prefix,
            seen
        );
        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_get_error(key, e))?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| Error::store(key, format!("Failed to read body: {}", e)))?;

        debug!("Downloaded: {}", key);
        Ok(bytes.to_vec())
    }

    async fn head(&self, key: &str) -> Result<ObjectMetadata> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_head_error(key, e))?;

        Ok(ObjectMetadata {
            content_type: response.content_type().map(|s| s.to_string()),
            content_length: response.content_length().unwrap_or(0),
        })
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        if self.dry_run {
            info!(
                "[dry run] Would upload {} ({} bytes, {})",
                key,
                data.len(),
                content_type
            );
            return Ok(());
        }

        let body = ByteStream::from(data.to_vec());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| access_or_store_error(key, "upload object", e))?;

        debug!("Uploaded: {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> Config {
        let mut config = Config::new("test-bucket", "photos/");
        config.access_key_id = Some("test-key".to_string());
        config.secret_access_key = Some("test-secret".to_string());
        config.endpoint = Some("http://127.0.0.1:9".to_string());
        config.dry_run = true;
        config
    }

    #[tokio::test]
    async fn test_dry_run_put_skips_upload() {
        let store = S3Store::new(&offline_config()).await.unwrap();

        store
            .put("photos/a.jpg", b"data", "image/jpeg")
            .await
            .unwrap();
        assert_eq!(store.bucket, "test-bucket");
    }
}
