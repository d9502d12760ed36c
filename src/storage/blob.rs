//! S3-compatible blob store, one bucket with tenant-keyed prefixes.

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob upload failed: {0}")]
    Upload(String),
    #[error("blob delete failed: {0}")]
    Delete(String),
}

#[derive(Clone)]
pub struct BlobStore {
    client: Client,
    bucket: String,
    public_base: String,
}

impl BlobStore {
    pub async fn from_config(config: &Config) -> Self {
        let credentials = Credentials::new(
            config.blob_access_key_id.clone(),
            config.blob_secret_access_key.clone(),
            None,
            None,
            "pardaaf",
        );

        let endpoint_url = format!(
            "https://{}.r2.cloudflarestorage.com",
            config.blob_account_id
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .credentials_provider(credentials)
            .endpoint_url(endpoint_url)
            .load()
            .await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(true)
                .build(),
        );

        Self {
            client,
            bucket: config.blob_bucket.clone(),
            public_base: config.blob_public_base.trim_end_matches('/').to_string(),
        }
    }

    pub async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BlobError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| BlobError::Upload(e.to_string()))?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| BlobError::Delete(e.to_string()))?;
        Ok(())
    }

    /// Public URL for a stored object, cache-busted by upload epoch.
    pub fn public_url(&self, key: &str, version_epoch: i64) -> String {
        format!("{}/{}?v={}", self.public_base, key, version_epoch)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn public_url_shape() {
        // public_url is pure string assembly; exercised via ImageService
        // tests which own a store handle. Kept here as the format anchor.
        let base = "https://cdn.pardaaf.com";
        let key = "curtaindb/gallerya/product/pardaaf-p17.webp";
        let url = format!("{}/{}?v={}", base, key, 1754550000);
        assert_eq!(
            url,
            "https://cdn.pardaaf.com/curtaindb/gallerya/product/pardaaf-p17.webp?v=1754550000"
        );
    }
}
