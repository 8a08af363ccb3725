use s3::creds::Credentials;
use s3::{Bucket, Region};
use uuid::Uuid;

/// Client for S3-compatible object storage fronted by a CDN.
pub struct StorageClient {
    bucket: Box<Bucket>,
    cdn_domain: String,
}

impl StorageClient {
    pub fn new(
        bucket_name: &str,
        region: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        cdn_domain: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            cdn_domain: cdn_domain.trim_end_matches('/').to_string(),
        })
    }

    /// Upload bytes under `{prefix}/{uuid}.{ext}` and return the CDN URL.
    pub async fn upload(
        &self,
        prefix: &str,
        data: &[u8],
        ext: &str,
    ) -> Result<String, StorageError> {
        let key = format!("{}/{}.{}", prefix.trim_end_matches('/'), Uuid::new_v4(), ext);
        let content_type = format!("image/{ext}");
        self.bucket
            .put_object_with_content_type(&key, data, &content_type)
            .await
            .map_err(StorageError::S3)?;
        Ok(format!("{}/{}", self.cdn_domain, key))
    }

}

/// Extension of the file a remote URL points at, defaulting to jpg.
/// Query strings and fragment-free vendor paths are both handled.
pub fn url_extension(remote_url: &str) -> &str {
    let filename = remote_url
        .rsplit('/')
        .next()
        .unwrap_or("")
        .split('?')
        .next()
        .unwrap_or("");
    match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 5 => ext,
        _ => "jpg",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_extension_plain() {
        assert_eq!(url_extension("https://cdn.vendor.ai/out/abc.png"), "png");
    }

    #[test]
    fn test_url_extension_with_query() {
        assert_eq!(
            url_extension("https://cdn.vendor.ai/out/abc.webp?sig=123&x=.zz"),
            "webp"
        );
    }

    #[test]
    fn test_url_extension_missing_defaults_to_jpg() {
        assert_eq!(url_extension("https://cdn.vendor.ai/out/abc"), "jpg");
        assert_eq!(url_extension("https://cdn.vendor.ai/"), "jpg");
    }

    #[test]
    fn test_url_extension_rejects_long_suffix() {
        // "jpegphoto" is not a plausible extension
        assert_eq!(url_extension("https://x/y.jpegphoto"), "jpg");
    }
}
