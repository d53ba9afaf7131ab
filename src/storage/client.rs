use super::{content_type_for_extension, object_key, StorageService};
use crate::models::Config;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{types::ObjectCannedAcl, Client as S3Client};
use tracing::{debug, info};

/// Connection details for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint: String,
    pub bucket: String,
    /// Public origin the stored objects are served from.
    pub base_url: String,
    /// MinIO and most self-hosted gateways need `<endpoint>/<bucket>/<key>`.
    pub path_style: bool,
}

impl S3Settings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let required = |value: &Option<String>, key: &str| {
            value
                .clone()
                .ok_or_else(|| Error::Config(format!("{} not set", key)))
        };

        Ok(Self {
            access_key_id: required(&config.storage_access_key_id, "STORAGE_ACCESS_KEY_ID")?,
            secret_access_key: required(
                &config.storage_secret_access_key,
                "STORAGE_SECRET_ACCESS_KEY",
            )?,
            endpoint: config.storage_endpoint.clone(),
            bucket: config.storage_bucket.clone(),
            base_url: config.storage_base_url.clone(),
            path_style: true,
        })
    }
}

/// S3-compatible object storage (AWS, DigitalOcean Spaces, MinIO).
pub struct S3Storage {
    client: S3Client,
    bucket: String,
    base_url: String,
}

impl S3Storage {
    pub async fn new(settings: S3Settings) -> Result<Self> {
        let S3Settings {
            access_key_id,
            secret_access_key,
            endpoint,
            bucket,
            base_url,
            path_style,
        } = settings;

        info!("Connecting to bucket {} at {}", bucket, endpoint);
        let credentials =
            Credentials::new(access_key_id, secret_access_key, None, None, "upload-bridge");
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            // region is required by the SDK but unused by most gateways
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(path_style)
            .build();

        Ok(Self {
            client: S3Client::from_conf(s3_config),
            bucket,
            base_url,
        })
    }
}

/// Join a base URL and an object key, percent-encoding characters a path
/// hint may carry (spaces, non-ASCII names).
fn public_url(base_url: &str, key: &str) -> String {
    let mut url = base_url.trim_end_matches('/').to_string();
    for segment in key.split('/') {
        url.push('/');
        for byte in segment.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    url.push(byte as char)
                }
                _ => url.push_str(&format!("%{:02X}", byte)),
            }
        }
    }
    url
}

#[async_trait]
impl StorageService for S3Storage {
    async fn save_file(
        &self,
        data: &[u8],
        path_hint: &str,
        unique_id: &str,
        extension: &str,
    ) -> Result<String> {
        let key = object_key(path_hint, unique_id, extension)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .content_type(content_type_for_extension(extension))
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("put_object {} failed: {}", key, e)))?;

        debug!("Uploaded {} bytes to s3://{}/{}", data.len(), self.bucket, key);
        Ok(public_url(&self.base_url, &key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url_encodes_path_hint() {
        assert_eq!(
            public_url("https://cdn.test/", "Coding Sensei/abc.png"),
            "https://cdn.test/Coding%20Sensei/abc.png"
        );
        assert_eq!(
            public_url("https://cdn.test", "Лиза/x.webp"),
            "https://cdn.test/%D0%9B%D0%B8%D0%B7%D0%B0/x.webp"
        );
        assert_eq!(public_url("https://cdn.test", "x.jpg"), "https://cdn.test/x.jpg");
    }

    #[test]
    fn test_settings_require_credentials() {
        let config = Config {
            storage_access_key_id: Some("key".to_string()),
            ..Config::default()
        };
        assert!(matches!(
            S3Settings::from_config(&config),
            Err(Error::Config(msg)) if msg.contains("STORAGE_SECRET_ACCESS_KEY")
        ));

        let config = Config {
            storage_secret_access_key: Some("secret".to_string()),
            ..config
        };
        let settings = S3Settings::from_config(&config).unwrap();
        assert_eq!(settings.access_key_id, "key");
        assert!(settings.path_style);
    }
}
