use crate::config::S3Config;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client as S3Client;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Region S3 treats as the default; bucket creation must omit the location constraint for it
const DEFAULT_REGION: &str = "us-east-1";

/// Object store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to check bucket {bucket}: {message}")]
    BucketCheck { bucket: String, message: String },

    #[error("Failed to create bucket {bucket}: {message}")]
    BucketCreate { bucket: String, message: String },

    #[error("Failed to upload {key}: {message}")]
    Upload { key: String, message: String },

    #[error("Failed to download {key}: {message}")]
    Download { key: String, message: String },

    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Where a photo was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPhotoReference {
    pub bucket: String,
    pub key: String,
}

/// Key-addressable blob storage for employee photos
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    async fn make_bucket(&self, bucket: &str, region: &str) -> Result<(), StorageError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Make sure the photo bucket exists, creating it when absent.
///
/// Safe to call on every startup: an existing bucket is left untouched.
#[instrument(skip(store))]
pub async fn ensure_bucket(
    store: &dyn PhotoStore,
    bucket: &str,
    region: &str,
) -> Result<(), StorageError> {
    if store.bucket_exists(bucket).await? {
        info!(bucket = %bucket, "Bucket already exists");
        return Ok(());
    }

    store.make_bucket(bucket, region).await?;
    info!(bucket = %bucket, region = %region, "Bucket created");
    Ok(())
}

/// S3-backed photo store (works against MinIO with path-style access)
pub struct S3PhotoStore {
    client: S3Client,
}

impl S3PhotoStore {
    /// Create a new S3 photo store
    pub async fn new(config: &S3Config) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            s3_config_builder = s3_config_builder.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "onboarding-config",
            ));
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = ?config.endpoint_url,
            "S3 photo store initialized"
        );

        Self { client }
    }
}

#[async_trait]
impl PhotoStore for S3PhotoStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(StorageError::BucketCheck {
                        bucket: bucket.to_string(),
                        message: DisplayErrorContext(&e).to_string(),
                    })
                }
            }
        }
    }

    async fn make_bucket(&self, bucket: &str, region: &str) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(bucket);

        if region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::BucketCreate {
                bucket: bucket.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }

    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(bucket = %bucket, key = %key, "Photo uploaded");
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    return Err(StorageError::NotFound(key.to_string()));
                }
                return Err(StorageError::Download {
                    key: key.to_string(),
                    message: DisplayErrorContext(&e).to_string(),
                });
            }
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Download {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(bytes.into_bytes().to_vec())
    }
}

/// Reduce an uploaded filename to something safe to embed in an object key.
///
/// Keeps only the last path component; anything outside `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_filename(filename: &str) -> String {
    let last = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let sanitized: String = last
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();

    if sanitized.trim_matches('.').is_empty() {
        "photo".to_string()
    } else {
        sanitized
    }
}
