//! S3-compatible storage implementation using the AWS SDK
//!
//! Works with AWS S3, MinIO, Cloudflare R2 and any other S3-compatible
//! object storage. Requests use path-style addressing so custom endpoints
//! do not need wildcard DNS.

use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Builder, Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::MetadataDirective,
};
use bytes::Bytes;
use tracing::{debug, error, instrument};

use super::{Listing, ObjectMeta, ObjectStore, PutOptions, StorageError};

const DEFAULT_REGION: &str = "us-east-1";

/// S3-compatible storage implementation
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client for a custom endpoint with static credentials
    pub fn connect(endpoint_url: &str, region: &str, access_key: &str, secret_key: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "storefront-env");
        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();

        Self::new(Client::from_conf(config))
    }

    /// Create S3 storage from environment variables
    ///
    /// Expects:
    /// - S3_ACCESS_KEY_ID
    /// - S3_SECRET_ACCESS_KEY
    /// - S3_ENDPOINT_URL (for S3-compatible services like MinIO or R2)
    /// - S3_REGION (optional, defaults to us-east-1)
    pub fn from_env() -> Result<Self, StorageError> {
        let access_key = require_env("S3_ACCESS_KEY_ID")?;
        let secret_key = require_env("S3_SECRET_ACCESS_KEY")?;
        let endpoint_url = require_env("S3_ENDPOINT_URL")?;
        let region = std::env::var("S3_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string());

        Ok(Self::connect(&endpoint_url, &region, &access_key, &secret_key))
    }

    /// Ensure bucket exists (create if it doesn't)
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(err)) if err.err().is_not_found() => {
                debug!(bucket, "Creating missing bucket");
                self.client
                    .create_bucket()
                    .bucket(bucket)
                    .send()
                    .await
                    .map_err(|e| {
                        StorageError::Backend(format!(
                            "Failed to create bucket '{}': {}",
                            bucket,
                            DisplayErrorContext(&e)
                        ))
                    })?;
                Ok(())
            }
            Err(e) => Err(StorageError::Backend(format!(
                "Failed to check bucket '{}': {}",
                bucket,
                DisplayErrorContext(&e)
            ))),
        }
    }

    /// Validate S3 key format
    fn validate_key(key: &str) -> Result<(), StorageError> {
        if key.is_empty() || key.len() > 1024 {
            return Err(StorageError::InvalidKey(
                "Key must be between 1 and 1024 characters".into(),
            ));
        }

        if key.starts_with('/') || key.ends_with('/') {
            return Err(StorageError::InvalidKey(
                "Key cannot start or end with '/'".into(),
            ));
        }

        Ok(())
    }
}

fn require_env(name: &str) -> Result<String, StorageError> {
    std::env::var(name)
        .map_err(|_| StorageError::Backend(format!("{} environment variable not set", name)))
}

/// `CopySource` value: bucket plus the percent-encoded key, slashes kept
fn copy_source(bucket: &str, key: &str) -> String {
    let encoded = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", bucket, encoded)
}

fn service_error<E>(action: &str, key: &str, err: SdkError<E, impl std::fmt::Debug>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    if let SdkError::ServiceError(service) = &err {
        if service.err().code() == Some("AccessDenied") {
            return StorageError::AccessDenied(key.to_string());
        }
    }
    error!(key, "S3 {} failed: {}", action, DisplayErrorContext(&err));
    StorageError::Backend(format!(
        "Failed to {} '{}': {}",
        action,
        key,
        DisplayErrorContext(&err)
    ))
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self, data, options), fields(size = data.len()))]
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: PutOptions,
    ) -> Result<(), StorageError> {
        Self::validate_key(key)?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .set_content_type(options.content_type)
            .set_cache_control(options.cache_control)
            .send()
            .await
            .map_err(|e| service_error("put", key, e))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        Self::validate_key(key)?;

        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => {
                debug!("Object not found");
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(service_error("get", key, e)),
        };

        let data = output.body.collect().await.map_err(|e| {
            StorageError::Backend(format!("Failed to read '{}' content: {}", key, e))
        })?;

        Ok(data.into_bytes())
    }

    #[instrument(skip(self))]
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        Self::validate_key(key)?;

        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(Some(ObjectMeta {
                key: key.to_string(),
                size: output.content_length().unwrap_or_default().max(0) as u64,
                content_type: output.content_type().map(str::to_string),
                cache_control: output.cache_control().map(str::to_string),
            })),
            Err(SdkError::ServiceError(err)) if err.err().is_not_found() => Ok(None),
            Err(e) => Err(service_error("head", key, e)),
        }
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Listing, StorageError> {
        let mut listing = Listing::default();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_delimiter(delimiter.map(str::to_string))
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| service_error("list", prefix, e))?;

            listing.keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
            listing.common_prefixes.extend(
                output
                    .common_prefixes()
                    .iter()
                    .filter_map(|common| common.prefix().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(
            keys = listing.keys.len(),
            prefixes = listing.common_prefixes.len(),
            "Listed objects"
        );
        Ok(listing)
    }

    #[instrument(skip(self, options))]
    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        options: PutOptions,
    ) -> Result<(), StorageError> {
        Self::validate_key(src_key)?;
        Self::validate_key(dst_key)?;

        match self
            .client
            .copy_object()
            .bucket(dst_bucket)
            .key(dst_key)
            .copy_source(copy_source(src_bucket, src_key))
            .metadata_directive(MetadataDirective::Replace)
            .set_content_type(options.content_type)
            .set_cache_control(options.cache_control)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(err)) if err.err().code() == Some("NoSuchKey") => Err(
                StorageError::NotFound(format!("{}/{}", src_bucket, src_key)),
            ),
            Err(e) => Err(service_error("copy", dst_key, e)),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        Self::validate_key(key)?;

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| service_error("delete", key, e))?;

        Ok(())
    }
}
