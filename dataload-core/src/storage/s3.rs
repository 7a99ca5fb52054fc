// dataload-core/src/storage/s3.rs

//! S3-compatible stores using the object_store crate.
//!
//! Objects are fetched whole on open with retries, then served from memory.
//! Requests run on a small tokio runtime owned by the stores, so readers
//! stay synchronous. Opening a store from inside another tokio runtime is
//! not supported.

use std::fmt;
use std::sync::Arc;

use futures::TryStreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tokio::runtime::Runtime;

use super::compression::{decompress, Compression};
use super::memory::BytesReader;
use super::retry::{with_retries, RetryPolicy};
use super::traits::{DataStore, StorageReader};
use crate::config::S3Config;
use crate::error::{ReaderError, Result};

/// One object in an S3 bucket.
pub struct S3Store {
    id: String,
    store: Arc<AmazonS3>,
    path: ObjectPath,
    retry_policy: RetryPolicy,
    runtime: Arc<Runtime>,
    compression: Compression,
}

impl fmt::Debug for S3Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Store").field("id", &self.id).finish()
    }
}

/// Splits `s3://bucket/key` into its bucket and key.
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let rest = uri
        .strip_prefix("s3://")
        .ok_or_else(|| ReaderError::config(format!("'{uri}' is not an s3:// URI")))?;
    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(ReaderError::config(format!("'{uri}' does not name a bucket")));
    }
    Ok((bucket.to_string(), key.to_string()))
}

fn build_client(config: &S3Config, bucket: &str) -> Result<AmazonS3> {
    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region(&config.region);

    // Set endpoint if provided (for MinIO, LocalStack, etc.)
    if let Some(endpoint) = &config.endpoint {
        builder = builder.with_endpoint(endpoint);
    }

    if let Some(access_key) = &config.access_key_id {
        builder = builder.with_access_key_id(access_key);
    }
    if let Some(secret_key) = &config.secret_access_key {
        builder = builder.with_secret_access_key(secret_key);
    }
    if let Some(token) = &config.session_token {
        builder = builder.with_token(token);
    }

    // Configure path style (required for MinIO)
    if config.force_path_style {
        builder = builder.with_virtual_hosted_style_request(false);
    }

    if config.allow_http {
        builder = builder.with_allow_http(true);
    }

    builder
        .build()
        .map_err(|e| ReaderError::config_with_source("failed to build S3 client", e))
}

fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("dataload-s3")
        .enable_all()
        .build()
        .map_err(|e| ReaderError::storage_with_source("s3", "failed to start I/O runtime", e))
}

/// Determines if an error is retryable.
fn is_retryable_error(error: &object_store::Error) -> bool {
    match error {
        object_store::Error::NotFound { .. }
        | object_store::Error::InvalidPath { .. }
        | object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. } => false,
        object_store::Error::Generic { .. } => true,
        other => {
            let message = other.to_string();
            message.contains("timeout")
                || message.contains("connection")
                || message.contains("503")
                || message.contains("500")
        }
    }
}

fn convert_error(id: &str, message: &str, error: object_store::Error) -> ReaderError {
    ReaderError::storage(id, format!("{message}: {error}"))
}

/// Expands an `s3://bucket/key` URI into stores.
///
/// A key that is empty or ends with `/` is treated as a prefix and listed;
/// objects are returned in key order, filtered by `suffix` when given.
/// Any other key names a single object.
///
/// `compression` applies to every object; `infer` is resolved per key.
pub fn list_objects(
    uri: &str,
    config: &S3Config,
    suffix: Option<&str>,
    compression: Compression,
) -> Result<Vec<S3Store>> {
    let (bucket, key) = parse_s3_uri(uri)?;
    let store = Arc::new(build_client(config, &bucket)?);
    let runtime = Arc::new(build_runtime()?);
    let retry_policy = RetryPolicy::from(config);

    let make_store = |path: ObjectPath| {
        let id = format!("s3://{bucket}/{path}");
        S3Store {
            compression: compression.resolve(&id),
            id,
            store: store.clone(),
            path,
            retry_policy: retry_policy.clone(),
            runtime: runtime.clone(),
        }
    };

    if !key.is_empty() && !key.ends_with('/') {
        return Ok(vec![make_store(ObjectPath::from(key.as_str()))]);
    }

    let prefix = ObjectPath::from(key.trim_end_matches('/'));
    let listed = runtime.block_on(with_retries(&retry_policy, is_retryable_error, || {
        let store = store.clone();
        let prefix = prefix.clone();
        async move { store.list(Some(&prefix)).try_collect::<Vec<_>>().await }
    }));
    let mut objects = listed.map_err(|e| convert_error(uri, "failed to list objects", e))?;
    objects.sort_by(|a, b| a.location.as_ref().cmp(b.location.as_ref()));

    Ok(objects
        .into_iter()
        .map(|meta| meta.location)
        .filter(|location| suffix.map_or(true, |s| location.as_ref().ends_with(s)))
        .map(make_store)
        .collect())
}

impl DataStore for S3Store {
    fn id(&self) -> &str {
        &self.id
    }

    fn open_read(&self) -> Result<Box<dyn StorageReader>> {
        let data = self
            .runtime
            .block_on(with_retries(&self.retry_policy, is_retryable_error, || {
                let store = self.store.clone();
                let path = self.path.clone();
                async move { store.get(&path).await?.bytes().await }
            }))
            .map_err(|e| convert_error(&self.id, "failed to fetch object", e))?;

        tracing::debug!(store = %self.id, bytes = data.len(), "fetched object");
        decompress(&self.id, Box::new(BytesReader::new(data)), self.compression)
    }
}
