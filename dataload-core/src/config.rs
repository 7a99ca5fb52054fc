// dataload-core/src/config.rs

//! Configuration for readers and the stores they read from.
//!
//! Configuration is parsed from TOML, can be overridden through `DATALOAD_*`
//! environment variables and is validated before a reader is built.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{ReaderError, Result};
use crate::format::Format;
use crate::storage::{self, Compression, DataStore};

// Top-level loader configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub reader: ReaderParams,
    pub storage: StorageConfig,
    pub dataset: DatasetConfig,
    pub format: Format,
}

/// What to do with a final batch holding fewer than `batch_size` instances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastBatchHandling {
    /// Emit the partial batch as is.
    #[default]
    None,
    /// Discard the partial batch.
    Drop,
    /// Fill the missing rows with default values and emit a full batch.
    Pad,
}

/// What to do when a record fails to parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadBatchHandling {
    /// Fail the read with the parse error.
    #[default]
    Error,
    /// Drop the offending record and keep filling the batch.
    Skip,
}

/// Reader parameters. A value of this type is an immutable snapshot that
/// can be shared by several readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderParams {
    /// Number of instances per batch.
    pub batch_size: usize,
    /// Depth of the completed-batch queue; 0 reads synchronously.
    pub num_prefetched_batches: usize,
    /// Number of concurrent parse and assemble pipelines.
    pub num_parallel_reads: usize,
    pub last_batch_handling: LastBatchHandling,
    pub bad_batch_handling: BadBatchHandling,
    /// Log every skipped bad record through the reader's logger.
    pub warn_bad_instances: bool,
    pub num_instances_to_skip: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_instances_to_read: Option<usize>,
    pub shard_index: usize,
    pub num_shards: usize,
    pub shuffle_instances: bool,
    pub shuffle_window: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shuffle_seed: Option<u64>,
    pub reshuffle_each_epoch: bool,
    /// Probability with which each record is admitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsample_ratio: Option<f64>,
}

impl Default for ReaderParams {
    fn default() -> Self {
        Self {
            batch_size: 32,
            num_prefetched_batches: 2,
            num_parallel_reads: 1,
            last_batch_handling: LastBatchHandling::None,
            bad_batch_handling: BadBatchHandling::Error,
            warn_bad_instances: false,
            num_instances_to_skip: 0,
            num_instances_to_read: None,
            shard_index: 0,
            num_shards: 1,
            shuffle_instances: false,
            shuffle_window: 0,
            shuffle_seed: None,
            reshuffle_each_epoch: true,
            subsample_ratio: None,
        }
    }
}

impl ReaderParams {
    /// Returns true when the shuffle buffer does more than pass records
    /// through.
    pub fn shuffles(&self) -> bool {
        self.shuffle_instances && self.shuffle_window > 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ReaderError::config("reader.batch_size must be greater than 0"));
        }
        if self.num_shards == 0 {
            return Err(ReaderError::config("reader.num_shards must be greater than 0"));
        }
        if self.shard_index >= self.num_shards {
            return Err(ReaderError::config(format!(
                "reader.shard_index ({}) must be less than reader.num_shards ({})",
                self.shard_index, self.num_shards
            )));
        }
        if let Some(ratio) = self.subsample_ratio {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ReaderError::config(
                    "reader.subsample_ratio must be in the range (0, 1]",
                ));
            }
        }
        Ok(())
    }
}

// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Chunk size in bytes used when reading records from a store.
    pub buffer_size: usize,
    // Whether to memory-map local files.
    pub use_mmap: bool,
    // File size threshold (bytes) above which local files are memory-mapped.
    pub mmap_threshold: u64,
    /// Compression of files and objects. `infer` decides per store from its
    /// extension.
    pub compression: Compression,
    /// S3-specific configuration, used for `s3://` dataset paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024, // 64 KB
            use_mmap: true,
            mmap_threshold: 1024 * 1024, // 1 MB
            compression: Compression::Infer,
            s3: None,
        }
    }
}

/// S3-compatible storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// AWS region (e.g., "us-east-1").
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    /// Maximum number of retries for failed requests.
    pub max_retries: u32,
    /// Initial delay (milliseconds) between retries.
    pub retry_delay_ms: u64,
    /// Maximum delay (milliseconds) between retries.
    pub max_retry_delay_ms: u64,
    /// Whether to use path-style addressing (required for MinIO).
    pub force_path_style: bool,
    /// Whether to allow HTTP (non-TLS) connections.
    pub allow_http: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            max_retries: 5,
            retry_delay_ms: 100,
            max_retry_delay_ms: 30_000,
            force_path_style: false,
            allow_http: false,
        }
    }
}

impl S3Config {
    /// Apply environment variable overrides to S3 configuration.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("DATALOAD_S3_REGION") {
            self.region = val;
        }
        if let Ok(val) = std::env::var("DATALOAD_S3_ENDPOINT") {
            self.endpoint = Some(val);
        }
        if let Ok(val) = std::env::var("DATALOAD_S3_ACCESS_KEY_ID") {
            self.access_key_id = Some(val);
        }
        if let Ok(val) = std::env::var("DATALOAD_S3_SECRET_ACCESS_KEY") {
            self.secret_access_key = Some(val);
        }
        if let Ok(val) = std::env::var("DATALOAD_S3_SESSION_TOKEN") {
            self.session_token = Some(val);
        }
        if let Ok(val) = std::env::var("DATALOAD_S3_MAX_RETRIES") {
            if let Ok(v) = val.parse() {
                self.max_retries = v;
            }
        }
        if let Ok(val) = std::env::var("DATALOAD_S3_ALLOW_HTTP") {
            if let Ok(v) = val.parse() {
                self.allow_http = v;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.region.is_empty() {
            return Err(ReaderError::config("storage.s3.region must not be empty"));
        }
        if self.retry_delay_ms > self.max_retry_delay_ms {
            return Err(ReaderError::config(
                "storage.s3.retry_delay_ms must not exceed storage.s3.max_retry_delay_ms",
            ));
        }
        Ok(())
    }
}

/// Where the records come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    // Files, directories or `s3://bucket/prefix` URIs, read in order.
    pub paths: Vec<String>,
    // Only files whose name ends with this suffix are taken from directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    // Whether directories are walked recursively.
    pub recursive: bool,
}

impl DatasetConfig {
    pub fn uses_s3(&self) -> bool {
        self.paths.iter().any(|p| p.starts_with("s3://"))
    }

    /// Resolves the configured paths into stores, in order.
    pub fn open_stores(&self, storage: &StorageConfig) -> Result<Vec<Arc<dyn DataStore>>> {
        storage::open_dataset(self, storage)
    }
}

impl FromStr for LoaderConfig {
    type Err = ReaderError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| ReaderError::config_with_source("failed to parse TOML config", e))
    }
}

impl LoaderConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReaderError::storage_with_source(path.display().to_string(), "failed to read config file", e)
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Variables are prefixed with `DATALOAD_` followed by the section name,
    // e.g. `DATALOAD_READER_BATCH_SIZE` overrides `reader.batch_size` and
    // `DATALOAD_DATASET_PATHS` (comma separated) replaces `dataset.paths`.
    // Values that fail to parse are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Reader overrides
        if let Ok(val) = std::env::var("DATALOAD_READER_BATCH_SIZE") {
            if let Ok(v) = val.parse() {
                self.reader.batch_size = v;
            }
        }
        if let Ok(val) = std::env::var("DATALOAD_READER_NUM_PREFETCHED_BATCHES") {
            if let Ok(v) = val.parse() {
                self.reader.num_prefetched_batches = v;
            }
        }
        if let Ok(val) = std::env::var("DATALOAD_READER_NUM_PARALLEL_READS") {
            if let Ok(v) = val.parse() {
                self.reader.num_parallel_reads = v;
            }
        }
        if let Ok(val) = std::env::var("DATALOAD_READER_SHUFFLE_INSTANCES") {
            if let Ok(v) = val.parse() {
                self.reader.shuffle_instances = v;
            }
        }
        if let Ok(val) = std::env::var("DATALOAD_READER_SHUFFLE_WINDOW") {
            if let Ok(v) = val.parse() {
                self.reader.shuffle_window = v;
            }
        }
        if let Ok(val) = std::env::var("DATALOAD_READER_SHUFFLE_SEED") {
            if let Ok(v) = val.parse() {
                self.reader.shuffle_seed = Some(v);
            }
        }
        if let Ok(val) = std::env::var("DATALOAD_READER_SHARD_INDEX") {
            if let Ok(v) = val.parse() {
                self.reader.shard_index = v;
            }
        }
        if let Ok(val) = std::env::var("DATALOAD_READER_NUM_SHARDS") {
            if let Ok(v) = val.parse() {
                self.reader.num_shards = v;
            }
        }

        // Storage overrides
        if let Ok(val) = std::env::var("DATALOAD_STORAGE_BUFFER_SIZE") {
            if let Ok(v) = val.parse() {
                self.storage.buffer_size = v;
            }
        }
        if let Ok(val) = std::env::var("DATALOAD_STORAGE_USE_MMAP") {
            if let Ok(v) = val.parse() {
                self.storage.use_mmap = v;
            }
        }
        if let Ok(val) = std::env::var("DATALOAD_STORAGE_MMAP_THRESHOLD") {
            if let Ok(v) = val.parse() {
                self.storage.mmap_threshold = v;
            }
        }

        // S3 overrides - create S3Config if the region is set
        if std::env::var("DATALOAD_S3_REGION").is_ok() {
            let s3_config = self.storage.s3.take().unwrap_or_default().with_env_overrides();
            self.storage.s3 = Some(s3_config);
        } else if let Some(s3_config) = self.storage.s3.take() {
            self.storage.s3 = Some(s3_config.with_env_overrides());
        }

        // Dataset overrides
        if let Ok(val) = std::env::var("DATALOAD_DATASET_PATHS") {
            self.dataset.paths = val
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }

        self
    }

    // Validate all configuration values.
    pub fn validate(&self) -> Result<()> {
        self.reader.validate()?;

        if self.storage.buffer_size == 0 {
            return Err(ReaderError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }

        if self.dataset.uses_s3() {
            match &self.storage.s3 {
                Some(s3_config) => s3_config.validate()?,
                None => {
                    return Err(ReaderError::config(
                        "storage.s3 configuration is required for s3:// dataset paths",
                    ));
                }
            }
        }

        self.format.validate()
    }
}
