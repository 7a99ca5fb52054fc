// dataload-core/src/storage/mod.rs

//! Stores that records are read from.
//!
//! Local files, in-memory buffers and (with the `s3` feature) S3 objects all
//! implement [`DataStore`], so a dataset can mix them freely. Each of them
//! can hold gzip-compressed data.
//!
//! # Example
//!
//! ```no_run
//! use dataload_core::config::{DatasetConfig, StorageConfig};
//! use dataload_core::storage::open_dataset;
//!
//! let dataset = DatasetConfig {
//!     paths: vec!["data/train".to_string()],
//!     suffix: Some(".csv".to_string()),
//!     recursive: false,
//! };
//! let stores = open_dataset(&dataset, &StorageConfig::default()).unwrap();
//! for store in &stores {
//!     println!("{}", store.id());
//! }
//! ```

mod compression;
mod local;
mod memory;
mod traits;

pub use compression::{decompress, Compression};
pub use local::{list_files, FileStore};
pub use memory::InMemoryStore;
pub use traits::{DataStore, StorageReader};

// S3 storage (requires feature flag)
#[cfg(feature = "s3")]
mod retry;
#[cfg(feature = "s3")]
mod s3;

#[cfg(feature = "s3")]
pub use retry::RetryPolicy;
#[cfg(feature = "s3")]
pub use s3::{list_objects, parse_s3_uri, S3Store};

use std::path::Path;
use std::sync::Arc;

use crate::config::{DatasetConfig, StorageConfig};
use crate::error::{ReaderError, Result};

/// Resolves the dataset paths into an ordered list of stores.
///
/// Paths are expanded in the order given; directories and S3 prefixes are
/// expanded in lexicographic order.
///
/// # Errors
///
/// Returns an error if a path cannot be listed, or if an `s3://` path is
/// given without the `s3` feature or an S3 configuration.
pub fn open_dataset(
    dataset: &DatasetConfig,
    storage: &StorageConfig,
) -> Result<Vec<Arc<dyn DataStore>>> {
    let mut stores: Vec<Arc<dyn DataStore>> = Vec::new();

    for path in &dataset.paths {
        if path.starts_with("s3://") {
            stores.extend(open_s3(path, dataset, storage)?);
            continue;
        }

        for file in list_files(Path::new(path), dataset.suffix.as_deref(), dataset.recursive)? {
            stores.push(Arc::new(FileStore::new(file, storage)));
        }
    }

    tracing::debug!(stores = stores.len(), "resolved dataset");
    Ok(stores)
}

#[cfg(feature = "s3")]
fn open_s3(
    uri: &str,
    dataset: &DatasetConfig,
    storage: &StorageConfig,
) -> Result<Vec<Arc<dyn DataStore>>> {
    let config = storage
        .s3
        .as_ref()
        .ok_or_else(|| ReaderError::config("storage.s3 configuration is required for s3:// dataset paths"))?;
    Ok(list_objects(uri, config, dataset.suffix.as_deref(), storage.compression)?
        .into_iter()
        .map(|store| Arc::new(store) as Arc<dyn DataStore>)
        .collect())
}

#[cfg(not(feature = "s3"))]
fn open_s3(
    uri: &str,
    _dataset: &DatasetConfig,
    _storage: &StorageConfig,
) -> Result<Vec<Arc<dyn DataStore>>> {
    Err(ReaderError::not_supported(format!(
        "'{uri}' requires the `s3` feature"
    )))
}
