// dataload-core/src/storage/compression.rs

//! Compressed stores.
//!
//! A compressed store is inflated whole when it is opened and then read
//! like an in-memory buffer.

use std::fmt;
use std::io::Read;

use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};

use super::memory::BytesReader;
use super::traits::StorageReader;
use crate::error::{ReaderError, Result};

/// Compression of the bytes of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    /// Chosen from the extension of the store: `.gz`, `.bz2` or `.zip`.
    #[default]
    Infer,
    Gzip,
    Bzip2,
    Zip,
}

impl Compression {
    /// Compression implied by the extension of `path`.
    pub fn from_extension(path: &str) -> Self {
        if path.ends_with(".gz") {
            Self::Gzip
        } else if path.ends_with(".bz2") {
            Self::Bzip2
        } else if path.ends_with(".zip") {
            Self::Zip
        } else {
            Self::None
        }
    }

    /// Replaces [`Compression::Infer`] with the compression implied by
    /// `path`.
    pub fn resolve(self, path: &str) -> Self {
        match self {
            Self::Infer => Self::from_extension(path),
            other => other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Infer => "infer",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Zip => "zip",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Wraps `reader` so that it yields the decompressed bytes of store `id`.
///
/// # Errors
///
/// Returns [`ReaderError::NotSupported`] for bzip2 and zip, and a storage
/// error if the compressed stream is malformed.
pub fn decompress(
    id: &str,
    reader: Box<dyn StorageReader>,
    compression: Compression,
) -> Result<Box<dyn StorageReader>> {
    match compression {
        Compression::None | Compression::Infer => Ok(reader),
        Compression::Gzip => {
            let mut data = Vec::new();
            MultiGzDecoder::new(reader)
                .read_to_end(&mut data)
                .map_err(|e| ReaderError::storage_with_source(id, "failed to inflate gzip data", e))?;
            tracing::debug!(store = id, bytes = data.len(), "inflated gzip store");
            Ok(Box::new(BytesReader::new(Bytes::from(data))))
        }
        Compression::Bzip2 | Compression::Zip => Err(ReaderError::not_supported(format!(
            "the data store '{id}' uses {compression} compression; only gzip is supported"
        ))),
    }
}
