// dataload-core/src/storage/traits.rs

//! Storage abstraction traits.
//!
//! A dataset is an ordered list of [`DataStore`]s. Each store is opened
//! independently and read through a [`StorageReader`], so local files,
//! in-memory buffers and remote objects can be mixed freely.

use std::fmt;
use std::io::{Read, Seek};

use crate::error::Result;

/// A handle for reading from a store.
///
/// This trait extends `Read` and `Seek` with additional methods for
/// efficient random access.
pub trait StorageReader: Read + Seek + Send {
    /// Returns the total size of the store in bytes.
    fn size(&self) -> u64;

    /// Reads up to `length` bytes starting at `start`.
    ///
    /// Returns fewer bytes than requested only when the range runs past the
    /// end of the store, and an empty buffer when `start` is at or beyond
    /// the end.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>>;
}

/// A named source of bytes, such as a file or an object.
///
/// # Object Safety
///
/// This trait is object-safe and is used as `Arc<dyn DataStore>`.
pub trait DataStore: Send + Sync + fmt::Debug {
    /// Identifier used in error messages and logs (usually a path or URI).
    fn id(&self) -> &str;

    /// Opens the store for reading from the beginning.
    ///
    /// # Errors
    ///
    /// Returns an error if the store doesn't exist or cannot be opened.
    fn open_read(&self) -> Result<Box<dyn StorageReader>>;
}

/// Clamps a requested range to a store of `size` bytes.
pub(crate) fn clamp_range(size: u64, start: u64, length: usize) -> usize {
    if start >= size {
        return 0;
    }
    let remaining = size - start;
    usize::try_from(remaining).map_or(length, |r| r.min(length))
}
