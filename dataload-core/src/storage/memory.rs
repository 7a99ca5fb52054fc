// dataload-core/src/storage/memory.rs

use std::io::{Cursor, Read, Seek, SeekFrom};

use bytes::Bytes;

use super::compression::{decompress, Compression};
use super::traits::{clamp_range, DataStore, StorageReader};
use crate::error::{ReaderError, Result};

/// A store backed by an in-memory buffer.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    id: String,
    data: Bytes,
    compression: Compression,
}

impl InMemoryStore {
    pub fn new(id: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
            compression: Compression::None,
        }
    }

    /// Declares the buffer compressed. A buffer has no extension, so
    /// `infer` is rejected.
    pub fn with_compression(mut self, compression: Compression) -> Result<Self> {
        if compression == Compression::Infer {
            return Err(ReaderError::not_supported(format!(
                "the in-memory store '{}' cannot infer its compression",
                self.id
            )));
        }
        self.compression = compression;
        Ok(self)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl DataStore for InMemoryStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn open_read(&self) -> Result<Box<dyn StorageReader>> {
        let reader = Box::new(BytesReader::new(self.data.clone()));
        decompress(&self.id, reader, self.compression)
    }
}

/// Reader over a shared buffer. Also used for objects fetched whole from
/// remote stores.
pub(crate) struct BytesReader {
    cursor: Cursor<Bytes>,
}

impl BytesReader {
    pub(crate) fn new(data: Bytes) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }
}

impl Read for BytesReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for BytesReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StorageReader for BytesReader {
    fn size(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>> {
        let length = clamp_range(self.size(), start, length);
        if length == 0 {
            return Ok(Vec::new());
        }
        let start = start as usize;
        Ok(self.cursor.get_ref()[start..start + length].to_vec())
    }
}
