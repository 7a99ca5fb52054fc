// dataload-core/src/source/reader.rs

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};

use super::framing::{Frame, FramingError, Payload, RecordFraming, Resync};
use crate::error::{ReaderError, Result};
use crate::storage::{DataStore, StorageReader};

/// One raw record read from a store.
#[derive(Debug, Clone)]
pub struct Record {
    /// Identifier of the store the record came from.
    pub store: Arc<str>,
    /// Position of the store in the dataset.
    pub ordinal: usize,
    /// Index of the record within its store, counting from 0.
    pub index: u64,
    /// Byte offset of the record within its store.
    pub offset: u64,
    pub payload: Bytes,
    /// Size limit the record exceeded. The payload of such a record is
    /// empty.
    pub oversized: Option<usize>,
}

impl Record {
    /// Fails with [`ReaderError::RecordTooLarge`] for an oversized record.
    pub fn check_size(&self) -> Result<()> {
        match self.oversized {
            Some(limit) => Err(ReaderError::RecordTooLarge {
                store: self.store.to_string(),
                offset: self.offset,
                limit,
            }),
            None => Ok(()),
        }
    }
}

/// Reads the records of a single store in fixed-size chunks.
pub struct RecordReader {
    store: Arc<str>,
    ordinal: usize,
    reader: Box<dyn StorageReader>,
    framing: Arc<dyn RecordFraming>,
    chunk_size: usize,
    buffer: BytesMut,
    /// Store offset of the first buffered byte.
    offset: u64,
    /// Store offset of the next chunk to read.
    read_pos: u64,
    eof: bool,
    next_index: u64,
    /// Start offset and limit of an oversized record being discarded.
    discarding: Option<(u64, usize)>,
}

impl RecordReader {
    pub fn open(
        ordinal: usize,
        store: &dyn DataStore,
        framing: Arc<dyn RecordFraming>,
        chunk_size: usize,
    ) -> Result<Self> {
        let reader = store.open_read()?;
        Ok(Self {
            store: Arc::from(store.id()),
            ordinal,
            reader,
            framing,
            chunk_size: chunk_size.max(1),
            buffer: BytesMut::new(),
            offset: 0,
            read_pos: 0,
            eof: false,
            next_index: 0,
            discarding: None,
        })
    }

    pub fn store_id(&self) -> &str {
        &self.store
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Returns the next record, or `None` at the end of the store.
    ///
    /// A record over the framing's size limit is skipped over when the
    /// framing can resync, and returned with [`Record::oversized`] set.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some((start, limit)) = self.discarding {
                match self.discard(start, limit)? {
                    Some(record) => return Ok(Some(record)),
                    None => continue,
                }
            }

            let frame = match self.framing.decode(&self.buffer, self.offset, self.eof) {
                Ok(frame) => frame,
                Err(FramingError::TooLarge { limit }) => {
                    self.discarding = Some((self.offset, limit));
                    continue;
                }
                Err(err) => return Err(self.framing_error(err)),
            };

            match frame {
                Frame::Record { payload, consumed } => {
                    let offset = self.offset;
                    let chunk = self.buffer.split_to(consumed).freeze();
                    self.offset += consumed as u64;

                    let payload = match payload {
                        Payload::Range(range) => chunk.slice(range),
                        Payload::Owned(bytes) => bytes,
                    };
                    return Ok(Some(self.emit(offset, payload, None)));
                }
                Frame::Skip { consumed } => self.advance(consumed),
                Frame::Incomplete if self.eof => {
                    if self.buffer.is_empty() {
                        return Ok(None);
                    }
                    return Err(ReaderError::corrupt_record(
                        self.store.as_ref(),
                        self.offset,
                        format!(
                            "the store ends with {} byte(s) of an incomplete record",
                            self.buffer.len()
                        ),
                    ));
                }
                Frame::Incomplete => self.fill()?,
            }
        }
    }

    /// Drops buffered bytes of the oversized record that starts at `start`.
    /// Returns its placeholder once the end is found.
    fn discard(&mut self, start: u64, limit: usize) -> Result<Option<Record>> {
        match self.framing.resync(&self.buffer, self.eof) {
            None => Err(ReaderError::RecordTooLarge {
                store: self.store.to_string(),
                offset: start,
                limit,
            }),
            Some(Resync::Partial { consumed }) if !self.eof => {
                self.advance(consumed);
                self.fill()?;
                Ok(None)
            }
            Some(Resync::Done { consumed } | Resync::Partial { consumed }) => {
                self.advance(consumed);
                self.discarding = None;
                tracing::trace!(store = %self.store, offset = start, limit, "discarded oversized record");
                Ok(Some(self.emit(start, Bytes::new(), Some(limit))))
            }
        }
    }

    fn emit(&mut self, offset: u64, payload: Bytes, oversized: Option<usize>) -> Record {
        let index = self.next_index;
        self.next_index += 1;
        Record {
            store: self.store.clone(),
            ordinal: self.ordinal,
            index,
            offset,
            payload,
            oversized,
        }
    }

    fn advance(&mut self, count: usize) {
        self.buffer.advance(count);
        self.offset += count as u64;
    }

    fn fill(&mut self) -> Result<()> {
        let chunk = self.reader.read_range(self.read_pos, self.chunk_size)?;
        if chunk.is_empty() {
            self.eof = true;
        } else {
            self.read_pos += chunk.len() as u64;
            self.buffer.extend_from_slice(&chunk);
        }
        Ok(())
    }

    fn framing_error(&self, error: FramingError) -> ReaderError {
        match error {
            FramingError::Corrupt(message) => {
                ReaderError::corrupt_record(self.store.as_ref(), self.offset, message)
            }
            FramingError::TooLarge { limit } => ReaderError::RecordTooLarge {
                store: self.store.to_string(),
                offset: self.offset,
                limit,
            },
        }
    }
}
