// dataload-core/src/source/mod.rs

//! The record source: stores in, admitted raw records out.
//!
//! A [`RecordSource`] walks the dataset's stores in order, lets the parser
//! consume per-store headers, and applies skip, limit, shard and subsample
//! decisions. Partitions share one source behind a mutex, so each record is
//! handed to exactly one of them.
//!
//! Under the skip policy a read limit counts only records that parse. That
//! is decided here, on the whole stream and before sharding, so every shard
//! and every shuffle or prefetch setting sees the same limit.

mod framing;
mod reader;
mod sharding;

pub use framing::{
    Frame, FramingError, LineFraming, Payload, RecordFraming, Resync, WholeStoreFraming,
};
pub(crate) use framing::{bom_len, trim_cr};
pub use reader::{Record, RecordReader};
pub use sharding::{shard_of, Admission, AdmissionFilter};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{BadBatchHandling, ReaderParams};
use crate::error::{ReaderError, Result};
use crate::format::{parse_record, RecordParser};
use crate::schema::Schema;
use crate::storage::DataStore;

pub struct RecordSource {
    stores: Vec<Arc<dyn DataStore>>,
    parser: Arc<dyn RecordParser>,
    chunk_size: usize,
    current: Option<RecordReader>,
    next_store: usize,
    filter: AdmissionFilter,
    skip_bad: bool,
    /// Admitted records pulled early to establish the schema.
    pending: VecDeque<Record>,
    exhausted: bool,
}

impl std::fmt::Debug for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSource")
            .field("stores", &self.stores.len())
            .field("parser", &self.parser.name())
            .field("next_store", &self.next_store)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl RecordSource {
    pub fn new(
        stores: Vec<Arc<dyn DataStore>>,
        parser: Arc<dyn RecordParser>,
        params: &ReaderParams,
        chunk_size: usize,
        seed: u64,
    ) -> Self {
        Self {
            stores,
            parser,
            chunk_size,
            current: None,
            next_store: 0,
            filter: AdmissionFilter::new(params, seed),
            skip_bad: params.bad_batch_handling == BadBatchHandling::Skip,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn parser(&self) -> &Arc<dyn RecordParser> {
        &self.parser
    }

    /// Returns the next admitted record.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if let Some(record) = self.pending.pop_front() {
            return Ok(Some(record));
        }
        self.next_admitted()
    }

    /// Returns the schema, pulling (but not consuming) admitted records
    /// until it is established.
    pub fn schema(&mut self) -> Result<Option<Arc<Schema>>> {
        while self.parser.schema().is_none() {
            let Some(record) = self.next_admitted()? else {
                return self.parser.infer_schema(None);
            };
            self.pending.push_back(record);
        }
        Ok(self.parser.schema())
    }

    /// Rewinds to the first store. The established schema is kept.
    pub fn reset(&mut self, seed: u64) {
        self.current = None;
        self.next_store = 0;
        self.pending.clear();
        self.exhausted = false;
        self.filter.reset(seed);
    }

    fn next_admitted(&mut self) -> Result<Option<Record>> {
        while !self.exhausted {
            let Some(record) = self.next_raw()? else {
                self.exhausted = true;
                break;
            };
            if self.filter.skips() {
                continue;
            }

            // The first record past the skip establishes the schema.
            if self.parser.schema().is_none() {
                if record.oversized.is_none() {
                    self.parser.infer_schema(Some(&record))?;
                } else if !self.skip_bad {
                    record.check_size()?;
                }
            }

            let counted = !(self.skip_bad && self.filter.limits_reads() && self.is_bad(&record));
            match self.filter.admit(counted) {
                Admission::Admit => return Ok(Some(record)),
                Admission::Reject => continue,
                Admission::Exhausted => self.exhausted = true,
            }
        }
        Ok(None)
    }

    /// True if the skip policy will drop `record`.
    fn is_bad(&self, record: &Record) -> bool {
        if record.oversized.is_some() {
            return true;
        }
        if self.parser.schema().is_none() {
            return false;
        }
        matches!(parse_record(self.parser.as_ref(), record), Err(err) if err.is_instance_error())
    }

    fn next_raw(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                if let Some(record) = reader.next_record()? {
                    return Ok(Some(record));
                }
                tracing::trace!(store = reader.store_id(), "store exhausted");
                self.current = None;
            }

            let Some(store) = self.stores.get(self.next_store).cloned() else {
                return Ok(None);
            };
            let ordinal = self.next_store;
            self.next_store += 1;

            let mut reader =
                RecordReader::open(ordinal, store.as_ref(), self.parser.framing(), self.chunk_size)?;
            self.parser.open_store(&mut reader)?;
            self.current = Some(reader);
        }
    }
}

/// A record source shared by all partitions of a reader.
#[derive(Debug, Clone)]
pub struct SharedSource {
    inner: Arc<Mutex<RecordSource>>,
}

impl SharedSource {
    pub fn new(source: RecordSource) -> Self {
        Self {
            inner: Arc::new(Mutex::new(source)),
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, RecordSource>> {
        self.inner
            .lock()
            .map_err(|_| ReaderError::reader("record source lock poisoned"))
    }
}
