// dataload-core/src/reader.rs

//! The reader: the public entry point that turns a dataset into batches.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dataload_core::config::ReaderParams;
//! use dataload_core::format::Format;
//! use dataload_core::storage::{DataStore, InMemoryStore};
//! use dataload_core::Reader;
//!
//! let stores: Vec<Arc<dyn DataStore>> =
//!     vec![Arc::new(InMemoryStore::new("train", "x,y\n1,2\n3,4\n"))];
//! let params = ReaderParams { batch_size: 2, ..Default::default() };
//!
//! let mut reader = Reader::new(stores, params, Format::default()).unwrap();
//! while let Some(example) = reader.read().unwrap() {
//!     println!("{} instance(s)", example.batch_size());
//! }
//! ```

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{LoaderConfig, ReaderParams};
use crate::dataset::{Pipeline, PrefetchScheduler};
use crate::error::{ReaderError, Result};
use crate::example::Example;
use crate::format::Format;
use crate::logging::{Logger, NoopLogger};
use crate::schema::Schema;
use crate::source::{RecordSource, SharedSource};
use crate::storage::DataStore;

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Lifecycle of a [`Reader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// No pass has started since construction or the last restart.
    Idle,
    Reading,
    /// The current pass delivered every batch.
    Exhausted,
    /// A read failed. The same error is returned by every later pull.
    Failed,
}

/// Builds a [`Reader`].
#[derive(Debug)]
pub struct ReaderBuilder {
    stores: Option<Vec<Arc<dyn DataStore>>>,
    params: ReaderParams,
    format: Option<Format>,
    logger: Arc<dyn Logger>,
    chunk_size: usize,
}

impl Default for ReaderBuilder {
    fn default() -> Self {
        Self {
            stores: None,
            params: ReaderParams::default(),
            format: None,
            logger: Arc::new(NoopLogger),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a loader configuration: its dataset is resolved into
    /// stores and its reader, storage and format sections are applied.
    pub fn with_config(config: &LoaderConfig) -> Result<Self> {
        config.validate()?;
        let stores = config.dataset.open_stores(&config.storage)?;
        Ok(Self::new()
            .dataset(stores)
            .params(config.reader.clone())
            .format(config.format.clone())
            .chunk_size(config.storage.buffer_size))
    }

    /// The stores to read, in order.
    pub fn dataset(mut self, stores: Vec<Arc<dyn DataStore>>) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn params(mut self, params: ReaderParams) -> Self {
        self.params = params;
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Receives warnings about bad records. Defaults to [`NoopLogger`].
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Number of bytes requested from a store per read.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Validates the configuration and builds the reader. No data is read
    /// until the first pull.
    pub fn build(self) -> Result<Reader> {
        let stores = self
            .stores
            .ok_or_else(|| ReaderError::config("a dataset is required to build a reader"))?;
        let format = self
            .format
            .ok_or_else(|| ReaderError::config("a format is required to build a reader"))?;
        if stores.is_empty() {
            return Err(ReaderError::config("the dataset does not contain any data store"));
        }
        if self.chunk_size == 0 {
            return Err(ReaderError::config("the chunk size must be greater than 0"));
        }
        self.params.validate()?;

        let parser = format.build(self.params.batch_size, self.logger.clone())?;
        let base_seed = self.params.shuffle_seed.unwrap_or_else(rand::random);

        let source = SharedSource::new(RecordSource::new(
            stores,
            parser,
            &self.params,
            self.chunk_size,
            base_seed,
        ));

        tracing::debug!(
            format = format.name(),
            batch_size = self.params.batch_size,
            shard_index = self.params.shard_index,
            num_shards = self.params.num_shards,
            "reader built"
        );

        Ok(Reader {
            params: self.params,
            source,
            logger: self.logger,
            batch_counter: Arc::new(AtomicU64::new(0)),
            base_seed,
            master_rng: StdRng::seed_from_u64(base_seed),
            epoch: 0,
            scheduler: None,
            peeked: None,
            state: ReaderState::Idle,
            failure: None,
            failure_yielded: false,
            closed: false,
        })
    }
}

/// Reads batches from a dataset.
///
/// A reader makes passes ("epochs") over its dataset. The first pull starts
/// a pass; [`restart`](Reader::restart) rewinds to the start of the shard
/// and reshuffles according to the configured policy.
#[derive(Debug)]
pub struct Reader {
    params: ReaderParams,
    source: SharedSource,
    logger: Arc<dyn Logger>,
    batch_counter: Arc<AtomicU64>,
    base_seed: u64,
    master_rng: StdRng,
    epoch: u64,
    scheduler: Option<PrefetchScheduler>,
    peeked: Option<Example>,
    state: ReaderState,
    failure: Option<ReaderError>,
    /// Set once the iterator has handed out the stored failure.
    failure_yielded: bool,
    closed: bool,
}

impl Reader {
    pub fn builder() -> ReaderBuilder {
        ReaderBuilder::new()
    }

    /// Builds a reader with the default logger and chunk size.
    pub fn new(stores: Vec<Arc<dyn DataStore>>, params: ReaderParams, format: Format) -> Result<Self> {
        Self::builder().dataset(stores).params(params).format(format).build()
    }

    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        ReaderBuilder::with_config(config)?.build()
    }

    pub fn params(&self) -> &ReaderParams {
        &self.params
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Index of the current pass, starting at 0.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the next batch, or `None` at the end of the pass.
    pub fn read(&mut self) -> Result<Option<Example>> {
        self.ensure_open()?;
        if let Some(example) = self.peeked.take() {
            return Ok(Some(example));
        }
        self.pull()
    }

    /// Returns the next batch without consuming it. Repeated calls return
    /// the same batch until [`read`](Self::read) is called.
    pub fn peek(&mut self) -> Result<Option<&Example>> {
        self.ensure_open()?;
        if self.peeked.is_none() {
            self.peeked = self.pull()?;
        }
        Ok(self.peeked.as_ref())
    }

    /// Returns the schema of the batches, establishing it from the data if
    /// needed. `None` means the dataset is empty and carries no header.
    pub fn schema(&mut self) -> Result<Option<Arc<Schema>>> {
        self.ensure_open()?;
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let schema = self.source.lock()?.schema();
        schema
    }

    /// Rewinds to the start of the shard. Pending batches are discarded.
    ///
    /// # Errors
    ///
    /// Returns the stored error if the reader failed, or
    /// [`ReaderError::Closed`] after [`close`](Self::close).
    pub fn restart(&mut self) -> Result<()> {
        self.ensure_open()?;
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        self.stop_scheduler();
        self.peeked = None;
        if self.state != ReaderState::Idle {
            self.epoch += 1;
        }
        self.state = ReaderState::Idle;
        tracing::debug!(epoch = self.epoch, "reader restarted");
        Ok(())
    }

    /// Stops every worker and releases the stores. Later calls fail with
    /// [`ReaderError::Closed`]. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.stop_scheduler();
        self.peeked = None;
        self.closed = true;
        tracing::debug!("reader closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(ReaderError::Closed);
        }
        Ok(())
    }

    fn pull(&mut self) -> Result<Option<Example>> {
        match self.state {
            ReaderState::Failed => {
                return Err(self
                    .failure
                    .clone()
                    .unwrap_or_else(|| ReaderError::reader("the reader failed")));
            }
            ReaderState::Exhausted => return Ok(None),
            ReaderState::Idle => {
                if let Err(err) = self.start_epoch() {
                    return Err(self.fail(err));
                }
            }
            ReaderState::Reading => {}
        }

        let Some(scheduler) = self.scheduler.as_mut() else {
            return Err(self.fail(ReaderError::reader("no pass is in progress")));
        };

        match scheduler.next() {
            Ok(Some(example)) => Ok(Some(example)),
            Ok(None) => {
                self.stop_scheduler();
                self.state = ReaderState::Exhausted;
                tracing::debug!(epoch = self.epoch, "pass exhausted");
                Ok(None)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn start_epoch(&mut self) -> Result<()> {
        let epoch_seed = if self.params.reshuffle_each_epoch {
            self.master_rng.gen()
        } else {
            self.base_seed
        };
        self.source.lock()?.reset(self.base_seed);

        let depth = self.params.num_prefetched_batches;
        let partitions = if depth == 0 {
            1
        } else {
            self.params.num_parallel_reads.max(1)
        };

        let pipelines = (0..partitions)
            .map(|partition| {
                Pipeline::new(
                    partition,
                    self.source.clone(),
                    &self.params,
                    epoch_seed.wrapping_add(partition as u64),
                    self.logger.clone(),
                    self.batch_counter.clone(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        self.scheduler = Some(PrefetchScheduler::start(pipelines, depth)?);
        self.state = ReaderState::Reading;
        tracing::debug!(epoch = self.epoch, partitions, depth, "pass started");
        Ok(())
    }

    fn fail(&mut self, err: ReaderError) -> ReaderError {
        self.stop_scheduler();
        self.state = ReaderState::Failed;
        self.failure = Some(err.clone());
        tracing::debug!(error = %err, "reader failed");
        err
    }

    fn stop_scheduler(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
    }
}

impl Iterator for Reader {
    type Item = Result<Example>;

    /// Yields batches until the end of the pass. A failure is yielded once,
    /// after which the iterator ends.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failure_yielded {
            return None;
        }
        match self.read() {
            Ok(Some(example)) => Some(Ok(example)),
            Ok(None) => None,
            Err(err) => {
                self.failure_yielded = true;
                Some(Err(err))
            }
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::{Duration, Instant};

    use crate::config::{BadBatchHandling, LastBatchHandling};
    use crate::format::{CsvOptions, TextLineOptions};
    use crate::logging::testing::MemoryLogger;
    use crate::storage::InMemoryStore;
    use crate::tensor::DataType;

    fn stores(data: &[&'static str]) -> Vec<Arc<dyn DataStore>> {
        data.iter()
            .enumerate()
            .map(|(i, d)| Arc::new(InMemoryStore::new(format!("part-{i}"), *d)) as Arc<dyn DataStore>)
            .collect()
    }

    fn numbers(n: usize) -> &'static str {
        let text: String = (0..n).map(|i| format!("{i}\n")).collect();
        Box::leak(text.into_boxed_str())
    }

    fn text_reader(data: &[&'static str], params: ReaderParams) -> Reader {
        Reader::new(stores(data), params, Format::TextLine(TextLineOptions::default())).unwrap()
    }

    fn int_csv() -> Format {
        Format::Csv(CsvOptions {
            header_row_index: None,
            default_data_type: Some(DataType::Int64),
            ..Default::default()
        })
    }

    fn strings(example: &Example) -> Vec<String> {
        example.tensors()[0]
            .as_dense()
            .unwrap()
            .data()
            .as_strings()
            .unwrap()
            .to_vec()
    }

    fn read_all(reader: &mut Reader) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(example) = reader.read().unwrap() {
            out.extend(strings(&example));
        }
        out
    }

    fn expected(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_reads_in_order() {
        let params = ReaderParams {
            batch_size: 4,
            ..Default::default()
        };
        let mut reader = text_reader(&[numbers(6), "6\n7\n"], params);
        assert_eq!(reader.state(), ReaderState::Idle);

        let sizes: Vec<usize> = std::iter::from_fn(|| reader.read().unwrap())
            .map(|e| e.batch_size())
            .collect();
        assert_eq!(sizes, vec![4, 4]);
        assert_eq!(reader.state(), ReaderState::Exhausted);
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn test_synchronous_and_prefetched_agree() {
        for depth in [0, 1, 4] {
            let params = ReaderParams {
                batch_size: 3,
                num_prefetched_batches: depth,
                ..Default::default()
            };
            let mut reader = text_reader(&[numbers(10)], params);
            assert_eq!(read_all(&mut reader), expected(10), "depth {depth}");
        }
    }

    #[test]
    fn test_last_batch_handling() {
        let read = |handling| {
            let params = ReaderParams {
                batch_size: 3,
                last_batch_handling: handling,
                ..Default::default()
            };
            let mut reader = Reader::new(stores(&["1\n2\n3\n4\n"]), params, int_csv()).unwrap();
            let mut batches = Vec::new();
            while let Some(example) = reader.read().unwrap() {
                let data = example.tensors()[0].as_dense().unwrap().data().as_i64().unwrap().to_vec();
                batches.push(data);
            }
            batches
        };

        assert_eq!(read(LastBatchHandling::None), vec![vec![1, 2, 3], vec![4]]);
        assert_eq!(read(LastBatchHandling::Drop), vec![vec![1, 2, 3]]);
        assert_eq!(read(LastBatchHandling::Pad), vec![vec![1, 2, 3], vec![4, 0, 0]]);
    }

    #[test]
    fn test_skip_fills_batches() {
        let logger = Arc::new(MemoryLogger::default());
        let params = ReaderParams {
            batch_size: 2,
            bad_batch_handling: BadBatchHandling::Skip,
            warn_bad_instances: true,
            ..Default::default()
        };
        let mut reader = Reader::builder()
            .dataset(stores(&["1\nx\n2\n3\ny\n4\n"]))
            .params(params)
            .format(int_csv())
            .logger(logger.clone())
            .build()
            .unwrap();

        let mut sizes = Vec::new();
        while let Some(example) = reader.read().unwrap() {
            sizes.push(example.batch_size());
        }
        assert_eq!(sizes, vec![2, 2]);
        assert_eq!(logger.messages().len(), 2);
    }

    #[test]
    fn test_skipped_records_do_not_count_toward_limit() {
        let params = ReaderParams {
            batch_size: 10,
            bad_batch_handling: BadBatchHandling::Skip,
            num_instances_to_read: Some(3),
            ..Default::default()
        };
        let mut reader = Reader::new(stores(&["1\nx\n2\n3\n4\n"]), params, int_csv()).unwrap();
        let example = reader.read().unwrap().unwrap();
        let data = example.tensors()[0].as_dense().unwrap().data().as_i64().unwrap().to_vec();
        assert_eq!(data, vec![1, 2, 3]);
    }

    fn read_ints(reader: &mut Reader) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(example) = reader.read().unwrap() {
            out.extend_from_slice(example.tensors()[0].as_dense().unwrap().data().as_i64().unwrap());
        }
        out
    }

    #[test]
    fn test_limit_with_skip_is_the_same_for_every_shard() {
        for num_shards in [2, 3] {
            let mut union = Vec::new();
            for shard_index in 0..num_shards {
                let params = ReaderParams {
                    batch_size: 2,
                    bad_batch_handling: BadBatchHandling::Skip,
                    num_instances_to_read: Some(3),
                    shard_index,
                    num_shards,
                    ..Default::default()
                };
                let mut reader =
                    Reader::new(stores(&["1\n2\nx\n3\n4\n5\n"]), params, int_csv()).unwrap();
                union.extend(read_ints(&mut reader));
            }
            union.sort_unstable();
            assert_eq!(union, vec![1, 2, 3], "{num_shards} shard(s)");
        }
    }

    #[test]
    fn test_limit_with_skip_ignores_shuffle_and_prefetch() {
        let configs = [
            (true, 4, 0, 1),
            (true, 2, 2, 1),
            (false, 0, 3, 3),
            (true, 3, 2, 2),
        ];
        for (shuffle_instances, shuffle_window, depth, parallel) in configs {
            let params = ReaderParams {
                batch_size: 2,
                bad_batch_handling: BadBatchHandling::Skip,
                num_instances_to_read: Some(3),
                shuffle_instances,
                shuffle_window,
                shuffle_seed: Some(3),
                num_prefetched_batches: depth,
                num_parallel_reads: parallel,
                ..Default::default()
            };
            let mut reader = Reader::new(stores(&["1\nx\n2\n3\n4\n"]), params, int_csv()).unwrap();
            let mut values = read_ints(&mut reader);
            values.sort_unstable();
            assert_eq!(values, vec![1, 2, 3], "window {shuffle_window}, depth {depth}");
        }
    }

    #[test]
    fn test_oversized_lines_follow_bad_record_policy() {
        let format = Format::TextLine(TextLineOptions {
            max_line_length: Some(3),
            ..Default::default()
        });
        let params = ReaderParams {
            batch_size: 4,
            bad_batch_handling: BadBatchHandling::Skip,
            ..Default::default()
        };
        let mut reader = Reader::new(stores(&["ab\nabcdef\ncd\n"]), params, format.clone()).unwrap();
        assert_eq!(read_all(&mut reader), vec!["ab", "cd"]);

        let params = ReaderParams {
            batch_size: 4,
            ..Default::default()
        };
        let mut reader = Reader::new(stores(&["ab\nabcdef\ncd\n"]), params, format).unwrap();
        assert!(matches!(
            reader.read(),
            Err(ReaderError::RecordTooLarge { offset: 3, limit: 3, .. })
        ));
    }

    #[test]
    fn test_reads_gzip_store() {
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(numbers(50).as_bytes()).unwrap();
        let store = InMemoryStore::new("numbers.gz", encoder.finish().unwrap())
            .with_compression(crate::storage::Compression::Gzip)
            .unwrap();

        let params = ReaderParams {
            batch_size: 8,
            ..Default::default()
        };
        let format = Format::TextLine(TextLineOptions::default());
        let stores: Vec<Arc<dyn DataStore>> = vec![Arc::new(store)];
        let mut reader = Reader::new(stores, params, format).unwrap();
        assert_eq!(read_all(&mut reader), expected(50));
    }

    #[test]
    fn test_error_is_terminal() {
        let params = ReaderParams {
            batch_size: 2,
            ..Default::default()
        };
        let mut reader = Reader::new(stores(&["1\n2\nx\n3\n"]), params, int_csv()).unwrap();

        assert!(reader.read().unwrap().is_some());
        let first = reader.read().unwrap_err();
        assert!(first.is_instance_error());
        assert_eq!(reader.state(), ReaderState::Failed);

        let again = reader.read().unwrap_err();
        assert_eq!(first.to_string(), again.to_string());
        assert!(reader.peek().is_err());
        assert!(reader.restart().is_err());
    }

    #[test]
    fn test_iterator_yields_failure_once() {
        let params = ReaderParams {
            batch_size: 1,
            ..Default::default()
        };
        let reader = Reader::new(stores(&["1\nx\n2\n"]), params, int_csv()).unwrap();
        let items: Vec<_> = reader.collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[test]
    fn test_peek_is_idempotent() {
        let params = ReaderParams {
            batch_size: 2,
            ..Default::default()
        };
        let mut reader = text_reader(&["a\nb\nc\n"], params);

        let first = strings(reader.peek().unwrap().unwrap());
        let second = strings(reader.peek().unwrap().unwrap());
        assert_eq!(first, vec!["a", "b"]);
        assert_eq!(first, second);

        assert_eq!(strings(&reader.read().unwrap().unwrap()), vec!["a", "b"]);
        assert_eq!(strings(&reader.read().unwrap().unwrap()), vec!["c"]);
        assert!(reader.peek().unwrap().is_none());
    }

    #[test]
    fn test_restart_rereads() {
        let params = ReaderParams {
            batch_size: 2,
            ..Default::default()
        };
        let mut reader = text_reader(&[numbers(5)], params);
        assert_eq!(read_all(&mut reader), expected(5));
        assert_eq!(reader.epoch(), 0);

        reader.restart().unwrap();
        assert_eq!(reader.epoch(), 1);
        assert_eq!(reader.state(), ReaderState::Idle);
        assert_eq!(read_all(&mut reader), expected(5));

        // Restarting mid-pass discards what is left of it.
        reader.restart().unwrap();
        reader.read().unwrap();
        reader.restart().unwrap();
        assert_eq!(read_all(&mut reader), expected(5));
    }

    #[test]
    fn test_fixed_seed_without_reshuffle_repeats_order() {
        let params = ReaderParams {
            batch_size: 8,
            shuffle_instances: true,
            shuffle_window: 16,
            shuffle_seed: Some(11),
            reshuffle_each_epoch: false,
            ..Default::default()
        };
        let mut reader = text_reader(&[numbers(100)], params);
        let first = read_all(&mut reader);
        reader.restart().unwrap();
        let second = read_all(&mut reader);

        assert_ne!(first, expected(100));
        assert_eq!(first, second);
    }

    #[test]
    fn test_reshuffle_changes_order() {
        let params = ReaderParams {
            batch_size: 8,
            shuffle_instances: true,
            shuffle_window: 32,
            shuffle_seed: Some(11),
            reshuffle_each_epoch: true,
            ..Default::default()
        };
        let mut reader = text_reader(&[numbers(200)], params.clone());
        let first = read_all(&mut reader);
        reader.restart().unwrap();
        let second = read_all(&mut reader);
        assert_ne!(first, second);

        let mut sorted = second.clone();
        sorted.sort_by_key(|v| v.parse::<u32>().unwrap());
        assert_eq!(sorted, expected(200));

        // An explicit seed makes the sequence of passes reproducible.
        let mut again = text_reader(&[numbers(200)], params);
        assert_eq!(read_all(&mut again), first);
    }

    #[test]
    fn test_shards_partition_the_stream() {
        let mut seen = Vec::new();
        for shard_index in 0..3 {
            let params = ReaderParams {
                batch_size: 4,
                shard_index,
                num_shards: 3,
                ..Default::default()
            };
            let mut reader = text_reader(&[numbers(20), "20\n21\n"], params);
            seen.extend(read_all(&mut reader));
        }
        let unique: HashSet<_> = seen.iter().cloned().collect();
        assert_eq!(seen.len(), 22);
        assert_eq!(unique.len(), 22);
    }

    #[test]
    fn test_parallel_reads_deliver_every_record() {
        let params = ReaderParams {
            batch_size: 7,
            num_parallel_reads: 4,
            num_prefetched_batches: 3,
            ..Default::default()
        };
        let mut reader = text_reader(&[numbers(500), numbers(10)], params);
        let mut seen = Vec::new();
        while let Some(example) = reader.read().unwrap() {
            assert!(example.batch_size() <= 7);
            seen.extend(strings(&example));
        }
        assert_eq!(seen.len(), 510);
    }

    #[test]
    fn test_schema_before_reading() {
        let mut reader = Reader::new(
            stores(&["id,label\n1,2\n"]),
            ReaderParams::default(),
            Format::Csv(CsvOptions {
                default_data_type: Some(DataType::Int64),
                ..Default::default()
            }),
        )
        .unwrap();

        let schema = reader.schema().unwrap().unwrap();
        let names: Vec<_> = schema.attributes().iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["id", "label"]);

        let example = reader.read().unwrap().unwrap();
        assert_eq!(example.batch_size(), 1);
    }

    #[test]
    fn test_empty_dataset() {
        let mut reader = Reader::new(stores(&[""]), ReaderParams::default(), int_csv()).unwrap();
        assert!(reader.schema().unwrap().is_none());
        assert!(reader.read().unwrap().is_none());
        assert_eq!(reader.state(), ReaderState::Exhausted);
    }

    #[test]
    fn test_close_with_prefetch_in_flight() {
        let params = ReaderParams {
            batch_size: 1,
            num_parallel_reads: 4,
            num_prefetched_batches: 1,
            ..Default::default()
        };
        let mut reader = text_reader(&[numbers(50_000)], params);
        assert!(reader.read().unwrap().is_some());

        let started = Instant::now();
        reader.close();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(reader.read(), Err(ReaderError::Closed)));
        assert!(matches!(reader.restart(), Err(ReaderError::Closed)));
        reader.close();
    }

    #[test]
    fn test_builder_requires_dataset_and_format() {
        let err = Reader::builder().format(Format::default()).build().unwrap_err();
        assert!(matches!(err, ReaderError::Config { .. }));

        let err = Reader::builder().dataset(stores(&["a\n"])).build().unwrap_err();
        assert!(matches!(err, ReaderError::Config { .. }));

        let err = Reader::builder()
            .dataset(stores(&["a\n"]))
            .format(Format::default())
            .params(ReaderParams {
                batch_size: 0,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, ReaderError::Config { .. }));
    }

    #[test]
    fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a\nb\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "c\n").unwrap();
        std::fs::write(dir.path().join("ignored.bin"), "zzz\n").unwrap();

        let toml = format!(
            r#"
            [reader]
            batch_size = 2

            [dataset]
            paths = ["{}"]
            suffix = ".txt"

            [format]
            kind = "text_line"
            "#,
            dir.path().display()
        );
        let config: LoaderConfig = toml.parse().unwrap();
        let mut reader = Reader::from_config(&config).unwrap();
        assert_eq!(read_all(&mut reader), vec!["a", "b", "c"]);
    }
}
