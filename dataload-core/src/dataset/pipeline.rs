// dataload-core/src/dataset/pipeline.rs

//! One partition's fetch, shuffle, parse and assemble loop.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use super::batch::{BatchAssembler, RecordInput};
use super::shuffle::ShuffleBuffer;
use crate::config::ReaderParams;
use crate::error::Result;
use crate::example::Example;
use crate::format::RecordParser;
use crate::logging::Logger;
use crate::schema::Schema;
use crate::source::{Record, SharedSource};

/// Pulls admitted records from the shared source through this partition's
/// shuffle buffer.
#[derive(Debug)]
struct PartitionInput {
    source: SharedSource,
    shuffle: ShuffleBuffer<Record>,
}

impl RecordInput for PartitionInput {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let source = &self.source;
        self.shuffle.next(|| source.lock()?.next_record())
    }
}

/// A producer of batches for one partition of a reader.
#[derive(Debug)]
pub struct Pipeline {
    partition: usize,
    input: PartitionInput,
    parser: Arc<dyn RecordParser>,
    assembler: BatchAssembler,
    schema: Option<Arc<Schema>>,
}

impl Pipeline {
    /// Creates the pipeline of `partition`. `shuffle_seed` seeds its
    /// shuffle buffer when the parameters enable shuffling.
    pub fn new(
        partition: usize,
        source: SharedSource,
        params: &ReaderParams,
        shuffle_seed: u64,
        logger: Arc<dyn Logger>,
        batch_counter: Arc<AtomicU64>,
    ) -> Result<Self> {
        let parser = source.lock()?.parser().clone();
        let shuffle = if params.shuffles() {
            ShuffleBuffer::new(params.shuffle_window, shuffle_seed)
        } else {
            ShuffleBuffer::passthrough()
        };

        Ok(Self {
            partition,
            input: PartitionInput { source, shuffle },
            parser,
            assembler: BatchAssembler::new(params, logger, batch_counter),
            schema: None,
        })
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    /// Produces the next batch, or `None` once this partition is drained.
    pub fn next_batch(&mut self) -> Result<Option<Example>> {
        let schema = match &self.schema {
            Some(schema) => schema.clone(),
            None => {
                let Some(schema) = self.input.source.lock()?.schema()? else {
                    return Ok(None);
                };
                self.schema = Some(schema.clone());
                schema
            }
        };

        self.assembler
            .assemble(&schema, self.parser.as_ref(), &mut self.input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Format, TextLineOptions};
    use crate::logging::NoopLogger;
    use crate::source::RecordSource;
    use crate::storage::{DataStore, InMemoryStore};

    fn source(data: &'static str, params: &ReaderParams) -> SharedSource {
        let stores: Vec<Arc<dyn DataStore>> = vec![Arc::new(InMemoryStore::new("m", data))];
        let parser = Format::TextLine(TextLineOptions::default())
            .build(params.batch_size, Arc::new(NoopLogger))
            .unwrap();
        SharedSource::new(RecordSource::new(stores, parser, params, 16, 0))
    }

    fn pipeline(partition: usize, source: SharedSource, params: &ReaderParams, seed: u64) -> Pipeline {
        Pipeline::new(
            partition,
            source,
            params,
            seed,
            Arc::new(NoopLogger),
            Arc::new(AtomicU64::new(0)),
        )
        .unwrap()
    }

    fn values(example: &Example) -> Vec<String> {
        example.tensors()[0]
            .as_dense()
            .unwrap()
            .data()
            .as_strings()
            .unwrap()
            .to_vec()
    }

    fn drain(pipeline: &mut Pipeline) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        while let Some(example) = pipeline.next_batch().unwrap() {
            out.push(values(&example));
        }
        out
    }

    #[test]
    fn test_batches_in_order() {
        let params = ReaderParams {
            batch_size: 2,
            ..Default::default()
        };
        let mut p = pipeline(0, source("a\nb\nc\n", &params), &params, 0);
        assert_eq!(drain(&mut p), vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn test_empty_dataset() {
        let params = ReaderParams::default();
        let mut p = pipeline(0, source("", &params), &params, 0);
        assert!(p.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_shuffled_batches() {
        let params = ReaderParams {
            batch_size: 4,
            shuffle_instances: true,
            shuffle_window: 8,
            ..Default::default()
        };
        let data = "0\n1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n11\n";
        let mut p = pipeline(0, source(data, &params), &params, 5);
        let mut all: Vec<String> = drain(&mut p).into_iter().flatten().collect();
        assert_ne!(all, (0..12).map(|i| i.to_string()).collect::<Vec<_>>());
        all.sort_by_key(|v| v.parse::<u32>().unwrap());
        assert_eq!(all, (0..12).map(|i| i.to_string()).collect::<Vec<_>>());
    }

    #[test]
    fn test_partitions_share_source() {
        let params = ReaderParams {
            batch_size: 1,
            ..Default::default()
        };
        let shared = source("a\nb\nc\nd\n", &params);
        let mut first = pipeline(0, shared.clone(), &params, 0);
        let mut second = pipeline(1, shared, &params, 1);

        let a = first.next_batch().unwrap().unwrap();
        let b = second.next_batch().unwrap().unwrap();
        assert_eq!(values(&a), vec!["a"]);
        assert_eq!(values(&b), vec!["b"]);
        assert_eq!(drain(&mut first).len() + drain(&mut second).len(), 2);
    }
}
