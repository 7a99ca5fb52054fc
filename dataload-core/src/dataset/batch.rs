// dataload-core/src/dataset/batch.rs

//! Batch assembly: instances in, [`Example`]s out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{BadBatchHandling, LastBatchHandling, ReaderParams};
use crate::error::{ReaderError, Result};
use crate::example::Example;
use crate::format::{parse_record, Instance, RecordParser};
use crate::logging::Logger;
use crate::schema::Schema;
use crate::source::Record;
use crate::tensor::{ArrayData, DenseTensor, Tensor, Value};

/// Columnar storage for one batch, preallocated to the full batch size.
#[derive(Debug)]
pub struct BatchBuilder {
    schema: Arc<Schema>,
    batch_size: usize,
    columns: Vec<ArrayData>,
    len: usize,
}

impl BatchBuilder {
    pub fn new(schema: Arc<Schema>, batch_size: usize) -> Self {
        let columns = schema
            .attributes()
            .iter()
            .map(|a| ArrayData::zeros(a.data_type(), batch_size * a.elements_per_instance()))
            .collect();
        Self {
            schema,
            batch_size,
            columns,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.batch_size
    }

    /// Appends one instance. Values must match the schema in count and type.
    pub fn push(&mut self, instance: &Instance) -> Result<()> {
        if self.is_full() {
            return Err(ReaderError::reader("the batch is already full"));
        }
        if instance.values.len() != self.columns.len() {
            return Err(ReaderError::schema(format!(
                "the instance #{} in the data store '{}' has {} value(s) while the schema has {} attribute(s)",
                instance.index,
                instance.store,
                instance.values.len(),
                self.columns.len()
            )));
        }

        for ((column, attr), value) in self
            .columns
            .iter_mut()
            .zip(self.schema.attributes())
            .zip(&instance.values)
        {
            let per_instance = attr.elements_per_instance();
            if let Value::Array(data) = value {
                if data.len() != per_instance {
                    return Err(ReaderError::schema(format!(
                        "the attribute '{}' expects {per_instance} element(s) per instance, got {}",
                        attr.name(),
                        data.len()
                    )));
                }
            }
            column.write(self.len * per_instance, value)?;
        }
        self.len += 1;
        Ok(())
    }

    /// Turns the collected rows into an example. A partial batch is handled
    /// according to `handling`; an empty one yields `None`.
    pub fn finish(self, handling: LastBatchHandling) -> Result<Option<Example>> {
        if self.len == 0 {
            return Ok(None);
        }

        let rows = if self.len == self.batch_size {
            self.batch_size
        } else {
            match handling {
                LastBatchHandling::Drop => return Ok(None),
                LastBatchHandling::Pad => self.batch_size,
                LastBatchHandling::None => self.len,
            }
        };

        let tensors = self
            .columns
            .into_iter()
            .zip(self.schema.attributes())
            .map(|(mut data, attr)| {
                data.truncate(rows * attr.elements_per_instance());
                let mut shape = attr.shape().to_vec();
                shape[0] = rows;
                DenseTensor::new(shape, data).map(Tensor::from)
            })
            .collect::<Result<Vec<_>>>()?;

        Example::new(self.schema, tensors).map(Some)
    }
}

/// Where an assembler pulls raw records from.
pub trait RecordInput {
    fn next_record(&mut self) -> Result<Option<Record>>;
}

/// Parses records and collects them into batches, applying the bad-record
/// and last-batch policies.
#[derive(Debug)]
pub struct BatchAssembler {
    batch_size: usize,
    last_batch: LastBatchHandling,
    bad_batch: BadBatchHandling,
    warn_bad_instances: bool,
    logger: Arc<dyn Logger>,
    batch_counter: Arc<AtomicU64>,
}

impl BatchAssembler {
    pub fn new(params: &ReaderParams, logger: Arc<dyn Logger>, batch_counter: Arc<AtomicU64>) -> Self {
        Self {
            batch_size: params.batch_size,
            last_batch: params.last_batch_handling,
            bad_batch: params.bad_batch_handling,
            warn_bad_instances: params.warn_bad_instances,
            logger,
            batch_counter,
        }
    }

    /// Assembles the next batch, or returns `None` once `input` is drained.
    pub fn assemble(
        &self,
        schema: &Arc<Schema>,
        parser: &dyn RecordParser,
        input: &mut dyn RecordInput,
    ) -> Result<Option<Example>> {
        let mut builder = BatchBuilder::new(schema.clone(), self.batch_size);
        let mut skipped = 0usize;

        while !builder.is_full() {
            let Some(record) = input.next_record()? else {
                break;
            };

            match parse_record(parser, &record) {
                Ok(instance) => builder.push(&instance)?,
                Err(err) if err.is_instance_error() && self.bad_batch == BadBatchHandling::Skip => {
                    skipped += 1;
                    if self.warn_bad_instances {
                        self.logger.warn(&format!(
                            "The instance #{} in the data store '{}' has been skipped: {err}",
                            record.index, record.store
                        ));
                    }
                }
                Err(err) => return Err(err),
            }
        }

        let rows = builder.len();
        let example = builder.finish(self.last_batch)?;
        if example.is_some() {
            let index = self.batch_counter.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(batch = index, rows, skipped, "assembled batch");
        }
        Ok(example)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Format, TextLineOptions};
    use crate::logging::testing::MemoryLogger;
    use crate::logging::NoopLogger;
    use crate::schema::Attribute;
    use crate::tensor::DataType;
    use bytes::Bytes;

    fn int_schema(batch_size: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![Attribute::new("x", DataType::Int64, vec![batch_size, 1])]).unwrap())
    }

    fn instance(x: i64) -> Instance {
        Instance {
            store: Arc::from("s"),
            index: x as u64,
            values: vec![Value::Int64(x)],
        }
    }

    fn column(example: &Example) -> Vec<i64> {
        example.tensors()[0]
            .as_dense()
            .unwrap()
            .data()
            .as_i64()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_full_batch() {
        let mut builder = BatchBuilder::new(int_schema(2), 2);
        builder.push(&instance(1)).unwrap();
        builder.push(&instance(2)).unwrap();
        assert!(builder.is_full());
        assert!(builder.push(&instance(3)).is_err());

        let example = builder.finish(LastBatchHandling::Drop).unwrap().unwrap();
        assert_eq!(example.batch_size(), 2);
        assert_eq!(column(&example), vec![1, 2]);
    }

    #[test]
    fn test_last_batch_handling() {
        let partial = || {
            let mut builder = BatchBuilder::new(int_schema(4), 4);
            builder.push(&instance(7)).unwrap();
            builder
        };

        let none = partial().finish(LastBatchHandling::None).unwrap().unwrap();
        assert_eq!(none.batch_size(), 1);
        assert_eq!(none.tensors()[0].shape(), &[1, 1]);

        assert!(partial().finish(LastBatchHandling::Drop).unwrap().is_none());

        let pad = partial().finish(LastBatchHandling::Pad).unwrap().unwrap();
        assert_eq!(pad.tensors()[0].shape(), &[4, 1]);
        assert_eq!(column(&pad), vec![7, 0, 0, 0]);

        let empty = BatchBuilder::new(int_schema(4), 4);
        assert!(empty.finish(LastBatchHandling::Pad).unwrap().is_none());
    }

    #[test]
    fn test_pad_strings_with_empty_values() {
        let schema = Arc::new(
            Schema::new(vec![Attribute::new("s", DataType::String, vec![3, 1])]).unwrap(),
        );
        let mut builder = BatchBuilder::new(schema, 3);
        builder
            .push(&Instance {
                store: Arc::from("s"),
                index: 0,
                values: vec![Value::String("a".into())],
            })
            .unwrap();
        let example = builder.finish(LastBatchHandling::Pad).unwrap().unwrap();
        let data = example.tensors()[0].as_dense().unwrap().data().as_strings().unwrap().to_vec();
        assert_eq!(data, vec!["a".to_string(), String::new(), String::new()]);
    }

    #[test]
    fn test_value_count_mismatch() {
        let mut builder = BatchBuilder::new(int_schema(2), 2);
        let mut bad = instance(1);
        bad.values.push(Value::Int64(2));
        assert!(matches!(builder.push(&bad), Err(ReaderError::Schema { .. })));
    }

    /// Serves lines as records. A `None` line stands for a record the
    /// framing discarded as oversized.
    struct Lines {
        lines: std::vec::IntoIter<Option<&'static str>>,
        index: u64,
    }

    impl Lines {
        fn new(lines: Vec<&'static str>) -> Self {
            Self::with_oversized(lines.into_iter().map(Some).collect())
        }

        fn with_oversized(lines: Vec<Option<&'static str>>) -> Self {
            Self {
                lines: lines.into_iter(),
                index: 0,
            }
        }
    }

    impl RecordInput for Lines {
        fn next_record(&mut self) -> Result<Option<Record>> {
            Ok(self.lines.next().map(|line| {
                self.index += 1;
                Record {
                    store: Arc::from("mem"),
                    ordinal: 0,
                    index: self.index - 1,
                    offset: 0,
                    payload: Bytes::from_static(line.unwrap_or_default().as_bytes()),
                    oversized: if line.is_none() { Some(8) } else { None },
                }
            }))
        }
    }

    fn assembler(params: ReaderParams, logger: Arc<dyn Logger>) -> BatchAssembler {
        BatchAssembler::new(&params, logger, Arc::new(AtomicU64::new(0)))
    }

    fn schema_for(parser: &Arc<dyn RecordParser>, first: &str) -> Arc<Schema> {
        let record = Record {
            store: Arc::from("mem"),
            ordinal: 0,
            index: 0,
            offset: 0,
            payload: Bytes::copy_from_slice(first.as_bytes()),
            oversized: None,
        };
        parser.infer_schema(Some(&record)).unwrap().unwrap()
    }

    #[test]
    fn test_skip_reaches_full_batch() {
        let params = ReaderParams {
            batch_size: 3,
            bad_batch_handling: BadBatchHandling::Skip,
            warn_bad_instances: true,
            ..Default::default()
        };
        let logger = Arc::new(MemoryLogger::default());
        let assembler = assembler(params, logger.clone());
        let parser = int_csv();
        let schema = schema_for(&parser, "1");

        let mut input = Lines::new(vec!["1", "x", "2", "y", "3", "4"]);
        let example = assembler.assemble(&schema, parser.as_ref(), &mut input).unwrap().unwrap();
        assert_eq!(column(&example), vec![1, 2, 3]);
        assert_eq!(logger.messages().len(), 2);

        let last = assembler.assemble(&schema, parser.as_ref(), &mut input).unwrap().unwrap();
        assert_eq!(column(&last), vec![4]);
        assert!(assembler.assemble(&schema, parser.as_ref(), &mut input).unwrap().is_none());
    }

    #[test]
    fn test_error_policy_aborts_batch() {
        let params = ReaderParams {
            batch_size: 3,
            ..Default::default()
        };
        let assembler = assembler(params, Arc::new(NoopLogger));
        let parser = int_csv();
        let schema = schema_for(&parser, "1");

        let mut input = Lines::new(vec!["1", "x", "2"]);
        let err = assembler.assemble(&schema, parser.as_ref(), &mut input).unwrap_err();
        assert!(matches!(err, ReaderError::InvalidInstance { instance: 1, .. }));
    }

    #[test]
    fn test_oversized_records_follow_policy() {
        let parser = int_csv();
        let schema = schema_for(&parser, "1");
        let records = || Lines::with_oversized(vec![Some("1"), None, Some("2")]);

        let skip = ReaderParams {
            batch_size: 3,
            bad_batch_handling: BadBatchHandling::Skip,
            warn_bad_instances: true,
            ..Default::default()
        };
        let logger = Arc::new(MemoryLogger::default());
        let example = assembler(skip, logger.clone())
            .assemble(&schema, parser.as_ref(), &mut records())
            .unwrap()
            .unwrap();
        assert_eq!(column(&example), vec![1, 2]);
        assert!(logger.messages()[0].contains("#1"));

        let error = ReaderParams {
            batch_size: 3,
            ..Default::default()
        };
        let err = assembler(error, Arc::new(NoopLogger))
            .assemble(&schema, parser.as_ref(), &mut records())
            .unwrap_err();
        assert!(matches!(err, ReaderError::RecordTooLarge { limit: 8, .. }));
    }

    #[test]
    fn test_drop_ends_stream() {
        let params = ReaderParams {
            batch_size: 2,
            last_batch_handling: LastBatchHandling::Drop,
            ..Default::default()
        };
        let assembler = assembler(params, Arc::new(NoopLogger));
        let parser = Format::TextLine(TextLineOptions::default())
            .build(2, Arc::new(NoopLogger))
            .unwrap();
        let schema = parser.schema().unwrap();

        let mut input = Lines::new(vec!["a", "b", "c"]);
        assert!(assembler.assemble(&schema, parser.as_ref(), &mut input).unwrap().is_some());
        assert!(assembler.assemble(&schema, parser.as_ref(), &mut input).unwrap().is_none());
    }

    fn int_csv() -> Arc<dyn RecordParser> {
        let options = crate::format::CsvOptions {
            header_row_index: None,
            default_data_type: Some(DataType::Int64),
            ..Default::default()
        };
        Format::Csv(options).build(3, Arc::new(NoopLogger)).unwrap()
    }
}
