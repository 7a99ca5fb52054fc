// dataload-core/src/format/text_line.rs

//! One instance per line of text.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Instance, RecordParser};
use crate::error::{ReaderError, Result};
use crate::schema::{Attribute, Schema};
use crate::source::{LineFraming, Record, RecordFraming, RecordReader};
use crate::tensor::{DataType, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextLineOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_line_length: Option<usize>,
    pub skip_blank_lines: bool,
}

#[derive(Debug)]
pub struct TextLineParser {
    framing: Arc<LineFraming>,
    schema: Arc<Schema>,
}

impl TextLineParser {
    pub fn new(options: &TextLineOptions, batch_size: usize) -> Result<Self> {
        let schema = Schema::new(vec![Attribute::new(
            "value",
            DataType::String,
            vec![batch_size, 1],
        )])?;
        Ok(Self {
            framing: Arc::new(LineFraming {
                max_line_length: options.max_line_length,
                skip_blank_lines: options.skip_blank_lines,
            }),
            schema: Arc::new(schema),
        })
    }
}

impl RecordParser for TextLineParser {
    fn name(&self) -> &'static str {
        "text_line"
    }

    fn framing(&self) -> Arc<dyn RecordFraming> {
        self.framing.clone()
    }

    fn open_store(&self, _reader: &mut RecordReader) -> Result<()> {
        Ok(())
    }

    fn infer_schema(&self, _record: Option<&Record>) -> Result<Option<Arc<Schema>>> {
        Ok(Some(self.schema.clone()))
    }

    fn schema(&self) -> Option<Arc<Schema>> {
        Some(self.schema.clone())
    }

    fn parse(&self, record: &Record) -> Result<Instance> {
        let line = std::str::from_utf8(&record.payload).map_err(|e| {
            ReaderError::invalid_instance(
                record.store.as_ref(),
                record.index,
                format!("the line contains invalid UTF-8 at byte {}", e.valid_up_to()),
            )
        })?;
        Ok(Instance {
            store: record.store.clone(),
            index: record.index,
            values: vec![Value::String(line.to_string())],
        })
    }
}
