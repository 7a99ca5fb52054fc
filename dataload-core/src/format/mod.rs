// dataload-core/src/format/mod.rs

//! Record parsers, one per input format.
//!
//! A [`Format`] is the serializable selector found in configuration files;
//! [`Format::build`] turns it into the [`RecordParser`] the pipeline drives.

pub mod csv;
pub mod image;
pub mod parse;
pub mod recordio;
pub mod text_line;

pub use self::csv::{CsvOptions, CsvParser, MaxFieldLengthHandling};
pub use self::image::{ImageFrame, ImageOptions};
pub use self::parse::{parse_value, ParserParams};
pub use self::recordio::{BlobParser, RecordIoFraming};
pub use self::text_line::{TextLineOptions, TextLineParser};

#[cfg(feature = "image")]
pub use self::image::ImageParser;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, Result};
use crate::logging::Logger;
use crate::schema::Schema;
use crate::source::{Record, RecordFraming, RecordReader};
use crate::tensor::Value;

/// One parsed record: a value per schema attribute, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub store: Arc<str>,
    /// Index of the record within its store.
    pub index: u64,
    pub values: Vec<Value>,
}

/// Turns raw records of one format into instances.
///
/// A parser is shared by every partition of a reader, so all methods take
/// `&self`. State that depends on the data (header names, the column
/// layout) is established once through a
/// [`SchemaSlot`](crate::schema::SchemaSlot).
pub trait RecordParser: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Framing used to split stores of this format into records.
    fn framing(&self) -> Arc<dyn RecordFraming>;

    /// Called once per store before its first record is read. Consumes
    /// leading non-data records such as a header row.
    fn open_store(&self, reader: &mut RecordReader) -> Result<()>;

    /// Establishes the schema from the first admitted record, or from
    /// configuration alone when `record` is `None`. Returns `None` if the
    /// schema cannot be determined without data.
    fn infer_schema(&self, record: Option<&Record>) -> Result<Option<Arc<Schema>>>;

    /// The established schema, if any.
    fn schema(&self) -> Option<Arc<Schema>>;

    /// Parses one record. Only called after the schema is established.
    fn parse(&self, record: &Record) -> Result<Instance>;
}

/// Parses `record`, failing with [`ReaderError::RecordTooLarge`] first if
/// the framing had to discard it.
pub fn parse_record(parser: &dyn RecordParser, record: &Record) -> Result<Instance> {
    record.check_size()?;
    parser.parse(record)
}

/// Input format and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Format {
    Csv(CsvOptions),
    TextLine(TextLineOptions),
    #[serde(rename = "recordio")]
    RecordIo,
    Image(ImageOptions),
    /// RecordIO records holding protobuf-encoded tensors. Not supported.
    #[serde(rename = "recordio_protobuf")]
    RecordIoProtobuf,
    /// Not supported.
    Parquet,
}

impl Default for Format {
    fn default() -> Self {
        Format::Csv(CsvOptions::default())
    }
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::Csv(_) => "csv",
            Format::TextLine(_) => "text_line",
            Format::RecordIo => "recordio",
            Format::Image(_) => "image",
            Format::RecordIoProtobuf => "recordio_protobuf",
            Format::Parquet => "parquet",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Format::Csv(options) => options.validate(),
            Format::TextLine(options) => {
                if options.max_line_length == Some(0) {
                    return Err(ReaderError::config(
                        "format.max_line_length must be greater than 0",
                    ));
                }
                Ok(())
            }
            Format::RecordIo => Ok(()),
            Format::Image(options) => options.validate(),
            Format::RecordIoProtobuf | Format::Parquet => Err(ReaderError::not_supported(
                format!("the '{}' format is not supported", self.name()),
            )),
        }
    }

    /// Builds the parser for this format.
    pub fn build(&self, batch_size: usize, logger: Arc<dyn Logger>) -> Result<Arc<dyn RecordParser>> {
        self.validate()?;
        let parser: Arc<dyn RecordParser> = match self {
            Format::Csv(options) => Arc::new(CsvParser::new(options.clone(), batch_size, logger)?),
            Format::TextLine(options) => Arc::new(TextLineParser::new(options, batch_size)?),
            Format::RecordIo => Arc::new(BlobParser::new(batch_size)?),
            Format::Image(options) => build_image(options, batch_size)?,
            Format::RecordIoProtobuf | Format::Parquet => {
                return Err(ReaderError::not_supported(format!(
                    "the '{}' format is not supported",
                    self.name()
                )))
            }
        };
        tracing::debug!(format = parser.name(), batch_size, "built record parser");
        Ok(parser)
    }
}

#[cfg(feature = "image")]
fn build_image(options: &ImageOptions, batch_size: usize) -> Result<Arc<dyn RecordParser>> {
    Ok(Arc::new(ImageParser::new(options, batch_size)?))
}

#[cfg(not(feature = "image"))]
fn build_image(_options: &ImageOptions, _batch_size: usize) -> Result<Arc<dyn RecordParser>> {
    Err(ReaderError::not_supported(
        "the image format requires the `image` feature of dataload-core",
    ))
}
