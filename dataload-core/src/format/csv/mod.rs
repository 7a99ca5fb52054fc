// dataload-core/src/format/csv/mod.rs

//! Delimited text (CSV and friends).
//!
//! Column names come from a header row, from explicit configuration, or are
//! generated as `<prefix>1..<prefix>N`. Column types are inferred from the
//! first admitted row unless overridden. Every column becomes an attribute
//! of shape `[batch_size, 1]`.

mod framing;
mod tokenizer;

pub use framing::CsvFraming;
pub use tokenizer::{Field, TokenizeError, Tokenizer};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::parse::{parse_value, preview, ParserParams};
use super::{Instance, RecordParser};
use crate::error::{ReaderError, Result};
use crate::logging::Logger;
use crate::schema::{resolve_names, select_columns, Attribute, ColumnSelection, Schema, SchemaSlot};
use crate::source::{LineFraming, Record, RecordFraming, RecordReader};
use crate::tensor::{DataType, Value};

/// Maximum number of characters of a bad value quoted in error messages.
const PREVIEW_CHARS: usize = 64;

/// What to do with a field longer than `max_field_length`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxFieldLengthHandling {
    /// Fail the record with a field-too-large error.
    #[default]
    Error,
    /// Silently cut the field.
    Truncate,
    /// Cut the field and log a warning.
    Warn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    /// Index of the header row among the leading records of each store;
    /// `false` means the stores have no header.
    #[serde(with = "header_row")]
    pub header_row_index: Option<usize>,
    /// Only the first store has a header row.
    pub has_single_header: bool,
    pub dedupe_column_names: bool,
    /// Explicit column names; header rows are then discarded.
    pub column_names: Vec<String>,
    pub name_prefix: String,
    pub use_columns: HashSet<String>,
    pub use_columns_by_index: HashSet<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_data_type: Option<DataType>,
    pub column_types: HashMap<String, DataType>,
    #[serde(with = "index_map")]
    pub column_types_by_index: BTreeMap<usize, DataType>,
    pub delimiter: char,
    pub quote_char: char,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_char: Option<char>,
    pub allow_quoted_new_lines: bool,
    pub skip_blank_lines: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_field_length: Option<usize>,
    pub max_field_length_handling: MaxFieldLengthHandling,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_line_length: Option<usize>,
    pub parser: ParserParams,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            header_row_index: Some(0),
            has_single_header: false,
            dedupe_column_names: true,
            column_names: Vec::new(),
            name_prefix: String::new(),
            use_columns: HashSet::new(),
            use_columns_by_index: HashSet::new(),
            default_data_type: None,
            column_types: HashMap::new(),
            column_types_by_index: BTreeMap::new(),
            delimiter: ',',
            quote_char: '"',
            comment_char: None,
            allow_quoted_new_lines: false,
            skip_blank_lines: true,
            encoding: None,
            max_field_length: None,
            max_field_length_handling: MaxFieldLengthHandling::Error,
            max_line_length: None,
            parser: ParserParams::default(),
        }
    }
}

impl CsvOptions {
    pub fn validate(&self) -> Result<()> {
        if let Some(encoding) = &self.encoding {
            let normalized = encoding.to_ascii_lowercase().replace(['-', '_'], "");
            if normalized != "utf8" {
                return Err(ReaderError::not_supported(format!(
                    "the text encoding '{encoding}' is not supported; only UTF-8 is"
                )));
            }
        }

        for (name, chr) in [("delimiter", Some(self.delimiter)), ("quote_char", Some(self.quote_char)), ("comment_char", self.comment_char)] {
            if let Some(chr) = chr {
                if !chr.is_ascii() || chr == '\n' || chr == '\r' {
                    return Err(ReaderError::config(format!(
                        "format.{name} must be a single ASCII character other than a line break"
                    )));
                }
            }
        }
        if self.delimiter == self.quote_char {
            return Err(ReaderError::config(
                "format.delimiter and format.quote_char must differ",
            ));
        }
        if !(2..=36).contains(&self.parser.base) {
            return Err(ReaderError::config("format.parser.base must be between 2 and 36"));
        }
        if self.max_field_length == Some(0) {
            return Err(ReaderError::config("format.max_field_length must be greater than 0"));
        }
        Ok(())
    }

    fn tokenizer(&self) -> Tokenizer {
        Tokenizer {
            delimiter: self.delimiter,
            quote_char: self.quote_char,
            max_field_length: self.max_field_length,
        }
    }

    fn framing(&self) -> CsvFraming {
        CsvFraming {
            line: LineFraming {
                max_line_length: self.max_line_length,
                skip_blank_lines: self.skip_blank_lines,
            },
            delimiter: self.delimiter as u8,
            quote_char: self.quote_char as u8,
            comment_char: self.comment_char.map(|c| c as u8),
            allow_quoted_new_lines: self.allow_quoted_new_lines,
        }
    }
}

/// One selected column of the input.
#[derive(Debug, Clone, PartialEq)]
struct Column {
    /// Position in the raw record.
    index: usize,
    name: String,
    data_type: DataType,
}

/// Everything derived from the first row; fixed once established.
#[derive(Debug, Clone, PartialEq)]
struct Layout {
    schema: Arc<Schema>,
    columns: Vec<Column>,
    num_fields: usize,
}

#[derive(Debug)]
pub struct CsvParser {
    options: CsvOptions,
    batch_size: usize,
    logger: Arc<dyn Logger>,
    tokenizer: Tokenizer,
    framing: Arc<CsvFraming>,
    header: SchemaSlot<Vec<String>>,
    layout: SchemaSlot<Layout>,
}

impl CsvParser {
    pub fn new(options: CsvOptions, batch_size: usize, logger: Arc<dyn Logger>) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            tokenizer: options.tokenizer(),
            framing: Arc::new(options.framing()),
            options,
            batch_size,
            logger,
            header: SchemaSlot::new(),
            layout: SchemaSlot::new(),
        })
    }

    fn tokenize(&self, text: &str) -> std::result::Result<Vec<Field>, TokenizeError> {
        let mut fields = Vec::new();
        self.tokenizer.tokenize(text, &mut fields)?;
        Ok(fields)
    }

    fn read_header_names(&self, record: &Record) -> Result<Vec<String>> {
        let unreadable = |reason: &str| {
            ReaderError::schema(format!(
                "the header row of the data store '{}' cannot be read: {reason}",
                record.store
            ))
        };

        let text = std::str::from_utf8(&record.payload).map_err(|_| unreadable("invalid UTF-8"))?;
        let fields = self
            .tokenize(text)
            .map_err(|_| unreadable("end of record reached inside a quoted field"))?;

        Ok(fields
            .into_iter()
            .map(|f| format!("{}{}", self.options.name_prefix, f.value))
            .collect())
    }

    fn infer_types(&self, record: Option<&Record>, num_names: Option<usize>) -> Result<Option<Vec<DataType>>> {
        let Some(record) = record else {
            return Ok(num_names.map(|n| {
                vec![self.options.default_data_type.unwrap_or(DataType::String); n]
            }));
        };

        let cannot_infer = |reason: &str| {
            ReaderError::schema(format!(
                "the schema of the data store '{}' cannot be inferred: {reason}",
                record.store
            ))
        };
        let text = std::str::from_utf8(&record.payload).map_err(|_| cannot_infer("invalid UTF-8"))?;
        let fields = self
            .tokenize(text)
            .map_err(|_| cannot_infer("end of record reached inside a quoted field"))?;

        Ok(Some(
            fields
                .iter()
                .map(|f| {
                    self.options
                        .default_data_type
                        .unwrap_or_else(|| DataType::infer(&f.value))
                })
                .collect(),
        ))
    }

    fn build_layout(&self, record: Option<&Record>) -> Result<Option<Layout>> {
        let names = if !self.options.column_names.is_empty() {
            Some(self.options.column_names.clone())
        } else {
            self.header.get().cloned()
        };

        let Some(mut types) = self.infer_types(record, names.as_ref().map(Vec::len))? else {
            return Ok(None);
        };

        let names = match names {
            Some(names) => {
                if names.len() != types.len() {
                    let row = record.map_or(0, |r| r.index);
                    let store = record.map_or("", |r| &*r.store);
                    return Err(ReaderError::schema(format!(
                        "the number of columns ({}) read from row #{row} in the data store '{store}' \
                         does not match the number of headers ({})",
                        types.len(),
                        names.len()
                    )));
                }
                names
            }
            None => (1..=types.len())
                .map(|i| format!("{}{i}", self.options.name_prefix))
                .collect(),
        };
        let num_fields = names.len();

        // Index overrides refer to the raw column positions.
        let leftover: Vec<String> = self
            .options
            .column_types_by_index
            .keys()
            .filter(|&&i| i >= num_fields)
            .map(ToString::to_string)
            .collect();
        if !leftover.is_empty() {
            return Err(ReaderError::config(format!(
                "the column types cannot be set; the following column indices are out of range: {}",
                leftover.join(", ")
            )));
        }
        for (&index, &data_type) in &self.options.column_types_by_index {
            types[index] = data_type;
        }

        let selection = ColumnSelection {
            names: self.options.use_columns.clone(),
            indices: self.options.use_columns_by_index.clone(),
        };
        let kept = select_columns(&names, &selection);
        let candidates: Vec<String> = kept.iter().map(|&i| names[i].clone()).collect();
        let resolved = resolve_names(&candidates, self.options.dedupe_column_names)?;

        let mut columns: Vec<Column> = kept
            .iter()
            .zip(resolved)
            .map(|(&index, name)| Column {
                index,
                name,
                data_type: types[index],
            })
            .collect();

        // Name overrides refer to the resolved names and take precedence.
        let mut missing = Vec::new();
        for (name, &data_type) in &self.options.column_types {
            match columns.iter_mut().find(|c| &c.name == name) {
                Some(column) => column.data_type = data_type,
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            missing.sort();
            return Err(ReaderError::config(format!(
                "the column types cannot be set; the following columns are not found in the dataset: {}",
                missing.join(", ")
            )));
        }

        let attributes = columns
            .iter()
            .map(|c| Attribute::new(c.name.clone(), c.data_type, vec![self.batch_size, 1]))
            .collect();
        let schema = Arc::new(Schema::new(attributes)?);

        Ok(Some(Layout {
            schema,
            columns,
            num_fields,
        }))
    }
}

impl RecordParser for CsvParser {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn framing(&self) -> Arc<dyn RecordFraming> {
        self.framing.clone()
    }

    fn open_store(&self, reader: &mut RecordReader) -> Result<()> {
        let Some(header_row) = self.options.header_row_index else {
            return Ok(());
        };
        if self.options.has_single_header && reader.ordinal() > 0 {
            return Ok(());
        }

        for _ in 0..header_row {
            if reader.next_record()?.is_none() {
                return Ok(());
            }
        }
        let Some(record) = reader.next_record()? else {
            return Ok(());
        };
        record.check_size()?;

        // Explicit names win; the header row is discarded.
        if !self.options.column_names.is_empty() {
            return Ok(());
        }

        let names = self.read_header_names(&record)?;
        self.header.establish(names).map_err(|_| {
            ReaderError::schema(format!(
                "the header row of the data store '{}' does not match the header of the first data store",
                reader.store_id()
            ))
        })?;
        Ok(())
    }

    fn infer_schema(&self, record: Option<&Record>) -> Result<Option<Arc<Schema>>> {
        if let Some(layout) = self.layout.get() {
            return Ok(Some(layout.schema.clone()));
        }
        let Some(layout) = self.build_layout(record)? else {
            return Ok(None);
        };
        let layout = self.layout.establish(layout)?;
        tracing::debug!(schema = %layout.schema, "inferred csv schema");
        Ok(Some(layout.schema.clone()))
    }

    fn schema(&self) -> Option<Arc<Schema>> {
        self.layout.get().map(|l| l.schema.clone())
    }

    fn parse(&self, record: &Record) -> Result<Instance> {
        let layout = self
            .layout
            .get()
            .ok_or_else(|| ReaderError::reader("a record was parsed before the schema was established"))?;
        let invalid = |message: String| {
            ReaderError::invalid_instance(record.store.as_ref(), record.index, message)
        };

        let text = std::str::from_utf8(&record.payload).map_err(|e| {
            invalid(format!("the row contains invalid UTF-8 at byte {}", e.valid_up_to()))
        })?;
        let fields = self
            .tokenize(text)
            .map_err(|_| invalid("end of record reached inside a quoted field".to_string()))?;

        if fields.len() != layout.num_fields {
            return Err(invalid(format!(
                "the row has {} column(s) while the dataset has {}",
                fields.len(),
                layout.num_fields
            )));
        }

        let mut values: Vec<Value> = Vec::with_capacity(layout.columns.len());
        for column in &layout.columns {
            let field = &fields[column.index];

            if field.truncated {
                let limit = self.options.max_field_length.unwrap_or_default();
                match self.options.max_field_length_handling {
                    MaxFieldLengthHandling::Error => {
                        return Err(ReaderError::FieldTooLarge {
                            store: record.store.to_string(),
                            instance: record.index,
                            field: column.name.clone(),
                            limit,
                        });
                    }
                    MaxFieldLengthHandling::Truncate => {}
                    MaxFieldLengthHandling::Warn => self.logger.warn(&format!(
                        "the column '{}' of the row #{} in the data store '{}' was truncated to {limit} characters",
                        column.name, record.index, record.store
                    )),
                }
            }

            let value = parse_value(&field.value, column.data_type, &self.options.parser)
                .ok_or_else(|| {
                    invalid(format!(
                        "the column '{}' cannot be parsed as {}; the value is '{}'",
                        column.name,
                        column.data_type,
                        preview(&field.value, PREVIEW_CHARS)
                    ))
                })?;
            values.push(value);
        }

        Ok(Instance {
            store: record.store.clone(),
            index: record.index,
            values,
        })
    }
}

/// (De)serializes `header_row_index` as an integer, or `false` for none.
mod header_row {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Index(usize),
        Flag(bool),
    }

    pub fn serialize<S: Serializer>(value: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(index) => Repr::Index(*index),
            None => Repr::Flag(false),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Index(index) => Some(index),
            Repr::Flag(true) => Some(0),
            Repr::Flag(false) => None,
        })
    }
}

/// (De)serializes index-keyed maps with string keys, as TOML requires.
mod index_map {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::tensor::DataType;

    pub fn serialize<S: Serializer>(
        value: &BTreeMap<usize, DataType>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<BTreeMap<String, DataType>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<usize, DataType>, D::Error> {
        BTreeMap::<String, DataType>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, v)| {
                k.parse::<usize>()
                    .map(|k| (k, v))
                    .map_err(|_| D::Error::custom(format!("'{k}' is not a column index")))
            })
            .collect()
    }
}
