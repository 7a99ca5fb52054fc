// dataload-core/src/format/parse.rs

//! Conversion of text fields into typed values.

use std::collections::HashSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::tensor::{DataType, Value};

/// Options for parsing numeric literals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserParams {
    /// Strings treated as NaN by floating-point columns.
    pub nan_values: HashSet<String>,
    /// Radix of integer literals.
    pub base: u32,
}

impl Default for ParserParams {
    fn default() -> Self {
        Self {
            nan_values: HashSet::new(),
            base: 10,
        }
    }
}

/// Parses `text` as a value of `data_type`. Returns `None` when the text is
/// not a valid literal of that type (including integer overflow).
pub fn parse_value(text: &str, data_type: DataType, params: &ParserParams) -> Option<Value> {
    let radix = params.base;
    let value = match data_type {
        DataType::Size => Value::Size(usize::from_str_radix(text, radix).ok()?),
        DataType::Float32 => Value::Float32(parse_float(text, params)? as f32),
        DataType::Float64 => Value::Float64(parse_float(text, params)?),
        DataType::Int8 => Value::Int8(i8::from_str_radix(text, radix).ok()?),
        DataType::Int16 => Value::Int16(i16::from_str_radix(text, radix).ok()?),
        DataType::Int32 => Value::Int32(i32::from_str_radix(text, radix).ok()?),
        DataType::Int64 => Value::Int64(i64::from_str_radix(text, radix).ok()?),
        DataType::UInt8 => Value::UInt8(u8::from_str_radix(text, radix).ok()?),
        DataType::UInt16 => Value::UInt16(u16::from_str_radix(text, radix).ok()?),
        DataType::UInt32 => Value::UInt32(u32::from_str_radix(text, radix).ok()?),
        DataType::UInt64 => Value::UInt64(u64::from_str_radix(text, radix).ok()?),
        DataType::String => Value::String(text.to_string()),
        DataType::Bytes => Value::Bytes(Bytes::copy_from_slice(text.as_bytes())),
    };
    Some(value)
}

fn parse_float(text: &str, params: &ParserParams) -> Option<f64> {
    if params.nan_values.contains(text) {
        return Some(f64::NAN);
    }
    text.parse::<f64>().ok()
}

/// Shortens `text` for use in error messages.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
