// dataload-core/src/tensor.rs

//! Typed array storage and the dense and sparse tensors built on it.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, Result};

/// Element type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Size,
    Float32,
    Float64,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    String,
    Bytes,
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            DataType::Size => "size",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::String => "string",
            DataType::Bytes => "bytes",
        }
    }

    /// Infers the narrowest type able to hold a delimited-text field.
    ///
    /// Empty text is a string; integers that fit `i64` are `int64`, larger
    /// non-negative ones `uint64`; anything else parseable as a float is
    /// `float64`, and the rest is `string`.
    pub fn infer(text: &str) -> DataType {
        if text.is_empty() {
            return DataType::String;
        }
        if text.parse::<i64>().is_ok() {
            return DataType::Int64;
        }
        if text.parse::<u64>().is_ok() {
            return DataType::UInt64;
        }
        if text.parse::<f64>().is_ok() {
            return DataType::Float64;
        }
        DataType::String
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self> {
        let dt = match s.to_ascii_lowercase().as_str() {
            "size" => DataType::Size,
            "float32" => DataType::Float32,
            "float64" => DataType::Float64,
            "int8" => DataType::Int8,
            "int16" => DataType::Int16,
            "int32" => DataType::Int32,
            "int64" => DataType::Int64,
            "uint8" => DataType::UInt8,
            "uint16" => DataType::UInt16,
            "uint32" => DataType::UInt32,
            "uint64" => DataType::UInt64,
            "string" => DataType::String,
            "bytes" => DataType::Bytes,
            other => return Err(ReaderError::config(format!("unknown data type '{other}'"))),
        };
        Ok(dt)
    }
}

/// A single parsed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Size(usize),
    Float32(f32),
    Float64(f64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    String(String),
    Bytes(Bytes),
    /// A field spanning several elements, such as decoded image pixels.
    Array(ArrayData),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Size(_) => DataType::Size,
            Value::Float32(_) => DataType::Float32,
            Value::Float64(_) => DataType::Float64,
            Value::Int8(_) => DataType::Int8,
            Value::Int16(_) => DataType::Int16,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::UInt8(_) => DataType::UInt8,
            Value::UInt16(_) => DataType::UInt16,
            Value::UInt32(_) => DataType::UInt32,
            Value::UInt64(_) => DataType::UInt64,
            Value::String(_) => DataType::String,
            Value::Bytes(_) => DataType::Bytes,
            Value::Array(data) => data.data_type(),
        }
    }
}

/// Contiguous, typed element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Size(Vec<usize>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    String(Vec<String>),
    Bytes(Vec<Bytes>),
}

// Expands `$body` once per variant with `$v` bound to the inner vector.
macro_rules! each_array {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ArrayData::Size($v) => $body,
            ArrayData::Float32($v) => $body,
            ArrayData::Float64($v) => $body,
            ArrayData::Int8($v) => $body,
            ArrayData::Int16($v) => $body,
            ArrayData::Int32($v) => $body,
            ArrayData::Int64($v) => $body,
            ArrayData::UInt8($v) => $body,
            ArrayData::UInt16($v) => $body,
            ArrayData::UInt32($v) => $body,
            ArrayData::UInt64($v) => $body,
            ArrayData::String($v) => $body,
            ArrayData::Bytes($v) => $body,
        }
    };
}

impl ArrayData {
    /// Allocates `len` elements holding the type's default value (zero,
    /// or empty for strings and byte strings).
    pub fn zeros(data_type: DataType, len: usize) -> Self {
        match data_type {
            DataType::Size => ArrayData::Size(vec![0; len]),
            DataType::Float32 => ArrayData::Float32(vec![0.0; len]),
            DataType::Float64 => ArrayData::Float64(vec![0.0; len]),
            DataType::Int8 => ArrayData::Int8(vec![0; len]),
            DataType::Int16 => ArrayData::Int16(vec![0; len]),
            DataType::Int32 => ArrayData::Int32(vec![0; len]),
            DataType::Int64 => ArrayData::Int64(vec![0; len]),
            DataType::UInt8 => ArrayData::UInt8(vec![0; len]),
            DataType::UInt16 => ArrayData::UInt16(vec![0; len]),
            DataType::UInt32 => ArrayData::UInt32(vec![0; len]),
            DataType::UInt64 => ArrayData::UInt64(vec![0; len]),
            DataType::String => ArrayData::String(vec![String::new(); len]),
            DataType::Bytes => ArrayData::Bytes(vec![Bytes::new(); len]),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ArrayData::Size(_) => DataType::Size,
            ArrayData::Float32(_) => DataType::Float32,
            ArrayData::Float64(_) => DataType::Float64,
            ArrayData::Int8(_) => DataType::Int8,
            ArrayData::Int16(_) => DataType::Int16,
            ArrayData::Int32(_) => DataType::Int32,
            ArrayData::Int64(_) => DataType::Int64,
            ArrayData::UInt8(_) => DataType::UInt8,
            ArrayData::UInt16(_) => DataType::UInt16,
            ArrayData::UInt32(_) => DataType::UInt32,
            ArrayData::UInt64(_) => DataType::UInt64,
            ArrayData::String(_) => DataType::String,
            ArrayData::Bytes(_) => DataType::Bytes,
        }
    }

    pub fn len(&self) -> usize {
        each_array!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn truncate(&mut self, len: usize) {
        each_array!(self, v => v.truncate(len))
    }

    /// Writes `value` starting at element `offset`.
    ///
    /// A scalar fills one element; an [`Value::Array`] is copied in full.
    pub fn write(&mut self, offset: usize, value: &Value) -> Result<()> {
        let needed = match value {
            Value::Array(src) => src.len(),
            _ => 1,
        };
        if offset + needed > self.len() {
            return Err(ReaderError::schema(format!(
                "value of {needed} element(s) does not fit at offset {offset} of an array of {}",
                self.len()
            )));
        }

        match (self, value) {
            (ArrayData::Size(d), Value::Size(x)) => d[offset] = *x,
            (ArrayData::Float32(d), Value::Float32(x)) => d[offset] = *x,
            (ArrayData::Float64(d), Value::Float64(x)) => d[offset] = *x,
            (ArrayData::Int8(d), Value::Int8(x)) => d[offset] = *x,
            (ArrayData::Int16(d), Value::Int16(x)) => d[offset] = *x,
            (ArrayData::Int32(d), Value::Int32(x)) => d[offset] = *x,
            (ArrayData::Int64(d), Value::Int64(x)) => d[offset] = *x,
            (ArrayData::UInt8(d), Value::UInt8(x)) => d[offset] = *x,
            (ArrayData::UInt16(d), Value::UInt16(x)) => d[offset] = *x,
            (ArrayData::UInt32(d), Value::UInt32(x)) => d[offset] = *x,
            (ArrayData::UInt64(d), Value::UInt64(x)) => d[offset] = *x,
            (ArrayData::String(d), Value::String(x)) => d[offset].clone_from(x),
            (ArrayData::Bytes(d), Value::Bytes(x)) => d[offset] = x.clone(),
            (dst, Value::Array(src)) => dst.copy_from(offset, src)?,
            (dst, value) => {
                return Err(ReaderError::schema(format!(
                    "cannot store a {} value in a {} array",
                    value.data_type(),
                    dst.data_type()
                )))
            }
        }
        Ok(())
    }

    fn copy_from(&mut self, offset: usize, src: &ArrayData) -> Result<()> {
        let n = src.len();
        match (self, src) {
            (ArrayData::Size(d), ArrayData::Size(s)) => d[offset..offset + n].copy_from_slice(s),
            (ArrayData::Float32(d), ArrayData::Float32(s)) => d[offset..offset + n].copy_from_slice(s),
            (ArrayData::Float64(d), ArrayData::Float64(s)) => d[offset..offset + n].copy_from_slice(s),
            (ArrayData::Int8(d), ArrayData::Int8(s)) => d[offset..offset + n].copy_from_slice(s),
            (ArrayData::Int16(d), ArrayData::Int16(s)) => d[offset..offset + n].copy_from_slice(s),
            (ArrayData::Int32(d), ArrayData::Int32(s)) => d[offset..offset + n].copy_from_slice(s),
            (ArrayData::Int64(d), ArrayData::Int64(s)) => d[offset..offset + n].copy_from_slice(s),
            (ArrayData::UInt8(d), ArrayData::UInt8(s)) => d[offset..offset + n].copy_from_slice(s),
            (ArrayData::UInt16(d), ArrayData::UInt16(s)) => d[offset..offset + n].copy_from_slice(s),
            (ArrayData::UInt32(d), ArrayData::UInt32(s)) => d[offset..offset + n].copy_from_slice(s),
            (ArrayData::UInt64(d), ArrayData::UInt64(s)) => d[offset..offset + n].copy_from_slice(s),
            (ArrayData::String(d), ArrayData::String(s)) => d[offset..offset + n].clone_from_slice(s),
            (ArrayData::Bytes(d), ArrayData::Bytes(s)) => d[offset..offset + n].clone_from_slice(s),
            (dst, src) => {
                return Err(ReaderError::schema(format!(
                    "cannot copy a {} array into a {} array",
                    src.data_type(),
                    dst.data_type()
                )))
            }
        }
        Ok(())
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            ArrayData::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<&[u64]> {
        match self {
            ArrayData::UInt64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            ArrayData::Float32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            ArrayData::Float64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match self {
            ArrayData::UInt8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            ArrayData::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[Bytes]> {
        match self {
            ArrayData::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

/// A dense, strided tensor. Strides are counted in elements.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseTensor {
    shape: Vec<usize>,
    strides: Vec<isize>,
    data: ArrayData,
}

impl DenseTensor {
    /// Creates a row-major tensor over `data`.
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self> {
        let strides = row_major_strides(&shape);
        Self::with_strides(shape, strides, data)
    }

    pub fn with_strides(shape: Vec<usize>, strides: Vec<isize>, data: ArrayData) -> Result<Self> {
        if strides.len() != shape.len() {
            return Err(ReaderError::schema(format!(
                "tensor has {} dimension(s) but {} stride(s)",
                shape.len(),
                strides.len()
            )));
        }
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(ReaderError::schema(format!(
                "tensor of shape {shape:?} needs {expected} element(s), got {}",
                data.len()
            )));
        }
        Ok(Self { shape, strides, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn into_data(self) -> ArrayData {
        self.data
    }
}

fn row_major_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![1isize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1] as isize;
    }
    strides
}

/// A sparse tensor in coordinate format: one index array per dimension,
/// each as long as the value array.
#[derive(Debug, Clone, PartialEq)]
pub struct CooTensor {
    shape: Vec<usize>,
    data: ArrayData,
    indices: Vec<Vec<u64>>,
}

impl CooTensor {
    pub fn new(shape: Vec<usize>, data: ArrayData, indices: Vec<Vec<u64>>) -> Result<Self> {
        if indices.len() != shape.len() {
            return Err(ReaderError::schema(format!(
                "COO tensor has {} dimension(s) but {} index array(s)",
                shape.len(),
                indices.len()
            )));
        }
        for (dim, (idx, &extent)) in indices.iter().zip(&shape).enumerate() {
            if idx.len() != data.len() {
                return Err(ReaderError::schema(format!(
                    "index array of dimension {dim} has {} entries for {} value(s)",
                    idx.len(),
                    data.len()
                )));
            }
            if let Some(&bad) = idx.iter().find(|&&i| i >= extent as u64) {
                return Err(ReaderError::schema(format!(
                    "index {bad} is out of range for dimension {dim} of size {extent}"
                )));
            }
        }
        Ok(Self { shape, data, indices })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn indices(&self) -> &[Vec<u64>] {
        &self.indices
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    Dense(DenseTensor),
    Coo(CooTensor),
}

impl Tensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::Dense(t) => t.shape(),
            Tensor::Coo(t) => t.shape(),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Tensor::Dense(t) => t.data().data_type(),
            Tensor::Coo(t) => t.data().data_type(),
        }
    }

    pub fn as_dense(&self) -> Option<&DenseTensor> {
        match self {
            Tensor::Dense(t) => Some(t),
            Tensor::Coo(_) => None,
        }
    }

    pub fn as_coo(&self) -> Option<&CooTensor> {
        match self {
            Tensor::Coo(t) => Some(t),
            Tensor::Dense(_) => None,
        }
    }
}

impl From<DenseTensor> for Tensor {
    fn from(t: DenseTensor) -> Self {
        Tensor::Dense(t)
    }
}

impl From<CooTensor> for Tensor {
    fn from(t: CooTensor) -> Self {
        Tensor::Coo(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_data_type() {
        assert_eq!(DataType::infer(""), DataType::String);
        assert_eq!(DataType::infer("42"), DataType::Int64);
        assert_eq!(DataType::infer("-7"), DataType::Int64);
        assert_eq!(DataType::infer("18446744073709551615"), DataType::UInt64);
        assert_eq!(DataType::infer("1.5"), DataType::Float64);
        assert_eq!(DataType::infer("1e10"), DataType::Float64);
        assert_eq!(DataType::infer("abc"), DataType::String);
    }

    #[test]
    fn test_data_type_from_str() {
        assert_eq!("float32".parse::<DataType>().unwrap(), DataType::Float32);
        assert_eq!("UINT8".parse::<DataType>().unwrap(), DataType::UInt8);
        assert!("complex".parse::<DataType>().is_err());
    }

    #[test]
    fn test_zeros_are_type_defaults() {
        let s = ArrayData::zeros(DataType::String, 2);
        assert_eq!(s.as_strings().unwrap(), &[String::new(), String::new()]);

        let f = ArrayData::zeros(DataType::Float64, 3);
        assert_eq!(f.as_f64().unwrap(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_write_scalar_and_array() {
        let mut data = ArrayData::zeros(DataType::UInt8, 6);
        data.write(0, &Value::UInt8(9)).unwrap();
        data.write(3, &Value::Array(ArrayData::UInt8(vec![1, 2, 3]))).unwrap();
        assert_eq!(data.as_u8().unwrap(), &[9, 0, 0, 1, 2, 3]);
    }

    #[test]
    fn test_write_type_mismatch() {
        let mut data = ArrayData::zeros(DataType::Int64, 2);
        let err = data.write(0, &Value::String("x".into())).unwrap_err();
        assert!(matches!(err, ReaderError::Schema { .. }));
    }

    #[test]
    fn test_write_out_of_bounds() {
        let mut data = ArrayData::zeros(DataType::Int64, 2);
        assert!(data.write(2, &Value::Int64(1)).is_err());
    }

    #[test]
    fn test_dense_strides() {
        let t = DenseTensor::new(vec![2, 3, 4], ArrayData::zeros(DataType::Float32, 24)).unwrap();
        assert_eq!(t.strides(), &[12, 4, 1]);
    }

    #[test]
    fn test_dense_rejects_wrong_len() {
        assert!(DenseTensor::new(vec![2, 2], ArrayData::zeros(DataType::Int8, 3)).is_err());
    }

    #[test]
    fn test_coo_validation() {
        let values = ArrayData::Float32(vec![1.0, 2.0]);
        let ok = CooTensor::new(vec![2, 10], values.clone(), vec![vec![0, 1], vec![3, 9]]);
        assert!(ok.is_ok());

        let out_of_range = CooTensor::new(vec![2, 10], values.clone(), vec![vec![0, 2], vec![3, 9]]);
        assert!(out_of_range.is_err());

        let missing_dim = CooTensor::new(vec![2, 10], values, vec![vec![0, 1]]);
        assert!(missing_dim.is_err());
    }
}
