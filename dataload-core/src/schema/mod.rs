// dataload-core/src/schema/mod.rs

//! Attributes, schemas and the first-writer-wins schema handoff.

mod resolver;

pub use resolver::{resolve_names, select_columns, ColumnSelection};

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::{ReaderError, Result};
use crate::tensor::DataType;

/// A named, typed field. The shape includes the leading batch dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    data_type: DataType,
    shape: Vec<usize>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, data_type: DataType, shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            data_type,
            shape,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements one instance contributes (the shape without the
    /// batch dimension).
    pub fn elements_per_instance(&self) -> usize {
        self.shape.iter().skip(1).product()
    }
}

/// An ordered set of uniquely named attributes.
#[derive(Debug, Clone)]
pub struct Schema {
    attributes: Vec<Attribute>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(attributes: Vec<Attribute>) -> Result<Self> {
        let mut index = HashMap::with_capacity(attributes.len());
        for (pos, attr) in attributes.iter().enumerate() {
            if index.insert(attr.name.clone(), pos).is_some() {
                return Err(ReaderError::schema(format!(
                    "the dataset contains more than one column with the name '{}'",
                    attr.name
                )));
            }
        }
        Ok(Self { attributes, index })
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.index_of(name).map(|i| &self.attributes[i])
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.attributes == other.attributes
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self
            .attributes
            .iter()
            .map(|a| format!("{}: {}{:?}", a.name, a.data_type, a.shape))
            .collect();
        write!(f, "[{}]", cols.join(", "))
    }
}

/// Write-once holder for a schema (or any schema-derived layout).
///
/// The first call to [`establish`](Self::establish) stores its candidate.
/// Every later call compares its candidate with the stored value and fails
/// with a schema error on mismatch instead of overwriting it.
#[derive(Debug)]
pub struct SchemaSlot<T> {
    cell: OnceLock<T>,
}

impl<T> Default for SchemaSlot<T> {
    fn default() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }
}

impl<T: PartialEq> SchemaSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn establish(&self, candidate: T) -> Result<&T> {
        if let Err(candidate) = self.cell.set(candidate) {
            if self.cell.get() != Some(&candidate) {
                return Err(ReaderError::schema(
                    "the schema inferred for this record does not match the schema already \
                     established for the reader",
                ));
            }
        }
        self.cell
            .get()
            .ok_or_else(|| ReaderError::reader("schema slot is empty after initialization"))
    }
}
