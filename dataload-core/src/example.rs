// dataload-core/src/example.rs

use std::sync::Arc;

use crate::error::{ReaderError, Result};
use crate::schema::{Attribute, Schema};
use crate::tensor::Tensor;

/// One batch: a tensor per schema attribute, batch dimension leading.
#[derive(Debug, Clone)]
pub struct Example {
    schema: Arc<Schema>,
    tensors: Vec<Tensor>,
}

impl Example {
    pub fn new(schema: Arc<Schema>, tensors: Vec<Tensor>) -> Result<Self> {
        if schema.len() != tensors.len() {
            return Err(ReaderError::schema(format!(
                "example has {} tensor(s) for {} attribute(s)",
                tensors.len(),
                schema.len()
            )));
        }
        Ok(Self { schema, tensors })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.schema.index_of(name).map(|i| &self.tensors[i])
    }

    /// Number of instances in this batch (the leading dimension).
    pub fn batch_size(&self) -> usize {
        self.tensors
            .first()
            .and_then(|t| t.shape().first().copied())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Attribute, &Tensor)> {
        self.schema.attributes().iter().zip(&self.tensors)
    }

    pub fn into_tensors(self) -> Vec<Tensor> {
        self.tensors
    }
}
