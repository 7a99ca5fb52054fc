// dataload-core/src/lib.rs

//! Batched data loading for training pipelines.
//!
//! The crate reads records from local files, memory or S3, parses them
//! according to a [`Format`], and emits fixed-schema batches of tensors
//! ([`Example`]s). Sharding, windowed shuffling, parallel prefetching and
//! bad-record policies are handled by the [`Reader`].

pub mod config;
pub mod dataset;
pub mod error;
pub mod example;
pub mod format;
pub mod logging;
pub mod reader;
pub mod schema;
pub mod source;
pub mod storage;
pub mod tensor;

// Re-export commonly used types for convenience
pub use config::{BadBatchHandling, LastBatchHandling, LoaderConfig, ReaderParams};
pub use error::{ReaderError, Result};
pub use example::Example;
pub use format::Format;
pub use logging::{Logger, NoopLogger, TracingLogger};
pub use reader::{Reader, ReaderBuilder, ReaderState};
pub use schema::{Attribute, Schema};
pub use storage::{Compression, DataStore, FileStore, InMemoryStore};
pub use tensor::{DataType, Tensor};
