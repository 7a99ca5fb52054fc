// dataload-core/src/dataset/mod.rs

//! The batch pipeline between a record source and the reader.
//!
//! Each partition runs a [`Pipeline`]: records pulled from the shared
//! source pass through a [`ShuffleBuffer`], are parsed and collected into
//! batches by a [`BatchAssembler`]. The [`PrefetchScheduler`] drives the
//! pipelines, inline or on worker threads.

mod batch;
mod pipeline;
mod prefetch;
mod shuffle;

pub use batch::{BatchAssembler, BatchBuilder, RecordInput};
pub use pipeline::Pipeline;
pub use prefetch::PrefetchScheduler;
pub use shuffle::ShuffleBuffer;
