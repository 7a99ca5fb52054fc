// dataload-core/src/dataset/prefetch.rs

//! Prefetching of batches ahead of consumption.
//!
//! With a queue depth of 0 a single pipeline runs on the caller's thread.
//! Otherwise every pipeline runs on its own worker thread and pushes
//! completed batches into one bounded channel; the consumer blocks on that
//! channel until a batch arrives or every worker has finished.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use super::pipeline::Pipeline;
use crate::error::{ReaderError, Result};
use crate::example::Example;

type PrefetchItem = Result<Example>;

enum Mode {
    Inline(Pipeline),
    Threaded {
        receiver: Option<Receiver<PrefetchItem>>,
        stop_flag: Arc<AtomicBool>,
        workers: Vec<JoinHandle<()>>,
    },
    Stopped,
}

/// Runs pipelines ahead of the consumer behind a bounded queue.
pub struct PrefetchScheduler {
    mode: Mode,
    exhausted: bool,
}

impl std::fmt::Debug for PrefetchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match &self.mode {
            Mode::Inline(_) => "inline".to_string(),
            Mode::Threaded { workers, .. } => format!("{} worker(s)", workers.len()),
            Mode::Stopped => "stopped".to_string(),
        };
        f.debug_struct("PrefetchScheduler")
            .field("mode", &mode)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl PrefetchScheduler {
    /// Starts the scheduler.
    ///
    /// With `depth == 0` only the first pipeline is used and it runs inline
    /// on each call to [`next`](Self::next).
    ///
    /// # Errors
    ///
    /// Returns an error if no pipeline is given or a worker thread cannot
    /// be spawned. Workers spawned before the failure are stopped.
    pub fn start(mut pipelines: Vec<Pipeline>, depth: usize) -> Result<Self> {
        if pipelines.is_empty() {
            return Err(ReaderError::reader("the prefetch scheduler needs at least one pipeline"));
        }

        if depth == 0 {
            if pipelines.len() > 1 {
                tracing::debug!(
                    partitions = pipelines.len(),
                    "synchronous reading uses a single partition"
                );
            }
            pipelines.truncate(1);
            let pipeline = pipelines.remove(0);
            return Ok(Self {
                mode: Mode::Inline(pipeline),
                exhausted: false,
            });
        }

        let (sender, receiver) = channel::bounded(depth);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let mut scheduler = Self {
            mode: Mode::Threaded {
                receiver: Some(receiver),
                stop_flag: stop_flag.clone(),
                workers: Vec::with_capacity(pipelines.len()),
            },
            exhausted: false,
        };

        for pipeline in pipelines {
            let name = format!("dataload-worker-{}", pipeline.partition());
            let sender = sender.clone();
            let stop_flag = stop_flag.clone();

            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || run_worker(pipeline, sender, stop_flag))
                .map_err(|e| ReaderError::reader(format!("failed to spawn a prefetch worker: {e}")))?;

            if let Mode::Threaded { workers, .. } = &mut scheduler.mode {
                workers.push(handle);
            }
        }

        Ok(scheduler)
    }

    /// Blocks until the next batch is available. Returns `None` once every
    /// pipeline is drained.
    pub fn next(&mut self) -> Result<Option<Example>> {
        if self.exhausted {
            return Ok(None);
        }

        let item = match &mut self.mode {
            Mode::Inline(pipeline) => pipeline.next_batch(),
            Mode::Threaded { receiver, .. } => match receiver.as_ref().map(Receiver::recv) {
                Some(Ok(item)) => item.map(Some),
                // Every sender is gone: all workers finished.
                Some(Err(_)) | None => Ok(None),
            },
            Mode::Stopped => Ok(None),
        };

        if matches!(item, Ok(None)) {
            self.exhausted = true;
        }
        item
    }

    /// Stops every worker and discards batches not yet consumed.
    pub fn stop(&mut self) {
        if let Mode::Threaded {
            receiver,
            stop_flag,
            workers,
        } = &mut self.mode
        {
            stop_flag.store(true, Ordering::Relaxed);
            // Unblocks workers waiting on a full queue.
            drop(receiver.take());

            for worker in workers.drain(..) {
                if worker.join().is_err() {
                    tracing::warn!("prefetch worker terminated abnormally");
                }
            }
            tracing::debug!("prefetch workers stopped");
        }
        self.mode = Mode::Stopped;
        self.exhausted = true;
    }
}

impl Drop for PrefetchScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(mut pipeline: Pipeline, sender: Sender<PrefetchItem>, stop_flag: Arc<AtomicBool>) {
    let partition = pipeline.partition();
    tracing::debug!(partition, "prefetch worker started");

    while !stop_flag.load(Ordering::Relaxed) {
        let item = panic::catch_unwind(AssertUnwindSafe(|| pipeline.next_batch()))
            .unwrap_or_else(|payload| {
                Err(ReaderError::reader(format!(
                    "the prefetch worker of partition {partition} panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        match item {
            Ok(Some(example)) => {
                if sender.send(Ok(example)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                if let Err(channel::SendError(Err(err))) = sender.send(Err(err)) {
                    tracing::debug!(partition, error = %err, "consumer gone, dropping worker error");
                }
                break;
            }
        }
    }

    tracing::debug!(partition, "prefetch worker finished");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
