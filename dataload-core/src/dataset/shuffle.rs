// dataload-core/src/dataset/shuffle.rs

//! Windowed reservoir shuffling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ReaderError, Result};

/// Holds up to `window` pending items and emits them in random order.
///
/// The buffer fills to capacity (or to the end of the input) before the
/// first emission. Each emission draws a uniformly random slot and
/// immediately backfills it from the input; once the input is exhausted
/// the window shrinks until the buffer is empty. A window of 0 or 1 passes
/// items through unchanged.
#[derive(Debug)]
pub struct ShuffleBuffer<T> {
    window: usize,
    slots: Vec<T>,
    rng: StdRng,
    filled: bool,
    upstream_done: bool,
    /// An input error raised while backfilling, returned on the next call.
    pending_error: Option<ReaderError>,
}

impl<T> ShuffleBuffer<T> {
    pub fn new(window: usize, seed: u64) -> Self {
        Self {
            window,
            slots: Vec::with_capacity(window.min(4096)),
            rng: StdRng::seed_from_u64(seed),
            filled: false,
            upstream_done: false,
            pending_error: None,
        }
    }

    /// A buffer that never reorders.
    pub fn passthrough() -> Self {
        Self::new(0, 0)
    }

    pub fn is_passthrough(&self) -> bool {
        self.window <= 1
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the next item, pulling from `input` as needed.
    pub fn next<F>(&mut self, mut input: F) -> Result<Option<T>>
    where
        F: FnMut() -> Result<Option<T>>,
    {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }
        if self.is_passthrough() {
            return input();
        }

        while !self.filled {
            if self.slots.len() >= self.window {
                self.filled = true;
                break;
            }
            match input()? {
                Some(item) => self.slots.push(item),
                None => {
                    self.upstream_done = true;
                    self.filled = true;
                }
            }
        }

        if self.slots.is_empty() {
            return Ok(None);
        }
        let slot = self.rng.gen_range(0..self.slots.len());

        if !self.upstream_done {
            match input() {
                Ok(Some(item)) => return Ok(Some(std::mem::replace(&mut self.slots[slot], item))),
                Ok(None) => self.upstream_done = true,
                Err(err) => self.pending_error = Some(err),
            }
        }
        Ok(Some(self.slots.swap_remove(slot)))
    }

    /// Drops all pending items and reseeds the generator.
    pub fn reset(&mut self, seed: u64) {
        self.slots.clear();
        self.rng = StdRng::seed_from_u64(seed);
        self.filled = false;
        self.upstream_done = false;
        self.pending_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shuffle(window: usize, seed: u64, n: u32) -> Vec<u32> {
        let mut input = 0..n;
        let mut buffer = ShuffleBuffer::new(window, seed);
        let mut out = Vec::new();
        while let Some(item) = buffer.next(|| Ok(input.next())).unwrap() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_passthrough() {
        assert_eq!(shuffle(0, 1, 5), vec![0, 1, 2, 3, 4]);
        assert_eq!(shuffle(1, 1, 5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_output_is_permutation() {
        for window in [2, 7, 100, 1000] {
            let mut out = shuffle(window, 42, 100);
            assert_ne!(out, (0..100).collect::<Vec<_>>(), "window {window}");
            out.sort();
            assert_eq!(out, (0..100).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_seed_reproducibility() {
        assert_eq!(shuffle(16, 7, 200), shuffle(16, 7, 200));
        assert_ne!(shuffle(16, 7, 200), shuffle(16, 8, 200));
    }

    #[test]
    fn test_memory_bounded_by_window() {
        let mut input = 0..10_000u32;
        let mut buffer = ShuffleBuffer::new(8, 3);
        let mut count = 0;
        while buffer.next(|| Ok(input.next())).unwrap().is_some() {
            assert!(buffer.len() <= 8);
            count += 1;
        }
        assert_eq!(count, 10_000);
    }

    #[test]
    fn test_error_while_filling_keeps_buffer() {
        let mut calls = 0;
        let mut buffer = ShuffleBuffer::new(4, 0);
        let err = buffer
            .next(|| {
                calls += 1;
                if calls == 3 {
                    Err(ReaderError::reader("boom"))
                } else {
                    Ok(Some(calls))
                }
            })
            .unwrap_err();
        assert!(matches!(err, ReaderError::Reader { .. }));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_error_while_backfilling_is_deferred() {
        let mut input = vec![Ok(Some(1)), Ok(Some(2)), Err(ReaderError::reader("late"))].into_iter();
        let mut buffer = ShuffleBuffer::new(2, 0);

        let first = buffer.next(|| input.next().unwrap_or(Ok(None))).unwrap();
        assert!(first.is_some());
        assert!(buffer.next(|| Ok(None)).is_err());
        assert!(buffer.next(|| Ok(None)).unwrap().is_some());
        assert!(buffer.next(|| Ok(None)).unwrap().is_none());
    }

    #[test]
    fn test_reset() {
        let mut buffer = ShuffleBuffer::new(4, 1);
        let mut input = 0..3u32;
        buffer.next(|| Ok(input.next())).unwrap();
        assert!(!buffer.is_empty());

        buffer.reset(1);
        assert!(buffer.is_empty());
        assert!(buffer.next(|| Ok(None::<u32>)).unwrap().is_none());
    }
}
