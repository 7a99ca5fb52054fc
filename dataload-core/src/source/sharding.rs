// dataload-core/src/source/sharding.rs

//! Skip, limit, shard and subsample decisions over the logical record
//! stream.
//!
//! Shard assignment is round-robin on the position of a record after the
//! skip: record `p` belongs to shard `p % num_shards`. This makes it a pure
//! function of the position, so the shards of a stream are disjoint and
//! together cover it exactly once.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ReaderParams;

/// Returns the shard a record at `position` belongs to.
#[inline]
pub fn shard_of(position: u64, num_shards: usize) -> usize {
    (position % num_shards.max(1) as u64) as usize
}

/// What to do with the next record of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Hand the record to the parser.
    Admit,
    /// Drop the record and look at the next one.
    Reject,
    /// The read limit is reached; stop reading.
    Exhausted,
}

/// Stateful admission filter applied to records in stream order.
#[derive(Debug)]
pub struct AdmissionFilter {
    to_skip: usize,
    to_skip_remaining: usize,
    to_read: Option<usize>,
    to_read_remaining: Option<usize>,
    shard_index: usize,
    num_shards: usize,
    position: u64,
    subsample_ratio: Option<f64>,
    rng: StdRng,
}

impl AdmissionFilter {
    pub fn new(params: &ReaderParams, seed: u64) -> Self {
        Self {
            to_skip: params.num_instances_to_skip,
            to_skip_remaining: params.num_instances_to_skip,
            to_read: params.num_instances_to_read,
            to_read_remaining: params.num_instances_to_read,
            shard_index: params.shard_index,
            num_shards: params.num_shards.max(1),
            position: 0,
            subsample_ratio: params.subsample_ratio.filter(|r| *r < 1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Consumes one unit of the skip count. True while the record is still
    /// within the skipped prefix of the stream.
    pub fn skips(&mut self) -> bool {
        if self.to_skip_remaining > 0 {
            self.to_skip_remaining -= 1;
            return true;
        }
        false
    }

    /// True when a read limit is set.
    pub fn limits_reads(&self) -> bool {
        self.to_read.is_some()
    }

    /// Decides the fate of the next record past the skipped prefix.
    ///
    /// Only `counted` records use up the read limit. Records that are not
    /// counted still take a position, so shard assignment stays a function
    /// of the stream alone.
    pub fn admit(&mut self, counted: bool) -> Admission {
        if let Some(remaining) = self.to_read_remaining.as_mut() {
            if *remaining == 0 {
                return Admission::Exhausted;
            }
            if counted {
                *remaining -= 1;
            }
        }

        let position = self.position;
        self.position += 1;
        if shard_of(position, self.num_shards) != self.shard_index {
            return Admission::Reject;
        }

        match self.subsample_ratio {
            Some(ratio) if !self.rng.gen_bool(ratio) => Admission::Reject,
            _ => Admission::Admit,
        }
    }

    /// Rewinds to the start of the stream.
    pub fn reset(&mut self, seed: u64) {
        self.to_skip_remaining = self.to_skip;
        self.to_read_remaining = self.to_read;
        self.position = 0;
        self.rng = StdRng::seed_from_u64(seed);
    }
}
