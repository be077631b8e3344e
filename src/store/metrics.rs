//! Live metrics buffer
//!
//! Bounded, per-block rolling window of the most recent hygiene-score
//! samples. Latest-wins per block for "current score" reads; history keeps
//! the most recent `HISTORY_CAPACITY` samples in insertion order with FIFO
//! eviction. No timestamp dedup: replayed samples are harmless overwrites
//! for current reads and retained in history.

use dashmap::DashMap;
use std::collections::VecDeque;

use crate::types::HygieneSample;

/// Samples retained per block
pub const HISTORY_CAPACITY: usize = 50;

/// Per-block window
struct BlockMetrics {
    current: HygieneSample,
    history: VecDeque<HygieneSample>,
}

/// Rolling hygiene-sample buffer keyed by block id
#[derive(Default)]
pub struct MetricsBuffer {
    blocks: DashMap<String, BlockMetrics>,
}

impl MetricsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one sample: replace the block's current sample and append to
    /// its bounded history.
    pub fn ingest(&self, sample: HygieneSample) {
        let mut entry = self
            .blocks
            .entry(sample.block_id.clone())
            .or_insert_with(|| BlockMetrics {
                current: sample.clone(),
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
            });

        entry.current = sample.clone();
        entry.history.push_back(sample);
        while entry.history.len() > HISTORY_CAPACITY {
            entry.history.pop_front();
        }
    }

    /// Latest sample for a block
    pub fn current(&self, block_id: &str) -> Option<HygieneSample> {
        self.blocks.get(block_id).map(|b| b.current.clone())
    }

    /// Latest score for a block
    pub fn current_score(&self, block_id: &str) -> Option<f64> {
        self.blocks.get(block_id).map(|b| b.current.score)
    }

    /// Snapshot of a block's history, oldest first
    pub fn history(&self, block_id: &str) -> Vec<HygieneSample> {
        self.blocks
            .get(block_id)
            .map(|b| b.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Known block ids
    pub fn block_ids(&self) -> Vec<String> {
        self.blocks.iter().map(|e| e.key().clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
