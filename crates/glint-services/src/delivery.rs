//! Delivery tracking — per-index sighting counts for each capture stream.
//!
//! A camera parked on one symbol reports it at its frame rate for as long
//! as the symbol stays up, so only counts are kept: memory is bounded by
//! `indices × streams`, not by how long a frame is held.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

/// Sightings of one symbol index, keyed by capture stream.
pub type StreamCounts = HashMap<String, u64>;

/// Tracks which capture streams saw which symbol indices, and how often.
#[derive(Clone, Default)]
pub struct DeliveryTracker {
    sightings: Arc<DashMap<u32, StreamCounts>>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sighting of `index` on `stream`.
    pub fn record(&self, index: u32, stream: &str) {
        let mut counts = self.sightings.entry(index).or_default();
        match counts.get_mut(stream) {
            Some(n) => *n = n.saturating_add(1),
            None => {
                counts.insert(stream.to_string(), 1);
            }
        }
    }

    /// Per-stream sighting counts for `index`.
    pub fn get(&self, index: u32) -> Option<StreamCounts> {
        self.sightings.get(&index).map(|c| c.clone())
    }

    /// How many times `index` was seen, repeats included.
    pub fn delivery_count(&self, index: u32) -> u64 {
        self.sightings
            .get(&index)
            .map(|c| c.values().sum())
            .unwrap_or(0)
    }

    /// Indices seen by more than one distinct stream.
    pub fn multi_stream_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self
            .sightings
            .iter()
            .filter(|entry| entry.value().len() > 1)
            .map(|entry| *entry.key())
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Log a summary of repeated and multi-stream deliveries.
    pub fn log_stats(&self) {
        let mut multi_stream = 0usize;
        let mut repeated = 0usize;
        let mut sightings = 0u64;

        for entry in self.sightings.iter() {
            let counts = entry.value();
            let total: u64 = counts.values().sum();
            sightings = sightings.saturating_add(total);
            if counts.len() > 1 {
                multi_stream += 1;
            } else if total > 1 {
                repeated += 1;
            }
        }

        tracing::info!(
            indices_seen = self.sightings.len(),
            sightings,
            multi_stream_indices = multi_stream,
            repeated_indices = repeated,
            "delivery tracker stats"
        );
    }
}
