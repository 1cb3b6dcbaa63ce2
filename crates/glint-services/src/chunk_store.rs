//! Chunk store — index-keyed, first-writer-wins accumulation of payloads.
//!
//! Shared by every capture stream of a session. Each index is set at most
//! once through an atomic check-and-set on its DashMap entry, so streams
//! never coordinate beyond holding the same store.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Result of offering a payload to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// First arrival for this index; stored.
    Inserted,
    /// Index already present with identical bytes.
    Duplicate,
    /// Index already present with different bytes; the first value is kept.
    Conflict,
}

#[derive(Clone, Default)]
pub struct ChunkStore {
    chunks: Arc<DashMap<u32, Bytes>>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(DashMap::new()),
        }
    }

    /// Store `payload` under `index` unless the index is already taken.
    pub fn insert(&self, index: u32, payload: Bytes) -> InsertOutcome {
        match self.chunks.entry(index) {
            Entry::Occupied(existing) => {
                if *existing.get() == payload {
                    InsertOutcome::Duplicate
                } else {
                    InsertOutcome::Conflict
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(payload);
                InsertOutcome::Inserted
            }
        }
    }

    pub fn get(&self, index: u32) -> Option<Bytes> {
        self.chunks.get(&index).map(|c| c.value().clone())
    }

    pub fn contains(&self, index: u32) -> bool {
        self.chunks.contains_key(&index)
    }

    /// Distinct indices stored so far. Never decreases.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Ascending indices in `[0, total)` not yet stored.
    pub fn missing(&self, total: u32) -> Vec<u32> {
        (0..total).filter(|i| !self.chunks.contains_key(i)).collect()
    }
}
