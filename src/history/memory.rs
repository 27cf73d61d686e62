//! Process-local history, used when no persistent backend is configured.

use super::{HistoryStore, RecordId, StoreError};
use crate::extract::Observation;
use async_trait::async_trait;
use std::sync::RwLock;

/// In-memory history; lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<Observation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, observation: &Observation) -> Result<RecordId, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.push(observation.clone());
        Ok(entries.len().to_string())
    }

    async fn most_recent(&self, n: usize) -> Vec<Observation> {
        let entries = self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner());

        // Newest insert first, then a stable sort keeps that order for equal timestamps
        let mut recent: Vec<Observation> = entries.iter().rev().cloned().collect();
        recent.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        recent.truncate(n);
        recent
    }
}
