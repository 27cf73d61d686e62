//! Observation history: the append/query contract and its backends.

pub mod csv_log;
pub mod memory;
pub mod mongo;

use crate::config::Config;
use crate::extract::Observation;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use csv_log::CsvLog;
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Identifier a backend assigns to an appended observation.
pub type RecordId = String;

/// Failures a history backend reports instead of panicking.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unreachable: {0}")]
    Unreachable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

/// Append-only observation history.
///
/// `append` signals failure as a value so callers can choose their own fallback.
/// `most_recent` never fails: an unreachable store reads as empty history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Establishes connectivity ahead of first use.
    async fn open(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Releases any held connection; the next call reconnects lazily.
    async fn close(&self) {}

    /// Durably records one observation.
    async fn append(&self, observation: &Observation) -> Result<RecordId, StoreError>;

    /// Up to `n` observations, newest first.
    async fn most_recent(&self, n: usize) -> Vec<Observation>;
}

/// The configured backends: a primary store and an optional secondary log.
#[derive(Clone)]
pub struct Stores {
    primary: Arc<dyn HistoryStore>,
    secondary: Option<Arc<dyn HistoryStore>>,
}

impl Stores {
    /// A single backend with no fallback.
    pub fn single(primary: Arc<dyn HistoryStore>) -> Self {
        Self { primary, secondary: None }
    }

    /// Adds a secondary backend, written alongside and read when the primary is short.
    pub fn with_secondary(mut self, secondary: Arc<dyn HistoryStore>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// MongoDB primary with the CSV log as secondary, CSV alone, or in-memory history.
    pub fn from_config(config: &Config) -> Self {
        let csv: Option<Arc<dyn HistoryStore>> =
            config.csv_log_path().map(|p| Arc::new(CsvLog::new(p)) as Arc<dyn HistoryStore>);

        match (MongoStore::from_config(config), csv) {
            (Some(mongo), Some(csv)) => Self::single(Arc::new(mongo)).with_secondary(csv),
            (Some(mongo), None) => Self::single(Arc::new(mongo)),
            (None, Some(csv)) => Self::single(csv),
            (None, None) => {
                info!("No persistent history configured; keeping history in memory");
                Self::single(Arc::new(MemoryStore::new()))
            }
        }
    }

    pub fn primary(&self) -> &Arc<dyn HistoryStore> {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&Arc<dyn HistoryStore>> {
        self.secondary.as_ref()
    }

    fn all(&self) -> impl Iterator<Item = &Arc<dyn HistoryStore>> {
        std::iter::once(&self.primary).chain(self.secondary.iter())
    }

    /// Opens every backend, logging the ones that are unreachable.
    pub async fn open(&self) {
        for store in self.all() {
            match store.open().await {
                Ok(()) => debug!("Opened {} history", store.name()),
                Err(e) => warn!("{} history unavailable: {}", store.name(), e),
            }
        }
    }

    pub async fn close(&self) {
        for store in self.all() {
            store.close().await;
        }
    }

    /// Appends to every backend; returns how many accepted the observation.
    pub async fn append(&self, observation: &Observation) -> usize {
        let mut saved = 0;
        for store in self.all() {
            match store.append(observation).await {
                Ok(id) => {
                    info!("Observation saved to {} with ID: {}", store.name(), id);
                    saved += 1;
                }
                Err(e) => warn!("Error saving observation to {}: {}", store.name(), e),
            }
        }
        saved
    }

    /// Up to `n` recent observations from the primary, or the secondary if the primary has none.
    pub async fn most_recent(&self, n: usize) -> Vec<Observation> {
        let history = self.primary.most_recent(n).await;
        if !history.is_empty() {
            return history;
        }

        match &self.secondary {
            Some(secondary) => secondary.most_recent(n).await,
            None => history,
        }
    }
}
