//! Price-change detection against persisted history.

use crate::config::Config;
use crate::extract::{ChangeResult, Observation};
use crate::history::Stores;
use tracing::{debug, info};

/// Compares a freshly persisted price against the one stored before it.
pub struct ChangeDetector {
    stores: Stores,
    threshold: f64,
    lookback: usize,
}

impl ChangeDetector {
    /// `lookback` is raised to 2: the newest row is the current observation itself.
    pub fn new(stores: Stores, threshold: f64, lookback: usize) -> Self {
        Self { stores, threshold, lookback: lookback.max(2) }
    }

    pub fn from_config(stores: Stores, config: &Config) -> Self {
        Self::new(stores, config.price_change_threshold, config.history_lookback)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Expects the current observation to already be persisted.
    pub async fn detect(&self, current: Option<f64>) -> ChangeResult {
        let Some(current) = current else {
            return ChangeResult::none();
        };

        let history = self.history().await;
        if history.len() < 2 {
            debug!("Not enough history to compare ({} entries)", history.len());
            return ChangeResult::none();
        }

        let result = compare(current, history[1].price_numeric(), self.threshold);
        if result.changed {
            info!("Price moved {:.2}% from previous observation", result.percent_change * 100.0);
        }
        result
    }

    /// Primary history, or the secondary's when the primary cannot supply a baseline.
    async fn history(&self) -> Vec<Observation> {
        let history = self.stores.primary().most_recent(self.lookback).await;
        if history.len() >= 2 {
            return history;
        }

        match self.stores.secondary() {
            Some(secondary) => {
                debug!("Reading baseline from {} history", secondary.name());
                secondary.most_recent(self.lookback).await
            }
            None => history,
        }
    }
}

/// Relative change of `current` against `previous`; changed when it reaches `threshold`.
pub fn compare(current: f64, previous: Option<f64>, threshold: f64) -> ChangeResult {
    let Some(previous) = previous else {
        return ChangeResult::none();
    };
    if previous.is_nan() || previous <= 0.0 {
        return ChangeResult::none();
    }

    let percent_change = (current - previous).abs() / previous;
    ChangeResult { changed: percent_change >= threshold, percent_change }
}
