//! Price tracking command: one extract/persist/detect cycle, or a loop of them.

use crate::config::Config;
use crate::detect::ChangeDetector;
use crate::extract::models::timestamp_format;
use crate::extract::{ChangeResult, ObservationBuilder, ObservationRecord};
use crate::format::Formatter;
use crate::history::Stores;
use crate::page::{PageSource, WebPage};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// A cycle that produced a persisted observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedCycle {
    #[serde(flatten)]
    pub record: ObservationRecord,
    /// `None` when no numeric price was available to compare.
    pub change: Option<ChangeResult>,
}

/// A cycle that produced nothing worth persisting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedCycle {
    pub error: String,
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one tracking cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CycleReport {
    Tracked(TrackedCycle),
    Failed(FailedCycle),
}

impl CycleReport {
    /// The change result, when a comparison flagged a move.
    pub fn alert(&self) -> Option<&ChangeResult> {
        match self {
            CycleReport::Tracked(TrackedCycle { change: Some(change), .. }) if change.changed => {
                Some(change)
            }
            _ => None,
        }
    }
}

/// Tracks one product page.
pub struct TrackCommand {
    config: Config,
    builder: ObservationBuilder,
    stores: Stores,
    detector: ChangeDetector,
}

impl TrackCommand {
    /// Creates a tracker with the configured history backends.
    pub fn new(config: Config) -> Self {
        let stores = Stores::from_config(&config);
        Self::with_stores(config, stores)
    }

    /// Creates a tracker with explicit history backends.
    pub fn with_stores(config: Config, stores: Stores) -> Self {
        let builder = ObservationBuilder::from_config(&config);
        let detector = ChangeDetector::from_config(stores.clone(), &config);
        Self { config, builder, stores, detector }
    }

    /// Runs a single cycle and returns the formatted report.
    pub async fn execute(&self, url: &str) -> Result<String> {
        let page = WebPage::new(&self.config).await.context("Failed to create HTTP client")?;

        self.stores.open().await;
        let report = self.run_cycle(&page, url).await;
        self.stores.close().await;

        Ok(Formatter::new(self.config.format).format_report(&report))
    }

    /// Runs cycles every `interval_secs` until Ctrl-C.
    pub async fn run(&self, url: &str) -> Result<()> {
        let page = WebPage::new(&self.config).await.context("Failed to create HTTP client")?;

        println!("Starting price tracker for: {}", url);
        println!("Checking price every {} seconds", self.interval().as_secs());

        let interrupted = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Could not listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        let cycles = self.run_until(&page, url, interrupted).await;
        info!("Tracker stopped after {} cycles", cycles);
        Ok(())
    }

    /// Runs cycles against `source` until `shutdown` resolves; returns the completed cycle count.
    ///
    /// The shutdown future is created once and polled across cycles and sleeps alike.
    pub async fn run_until(
        &self,
        source: &impl PageSource,
        url: &str,
        shutdown: impl Future<Output = ()>,
    ) -> usize {
        let mut shutdown = std::pin::pin!(shutdown);
        let formatter = Formatter::new(self.config.format);
        let interval = self.interval();
        let mut cycles = 0;

        self.stores.open().await;

        loop {
            let report = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Interrupted during cycle, stopping tracker");
                    break;
                }
                report = self.run_cycle(source, url) => report,
            };

            cycles += 1;
            println!("{}", formatter.format_report(&report));

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Interrupted, stopping tracker");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.stores.close().await;
        cycles
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_secs.max(1))
    }

    /// Runs one cycle against a provided page source. Never fails; errors become reports.
    pub async fn run_cycle(&self, source: &impl PageSource, url: &str) -> CycleReport {
        let started = Utc::now();

        match self.try_cycle(source, url).await {
            Ok(report) => report,
            Err(e) => {
                error!("Error in price tracking: {:#}", e);
                CycleReport::Failed(FailedCycle { error: format!("{:#}", e), timestamp: started })
            }
        }
    }

    async fn try_cycle(&self, source: &impl PageSource, url: &str) -> Result<CycleReport> {
        validate_url(url)?;

        let observation = self.builder.build(source, url).await;

        if !observation.price_raw().is_available() {
            warn!("Failed to extract price from {}", url);
            return Ok(CycleReport::Failed(FailedCycle {
                error: "Failed to extract price".to_string(),
                timestamp: observation.timestamp(),
            }));
        }

        if self.stores.append(&observation).await == 0 {
            warn!("Observation was not saved to any history store");
        }

        let change = match observation.price_numeric() {
            Some(price) => Some(self.detector.detect(Some(price)).await),
            None => None,
        };

        Ok(CycleReport::Tracked(TrackedCycle { record: observation.to_record(), change }))
    }
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        anyhow::bail!("Invalid product URL: '{}'. Expected an http(s) URL.", url);
    }
    Ok(())
}
