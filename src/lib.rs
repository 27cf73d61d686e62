//! price-tracker - Single-product price tracking with change alerts
//!
//! Extracts a product's price and metadata from its page, records each reading,
//! and flags significant moves against the previous reading.

pub mod commands;
pub mod config;
pub mod detect;
pub mod extract;
pub mod format;
pub mod history;
pub mod page;

pub use config::Config;
pub use detect::ChangeDetector;
pub use extract::{ChangeResult, Observation, ObservationBuilder, ObservationRecord, Reading};
pub use history::{HistoryStore, Stores};
