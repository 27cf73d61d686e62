//! CLI command implementations.

pub mod history;
pub mod track;

pub use history::HistoryCommand;
pub use track::{CycleReport, FailedCycle, TrackCommand, TrackedCycle};
