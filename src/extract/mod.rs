//! Turning page fragments into structured observations.

pub mod builder;
pub mod models;
pub mod parsers;

pub use builder::{ExtractionPlan, ObservationBuilder, Strategy};
pub use models::{
    ChangeResult, Field, NotAvailable, Observation, ObservationRecord, ParsedPrice, Reading,
};
