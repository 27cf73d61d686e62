//! Page fetching: HTTP client, CSS selectors, and structured extraction.

pub mod client;
pub mod llm;
pub mod selectors;

pub use client::{PageSource, WebPage};
pub use llm::LlmExtractor;
