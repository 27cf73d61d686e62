//! Builds observations by trying each field's extraction strategies in order.

use super::models::{Field, NotAvailable, Observation};
use super::parsers;
use crate::config::{Config, SelectorConfig};
use crate::page::PageSource;
use chrono::Utc;
use tracing::{debug, info, warn};

/// Instruction sent to the structured extractor when the name selector misses.
pub const NAME_INSTRUCTION: &str = "Extract only the exact product name from this product page. \
     Return the data in JSON format with key 'name'.";

/// One way of obtaining a field's raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Text of the elements matching a CSS selector.
    Selector(String),
    /// A JSON payload from the structured extractor, read at the field's key.
    Structured { instruction: String },
}

/// Ordered strategies for every field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPlan {
    price: Vec<Strategy>,
    name: Vec<Strategy>,
    discount: Vec<Strategy>,
    rating: Vec<Strategy>,
    rating_count: Vec<Strategy>,
}

impl ExtractionPlan {
    /// One selector strategy per field.
    pub fn from_selectors(selectors: &SelectorConfig) -> Self {
        Self {
            price: vec![Strategy::Selector(selectors.price.clone())],
            name: vec![Strategy::Selector(selectors.name.clone())],
            discount: vec![Strategy::Selector(selectors.discount.clone())],
            rating: vec![Strategy::Selector(selectors.rating.clone())],
            rating_count: vec![Strategy::Selector(selectors.rating_count.clone())],
        }
    }

    /// Configured selectors, with structured extraction as the name fallback.
    pub fn from_config(config: &Config) -> Self {
        Self::from_selectors(&config.selectors).with_fallback(
            Field::Name,
            Strategy::Structured { instruction: NAME_INSTRUCTION.to_string() },
        )
    }

    /// Appends a strategy to the end of a field's list.
    pub fn with_fallback(mut self, field: Field, strategy: Strategy) -> Self {
        self.strategies_mut(field).push(strategy);
        self
    }

    pub fn strategies(&self, field: Field) -> &[Strategy] {
        match field {
            Field::Price => &self.price,
            Field::Name => &self.name,
            Field::Discount => &self.discount,
            Field::Rating => &self.rating,
            Field::RatingCount => &self.rating_count,
        }
    }

    fn strategies_mut(&mut self, field: Field) -> &mut Vec<Strategy> {
        match field {
            Field::Price => &mut self.price,
            Field::Name => &mut self.name,
            Field::Discount => &mut self.discount,
            Field::Rating => &mut self.rating,
            Field::RatingCount => &mut self.rating_count,
        }
    }
}

/// Assembles one [`Observation`] per call from a page source.
pub struct ObservationBuilder {
    plan: ExtractionPlan,
    currency_symbol: String,
}

impl ObservationBuilder {
    /// Creates a builder with an explicit plan.
    pub fn new(plan: ExtractionPlan, currency_symbol: impl Into<String>) -> Self {
        Self { plan, currency_symbol: currency_symbol.into() }
    }

    /// Creates a builder from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(ExtractionPlan::from_config(config), config.currency_symbol.clone())
    }

    /// Extracts every field and stamps the result with a single timestamp.
    ///
    /// Never fails: fields that cannot be obtained resolve to their sentinel.
    pub async fn build(&self, source: &impl PageSource, url: &str) -> Observation {
        let symbol = self.currency_symbol.as_str();

        let price =
            self.extract(source, url, Field::Price, |raw| parsers::parse_price(raw, symbol)).await;
        let discount = self.extract(source, url, Field::Discount, parsers::parse_discount).await;
        let name = self.extract(source, url, Field::Name, parsers::parse_name).await;
        let rating = self.extract(source, url, Field::Rating, parsers::parse_rating).await;
        let rating_count =
            self.extract(source, url, Field::RatingCount, parsers::parse_rating_count).await;

        let observation = Observation::new(
            Utc::now(),
            name.into(),
            price,
            discount.into(),
            rating.into(),
            rating_count.into(),
        );

        if observation.is_empty() {
            warn!("No fields could be extracted from {}", url);
        } else {
            info!(
                "Built observation: {} at {}",
                observation.product_name().display(Field::Name),
                observation.price_raw().display(Field::Price)
            );
        }

        observation
    }

    /// Tries the field's strategies in order and returns the first parsed value.
    async fn extract<T>(
        &self,
        source: &impl PageSource,
        url: &str,
        field: Field,
        parse: impl Fn(&str) -> Result<T, NotAvailable>,
    ) -> Result<T, NotAvailable> {
        for strategy in self.plan.strategies(field) {
            let raw = match strategy {
                Strategy::Selector(css) => match source.fragment(url, css).await {
                    Ok(text) => text,
                    Err(e) => {
                        debug!("{} selector '{}' failed: {:#}", field, css, e);
                        continue;
                    }
                },
                Strategy::Structured { instruction } => {
                    if !source.supports_structured() {
                        debug!("Skipping structured extraction for {}: not configured", field);
                        continue;
                    }

                    info!("Falling back to structured extraction for {}", field);
                    match source.structured(url, instruction).await {
                        Ok(payload) => match parsers::parse_structured(&payload, field.json_key())
                        {
                            Ok(value) => value,
                            Err(NotAvailable) => {
                                warn!("Structured payload had no usable {}", field);
                                continue;
                            }
                        },
                        Err(e) => {
                            warn!("Structured extraction for {} failed: {:#}", field, e);
                            continue;
                        }
                    }
                }
            };

            match parse(&raw) {
                Ok(value) => return Ok(value),
                Err(NotAvailable) => debug!("{} not parseable from '{}'", field, raw),
            }
        }

        Err(NotAvailable)
    }
}
