//! Data models for observations, field readings, and change results.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp layout used by the CSV log and JSON output.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Marker for a field that could not be extracted or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotAvailable;

impl fmt::Display for NotAvailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not available")
    }
}

/// The logical fields extracted from a product page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Price,
    Discount,
    Rating,
    RatingCount,
}

impl Field {
    /// All fields in extraction order.
    pub fn all() -> [Field; 5] {
        [Field::Price, Field::Discount, Field::Name, Field::Rating, Field::RatingCount]
    }

    /// Text stored and displayed when the field is unavailable.
    pub fn sentinel(&self) -> &'static str {
        match self {
            Field::Name => "Unknown Product",
            Field::Discount => "No discount",
            Field::Price | Field::Rating | Field::RatingCount => "Not available",
        }
    }

    /// Key used for this field in structured extraction payloads.
    pub fn json_key(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Price => "price",
            Field::Discount => "discount",
            Field::Rating => "rating",
            Field::RatingCount => "reviews_count",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Name => write!(f, "name"),
            Field::Price => write!(f, "price"),
            Field::Discount => write!(f, "discount"),
            Field::Rating => write!(f, "rating"),
            Field::RatingCount => write!(f, "rating_count"),
        }
    }
}

/// A field value, or the explicit absence of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    Value(String),
    Unavailable,
}

impl Reading {
    /// Returns the value, if present.
    pub fn value(&self) -> Option<&str> {
        match self {
            Reading::Value(v) => Some(v),
            Reading::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Reading::Value(_))
    }

    /// Returns the value or the field's sentinel text.
    pub fn display(&self, field: Field) -> &str {
        self.value().unwrap_or(field.sentinel())
    }

    /// Reads back persisted text, mapping the field's sentinel to `Unavailable`.
    pub fn from_stored(text: &str, field: Field) -> Self {
        let text = text.trim();
        if text.is_empty() || text == field.sentinel() {
            Reading::Unavailable
        } else {
            Reading::Value(text.to_string())
        }
    }
}

impl From<Result<String, NotAvailable>> for Reading {
    fn from(result: Result<String, NotAvailable>) -> Self {
        match result {
            Ok(v) => Reading::Value(v),
            Err(NotAvailable) => Reading::Unavailable,
        }
    }
}

/// A parsed price: the display string and the numeric value behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrice {
    /// Currency-prefixed display text, e.g. "$ 1,234.56"
    pub display: String,
    /// Numeric value; None if the matched digits did not form a valid decimal
    pub numeric: Option<f64>,
}

/// One point-in-time reading of the tracked product.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    timestamp: DateTime<Utc>,
    product_name: Reading,
    price_raw: Reading,
    price_numeric: Option<f64>,
    discount: Reading,
    rating: Reading,
    rating_count: Reading,
}

impl Observation {
    /// Assembles an observation. The numeric price only ever comes from `price`.
    pub fn new(
        timestamp: DateTime<Utc>,
        product_name: Reading,
        price: Result<ParsedPrice, NotAvailable>,
        discount: Reading,
        rating: Reading,
        rating_count: Reading,
    ) -> Self {
        let (price_raw, price_numeric) = match price {
            Ok(p) => (Reading::Value(p.display), p.numeric),
            Err(NotAvailable) => (Reading::Unavailable, None),
        };

        Self { timestamp, product_name, price_raw, price_numeric, discount, rating, rating_count }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn product_name(&self) -> &Reading {
        &self.product_name
    }

    pub fn price_raw(&self) -> &Reading {
        &self.price_raw
    }

    pub fn price_numeric(&self) -> Option<f64> {
        self.price_numeric
    }

    pub fn discount(&self) -> &Reading {
        &self.discount
    }

    pub fn rating(&self) -> &Reading {
        &self.rating
    }

    pub fn rating_count(&self) -> &Reading {
        &self.rating_count
    }

    /// Returns the reading for a field. The price reading is the display text.
    pub fn reading(&self, field: Field) -> &Reading {
        match field {
            Field::Name => &self.product_name,
            Field::Price => &self.price_raw,
            Field::Discount => &self.discount,
            Field::Rating => &self.rating,
            Field::RatingCount => &self.rating_count,
        }
    }

    /// True when every field resolved to its sentinel.
    pub fn is_empty(&self) -> bool {
        Field::all().iter().all(|f| !self.reading(*f).is_available())
    }

    /// Flattens into the canonical persisted schema.
    pub fn to_record(&self) -> ObservationRecord {
        ObservationRecord {
            timestamp: self.timestamp,
            product_name: self.product_name.display(Field::Name).to_string(),
            price: self.price_raw.display(Field::Price).to_string(),
            price_numeric: self.price_numeric,
            discount: self.discount.display(Field::Discount).to_string(),
            rating: self.rating.display(Field::Rating).to_string(),
            num_ratings: self.rating_count.display(Field::RatingCount).to_string(),
        }
    }
}

/// Canonical flat schema shared by every history backend and JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
    pub product_name: String,
    pub price: String,
    pub price_numeric: Option<f64>,
    pub discount: String,
    pub rating: String,
    pub num_ratings: String,
}

impl ObservationRecord {
    /// Column names, in persisted order.
    pub const COLUMNS: [&'static str; 7] =
        ["timestamp", "product_name", "price", "price_numeric", "discount", "rating", "num_ratings"];

    /// Rebuilds an observation. A missing price display forces the numeric value to None.
    pub fn into_observation(self) -> Observation {
        let price_raw = Reading::from_stored(&self.price, Field::Price);
        let price_numeric = if price_raw.is_available() { self.price_numeric } else { None };

        Observation {
            timestamp: self.timestamp,
            product_name: Reading::from_stored(&self.product_name, Field::Name),
            price_raw,
            price_numeric,
            discount: Reading::from_stored(&self.discount, Field::Discount),
            rating: Reading::from_stored(&self.rating, Field::Rating),
            rating_count: Reading::from_stored(&self.num_ratings, Field::RatingCount),
        }
    }
}

impl From<&Observation> for ObservationRecord {
    fn from(observation: &Observation) -> Self {
        observation.to_record()
    }
}

/// Formats a timestamp the way the CSV log and reports show it.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Serde adapter for `%Y-%m-%d %H:%M:%S` timestamps (UTC).
pub mod timestamp_format {
    use super::{format_timestamp, TIMESTAMP_FORMAT};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_timestamp(&text).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid timestamp '{}', expected {}", text, TIMESTAMP_FORMAT))
        })
    }
}

/// Parses a stored timestamp; accepts the CSV layout and RFC 3339.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.with_timezone(&Utc)))
}

/// Outcome of comparing the current price against the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub changed: bool,
    /// Absolute fractional change (0.025 = 2.5%)
    pub percent_change: f64,
}

impl ChangeResult {
    /// No comparison was possible.
    pub fn none() -> Self {
        Self { changed: false, percent_change: 0.0 }
    }
}

impl Default for ChangeResult {
    fn default() -> Self {
        Self::none()
    }
}
