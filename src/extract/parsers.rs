//! Field parsers that normalize raw page fragments into typed values.
//!
//! Every parser is total: malformed or empty input degrades to [`NotAvailable`]
//! instead of an error, so one missing field never spoils the rest of an observation.

use super::models::{NotAvailable, ParsedPrice};
use regex_lite::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, trace};

mod patterns {
    use super::*;

    /// Leftmost price: 1-3 digits, comma thousands groups, optional decimals.
    pub static PRICE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\d{1,3}(?:,\d{3})*(?:\.\d+)?").unwrap());

    pub static DISCOUNT: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?%").unwrap());

    pub static RATING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

    pub static RATING_COUNT: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\d{1,3}(?:,\d{3})*").unwrap());
}

/// Collapses whitespace. Fragments arrive as element text, so `<` and `>` are literal.
pub fn clean_fragment(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(raw: &str) -> Result<String, NotAvailable> {
    let cleaned = clean_fragment(raw);
    if cleaned.is_empty() {
        Err(NotAvailable)
    } else {
        Ok(cleaned)
    }
}

/// Parses the first price in the fragment.
///
/// Pages sometimes repeat the price text ("$12.99 $12.99"), so only the first
/// match counts. The display string keeps the thousands separators.
pub fn parse_price(raw: &str, currency_symbol: &str) -> Result<ParsedPrice, NotAvailable> {
    let text = non_empty(raw)?;
    let digits = patterns::PRICE.find(&text).ok_or(NotAvailable)?.as_str();

    let display = if currency_symbol.is_empty() {
        digits.to_string()
    } else {
        format!("{} {}", currency_symbol, digits)
    };

    let numeric = digits.replace(',', "").parse::<f64>().ok();
    if numeric.is_none() {
        debug!("Could not convert price '{}' to a number", digits);
    }

    trace!("Parsed price {:?} from '{}'", numeric, text);
    Ok(ParsedPrice { display, numeric })
}

/// Parses a discount percentage, passing non-percentage text through.
pub fn parse_discount(raw: &str) -> Result<String, NotAvailable> {
    let text = non_empty(raw)?;
    Ok(patterns::DISCOUNT.find(&text).map(|m| m.as_str().to_string()).unwrap_or(text))
}

/// Parses the product name verbatim.
pub fn parse_name(raw: &str) -> Result<String, NotAvailable> {
    non_empty(raw)
}

/// Parses a star rating into "<value> out of 5".
pub fn parse_rating(raw: &str) -> Result<String, NotAvailable> {
    let text = non_empty(raw)?;
    // Digit-free text ("No ratings yet") is missing, the same as price.
    let value = patterns::RATING.find(&text).ok_or(NotAvailable)?;
    Ok(format!("{} out of 5", value.as_str()))
}

/// Parses a rating count, keeping thousands separators.
pub fn parse_rating_count(raw: &str) -> Result<String, NotAvailable> {
    let text = non_empty(raw)?;
    // Digit-free text is missing rather than passed through.
    let count = patterns::RATING_COUNT.find(&text).ok_or(NotAvailable)?;
    Ok(count.as_str().to_string())
}

/// Reads one key from a structured extraction payload.
///
/// Accepts a single object or a non-empty list whose first element is an object.
/// Malformed JSON, empty lists, and missing keys are all `NotAvailable`.
pub fn parse_structured(payload: &str, key: &str) -> Result<String, NotAvailable> {
    let json = strip_code_fence(payload);

    let value: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            debug!("Error parsing structured payload: {}", e);
            return Err(NotAvailable);
        }
    };

    let object = match &value {
        Value::Object(map) => map,
        Value::Array(items) => match items.first() {
            Some(Value::Object(map)) => map,
            _ => return Err(NotAvailable),
        },
        _ => return Err(NotAvailable),
    };

    let text = match object.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(NotAvailable),
    };

    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("not available") {
        return Err(NotAvailable);
    }

    Ok(text.to_string())
}

/// Models often wrap JSON in ```json fences.
fn strip_code_fence(payload: &str) -> &str {
    let trimmed = payload.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
