use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use super::repair::repair_orders_list;
use super::{ParserChain, Tier};

pub const MARKER_WITH_COLON: &str = "marker_with_colon";
pub const MARKER_WITHOUT_COLON: &str = "marker_without_colon";
pub const FENCED_JSON: &str = "fenced_json";
pub const BRACKET_REPAIR: &str = "bracket_repair";

static MARKER_COLON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"PARSABLE OUTPUT:\s*(\{[\s\S]*\})").expect("valid regex")
});
static MARKER_INLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)PARSABLE OUTPUT\s*\{(.*?)\}\s*$").expect("valid regex")
});
static FENCED_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("valid regex"));

static ORDER_CHAIN: Lazy<ParserChain<Map<String, Value>>> = Lazy::new(|| {
    ParserChain::new(vec![
        Tier::new(MARKER_WITH_COLON, |raw| decode_object(&locate_marker_with_colon(raw)?)),
        Tier::new(MARKER_WITHOUT_COLON, |raw| decode_object(&locate_marker_without_colon(raw)?)),
        Tier::new(FENCED_JSON, |raw| decode_object(&locate_fenced_json(raw)?)),
        Tier::new(BRACKET_REPAIR, bracket_repair),
    ])
});

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrderDecodingError {
    #[error("no structured order block found in response")]
    NoStructuredContent,
    #[error("order block found by {tier} has no `orders` field")]
    MissingOrdersField { tier: &'static str },
    #[error("order block found by {tier} lists no orders")]
    EmptyOrders { tier: &'static str },
}

/// Candidate order list and the tier that produced it. `orders` is the raw
/// JSON value; the validator decides whether it is usable.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderExtraction {
    pub tier: &'static str,
    pub orders: Value,
}

pub fn extract_orders(raw: &str) -> Result<OrderExtraction, OrderDecodingError> {
    let (tier, mut object) =
        ORDER_CHAIN.first_match(raw).ok_or(OrderDecodingError::NoStructuredContent)?;

    let orders = match object.remove("orders") {
        None | Some(Value::Null) => return Err(OrderDecodingError::MissingOrdersField { tier }),
        Some(orders) => orders,
    };
    if orders.as_array().is_some_and(Vec::is_empty) {
        return Err(OrderDecodingError::EmptyOrders { tier });
    }

    tracing::debug!(event_name = "parser.orders.extracted", tier, "order block extracted");
    Ok(OrderExtraction { tier, orders })
}

fn locate_marker_with_colon(raw: &str) -> Option<String> {
    MARKER_COLON.captures(raw).and_then(|captures| captures.get(1)).map(|m| m.as_str().to_string())
}

fn locate_marker_without_colon(raw: &str) -> Option<String> {
    MARKER_INLINE
        .captures(raw)
        .and_then(|captures| captures.get(1))
        .map(|m| format!("{{{}}}", m.as_str().trim()))
}

fn locate_fenced_json(raw: &str) -> Option<String> {
    FENCED_OBJECT.captures(raw).and_then(|captures| captures.get(1)).map(|m| m.as_str().to_string())
}

/// Strips one level of `{{ ... }}` wrapping.
fn unwrap_double_braces(candidate: &str) -> &str {
    let trimmed = candidate.trim();
    if trimmed.starts_with("{{") && trimmed.ends_with("}}") {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

fn decode_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(unwrap_double_braces(candidate)) {
        Ok(Value::Object(object)) => Some(object),
        Ok(_) => None,
        Err(error) => {
            tracing::debug!(
                event_name = "parser.orders.decode_failed",
                error = %error,
                "order candidate is not valid JSON"
            );
            None
        }
    }
}

/// Repairs the first candidate any locating tier found.
fn bracket_repair(raw: &str) -> Option<Map<String, Value>> {
    let candidate = locate_marker_with_colon(raw)
        .or_else(|| locate_marker_without_colon(raw))
        .or_else(|| locate_fenced_json(raw))?;
    let orders = repair_orders_list(&candidate)?;

    let mut object = Map::new();
    object.insert("orders".to_string(), Value::from(orders));
    Some(object)
}
