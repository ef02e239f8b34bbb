use std::collections::HashSet;

use parley_core::{Location, Order, PossibleOrders};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NotAString,
    Illegal,
    DuplicateLocation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RejectedOrder {
    pub candidate: String,
    pub reason: RejectReason,
}

/// Complete, legal order set plus an account of how it was assembled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidatedOrders {
    pub orders: Vec<Order>,
    pub accepted: Vec<Order>,
    pub rejected: Vec<RejectedOrder>,
    pub defaulted: Vec<Order>,
    /// No candidate survived; `orders` is exactly the fallback set.
    pub fell_back: bool,
}

/// Reconciles a model's candidate list with the legal orders.
///
/// Accepted orders keep their candidate order; every location left uncovered
/// then gets its default (hold if offered, else the first legal order) in
/// engine order. The first legal order for a location wins and later ones
/// for the same location are rejected.
pub fn validate_orders(candidate: &Value, possible: &PossibleOrders) -> ValidatedOrders {
    let Some(items) = candidate.as_array() else {
        tracing::debug!(
            event_name = "validator.orders.not_a_list",
            "candidate orders are not a list; using fallback"
        );
        return fallback(Vec::new(), possible);
    };

    let mut covered: HashSet<&Location> = HashSet::new();
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for item in items {
        let Some(text) = item.as_str() else {
            rejected.push(RejectedOrder {
                candidate: item.to_string(),
                reason: RejectReason::NotAString,
            });
            continue;
        };
        let text = text.trim();
        match possible.location_of(text) {
            None => rejected.push(RejectedOrder {
                candidate: text.to_string(),
                reason: RejectReason::Illegal,
            }),
            Some(location) if !covered.insert(location) => rejected.push(RejectedOrder {
                candidate: text.to_string(),
                reason: RejectReason::DuplicateLocation,
            }),
            Some(_) => accepted.push(Order::new(text)),
        }
    }

    if accepted.is_empty() {
        return fallback(rejected, possible);
    }

    let defaulted = possible
        .iter()
        .filter(|(location, _)| !covered.contains(location))
        .filter_map(|(_, legal)| default_order(legal).cloned())
        .collect::<Vec<_>>();

    let mut orders = accepted.clone();
    orders.extend(defaulted.iter().cloned());
    ValidatedOrders { orders, accepted, rejected, defaulted, fell_back: false }
}

/// Hold-biased default for every location that has any legal order.
pub fn fallback_orders(possible: &PossibleOrders) -> Vec<Order> {
    possible.iter().filter_map(|(_, legal)| default_order(legal).cloned()).collect()
}

/// Validation result used when no candidate list could be decoded at all.
pub fn fallback_validation(possible: &PossibleOrders) -> ValidatedOrders {
    fallback(Vec::new(), possible)
}

fn default_order(legal: &[Order]) -> Option<&Order> {
    legal.iter().find(|order| order.is_hold()).or_else(|| legal.first())
}

fn fallback(rejected: Vec<RejectedOrder>, possible: &PossibleOrders) -> ValidatedOrders {
    let orders = fallback_orders(possible);
    ValidatedOrders {
        defaulted: orders.clone(),
        orders,
        accepted: Vec::new(),
        rejected,
        fell_back: true,
    }
}

#[cfg(test)]
mod tests {
    use parley_core::{Order, PossibleOrders};
    use serde_json::json;

    use super::{fallback_orders, validate_orders, RejectReason};
    use crate::parser::extract_orders;

    fn orders(values: &[&str]) -> Vec<Order> {
        values.iter().map(|value| Order::new(*value)).collect()
    }

    fn board() -> PossibleOrders {
        PossibleOrders::from_pairs([
            ("PAR", vec!["A PAR - BUR", "A PAR H", "A PAR - PIC"]),
            ("BRE", vec!["F BRE - MAO", "F BRE H"]),
            ("MAR", vec!["A MAR - SPA", "A MAR - PIE"]),
        ])
    }

    #[test]
    fn parsed_scenario_keeps_exactly_the_legal_orders() {
        let possible = PossibleOrders::from_pairs([
            ("PAR", vec!["A PAR H"]),
            ("BRE", vec!["F BRE - MAO", "F BRE H"]),
        ]);
        let extraction = extract_orders(r#"PARSABLE OUTPUT:{"orders": ["A PAR H", "F BRE - MAO"]}"#)
            .expect("orders extracted");

        let validated = validate_orders(&extraction.orders, &possible);
        assert_eq!(validated.orders, orders(&["A PAR H", "F BRE - MAO"]));
        assert!(validated.defaulted.is_empty());
        assert!(!validated.fell_back);
    }

    #[test]
    fn unparseable_text_falls_back_to_hold() {
        let possible = PossibleOrders::from_pairs([("PAR", vec!["A PAR H", "A PAR - PIC"])]);
        assert!(extract_orders("I think holding is wise.").is_err());
        assert_eq!(fallback_orders(&possible), orders(&["A PAR H"]));
    }

    #[test]
    fn uncovered_locations_get_hold_or_first_legal_order() {
        let validated = validate_orders(&json!([" A PAR - PIC "]), &board());

        assert_eq!(validated.accepted, orders(&["A PAR - PIC"]));
        assert_eq!(validated.defaulted, orders(&["F BRE H", "A MAR - SPA"]));
        assert_eq!(validated.orders, orders(&["A PAR - PIC", "F BRE H", "A MAR - SPA"]));
    }

    #[test]
    fn illegal_duplicate_and_non_string_entries_are_rejected() {
        let validated =
            validate_orders(&json!(["A PAR - BUR", "A PAR H", "A PAR - RUH", 7]), &board());

        let reasons = validated.rejected.iter().map(|rejected| rejected.reason).collect::<Vec<_>>();
        assert_eq!(
            reasons,
            vec![RejectReason::DuplicateLocation, RejectReason::Illegal, RejectReason::NotAString]
        );
        assert_eq!(validated.orders, orders(&["A PAR - BUR", "F BRE H", "A MAR - SPA"]));
    }

    #[test]
    fn only_illegal_candidates_equal_the_fallback() {
        let validated = validate_orders(&json!(["A PAR - MOS", "F BRE - NAO"]), &board());

        assert!(validated.fell_back);
        assert_eq!(validated.orders, fallback_orders(&board()));
        assert_eq!(validated.rejected.len(), 2);
    }

    #[test]
    fn non_list_candidate_is_total_failure() {
        for candidate in [json!("A PAR H"), json!({"PAR": "A PAR H"}), json!(null)] {
            let validated = validate_orders(&candidate, &board());
            assert!(validated.fell_back);
            assert_eq!(validated.orders, fallback_orders(&board()));
        }
    }

    #[test]
    fn every_location_is_covered_with_one_of_its_own_legal_orders() {
        let possible = board();
        for candidate in [json!([]), json!(["A MAR - PIE"]), json!(["F BRE - MAO", "A PAR H"])] {
            let validated = validate_orders(&candidate, &possible);
            assert_eq!(validated.orders.len(), possible.len());
            for (location, legal) in possible.iter() {
                let covering = validated
                    .orders
                    .iter()
                    .filter(|order| legal.contains(order))
                    .count();
                assert_eq!(covering, 1, "location {location} should be ordered once");
            }
        }
    }
}
