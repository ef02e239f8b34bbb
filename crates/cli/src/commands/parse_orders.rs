use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use parley_agent::parser::extract_orders;
use parley_agent::validator::{fallback_validation, RejectedOrder};
use parley_agent::validate_orders;
use parley_core::{Order, PossibleOrders};
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_INPUT};

const COMMAND: &str = "parse-orders";

#[derive(Debug, Serialize)]
struct ParseOrdersReport {
    command: &'static str,
    status: &'static str,
    tier: Option<&'static str>,
    decoding_error: Option<String>,
    fell_back: bool,
    orders: Vec<Order>,
    accepted: Vec<Order>,
    defaulted: Vec<Order>,
    rejected: Vec<RejectedOrder>,
}

pub fn run(response_path: &Path, possible_orders_path: &Path) -> CommandResult {
    match parse(response_path, possible_orders_path) {
        Ok(report) => CommandResult::report(COMMAND, 0, &report),
        Err(error) => CommandResult::failure(COMMAND, "input", format!("{error:#}"), EXIT_INPUT),
    }
}

fn parse(response_path: &Path, possible_orders_path: &Path) -> Result<ParseOrdersReport> {
    let raw = fs::read_to_string(response_path)
        .with_context(|| format!("reading response from `{}`", response_path.display()))?;
    let possible_raw = fs::read_to_string(possible_orders_path).with_context(|| {
        format!("reading possible orders from `{}`", possible_orders_path.display())
    })?;
    let possible = serde_json::from_str::<PossibleOrders>(&possible_raw)
        .context("possible orders must be a JSON object of location -> [orders]")?;

    let (tier, decoding_error, validation) = match extract_orders(&raw) {
        Ok(extraction) => {
            (Some(extraction.tier), None, validate_orders(&extraction.orders, &possible))
        }
        Err(error) => (None, Some(error.to_string()), fallback_validation(&possible)),
    };

    Ok(ParseOrdersReport {
        command: COMMAND,
        status: "ok",
        tier,
        decoding_error,
        fell_back: validation.fell_back,
        orders: validation.orders,
        accepted: validation.accepted,
        defaulted: validation.defaulted,
        rejected: validation.rejected,
    })
}
