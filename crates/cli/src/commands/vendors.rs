use parley_agent::load_model_client;
use parley_agent::vendor::LlmVendor;
use parley_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_CONFIG};

const COMMAND: &str = "vendors";

pub const STANDARD_POWERS: [&str; 7] =
    ["AUSTRIA", "ENGLAND", "FRANCE", "GERMANY", "ITALY", "RUSSIA", "TURKEY"];

#[derive(Debug, Serialize)]
struct Assignment {
    power: String,
    model: String,
    vendor: LlmVendor,
    base_url: String,
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    problem: Option<String>,
}

#[derive(Debug, Serialize)]
struct VendorsReport {
    command: &'static str,
    status: &'static str,
    ready: usize,
    assignments: Vec<Assignment>,
}

/// Resolves the model of every standard power (plus any extra power named in
/// `models`) and tries to build its client without sending a request.
pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };

    let mut powers = STANDARD_POWERS.iter().map(|power| power.to_string()).collect::<Vec<_>>();
    for assigned in config.models.keys() {
        if !powers.iter().any(|power| power.eq_ignore_ascii_case(assigned)) {
            powers.push(assigned.to_ascii_uppercase());
        }
    }

    let assignments = powers.into_iter().map(|power| assignment(&config, power)).collect::<Vec<_>>();
    let ready = assignments.iter().filter(|assignment| assignment.ready).count();
    let report = VendorsReport {
        command: COMMAND,
        status: if ready == assignments.len() { "ok" } else { "degraded" },
        ready,
        assignments,
    };
    CommandResult::report(COMMAND, 0, &report)
}

fn assignment(config: &AppConfig, power: String) -> Assignment {
    let model = config.model_for(&power).to_string();
    let vendor = LlmVendor::for_model(&model);
    let problem = load_model_client(&model, &config.llm, "").err().map(|error| error.to_string());
    Assignment {
        base_url: config.llm.vendor(vendor).base_url.clone(),
        ready: problem.is_none(),
        power,
        model,
        vendor,
        problem,
    }
}
