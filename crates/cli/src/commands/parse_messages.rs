use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use parley_agent::parser::{parse_messages, ConversationError};
use parley_core::ParsedMessage;
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_INPUT};

const COMMAND: &str = "parse-messages";

#[derive(Debug, Serialize)]
struct ParseMessagesReport {
    command: &'static str,
    status: &'static str,
    messages: Vec<ParsedMessage>,
    error: Option<ConversationError>,
}

pub fn run(response_path: &Path) -> CommandResult {
    match parse(response_path) {
        Ok(report) => CommandResult::report(COMMAND, 0, &report),
        Err(error) => CommandResult::failure(COMMAND, "input", format!("{error:#}"), EXIT_INPUT),
    }
}

fn parse(response_path: &Path) -> Result<ParseMessagesReport> {
    let raw = fs::read_to_string(response_path)
        .with_context(|| format!("reading response from `{}`", response_path.display()))?;
    let (messages, error) = parse_messages(&raw);
    Ok(ParseMessagesReport { command: COMMAND, status: "ok", messages, error })
}
