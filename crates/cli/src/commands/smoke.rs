use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use parley_agent::{
    collect_orders, conduct_negotiations, AgentClient, NegotiationSettings, PowerAgent,
    PromptTemplates, ScriptedModelClient,
};
use parley_core::config::{AppConfig, LoadOptions};
use parley_core::{
    AgentState, ErrorAggregator, GameEngine, GameHistory, InMemoryGame, Power, Recipient,
};
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_SMOKE};

const SCRIPTED_MODEL: &str = "scripted-smoke";
const ELIMINATED: &str = "ITALY";
const DRIFTING: &str = "GERMANY";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

/// Scripted seat: what the power says each round and what it orders.
struct Seat {
    power: &'static str,
    location: &'static str,
    legal: [&'static str; 2],
    message: &'static str,
    orders: &'static str,
}

const SEATS: [Seat; 5] = [
    Seat {
        power: "AUSTRIA",
        location: "VIE",
        legal: ["A VIE H", "A VIE - GAL"],
        message: r#"{"message_type": "private", "recipient": "ATLANTIS", "content": "A secret pact?"}"#,
        orders: r#"PARSABLE OUTPUT: {"orders": ["A VIE - GAL"]}"#,
    },
    Seat {
        power: "ENGLAND",
        location: "LON",
        legal: ["F LON H", "F LON - NTH"],
        message: r#"```json
{"message_type": "private", "recipient": "FRANCE", "content": "The channel stays empty."}
```"#,
        orders: "PARSABLE OUTPUT\n{\"orders\": [\"F LON - NTH\"]}",
    },
    Seat {
        power: "FRANCE",
        location: "PAR",
        legal: ["A PAR H", "A PAR - BUR"],
        message: r#"{{"message_type": "global", "content": "France seeks peace."}}"#,
        orders: "```json\n{\"orders\": [\"A PAR - BUR\", \"A PAR H\"]}\n```",
    },
    Seat {
        power: DRIFTING,
        location: "BER",
        legal: ["A BER H", "A BER - KIE"],
        message: "Here are some strategic thoughts: you should consider Holland.",
        orders: "I would move to Kiel if I were you.",
    },
    Seat {
        power: ELIMINATED,
        location: "ROM",
        legal: ["A ROM H", "A ROM - APU"],
        message: r#"{"message_type": "global", "content": "Italy is still here!"}"#,
        orders: r#"PARSABLE OUTPUT: {"orders": ["A ROM H"]}"#,
    },
];

struct Table {
    game: InMemoryGame,
    agents: BTreeMap<Power, PowerAgent>,
    clients: BTreeMap<Power, Arc<ScriptedModelClient>>,
    history: GameHistory,
    stats: ErrorAggregator,
}

impl Table {
    fn seat(rounds: u32, prompts: &Arc<PromptTemplates>) -> Self {
        let mut game = InMemoryGame::new("S1901M").then_phases(["F1901M"]);
        let mut agents = BTreeMap::new();
        let mut clients = BTreeMap::new();

        for seat in &SEATS {
            game = game.with_orderable(seat.power, seat.location, seat.legal);
            let replies = (0..rounds).map(|_| seat.message).chain([seat.orders]);
            let client = Arc::new(ScriptedModelClient::new(SCRIPTED_MODEL, replies));
            let power = Power::new(seat.power);
            agents.insert(
                power.clone(),
                PowerAgent::new(
                    AgentState::new(power.clone()).with_goals(["Survive the opening"]),
                    AgentClient::new(client.clone(), Arc::clone(prompts)),
                ),
            );
            clients.insert(power, client);
        }

        let game = game.eliminate(ELIMINATED);
        let stats = ErrorAggregator::with_powers(game.powers());
        Self { game, agents, clients, history: GameHistory::new(), stats }
    }

    fn calls(&self, power: &str) -> usize {
        self.clients.get(&Power::new(power)).map(|client| client.call_count()).unwrap_or_default()
    }
}

pub fn run(options: &LoadOptions, rounds: Option<u32>) -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(options.clone())) {
        Ok((elapsed_ms, config)) => {
            checks.push(pass("config_validation", elapsed_ms, "configuration loaded and validated"));
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(fail("config_validation", elapsed_ms, error.to_string()));
            return finalize_report(checks, started, &REMAINING_CHECKS);
        }
    };

    let prompts = match timed_check(|| PromptTemplates::load(config.prompts.dir.as_deref())) {
        Ok((elapsed_ms, prompts)) => {
            checks.push(pass("prompt_templates", elapsed_ms, "templates loaded"));
            Arc::new(prompts)
        }
        Err((elapsed_ms, error)) => {
            checks.push(fail("prompt_templates", elapsed_ms, error.to_string()));
            return finalize_report(checks, started, &REMAINING_CHECKS[1..]);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let message = format!("failed to initialize async runtime: {error}");
            checks.push(fail("negotiation_rounds", 0, message));
            return finalize_report(checks, started, &REMAINING_CHECKS[2..]);
        }
    };

    let mut settings = NegotiationSettings::from(&config.negotiation);
    if let Some(rounds) = rounds {
        settings.max_rounds = rounds;
    }
    settings.early_exit = false;
    let mut table = Table::seat(settings.max_rounds, &prompts);
    let active = SEATS.len() - 1;

    let negotiation_started = Instant::now();
    let negotiation = runtime.block_on(conduct_negotiations(
        &mut table.game,
        &mut table.agents,
        &mut table.history,
        &mut table.stats,
        settings,
    ));
    let negotiation_ms = negotiation_started.elapsed().as_millis() as u64;
    let report = match negotiation {
        Ok(report) => report,
        Err(error) => {
            checks.push(fail("negotiation_rounds", negotiation_ms, error.to_string()));
            return finalize_report(checks, started, &REMAINING_CHECKS[2..]);
        }
    };

    let expected_tasks = settings.max_rounds as usize * active;
    checks.push(verdict(
        "negotiation_rounds",
        negotiation_ms,
        report.tasks_dispatched == expected_tasks && table.calls(ELIMINATED) == 0,
        format!(
            "{} tasks over {} rounds, {} messages routed",
            report.tasks_dispatched, report.rounds_run, report.messages_routed
        ),
        format!(
            "expected {expected_tasks} tasks and no calls for {ELIMINATED}; got {} tasks and {} calls",
            report.tasks_dispatched,
            table.calls(ELIMINATED)
        ),
    ));

    let broadcasts = table
        .game
        .messages()
        .iter()
        .filter(|message| message.sender.as_str() == "AUSTRIA")
        .all(|message| message.recipient == Recipient::Broadcast);
    checks.push(verdict(
        "recipient_rewrite",
        0,
        report.recipients_rewritten == settings.max_rounds as usize && broadcasts,
        format!("{} unknown recipients sent as global", report.recipients_rewritten),
        format!(
            "expected {} rewritten recipients, got {}",
            settings.max_rounds, report.recipients_rewritten
        ),
    ));

    let orders_started = Instant::now();
    let submitted = runtime.block_on(collect_orders(
        &mut table.game,
        &table.agents,
        &mut table.history,
        &mut table.stats,
        settings,
    ));
    let orders_ms = orders_started.elapsed().as_millis() as u64;
    match submitted {
        Ok(submitted) => checks.push(verdict(
            "order_phase",
            orders_ms,
            submitted.len() == active && submitted.values().all(|orders| orders.len() == 1),
            format!("{} powers submitted complete order sets", submitted.len()),
            format!("expected {active} complete order sets, got {}", submitted.len()),
        )),
        Err(error) => checks.push(fail("order_phase", orders_ms, error.to_string())),
    }

    let drifting = table.stats.counters_for(&Power::new(DRIFTING));
    checks.push(verdict(
        "error_accounting",
        0,
        drifting.conversation_errors == settings.max_rounds && drifting.order_decoding_errors == 1,
        format!(
            "{DRIFTING}: {} conversation errors, {} order decoding errors",
            drifting.conversation_errors, drifting.order_decoding_errors
        ),
        format!(
            "{DRIFTING} counters were {} conversation / {} order decoding",
            drifting.conversation_errors, drifting.order_decoding_errors
        ),
    ));

    let process_started = Instant::now();
    let processed = table.game.process();
    let process_ms = process_started.elapsed().as_millis() as u64;
    match processed {
        Ok(()) => checks.push(verdict(
            "phase_processing",
            process_ms,
            table.game.current_phase() == "F1901M",
            format!("advanced to {}", table.game.current_phase()),
            format!("phase did not advance (still {})", table.game.current_phase()),
        )),
        Err(error) => checks.push(fail("phase_processing", process_ms, error.to_string())),
    }

    tracing::info!(
        event_name = "smoke.finished",
        stats = %serde_json::to_string(table.stats.counters()).unwrap_or_default(),
        "smoke run finished"
    );
    finalize_report(checks, started, &[])
}

const REMAINING_CHECKS: [&str; 6] = [
    "prompt_templates",
    "negotiation_rounds",
    "recipient_rewrite",
    "order_phase",
    "error_accounting",
    "phase_processing",
];

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn pass(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Pass, elapsed_ms, message: message.into() }
}

fn fail(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message: message.into() }
}

fn verdict(
    name: &'static str,
    elapsed_ms: u64,
    ok: bool,
    success: String,
    failure: String,
) -> SmokeCheck {
    if ok {
        pass(name, elapsed_ms, success)
    } else {
        fail(name, elapsed_ms, failure)
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due to previous failure".to_string(),
    }
}

fn finalize_report(
    mut checks: Vec<SmokeCheck>,
    started: Instant,
    remaining: &[&'static str],
) -> CommandResult {
    checks.extend(remaining.iter().copied().map(skipped));

    let total_elapsed_ms = started.elapsed().as_millis() as u64;
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    CommandResult::report("smoke", if failed { EXIT_SMOKE } else { 0 }, &report)
}
