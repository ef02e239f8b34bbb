//! Round-based negotiation phase.
//!
//! Every round snapshots the board for each active power, dispatches one
//! conversation task per power to the [`WorkerPool`], and routes replies in
//! completion order. Only this driver mutates the game, the history, the
//! agents' journals and the error stats; tasks see nothing but their
//! [`TurnContext`].

use std::collections::BTreeMap;

use chrono::Utc;
use parley_core::config::NegotiationConfig;
use parley_core::{
    active_powers, ErrorAggregator, ErrorKind, ErrorRecord, GameEngine, GameHistory, GameMessage,
    MessageType, ParsedMessage, Power, Recipient,
};
use thiserror::Error;

use crate::agent::{AgentClient, ConversationReply, PowerAgent, TurnContext};
use crate::parser::ConversationError;
use crate::pool::{TaskResult, WorkerPool};

const JOURNAL_SNIPPET_CHARS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NegotiationSettings {
    pub max_rounds: u32,
    pub early_exit: bool,
    pub max_concurrency: usize,
    pub history_phases: usize,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self::from(&NegotiationConfig::default())
    }
}

impl From<&NegotiationConfig> for NegotiationSettings {
    fn from(config: &NegotiationConfig) -> Self {
        Self {
            max_rounds: config.max_rounds,
            early_exit: config.early_exit,
            max_concurrency: config.max_concurrency,
            history_phases: config.history_phases,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("early exit: {power} failed in {phase} (round {round}) with {kind}: {message}")]
    EarlyExit { power: Power, phase: String, round: u32, kind: ErrorKind, message: String },
}

impl NegotiationError {
    fn early_exit(record: &ErrorRecord) -> Self {
        Self::EarlyExit {
            power: record.power.clone(),
            phase: record.phase.clone(),
            round: record.round,
            kind: record.kind,
            message: record.message.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    RunningRound(u32),
    Done,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct NegotiationReport {
    pub phase: String,
    pub rounds_run: u32,
    pub tasks_dispatched: usize,
    pub messages_routed: usize,
    pub recipients_rewritten: usize,
    pub errors_recorded: usize,
}

pub struct NegotiationOrchestrator {
    settings: NegotiationSettings,
    pool: WorkerPool,
    state: NegotiationState,
}

impl NegotiationOrchestrator {
    pub fn new(settings: NegotiationSettings) -> Self {
        Self { pool: WorkerPool::new(settings.max_concurrency), settings, state: NegotiationState::Idle }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub async fn run<G>(
        &mut self,
        game: &mut G,
        agents: &mut BTreeMap<Power, PowerAgent>,
        history: &mut GameHistory,
        stats: &mut ErrorAggregator,
    ) -> Result<NegotiationReport, NegotiationError>
    where
        G: GameEngine + ?Sized,
    {
        let phase = game.current_phase();
        history.add_phase(&phase);
        let known_powers = game.powers();

        let mut report = NegotiationReport { phase: phase.clone(), ..NegotiationReport::default() };
        let mut phase_errors: BTreeMap<Power, Vec<ErrorRecord>> = BTreeMap::new();
        let mut aborted = None;

        tracing::info!(
            event_name = "negotiation.phase.started",
            phase = %phase,
            max_rounds = self.settings.max_rounds,
            "negotiation phase started"
        );

        for round in 0..self.settings.max_rounds {
            self.state = NegotiationState::RunningRound(round);
            let turns = scheduled_turns(game, agents, history, self.settings.history_phases);
            let jobs = turns
                .into_iter()
                .map(|(ctx, client)| {
                    let power = ctx.power.clone();
                    (power, async move { client.get_conversation_reply(&ctx).await })
                })
                .collect::<Vec<_>>();

            tracing::debug!(
                event_name = "negotiation.round.dispatched",
                phase = %phase,
                round = round + 1,
                tasks = jobs.len(),
                "round dispatched"
            );

            let mut dispatch = self.pool.dispatch(jobs);
            report.tasks_dispatched += dispatch.dispatched();
            report.rounds_run += 1;

            let mut fatal = None;
            while let Some(TaskResult { power, outcome }) = dispatch.next().await {
                if fatal.is_some() {
                    tracing::debug!(
                        event_name = "negotiation.round.drained",
                        power = %power,
                        round = round + 1,
                        "result discarded after early exit"
                    );
                    continue;
                }

                let reply = outcome.unwrap_or_else(|failure| ConversationReply {
                    messages: Vec::new(),
                    error: Some(ConversationError::processing(failure.to_string())),
                });
                let Some(agent) = agents.get_mut(&power) else {
                    continue;
                };

                let mut route = Route { game: &mut *game, history: &mut *history, phase: &phase };
                for message in &reply.messages {
                    let (recipient, rewritten) = resolve_recipient(&power, message, &known_powers);
                    if rewritten {
                        report.recipients_rewritten += 1;
                    }
                    if route.deliver(agent, recipient, &message.content) {
                        report.messages_routed += 1;
                    }
                }
                if reply.messages.is_empty() && reply.error.is_none() {
                    tracing::debug!(
                        event_name = "negotiation.reply.empty",
                        power = %power,
                        phase = %phase,
                        round = round + 1,
                        "agent sent no messages"
                    );
                }

                if let Some(error) = reply.error {
                    let record = error.to_record(&power, &phase, round);
                    tracing::warn!(
                        event_name = "negotiation.reply.failed",
                        power = %power,
                        phase = %phase,
                        round = round + 1,
                        kind = %record.kind,
                        error = %record.message,
                        "conversation reply failed"
                    );
                    agent.state.add_journal_entry(format!(
                        "Failed to generate message in {phase} (Round {}): {}",
                        round + 1,
                        record.kind
                    ));
                    if self.settings.early_exit {
                        fatal = Some(NegotiationError::early_exit(&record));
                    }
                    stats.record(record.clone());
                    phase_errors.entry(power.clone()).or_default().push(record);
                    report.errors_recorded += 1;
                }
            }

            if let Some(error) = fatal {
                tracing::error!(
                    event_name = "negotiation.phase.early_exit",
                    phase = %phase,
                    round = round + 1,
                    error = %error,
                    "aborting negotiation phase"
                );
                aborted = Some(error);
                break;
            }
        }

        if !phase_errors.is_empty() {
            history.add_conversation_errors(&phase, phase_errors);
        }
        self.state = NegotiationState::Done;

        tracing::info!(
            event_name = "negotiation.phase.finished",
            phase = %phase,
            rounds = report.rounds_run,
            messages = report.messages_routed,
            errors = report.errors_recorded,
            "negotiation phase finished"
        );
        match aborted {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }
}

/// Runs one negotiation phase with a fresh orchestrator.
pub async fn conduct_negotiations<G>(
    game: &mut G,
    agents: &mut BTreeMap<Power, PowerAgent>,
    history: &mut GameHistory,
    stats: &mut ErrorAggregator,
    settings: NegotiationSettings,
) -> Result<NegotiationReport, NegotiationError>
where
    G: GameEngine + ?Sized,
{
    NegotiationOrchestrator::new(settings).run(game, agents, history, stats).await
}

/// Snapshots of every power that should act now: not eliminated, backed by
/// an agent, and holding at least one legal order.
pub(crate) fn scheduled_turns<G>(
    game: &G,
    agents: &BTreeMap<Power, PowerAgent>,
    history: &GameHistory,
    history_phases: usize,
) -> Vec<(TurnContext, AgentClient)>
where
    G: GameEngine + ?Sized,
{
    let mut turns = Vec::new();
    for power in active_powers(game) {
        let Some(agent) = agents.get(&power) else {
            tracing::debug!(event_name = "schedule.power.no_agent", power = %power, "skipping power");
            continue;
        };
        let ctx = TurnContext::snapshot(game, &agent.state, history, history_phases);
        if !ctx.possible_orders.has_any_legal_order() {
            tracing::debug!(
                event_name = "schedule.power.no_orders",
                power = %power,
                "skipping power without legal orders"
            );
            continue;
        }
        turns.push((ctx, agent.client.clone()));
    }
    turns
}

/// Recipient a message is actually delivered to, and whether it had to be
/// rewritten to a broadcast.
pub fn resolve_recipient(
    sender: &Power,
    message: &ParsedMessage,
    known_powers: &[Power],
) -> (Recipient, bool) {
    if message.message_type == MessageType::Global {
        return (Recipient::Broadcast, false);
    }

    let requested = match &message.recipient {
        Recipient::Power(power) => power,
        Recipient::Broadcast => {
            tracing::warn!(
                event_name = "negotiation.message.recipient_rewritten",
                power = %sender,
                recipient = "",
                "private message without recipient sent as global"
            );
            return (Recipient::Broadcast, true);
        }
    };

    match known_powers.iter().find(|power| power.as_str().eq_ignore_ascii_case(requested.as_str())) {
        Some(power) => (Recipient::Power(power.clone()), false),
        None => {
            tracing::warn!(
                event_name = "negotiation.message.recipient_rewritten",
                power = %sender,
                recipient = %requested,
                "unknown recipient; message sent as global"
            );
            (Recipient::Broadcast, true)
        }
    }
}

struct Route<'a, G: ?Sized> {
    game: &'a mut G,
    history: &'a mut GameHistory,
    phase: &'a str,
}

impl<G> Route<'_, G>
where
    G: GameEngine + ?Sized,
{
    fn deliver(&mut self, agent: &mut PowerAgent, recipient: Recipient, content: &str) -> bool {
        let sender = agent.power().clone();
        let message = GameMessage {
            phase: self.phase.to_string(),
            sender: sender.clone(),
            recipient: recipient.clone(),
            content: content.to_string(),
            time_sent: Utc::now(),
        };
        if let Err(error) = self.game.add_message(message) {
            tracing::error!(
                event_name = "negotiation.message.rejected",
                power = %sender,
                phase = self.phase,
                error = %error,
                "engine rejected message"
            );
            return false;
        }
        self.history.add_message(self.phase, &sender, &recipient, content);

        let target = match &recipient {
            Recipient::Broadcast => "globally".to_string(),
            Recipient::Power(power) => format!("to {power}"),
        };
        let snippet = content.chars().take(JOURNAL_SNIPPET_CHARS).collect::<String>();
        agent.state.add_journal_entry(format!("Sent message {target} in {}: {snippet}...", self.phase));
        true
    }
}
