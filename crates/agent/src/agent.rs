use std::collections::BTreeMap;
use std::sync::Arc;

use parley_core::{
    active_powers, gather_possible_orders, AgentState, BoardState, GameEngine, GameHistory, Order,
    ParsedMessage, PossibleOrders, Power,
};

use crate::llm::{generate_checked, generate_text, ModelClient};
use crate::parser::{extract_orders, parse_messages, ConversationError, OrderDecodingError};
use crate::prompt::PromptTemplates;
use crate::validator::{fallback_validation, validate_orders, ValidatedOrders};

/// Read-only snapshot a generation task works from. Built by the phase
/// driver before dispatch; tasks never touch the live game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnContext {
    pub power: Power,
    pub phase: String,
    pub board: BoardState,
    pub possible_orders: PossibleOrders,
    pub history: String,
    pub goals: Vec<String>,
    pub relationships: BTreeMap<Power, String>,
    pub active_powers: Vec<Power>,
}

impl TurnContext {
    pub fn snapshot<G>(
        game: &G,
        state: &AgentState,
        history: &GameHistory,
        history_phases: usize,
    ) -> Self
    where
        G: GameEngine + ?Sized,
    {
        Self {
            power: state.power.clone(),
            phase: game.current_phase(),
            board: game.get_state(),
            possible_orders: gather_possible_orders(game, &state.power),
            history: history.render_for(&state.power, true, history_phases),
            goals: state.goals.clone(),
            relationships: state.relationships.clone(),
            active_powers: active_powers(game),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderDecision {
    pub orders: Vec<Order>,
    pub validation: ValidatedOrders,
    pub decoding_error: Option<OrderDecodingError>,
    pub raw_response: String,
}

impl OrderDecision {
    pub fn used_fallback(&self) -> bool {
        self.validation.fell_back
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationReply {
    pub messages: Vec<ParsedMessage>,
    pub error: Option<ConversationError>,
}

/// Model client plus the templates used to prompt it. Cheap to clone into
/// spawned tasks.
#[derive(Clone)]
pub struct AgentClient {
    client: Arc<dyn ModelClient>,
    prompts: Arc<PromptTemplates>,
}

impl AgentClient {
    pub fn new(client: Arc<dyn ModelClient>, prompts: Arc<PromptTemplates>) -> Self {
        Self { client, prompts }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Always yields a complete legal order set; decoding problems are
    /// reported alongside it.
    pub async fn get_orders(&self, ctx: &TurnContext) -> OrderDecision {
        let prompt = self.prompts.order_prompt(ctx);
        let raw_response = generate_text(self.client.as_ref(), &prompt).await;

        let (validation, decoding_error) = match extract_orders(&raw_response) {
            Ok(extraction) => (validate_orders(&extraction.orders, &ctx.possible_orders), None),
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.orders.decoding_failed",
                    power = %ctx.power,
                    phase = %ctx.phase,
                    model = self.model_name(),
                    error = %error,
                    "could not extract orders; using fallback"
                );
                (fallback_validation(&ctx.possible_orders), Some(error))
            }
        };

        tracing::debug!(
            event_name = "agent.orders.validated",
            power = %ctx.power,
            accepted = validation.accepted.len(),
            rejected = validation.rejected.len(),
            defaulted = validation.defaulted.len(),
            "orders validated"
        );

        OrderDecision { orders: validation.orders.clone(), validation, decoding_error, raw_response }
    }

    pub async fn get_conversation_reply(&self, ctx: &TurnContext) -> ConversationReply {
        let prompt = self.prompts.conversation_prompt(ctx);
        let raw_response = match generate_checked(self.client.as_ref(), &prompt).await {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.conversation.generation_failed",
                    power = %ctx.power,
                    phase = %ctx.phase,
                    model = self.model_name(),
                    error = %error,
                    "conversation generation failed"
                );
                return ConversationReply {
                    messages: Vec::new(),
                    error: Some(ConversationError::generation(error.to_string())),
                };
            }
        };

        let (messages, error) = parse_messages(&raw_response);
        if let Some(error) = &error {
            tracing::warn!(
                event_name = "agent.conversation.parse_failed",
                power = %ctx.power,
                phase = %ctx.phase,
                model = self.model_name(),
                kind = %error.kind,
                recovered = messages.len(),
                "conversation reply was not fully usable"
            );
        }
        ConversationReply { messages, error }
    }

    /// Free-text strategic directive; empty when generation failed.
    pub async fn get_plan(&self, ctx: &TurnContext) -> String {
        let prompt = self.prompts.planning_prompt(ctx);
        generate_text(self.client.as_ref(), &prompt).await
    }
}

/// One power's long-lived agent.
#[derive(Clone)]
pub struct PowerAgent {
    pub state: AgentState,
    pub client: AgentClient,
}

impl PowerAgent {
    pub fn new(state: AgentState, client: AgentClient) -> Self {
        Self { state, client }
    }

    pub fn power(&self) -> &Power {
        &self.state.power
    }
}
