//! Agent runtime: turns unreliable model output into game actions.
//!
//! Each phase follows the same loop:
//! 1. **Snapshot** (`agent`) - build a read-only `TurnContext` per power
//! 2. **Prompt** (`prompt`) - render templates into one prompt string
//! 3. **Generate** (`llm`, `vendor`) - ask the power's model for text
//! 4. **Parse** (`parser`) - recover orders or messages through tiered fallbacks
//! 5. **Validate** (`validator`) - reconcile orders with the legal-order table
//! 6. **Route** (`negotiation`, `orders`) - apply results to the game in completion order
//!
//! Generation runs concurrently on a bounded `pool`; everything that mutates
//! the game, the history or the error stats happens on the driving task.
//!
//! # Key Types
//!
//! - `ModelClient` - text in, text out; one implementation per vendor
//! - `NegotiationOrchestrator` - runs the negotiation rounds of one phase
//! - `ValidatedOrders` - a complete, legal order set and how it was built

pub mod agent;
pub mod llm;
pub mod negotiation;
pub mod orders;
pub mod parser;
pub mod planning;
pub mod pool;
pub mod prompt;
pub mod validator;
pub mod vendor;

pub use agent::{AgentClient, ConversationReply, OrderDecision, PowerAgent, TurnContext};
pub use llm::{GenerationError, ModelClient, ScriptedModelClient};
pub use negotiation::{
    conduct_negotiations, NegotiationError, NegotiationOrchestrator, NegotiationReport,
    NegotiationSettings, NegotiationState,
};
pub use orders::collect_orders;
pub use planning::run_planning;
pub use prompt::PromptTemplates;
pub use validator::{validate_orders, ValidatedOrders};
pub use vendor::load_model_client;
