pub mod config;
pub mod domain;
pub mod errors;
pub mod game;
pub mod history;
pub mod stats;

pub use config::{AppConfig, ConfigError, LlmVendor, LoadOptions};
pub use domain::agent::{AgentState, JournalEntry};
pub use domain::failure::ErrorRecord;
pub use domain::message::{GameMessage, MessageType, ParsedMessage, Recipient, GLOBAL};
pub use domain::order::{Location, Order, PossibleOrders, Power};
pub use errors::{ErrorKind, GameError};
pub use game::{active_powers, gather_possible_orders, BoardState, GameEngine, InMemoryGame};
pub use history::{GameHistory, HistoryMessage, PhaseRecord};
pub use stats::{ErrorAggregator, ErrorCounters};
