//! Recovers structured intent from free-form model output.
//!
//! Each fallback strategy is a [`Tier`]: a pure `text -> Option<candidate>`
//! function. A [`ParserChain`] tries its tiers in order and the first one that
//! produces a candidate is authoritative.

pub mod messages;
pub mod orders;
pub mod repair;

pub use messages::{classify_missing_json, parse_messages, BlockError, ConversationError};
pub use orders::{extract_orders, OrderDecodingError, OrderExtraction};

pub struct Tier<C> {
    pub name: &'static str,
    pub extract: fn(&str) -> Option<C>,
}

impl<C> Tier<C> {
    pub const fn new(name: &'static str, extract: fn(&str) -> Option<C>) -> Self {
        Self { name, extract }
    }
}

pub struct ParserChain<C> {
    tiers: Vec<Tier<C>>,
}

impl<C> ParserChain<C> {
    pub fn new(tiers: Vec<Tier<C>>) -> Self {
        Self { tiers }
    }

    /// First tier producing a candidate, with that tier's name.
    pub fn first_match(&self, raw: &str) -> Option<(&'static str, C)> {
        self.tiers.iter().find_map(|tier| (tier.extract)(raw).map(|candidate| (tier.name, candidate)))
    }
}
