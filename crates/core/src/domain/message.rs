use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order::Power;

/// Ledger sentinel for messages visible to every power.
pub const GLOBAL: &str = "GLOBAL";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Global,
    Private,
}

impl MessageType {
    /// Anything other than an explicit `private` is treated as global.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("private") {
            Self::Private
        } else {
            Self::Global
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Recipient {
    Broadcast,
    Power(Power),
}

impl Recipient {
    pub fn from_label(label: &str) -> Self {
        let trimmed = label.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(GLOBAL) || trimmed.eq_ignore_ascii_case("ALL")
        {
            Self::Broadcast
        } else {
            Self::Power(Power::new(trimmed))
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Broadcast => GLOBAL,
            Self::Power(power) => power.as_str(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Broadcast)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Recipient {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Recipient {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label))
    }
}

/// A negotiation message recovered from model output, before the
/// orchestrator resolves its recipient against the live power set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub message_type: MessageType,
    pub recipient: Recipient,
    pub content: String,
}

impl ParsedMessage {
    pub fn global(content: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Global,
            recipient: Recipient::Broadcast,
            content: content.into(),
        }
    }

    pub fn private(recipient: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Private,
            recipient: Recipient::Power(Power::new(recipient)),
            content: content.into(),
        }
    }
}

/// One entry of the engine's authoritative message ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMessage {
    pub phase: String,
    pub sender: Power,
    pub recipient: Recipient,
    pub content: String,
    pub time_sent: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{MessageType, ParsedMessage, Recipient};

    #[test]
    fn broadcast_aliases_resolve_to_sentinel() {
        assert_eq!(Recipient::from_label("GLOBAL"), Recipient::Broadcast);
        assert_eq!(Recipient::from_label(" all "), Recipient::Broadcast);
        assert_eq!(Recipient::from_label(""), Recipient::Broadcast);
        assert_eq!(Recipient::from_label("ENGLAND").label(), "ENGLAND");
    }

    #[test]
    fn message_serializes_as_flat_string_record() {
        let message = ParsedMessage::private("ENGLAND", "Shall we split the channel?");
        let value = serde_json::to_value(&message).expect("message should encode");

        assert_eq!(value["message_type"], "private");
        assert_eq!(value["recipient"], "ENGLAND");
        assert_eq!(value["content"], "Shall we split the channel?");
        assert_eq!(MessageType::from_label("PRIVATE"), MessageType::Private);
        assert_eq!(MessageType::from_label("announcement"), MessageType::Global);
    }
}
