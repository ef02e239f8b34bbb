use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::{Order, Power};

/// Failure categories observed while turning model output into game input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "generation_error")]
    Generation,
    #[serde(rename = "format_error")]
    Format,
    #[serde(rename = "json_decode_error")]
    JsonDecode,
    #[serde(rename = "validation_error")]
    Validation,
    #[serde(rename = "order_decoding_error")]
    OrderDecoding,
    #[serde(rename = "processing_exception")]
    Processing,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generation => "generation_error",
            Self::Format => "format_error",
            Self::JsonDecode => "json_decode_error",
            Self::Validation => "validation_error",
            Self::OrderDecoding => "order_decoding_error",
            Self::Processing => "processing_exception",
        }
    }

    pub fn is_order_mode(&self) -> bool {
        matches!(self, Self::OrderDecoding)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures reported by the game-rules engine collaborator.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("unknown power `{0}`")]
    UnknownPower(Power),
    #[error("power `{power}` submitted an order the engine does not offer: `{order}`")]
    IllegalOrder { power: Power, order: Order },
    #[error("engine rejected the request: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, GameError};
    use crate::domain::order::{Order, Power};

    #[test]
    fn kind_labels_match_serialized_names() {
        for kind in [
            ErrorKind::Generation,
            ErrorKind::Format,
            ErrorKind::JsonDecode,
            ErrorKind::Validation,
            ErrorKind::OrderDecoding,
            ErrorKind::Processing,
        ] {
            let encoded = serde_json::to_value(kind).expect("kind should encode");
            assert_eq!(encoded, kind.as_str());
        }
    }

    #[test]
    fn only_order_decoding_counts_as_order_mode() {
        assert!(ErrorKind::OrderDecoding.is_order_mode());
        assert!(!ErrorKind::Validation.is_order_mode());
    }

    #[test]
    fn illegal_order_error_names_power_and_order() {
        let error = GameError::IllegalOrder {
            power: Power::new("ITALY"),
            order: Order::new("A VEN - PAR"),
        };
        let message = error.to_string();
        assert!(message.contains("ITALY"));
        assert!(message.contains("A VEN - PAR"));
    }
}
