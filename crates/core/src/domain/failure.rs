use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::Power;
use crate::errors::ErrorKind;

/// Immutable record of one parse, validation, or generation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    pub round: u32,
    pub phase: String,
    pub power: Power,
    pub recorded_at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(
        power: Power,
        phase: impl Into<String>,
        round: u32,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            message: message.into(),
            analysis: None,
            raw_response: None,
            round,
            phase: phase.into(),
            power,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_analysis(mut self, analysis: impl Into<String>) -> Self {
        self.analysis = Some(analysis.into());
        self
    }

    pub fn with_raw_response(mut self, raw_response: impl Into<String>) -> Self {
        let raw_response = raw_response.into();
        if !raw_response.is_empty() {
            self.raw_response = Some(raw_response);
        }
        self
    }

    /// First `limit` characters of the raw response, for log lines.
    pub fn response_snippet(&self, limit: usize) -> Option<String> {
        let raw = self.raw_response.as_deref()?;
        let mut snippet = raw.chars().take(limit).collect::<String>();
        if raw.chars().count() > limit {
            snippet.push_str("...");
        }
        Some(snippet)
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorRecord;
    use crate::domain::order::Power;
    use crate::errors::ErrorKind;

    #[test]
    fn record_carries_round_phase_and_power() {
        let record =
            ErrorRecord::new(Power::new("TURKEY"), "S1901M", 2, ErrorKind::Format, "no json")
                .with_analysis("Response gives considerations instead of JSON")
                .with_raw_response("consider the Black Sea");

        let value = serde_json::to_value(&record).expect("record should encode");
        assert_eq!(value["kind"], "format_error");
        assert_eq!(value["round"], 2);
        assert_eq!(value["phase"], "S1901M");
        assert_eq!(value["power"], "TURKEY");
        assert!(!record.id.is_empty());
    }

    #[test]
    fn empty_raw_response_is_not_stored() {
        let record =
            ErrorRecord::new(Power::new("TURKEY"), "S1901M", 0, ErrorKind::Generation, "empty")
                .with_raw_response("");
        assert!(record.raw_response.is_none());
        assert!(record.response_snippet(10).is_none());
    }

    #[test]
    fn snippet_is_truncated_with_ellipsis() {
        let record =
            ErrorRecord::new(Power::new("RUSSIA"), "F1901M", 0, ErrorKind::Format, "no json")
                .with_raw_response("abcdefghij");
        assert_eq!(record.response_snippet(4).as_deref(), Some("abcd..."));
        assert_eq!(record.response_snippet(20).as_deref(), Some("abcdefghij"));
    }
}
