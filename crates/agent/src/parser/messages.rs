use once_cell::sync::Lazy;
use parley_core::{ErrorKind, ErrorRecord, MessageType, ParsedMessage, Power, Recipient};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::{ParserChain, Tier};

static DOUBLE_BRACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("valid regex"));
static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid regex"));
static MESSAGE_TYPE_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\{[\s\S]*?"message_type"[\s\S]*?\}"#).expect("valid regex"));
static UNTERMINATED_MESSAGE_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\{[^{]*?"message_type"[\s\S]*"#).expect("valid regex"));
static ANY_BRACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*?\}").expect("valid regex"));
static SUGGESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"you (can|could|should)").expect("valid regex"));

static MESSAGE_CHAIN: Lazy<ParserChain<Vec<String>>> = Lazy::new(|| {
    ParserChain::new(vec![
        Tier::new("double_brace", double_brace_blocks),
        Tier::new("fenced_json", fenced_blocks),
        Tier::new("message_type_object", message_type_blocks),
        Tier::new("unterminated_message_type", unterminated_message_type_block),
        Tier::new("any_braces", any_brace_blocks),
    ])
});

const MISSING_JSON_HINTS: [(&str, &str); 4] = [
    ("here are some strategic", "Response contains strategic advice instead of JSON"),
    ("your goal", "Response focuses on describing goals instead of JSON"),
    ("consider", "Response gives considerations instead of JSON"),
    ("option", "Response discusses options instead of JSON"),
];

/// One candidate block that could not become a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockError {
    pub kind: ErrorKind,
    pub message: String,
    pub block: String,
}

/// Diagnostic attached to a negotiation reply that was not fully usable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    pub raw_response: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub block_errors: Vec<BlockError>,
}

impl ConversationError {
    pub fn generation(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Generation,
            message: message.into(),
            analysis: None,
            raw_response: String::new(),
            block_errors: Vec::new(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Processing, ..Self::generation(message) }
    }

    pub fn to_record(&self, power: &Power, phase: &str, round: u32) -> ErrorRecord {
        let record = ErrorRecord::new(power.clone(), phase, round, self.kind, self.message.clone())
            .with_raw_response(self.raw_response.clone());
        match &self.analysis {
            Some(analysis) => record.with_analysis(analysis.clone()),
            None => record,
        }
    }
}

/// Messages recovered from `raw`, plus a diagnostic whenever nothing was
/// recovered or any candidate block failed.
pub fn parse_messages(raw: &str) -> (Vec<ParsedMessage>, Option<ConversationError>) {
    let Some((tier, blocks)) = MESSAGE_CHAIN.first_match(raw) else {
        return (
            Vec::new(),
            Some(ConversationError {
                kind: ErrorKind::Format,
                message: "No JSON message blocks found in response".to_string(),
                analysis: Some(classify_missing_json(raw).to_string()),
                raw_response: raw.to_string(),
                block_errors: Vec::new(),
            }),
        );
    };

    let block_count = blocks.len();
    let mut messages = Vec::new();
    let mut block_errors = Vec::new();
    for block in blocks {
        match decode_block(&block) {
            Ok(message) => messages.push(message),
            Err(error) => {
                tracing::debug!(
                    event_name = "parser.messages.block_rejected",
                    tier,
                    kind = %error.kind,
                    "message block rejected"
                );
                block_errors.push(error);
            }
        }
    }

    if block_errors.is_empty() {
        return (messages, None);
    }

    let kind = block_errors.first().map(|error| error.kind).unwrap_or(ErrorKind::Format);
    let analysis = messages.is_empty().then(|| classify_missing_json(raw).to_string());
    let error = ConversationError {
        kind,
        message: format!(
            "{} of {block_count} message blocks found by {tier} could not be used",
            block_errors.len()
        ),
        analysis,
        raw_response: raw.to_string(),
        block_errors,
    };
    (messages, Some(error))
}

/// Best guess at why a reply carries no JSON.
pub fn classify_missing_json(raw: &str) -> &'static str {
    let lowered = raw.to_lowercase();
    if lowered.contains(MISSING_JSON_HINTS[0].0) {
        return MISSING_JSON_HINTS[0].1;
    }
    if SUGGESTION.is_match(&lowered) {
        return "Response contains suggestions instead of JSON";
    }
    MISSING_JSON_HINTS[1..]
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, explanation)| *explanation)
        .unwrap_or("Unable to determine why JSON is missing")
}

fn decode_block(block: &str) -> Result<ParsedMessage, BlockError> {
    let value = serde_json::from_str::<Value>(block.trim()).map_err(|error| BlockError {
        kind: ErrorKind::JsonDecode,
        message: error.to_string(),
        block: block.to_string(),
    })?;

    let invalid = |message: &str| BlockError {
        kind: ErrorKind::Validation,
        message: message.to_string(),
        block: block.to_string(),
    };
    let object = value.as_object().ok_or_else(|| invalid("message block is not an object"))?;
    let message_type = object
        .get("message_type")
        .ok_or_else(|| invalid("message block has no `message_type`"))?
        .as_str()
        .ok_or_else(|| invalid("`message_type` is not a string"))?;
    let content = object
        .get("content")
        .ok_or_else(|| invalid("message block has no `content`"))?
        .as_str()
        .ok_or_else(|| invalid("`content` is not a string"))?;
    let recipient = object.get("recipient").and_then(Value::as_str).unwrap_or_default();

    Ok(ParsedMessage {
        message_type: MessageType::from_label(message_type),
        recipient: Recipient::from_label(recipient),
        content: content.to_string(),
    })
}

fn non_empty(blocks: Vec<String>) -> Option<Vec<String>> {
    (!blocks.is_empty()).then_some(blocks)
}

fn double_brace_blocks(raw: &str) -> Option<Vec<String>> {
    non_empty(
        DOUBLE_BRACE
            .captures_iter(raw)
            .filter_map(|captures| captures.get(1))
            .map(|inner| format!("{{{}}}", inner.as_str().trim()))
            .collect(),
    )
}

fn fenced_blocks(raw: &str) -> Option<Vec<String>> {
    non_empty(
        FENCED_BLOCK
            .captures_iter(raw)
            .filter_map(|captures| captures.get(1))
            .map(|inner| inner.as_str().trim().to_string())
            .collect(),
    )
}

fn message_type_blocks(raw: &str) -> Option<Vec<String>> {
    non_empty(MESSAGE_TYPE_OBJECT.find_iter(raw).map(|m| m.as_str().trim().to_string()).collect())
}

/// The last object opened before `"message_type"` runs to the end of the
/// text; a closing brace is appended when missing.
fn unterminated_message_type_block(raw: &str) -> Option<Vec<String>> {
    let found = UNTERMINATED_MESSAGE_TYPE.find(raw)?;
    let mut block = found.as_str().trim().to_string();
    if !block.ends_with('}') {
        block.push('}');
    }
    Some(vec![block])
}

fn any_brace_blocks(raw: &str) -> Option<Vec<String>> {
    non_empty(ANY_BRACES.find_iter(raw).map(|m| m.as_str().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use parley_core::{ErrorKind, MessageType, ParsedMessage, Power, Recipient};

    use super::{classify_missing_json, parse_messages};
    use crate::prompt::MESSAGE_FORMAT_REMINDER;

    #[test]
    fn one_bad_fenced_block_does_not_sink_its_sibling() {
        let raw = "```json\n{\"message_type\":\"global\",\"content\":\"hi\"}\n```\n\
                   ```json\n{\"message_type\":\"private\",\"recipient\":\"ENGLAND\"}\n```";
        let (messages, error) = parse_messages(raw);

        assert_eq!(messages, vec![ParsedMessage::global("hi")]);
        let error = error.expect("partial failure is reported");
        assert_eq!(error.kind, ErrorKind::Validation);
        assert_eq!(error.block_errors.len(), 1);
        assert!(error.analysis.is_none());
    }

    #[test]
    fn format_reminder_examples_round_trip() {
        let (messages, error) = parse_messages(MESSAGE_FORMAT_REMINDER);

        assert!(error.is_none());
        assert_eq!(
            messages,
            vec![
                ParsedMessage::global("Your message here"),
                ParsedMessage::private("ENGLAND", "Your private message here"),
            ]
        );
    }

    #[test]
    fn double_braces_take_precedence_and_are_rewrapped() {
        let raw = r#"{{"message_type": "private", "recipient": "russia", "content": "Sweden is yours"}}
```json
{"message_type": "global", "content": "ignored"}
```"#;
        let (messages, error) = parse_messages(raw);

        assert!(error.is_none());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_type, MessageType::Private);
        assert_eq!(messages[0].recipient, Recipient::Power(Power::new("russia")));
    }

    #[test]
    fn bare_message_objects_are_found_without_fences() {
        let raw = r#"Sure. {"message_type": "global", "content": "Peace"} and
{"message_type": "private", "recipient": "ITALY", "content": "Lepanto?"}"#;
        let (messages, error) = parse_messages(raw);

        assert!(error.is_none());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].recipient.label(), "ITALY");
    }

    #[test]
    fn unterminated_object_gets_a_closing_brace() {
        let raw = r#"{"message_type": "global", "content": "Truncated but fine""#;
        let (messages, error) = parse_messages(raw);

        assert!(error.is_none());
        assert_eq!(messages, vec![ParsedMessage::global("Truncated but fine")]);
    }

    #[test]
    fn undecodable_blocks_are_json_decode_errors() {
        let raw = "```json\n{\"message_type\": \"global\", content: nope}\n```";
        let (messages, error) = parse_messages(raw);

        assert!(messages.is_empty());
        let error = error.expect("decode failure is reported");
        assert_eq!(error.kind, ErrorKind::JsonDecode);
        assert_eq!(error.raw_response, raw);
        assert!(error.analysis.is_some());
    }

    #[test]
    fn text_without_braces_is_a_format_error_with_analysis() {
        let raw = "You should consider attacking Munich.";
        let (messages, error) = parse_messages(raw);

        assert!(messages.is_empty());
        let error = error.expect("missing json is reported");
        assert_eq!(error.kind, ErrorKind::Format);
        assert_eq!(error.analysis.as_deref(), Some("Response contains suggestions instead of JSON"));
        assert_eq!(error.raw_response, raw);
    }

    #[test]
    fn analysis_heuristics_apply_in_order() {
        assert_eq!(
            classify_missing_json("Here are some strategic options you could take"),
            "Response contains strategic advice instead of JSON"
        );
        assert_eq!(
            classify_missing_json("Your goal is Vienna"),
            "Response focuses on describing goals instead of JSON"
        );
        assert_eq!(
            classify_missing_json("Consider the Balkans"),
            "Response gives considerations instead of JSON"
        );
        assert_eq!(
            classify_missing_json("Several options remain"),
            "Response discusses options instead of JSON"
        );
        assert_eq!(classify_missing_json(""), "Unable to determine why JSON is missing");
    }

    #[test]
    fn error_converts_to_round_tagged_record() {
        let (_, error) = parse_messages("no json at all");
        let record = error.expect("error").to_record(&Power::new("AUSTRIA"), "S1901M", 1);

        assert_eq!(record.kind, ErrorKind::Format);
        assert_eq!(record.round, 1);
        assert_eq!(record.raw_response.as_deref(), Some("no json at all"));
        assert!(record.analysis.is_some());
    }
}
