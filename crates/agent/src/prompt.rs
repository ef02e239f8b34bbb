use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::agent::TurnContext;

pub const SYSTEM_PROMPT_FILE: &str = "system_prompt.txt";
pub const CONTEXT_PROMPT_FILE: &str = "context_prompt.txt";
pub const ORDER_INSTRUCTIONS_FILE: &str = "order_instructions.txt";
pub const CONVERSATION_INSTRUCTIONS_FILE: &str = "conversation_instructions.txt";
pub const PLANNING_INSTRUCTIONS_FILE: &str = "planning_instructions.txt";

/// Appended to every conversation prompt. Both examples must parse back
/// into messages.
pub const MESSAGE_FORMAT_REMINDER: &str = r#"CRITICAL REMINDER: Your response MUST consist ONLY of one or more valid JSON objects.
DO NOT include any text, explanations, or analysis outside of the JSON objects.
Example JSON format:
```json
{
  "message_type": "global",
  "content": "Your message here"
}
```
or
```json
{
  "message_type": "private",
  "recipient": "ENGLAND",
  "content": "Your private message here"
}
```"#;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert Diplomacy player. You negotiate, form \
alliances and betray when it serves your power. Answer in the exact format you are asked for.";

const DEFAULT_CONTEXT_PROMPT: &str = "Your power: {power_name}
Current phase: {current_phase}

Unit locations:
{all_unit_locations}

Supply centers:
{all_supply_centers}

Game history:
{game_history}

Your goals:
{agent_goals}

Your relationships:
{agent_relationships}

Possible orders:
{possible_orders}";

const DEFAULT_ORDER_INSTRUCTIONS: &str = "Choose exactly one order for each of your orderable \
locations, using only the possible orders listed above. Think it through, then finish with a \
line of the form:

PARSABLE OUTPUT:
{\"orders\": [\"order 1\", \"order 2\"]}";

const DEFAULT_CONVERSATION_INSTRUCTIONS: &str = "You are {power_name}, negotiating with the other \
powers this phase. Send any global announcements and private messages you want. Each message is \
one JSON object with \"message_type\" set to \"global\" or \"private\", a \"recipient\" power for \
private messages, and the message text in \"content\".";

const DEFAULT_PLANNING_INSTRUCTIONS: &str = "Write a short strategic directive for this phase: \
who to trust, which centers to target and which moves to prepare. Plain text, no JSON.";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("could not read prompt template `{path}`: {source}")]
    Read { path: PathBuf, source: io::Error },
}

/// Instruction templates loaded as opaque text. Only the placeholders are
/// interpreted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplates {
    pub system: String,
    pub context: String,
    pub orders: String,
    pub conversation: String,
    pub planning: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            context: DEFAULT_CONTEXT_PROMPT.to_string(),
            orders: DEFAULT_ORDER_INSTRUCTIONS.to_string(),
            conversation: DEFAULT_CONVERSATION_INSTRUCTIONS.to_string(),
            planning: DEFAULT_PLANNING_INSTRUCTIONS.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Reads the templates found in `dir`; missing files keep the built-in text.
    pub fn load(dir: Option<&Path>) -> Result<Self, PromptError> {
        let mut templates = Self::default();
        let Some(dir) = dir else {
            return Ok(templates);
        };

        let slots = [
            (SYSTEM_PROMPT_FILE, &mut templates.system),
            (CONTEXT_PROMPT_FILE, &mut templates.context),
            (ORDER_INSTRUCTIONS_FILE, &mut templates.orders),
            (CONVERSATION_INSTRUCTIONS_FILE, &mut templates.conversation),
            (PLANNING_INSTRUCTIONS_FILE, &mut templates.planning),
        ];
        for (file_name, slot) in slots {
            let path = dir.join(file_name);
            match fs::read_to_string(&path) {
                Ok(text) => *slot = text,
                Err(source) if source.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(
                        event_name = "prompt.template.default",
                        template = file_name,
                        "template file missing; using built-in text"
                    );
                }
                Err(source) => return Err(PromptError::Read { path, source }),
            }
        }
        Ok(templates)
    }

    pub fn context_prompt(&self, ctx: &TurnContext) -> String {
        let history = if ctx.history.trim().is_empty() {
            "\n(No game history yet)\n".to_string()
        } else {
            ctx.history.clone()
        };

        fill_placeholders(
            &self.context,
            &[
                ("power_name", ctx.power.as_str().to_string()),
                ("current_phase", ctx.phase.clone()),
                ("all_unit_locations", render_holdings(&ctx.board.units)),
                ("all_supply_centers", render_holdings(&ctx.board.centers)),
                ("game_history", history),
                ("possible_orders", render_possible_orders(ctx)),
                ("agent_goals", render_goals(&ctx.goals)),
                ("agent_relationships", render_relationships(ctx)),
            ],
        )
    }

    pub fn order_prompt(&self, ctx: &TurnContext) -> String {
        format!("{}\n\n{}", self.context_prompt(ctx), self.orders)
    }

    pub fn conversation_prompt(&self, ctx: &TurnContext) -> String {
        let instructions =
            fill_placeholders(&self.conversation, &[("power_name", ctx.power.as_str().to_string())]);
        format!("{}\n\n{instructions}\n\n{MESSAGE_FORMAT_REMINDER}", self.context_prompt(ctx))
    }

    pub fn planning_prompt(&self, ctx: &TurnContext) -> String {
        format!("{}\n\n{}", self.context_prompt(ctx), self.planning)
    }
}

/// Single left-to-right pass over `template`. Inserted values are copied
/// verbatim, so placeholder text inside them (a model's message quoted in
/// the history, say) is never expanded. Unknown `{...}` spans stay as-is.
fn fill_placeholders(template: &str, values: &[(&str, String)]) -> String {
    let mut filled = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        filled.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (value, close))
        });
        match value {
            Some((value, close)) => {
                filled.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                filled.push('{');
                rest = after;
            }
        }
    }
    filled.push_str(rest);
    filled
}

fn render_holdings<K: std::fmt::Display>(
    holdings: &std::collections::BTreeMap<K, Vec<String>>,
) -> String {
    holdings
        .iter()
        .map(|(power, held)| format!("  {power}: {}", held.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_possible_orders(ctx: &TurnContext) -> String {
    let mut rendered = String::new();
    for (location, orders) in ctx.possible_orders.iter() {
        let orders = orders.iter().map(|order| order.as_str()).collect::<Vec<_>>().join(", ");
        let _ = writeln!(rendered, "  {location}: {orders}");
    }
    rendered
}

fn render_goals(goals: &[String]) -> String {
    if goals.is_empty() {
        return "None specified".to_string();
    }
    goals.iter().map(|goal| format!("- {goal}")).collect::<Vec<_>>().join("\n")
}

fn render_relationships(ctx: &TurnContext) -> String {
    if ctx.relationships.is_empty() {
        return "None specified".to_string();
    }
    ctx.relationships
        .iter()
        .map(|(power, stance)| format!("- {power}: {stance}"))
        .collect::<Vec<_>>()
        .join("\n")
}
