use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order::Power;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub text: String,
    pub written_at: DateTime<Utc>,
}

/// Long-lived memory of one power's agent for the length of a game.
///
/// Goals and relationships are read by prompt construction; the journal
/// only ever grows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub power: Power,
    pub goals: Vec<String>,
    pub relationships: BTreeMap<Power, String>,
    journal: Vec<JournalEntry>,
}

impl AgentState {
    pub fn new(power: Power) -> Self {
        Self { power, goals: Vec::new(), relationships: BTreeMap::new(), journal: Vec::new() }
    }

    pub fn with_goals<I, S>(mut self, goals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.goals = goals.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relationship(mut self, power: Power, stance: impl Into<String>) -> Self {
        self.relationships.insert(power, stance.into());
        self
    }

    pub fn add_journal_entry(&mut self, text: impl Into<String>) {
        self.journal.push(JournalEntry { text: text.into(), written_at: Utc::now() });
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }
}

#[cfg(test)]
mod tests {
    use super::AgentState;
    use crate::domain::order::Power;

    #[test]
    fn journal_is_append_only_and_ordered() {
        let mut state = AgentState::new(Power::new("FRANCE"))
            .with_goals(["Secure Iberia"])
            .with_relationship(Power::new("ENGLAND"), "Wary");

        state.add_journal_entry("first");
        state.add_journal_entry("second");

        let texts = state.journal().iter().map(|entry| entry.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(state.goals, vec!["Secure Iberia".to_string()]);
        assert_eq!(state.relationships.get(&Power::new("ENGLAND")).map(String::as_str), Some("Wary"));
    }
}
