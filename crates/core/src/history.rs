//! Chronological record of what each phase produced: plans, negotiation
//! traffic, orders and their adjudication results.
//!
//! The record is rendered back into prompts, so a power only ever sees the
//! global channel plus the private conversations it took part in.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::domain::failure::ErrorRecord;
use crate::domain::message::Recipient;
use crate::domain::order::{Order, Power};

const PHASE_SEPARATOR_WIDTH: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub sender: Power,
    pub recipient: Recipient,
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub name: String,
    pub plans: BTreeMap<Power, String>,
    pub messages: Vec<HistoryMessage>,
    pub orders_by_power: BTreeMap<Power, Vec<Order>>,
    pub results_by_power: BTreeMap<Power, Vec<Vec<String>>>,
}

impl PhaseRecord {
    fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    fn global_lines(&self) -> String {
        let mut lines = String::new();
        for message in self.messages.iter().filter(|message| message.recipient.is_broadcast()) {
            let _ = writeln!(lines, " {}: {}", message.sender, message.content);
        }
        lines
    }

    /// Private conversations `power` is party to, keyed by counterpart in
    /// first-contact order.
    fn private_conversations(&self, power: &Power) -> Vec<(Power, String)> {
        let mut conversations: Vec<(Power, String)> = Vec::new();
        for message in &self.messages {
            let Recipient::Power(recipient) = &message.recipient else {
                continue;
            };
            let counterpart = if &message.sender == power {
                recipient
            } else if recipient == power {
                &message.sender
            } else {
                continue;
            };
            let line = format!("  {}: {}\n", message.sender, message.content);
            match conversations.iter_mut().find(|(known, _)| known == counterpart) {
                Some((_, transcript)) => transcript.push_str(&line),
                None => conversations.push((counterpart.clone(), line)),
            }
        }
        conversations
    }

    fn order_lines(&self) -> String {
        let mut lines = String::new();
        for (power, orders) in &self.orders_by_power {
            let _ = writeln!(lines, "{power}:");
            let results = self.results_by_power.get(power);
            for (index, order) in orders.iter().enumerate() {
                let outcome = results
                    .and_then(|results| results.get(index))
                    .filter(|result| result.iter().any(|entry| !entry.is_empty()))
                    .map(|result| result.join(", "))
                    .unwrap_or_else(|| "successful".to_string());
                let _ = writeln!(lines, "  {order} ({outcome})");
            }
            lines.push('\n');
        }
        lines
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameHistory {
    phases: Vec<PhaseRecord>,
    conversation_errors: BTreeMap<String, BTreeMap<Power, Vec<ErrorRecord>>>,
}

impl GameHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phases(&self) -> &[PhaseRecord] {
        &self.phases
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseRecord> {
        self.phases.iter().rev().find(|phase| phase.name == name)
    }

    pub fn add_phase(&mut self, name: &str) {
        if self.phases.last().is_some_and(|phase| phase.name == name) {
            tracing::warn!(
                event_name = "history.phase.duplicate",
                phase = name,
                "phase already recorded; not adding again"
            );
            return;
        }
        self.phases.push(PhaseRecord::new(name));
        tracing::debug!(event_name = "history.phase.added", phase = name, "phase added");
    }

    pub fn add_plan(&mut self, phase: &str, power: &Power, plan: impl Into<String>) {
        if let Some(record) = self.phase_mut(phase) {
            record.plans.insert(power.clone(), plan.into());
        }
    }

    pub fn add_message(
        &mut self,
        phase: &str,
        sender: &Power,
        recipient: &Recipient,
        content: impl Into<String>,
    ) {
        if let Some(record) = self.phase_mut(phase) {
            record.messages.push(HistoryMessage {
                sender: sender.clone(),
                recipient: recipient.clone(),
                content: content.into(),
            });
        }
    }

    pub fn add_orders(&mut self, phase: &str, power: &Power, orders: &[Order]) {
        if let Some(record) = self.phase_mut(phase) {
            record.orders_by_power.entry(power.clone()).or_default().extend_from_slice(orders);
        }
    }

    pub fn add_results(&mut self, phase: &str, power: &Power, results: Vec<Vec<String>>) {
        if let Some(record) = self.phase_mut(phase) {
            record.results_by_power.entry(power.clone()).or_default().extend(results);
        }
    }

    /// Appends to the per-power error lists stored for `phase`.
    pub fn add_conversation_errors(
        &mut self,
        phase: &str,
        errors: BTreeMap<Power, Vec<ErrorRecord>>,
    ) {
        let stored = self.conversation_errors.entry(phase.to_string()).or_default();
        for (power, records) in errors {
            stored.entry(power).or_default().extend(records);
        }
    }

    pub fn conversation_errors(&self, phase: &str) -> Option<&BTreeMap<Power, Vec<ErrorRecord>>> {
        self.conversation_errors.get(phase)
    }

    /// Plans recorded for the most recent phase.
    pub fn strategic_directives(&self) -> BTreeMap<Power, String> {
        self.phases.last().map(|phase| phase.plans.clone()).unwrap_or_default()
    }

    /// Prompt-ready transcript of the last `phases` phases as seen by `power`.
    pub fn render_for(&self, power: &Power, include_plans: bool, phases: usize) -> String {
        if self.phases.is_empty() {
            return String::new();
        }

        let start = self.phases.len().saturating_sub(phases);
        let reported = &self.phases[start..];
        let mut rendered = String::new();

        for phase in reported {
            let _ = write!(rendered, "\n{}:\n", phase.name);

            let global = phase.global_lines();
            if !global.is_empty() {
                rendered.push_str("\nGLOBAL:\n");
                rendered.push_str(&global);
            }

            let private = phase.private_conversations(power);
            if !private.is_empty() {
                rendered.push_str("\nPRIVATE:\n");
                for (counterpart, transcript) in private {
                    let _ = write!(rendered, " {counterpart}:\n\n{transcript}\n");
                }
            }

            if !phase.orders_by_power.is_empty() {
                rendered.push_str("\nORDERS:\n");
                rendered.push_str(&phase.order_lines());
            }

            rendered.push_str(&"-".repeat(PHASE_SEPARATOR_WIDTH));
            rendered.push('\n');
        }

        if include_plans {
            if let Some(plan) = reported.last().and_then(|phase| phase.plans.get(power)) {
                let _ = write!(
                    rendered,
                    "\n{power} STRATEGIC DIRECTIVE:\n\
                     Here is a high-level directive you have planned out previously for this phase.\n\
                     {plan}\n"
                );
            }
        }

        rendered
    }

    fn phase_mut(&mut self, name: &str) -> Option<&mut PhaseRecord> {
        let found = self.phases.iter_mut().rev().find(|phase| phase.name == name);
        if found.is_none() {
            tracing::error!(
                event_name = "history.phase.missing",
                phase = name,
                "phase not found in history; entry dropped"
            );
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::GameHistory;
    use crate::domain::failure::ErrorRecord;
    use crate::domain::message::Recipient;
    use crate::domain::order::{Order, Power};
    use crate::errors::ErrorKind;

    fn power(name: &str) -> Power {
        Power::new(name)
    }

    #[test]
    fn duplicate_latest_phase_is_not_added_twice() {
        let mut history = GameHistory::new();
        history.add_phase("S1901M");
        history.add_phase("S1901M");
        history.add_phase("F1901M");
        history.add_phase("S1901M");

        let names = history.phases().iter().map(|phase| phase.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["S1901M", "F1901M", "S1901M"]);
    }

    #[test]
    fn entries_for_unknown_phase_are_dropped() {
        let mut history = GameHistory::new();
        history.add_phase("S1901M");
        history.add_message("W1901A", &power("FRANCE"), &Recipient::Broadcast, "lost");
        history.add_orders("W1901A", &power("FRANCE"), &[Order::new("A PAR H")]);

        let phase = history.phase("S1901M").expect("phase exists");
        assert!(phase.messages.is_empty());
        assert!(phase.orders_by_power.is_empty());
    }

    #[test]
    fn render_shows_global_and_only_own_private_conversations() {
        let mut history = GameHistory::new();
        history.add_phase("S1901M");
        history.add_message("S1901M", &power("ENGLAND"), &Recipient::Broadcast, "Peace in our time");
        history.add_message(
            "S1901M",
            &power("FRANCE"),
            &Recipient::Power(power("ENGLAND")),
            "DMZ the channel?",
        );
        history.add_message(
            "S1901M",
            &power("ENGLAND"),
            &Recipient::Power(power("FRANCE")),
            "Agreed",
        );
        history.add_message(
            "S1901M",
            &power("GERMANY"),
            &Recipient::Power(power("RUSSIA")),
            "Secret",
        );

        let rendered = history.render_for(&power("FRANCE"), true, 5);

        assert!(rendered.starts_with("\nS1901M:\n"));
        assert!(rendered.contains("\nGLOBAL:\n ENGLAND: Peace in our time\n"));
        assert!(rendered.contains(
            "\nPRIVATE:\n ENGLAND:\n\n  FRANCE: DMZ the channel?\n  ENGLAND: Agreed\n\n"
        ));
        assert!(!rendered.contains("Secret"));
        assert!(rendered.ends_with(&format!("{}\n", "-".repeat(50))));
    }

    #[test]
    fn render_marks_orders_without_results_successful() {
        let mut history = GameHistory::new();
        history.add_phase("S1901M");
        history.add_orders(
            "S1901M",
            &power("FRANCE"),
            &[Order::new("A PAR - BUR"), Order::new("F BRE H")],
        );
        history.add_results("S1901M", &power("FRANCE"), vec![vec!["bounce".to_string()]]);

        let rendered = history.render_for(&power("ITALY"), false, 5);
        assert!(rendered.contains("\nORDERS:\nFRANCE:\n  A PAR - BUR (bounce)\n  F BRE H (successful)\n"));
    }

    #[test]
    fn render_limits_phases_and_appends_latest_directive() {
        let mut history = GameHistory::new();
        for phase in ["S1901M", "F1901M", "W1901A"] {
            history.add_phase(phase);
        }
        history.add_plan("W1901A", &power("FRANCE"), "Build in Marseilles.");

        let rendered = history.render_for(&power("FRANCE"), true, 2);
        assert!(!rendered.contains("S1901M"));
        assert!(rendered.contains("F1901M"));
        assert!(rendered.ends_with(
            "\nFRANCE STRATEGIC DIRECTIVE:\nHere is a high-level directive you have planned out previously for this phase.\nBuild in Marseilles.\n"
        ));

        let without_plans = history.render_for(&power("FRANCE"), false, 2);
        assert!(!without_plans.contains("STRATEGIC DIRECTIVE"));
        assert_eq!(
            history.strategic_directives().get(&power("FRANCE")).map(String::as_str),
            Some("Build in Marseilles.")
        );
    }

    #[test]
    fn conversation_errors_are_kept_per_phase() {
        let mut history = GameHistory::new();
        let record = ErrorRecord::new(power("TURKEY"), "S1901M", 1, ErrorKind::Format, "no json");
        history.add_conversation_errors("S1901M", BTreeMap::from([(power("TURKEY"), vec![record])]));

        let stored = history.conversation_errors("S1901M").expect("errors stored");
        assert_eq!(stored[&power("TURKEY")].len(), 1);
        assert!(history.conversation_errors("F1901M").is_none());
    }

    #[test]
    fn renegotiating_a_phase_appends_errors() {
        let mut history = GameHistory::new();
        for round in 0..2 {
            let record =
                ErrorRecord::new(power("TURKEY"), "S1901M", round, ErrorKind::Format, "no json");
            history.add_conversation_errors("S1901M", BTreeMap::from([(power("TURKEY"), vec![record])]));
        }

        let stored = history.conversation_errors("S1901M").expect("errors stored");
        let rounds = stored[&power("TURKEY")].iter().map(|record| record.round).collect::<Vec<_>>();
        assert_eq!(rounds, vec![0, 1]);
    }

    #[test]
    fn empty_history_renders_nothing() {
        assert_eq!(GameHistory::new().render_for(&power("FRANCE"), true, 5), "");
    }
}
