use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::failure::ErrorRecord;
use crate::domain::order::Power;
use crate::errors::ErrorKind;

/// Failure counters surfaced to operators, one set per power.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounters {
    pub conversation_errors: u32,
    pub order_decoding_errors: u32,
}

impl ErrorCounters {
    pub fn total(&self) -> u32 {
        self.conversation_errors + self.order_decoding_errors
    }
}

/// Per-power error ledger. Mutated only by the phase driver that consumes
/// task results, so it needs no interior locking.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAggregator {
    counters: BTreeMap<Power, ErrorCounters>,
    records: BTreeMap<Power, Vec<ErrorRecord>>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts every power at zero so the serialised stats list all of them.
    pub fn with_powers<I>(powers: I) -> Self
    where
        I: IntoIterator<Item = Power>,
    {
        let mut aggregator = Self::new();
        for power in powers {
            aggregator.counters.entry(power).or_default();
        }
        aggregator
    }

    pub fn record(&mut self, record: ErrorRecord) {
        let counters = self.counters.entry(record.power.clone()).or_default();
        if record.kind.is_order_mode() {
            counters.order_decoding_errors += 1;
        } else {
            counters.conversation_errors += 1;
        }
        self.records.entry(record.power.clone()).or_default().push(record);
    }

    pub fn counters(&self) -> &BTreeMap<Power, ErrorCounters> {
        &self.counters
    }

    pub fn counters_for(&self, power: &Power) -> ErrorCounters {
        self.counters.get(power).copied().unwrap_or_default()
    }

    pub fn records_for(&self, power: &Power) -> &[ErrorRecord] {
        self.records.get(power).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn records_in_round<'a>(
        &'a self,
        power: &Power,
        phase: &'a str,
        round: u32,
    ) -> impl Iterator<Item = &'a ErrorRecord> + 'a {
        self.records_for(power)
            .iter()
            .filter(move |record| record.phase == phase && record.round == round)
    }

    pub fn records_of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &ErrorRecord> {
        self.records.values().flatten().filter(move |record| record.kind == kind)
    }

    pub fn total_records(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorAggregator, ErrorCounters};
    use crate::domain::failure::ErrorRecord;
    use crate::domain::order::Power;
    use crate::errors::ErrorKind;

    fn record(power: &str, round: u32, kind: ErrorKind) -> ErrorRecord {
        ErrorRecord::new(Power::new(power), "S1901M", round, kind, "failure")
    }

    #[test]
    fn records_increment_matching_counter() {
        let mut stats = ErrorAggregator::new();
        stats.record(record("FRANCE", 0, ErrorKind::Format));
        stats.record(record("FRANCE", 1, ErrorKind::JsonDecode));
        stats.record(record("FRANCE", 0, ErrorKind::OrderDecoding));
        stats.record(record("ITALY", 0, ErrorKind::OrderDecoding));

        assert_eq!(
            stats.counters_for(&Power::new("FRANCE")),
            ErrorCounters { conversation_errors: 2, order_decoding_errors: 1 }
        );
        assert_eq!(stats.counters_for(&Power::new("ITALY")).order_decoding_errors, 1);
        assert_eq!(stats.total_records(), 4);
        assert_eq!(stats.records_of_kind(ErrorKind::JsonDecode).count(), 1);
    }

    #[test]
    fn records_in_same_round_accumulate_without_overwrite() {
        let mut stats = ErrorAggregator::new();
        stats.record(record("GERMANY", 2, ErrorKind::JsonDecode));
        stats.record(record("GERMANY", 2, ErrorKind::Validation));

        let in_round = stats
            .records_in_round(&Power::new("GERMANY"), "S1901M", 2)
            .map(|record| record.kind)
            .collect::<Vec<_>>();
        assert_eq!(in_round, vec![ErrorKind::JsonDecode, ErrorKind::Validation]);
        assert_eq!(stats.records_in_round(&Power::new("GERMANY"), "S1901M", 0).count(), 0);
    }

    #[test]
    fn stats_serialize_as_power_to_counters() {
        let stats = ErrorAggregator::with_powers([Power::new("AUSTRIA"), Power::new("RUSSIA")]);
        let value = serde_json::to_value(stats.counters()).expect("counters should encode");
        assert_eq!(value["AUSTRIA"]["conversation_errors"], 0);
        assert_eq!(value["RUSSIA"]["order_decoding_errors"], 0);
        assert!(stats.records_for(&Power::new("AUSTRIA")).is_empty());
    }
}
