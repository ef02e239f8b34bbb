use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::domain::message::{GameMessage, Recipient};
use crate::domain::order::{Location, Order, Power};
use crate::errors::GameError;
use crate::game::{BoardState, GameEngine};

#[derive(Clone, Debug, Default)]
struct PowerSlot {
    eliminated: bool,
    units: Vec<String>,
    centers: Vec<String>,
    orderable: Vec<Location>,
}

/// Orders submitted during one processed phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedPhase {
    pub phase: String,
    pub orders: BTreeMap<Power, Vec<Order>>,
}

/// Deterministic engine double: no adjudication, just bookkeeping.
#[derive(Clone, Debug)]
pub struct InMemoryGame {
    phase: String,
    upcoming_phases: VecDeque<String>,
    powers: BTreeMap<Power, PowerSlot>,
    legal_orders: HashMap<Location, Vec<Order>>,
    messages: Vec<GameMessage>,
    submitted: BTreeMap<Power, Vec<Order>>,
    processed: Vec<ProcessedPhase>,
}

impl InMemoryGame {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            upcoming_phases: VecDeque::new(),
            powers: BTreeMap::new(),
            legal_orders: HashMap::new(),
            messages: Vec::new(),
            submitted: BTreeMap::new(),
            processed: Vec::new(),
        }
    }

    pub fn with_power(mut self, power: &str) -> Self {
        self.powers.entry(Power::new(power)).or_default();
        self
    }

    /// Registers `location` as orderable by `power` with the given legal set.
    pub fn with_orderable<I, S>(mut self, power: &str, location: &str, orders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let location = Location::new(location);
        let slot = self.powers.entry(Power::new(power)).or_default();
        if !slot.orderable.contains(&location) {
            slot.orderable.push(location.clone());
        }
        self.legal_orders.insert(location, orders.into_iter().map(Order::new).collect());
        self
    }

    pub fn with_units<I, S>(mut self, power: &str, units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slot = self.powers.entry(Power::new(power)).or_default();
        slot.units.extend(units.into_iter().map(Into::into));
        self
    }

    pub fn with_centers<I, S>(mut self, power: &str, centers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slot = self.powers.entry(Power::new(power)).or_default();
        slot.centers.extend(centers.into_iter().map(Into::into));
        self
    }

    /// Phase labels `process` advances through, in order.
    pub fn then_phases<I, S>(mut self, phases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.upcoming_phases.extend(phases.into_iter().map(Into::into));
        self
    }

    pub fn eliminate(mut self, power: &str) -> Self {
        self.powers.entry(Power::new(power)).or_default().eliminated = true;
        self
    }

    pub fn messages(&self) -> &[GameMessage] {
        &self.messages
    }

    pub fn submitted_orders(&self, power: &Power) -> Option<&[Order]> {
        self.submitted.get(power).map(Vec::as_slice)
    }

    pub fn processed_phases(&self) -> &[ProcessedPhase] {
        &self.processed
    }

    fn slot(&self, power: &Power) -> Result<&PowerSlot, GameError> {
        self.powers.get(power).ok_or_else(|| GameError::UnknownPower(power.clone()))
    }
}

impl GameEngine for InMemoryGame {
    fn powers(&self) -> Vec<Power> {
        self.powers.keys().cloned().collect()
    }

    fn current_phase(&self) -> String {
        self.phase.clone()
    }

    fn get_orderable_locations(&self, power: &Power) -> Vec<Location> {
        self.powers
            .get(power)
            .filter(|slot| !slot.eliminated)
            .map(|slot| slot.orderable.clone())
            .unwrap_or_default()
    }

    fn get_all_possible_orders(&self) -> HashMap<Location, Vec<Order>> {
        self.legal_orders.clone()
    }

    fn get_state(&self) -> BoardState {
        BoardState {
            phase: self.phase.clone(),
            units: self
                .powers
                .iter()
                .map(|(power, slot)| (power.clone(), slot.units.clone()))
                .collect(),
            centers: self
                .powers
                .iter()
                .map(|(power, slot)| (power.clone(), slot.centers.clone()))
                .collect(),
        }
    }

    fn add_message(&mut self, message: GameMessage) -> Result<(), GameError> {
        self.slot(&message.sender)?;
        if let Recipient::Power(recipient) = &message.recipient {
            self.slot(recipient)?;
        }
        self.messages.push(message);
        Ok(())
    }

    fn set_orders(&mut self, power: &Power, orders: &[Order]) -> Result<(), GameError> {
        let slot = self.slot(power)?;
        for order in orders {
            let offered = slot.orderable.iter().any(|location| {
                self.legal_orders.get(location).is_some_and(|legal| legal.contains(order))
            });
            if !offered {
                return Err(GameError::IllegalOrder { power: power.clone(), order: order.clone() });
            }
        }
        self.submitted.insert(power.clone(), orders.to_vec());
        Ok(())
    }

    fn process(&mut self) -> Result<(), GameError> {
        let orders = std::mem::take(&mut self.submitted);
        self.processed.push(ProcessedPhase { phase: self.phase.clone(), orders });
        if let Some(next) = self.upcoming_phases.pop_front() {
            self.phase = next;
        }
        Ok(())
    }

    fn is_eliminated(&self, power: &Power) -> bool {
        self.powers.get(power).is_some_and(|slot| slot.eliminated)
    }
}
