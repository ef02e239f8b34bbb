//! Narrow query/command surface of the game-rules engine.
//!
//! Legality, adjudication and map topology live behind [`GameEngine`]; the
//! rest of the workspace only reads snapshots and submits messages/orders.

pub mod memory;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::message::GameMessage;
use crate::domain::order::{Location, Order, PossibleOrders, Power};
use crate::errors::GameError;

pub use memory::InMemoryGame;

/// Read-only board snapshot handed to prompt construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardState {
    pub phase: String,
    pub units: BTreeMap<Power, Vec<String>>,
    pub centers: BTreeMap<Power, Vec<String>>,
}

pub trait GameEngine {
    fn powers(&self) -> Vec<Power>;
    fn current_phase(&self) -> String;
    fn get_orderable_locations(&self, power: &Power) -> Vec<Location>;
    fn get_all_possible_orders(&self) -> HashMap<Location, Vec<Order>>;
    fn get_state(&self) -> BoardState;
    fn add_message(&mut self, message: GameMessage) -> Result<(), GameError>;
    fn set_orders(&mut self, power: &Power, orders: &[Order]) -> Result<(), GameError>;
    fn process(&mut self) -> Result<(), GameError>;
    fn is_eliminated(&self, power: &Power) -> bool;
}

/// Powers that may still act this phase.
pub fn active_powers<G>(engine: &G) -> Vec<Power>
where
    G: GameEngine + ?Sized,
{
    engine.powers().into_iter().filter(|power| !engine.is_eliminated(power)).collect()
}

/// Legal orders for each location `power` must order, in the engine's
/// location order. Locations without any legal order are left out.
pub fn gather_possible_orders<G>(engine: &G, power: &Power) -> PossibleOrders
where
    G: GameEngine + ?Sized,
{
    let all_possible = engine.get_all_possible_orders();
    let mut possible = PossibleOrders::new();
    for location in engine.get_orderable_locations(power) {
        match all_possible.get(&location) {
            Some(orders) if !orders.is_empty() => possible.insert(location, orders.clone()),
            _ => tracing::debug!(
                event_name = "game.possible_orders.location_without_orders",
                power = %power,
                location = %location,
                "orderable location has no legal orders"
            ),
        }
    }
    possible
}

#[cfg(test)]
mod tests {
    use super::{active_powers, gather_possible_orders, InMemoryGame};
    use crate::domain::order::{Location, Power};

    #[test]
    fn gather_keeps_engine_location_order_and_drops_empty_sets() {
        let game = InMemoryGame::new("S1901M")
            .with_orderable("FRANCE", "PAR", ["A PAR H", "A PAR - BUR"])
            .with_orderable("FRANCE", "BRE", ["F BRE H"])
            .with_orderable("FRANCE", "MAR", Vec::<&str>::new());

        let possible = gather_possible_orders(&game, &Power::new("FRANCE"));
        let locations = possible.locations().map(Location::as_str).collect::<Vec<_>>();
        assert_eq!(locations, vec!["PAR", "BRE"]);
    }

    #[test]
    fn eliminated_powers_are_not_active() {
        let game = InMemoryGame::new("S1901M")
            .with_orderable("FRANCE", "PAR", ["A PAR H"])
            .with_orderable("ITALY", "ROM", ["A ROM H"])
            .eliminate("ITALY");

        assert_eq!(active_powers(&game), vec![Power::new("FRANCE")]);
    }
}
