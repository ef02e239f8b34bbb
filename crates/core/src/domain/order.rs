use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Power(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(pub String);

/// One unit instruction in the engine's order grammar, e.g. `A PAR - BUR`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Order(pub String);

impl Power {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Order {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_hold(&self) -> bool {
        self.0.split_whitespace().last() == Some("H")
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Legal orders for one power in the current phase, keyed by orderable
/// location. Iteration follows the order the engine offered the locations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PossibleOrders {
    entries: Vec<(Location, Vec<Order>)>,
}

impl PossibleOrders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<L, O, I, J>(pairs: I) -> Self
    where
        L: Into<String>,
        O: Into<String>,
        I: IntoIterator<Item = (L, J)>,
        J: IntoIterator<Item = O>,
    {
        let mut possible = Self::new();
        for (location, orders) in pairs {
            possible.insert(
                Location::new(location),
                orders.into_iter().map(|order| Order::new(order)).collect(),
            );
        }
        possible
    }

    /// Replaces the legal set of an already known location in place.
    pub fn insert(&mut self, location: Location, orders: Vec<Order>) {
        match self.entries.iter_mut().find(|(known, _)| *known == location) {
            Some((_, existing)) => *existing = orders,
            None => self.entries.push((location, orders)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Location, &[Order])> {
        self.entries.iter().map(|(location, orders)| (location, orders.as_slice()))
    }

    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.entries.iter().map(|(location, _)| location)
    }

    pub fn legal_for(&self, location: &Location) -> Option<&[Order]> {
        self.entries
            .iter()
            .find(|(known, _)| known == location)
            .map(|(_, orders)| orders.as_slice())
    }

    /// First location whose legal set contains `order` verbatim.
    pub fn location_of(&self, order: &str) -> Option<&Location> {
        self.entries
            .iter()
            .find(|(_, orders)| orders.iter().any(|legal| legal.as_str() == order))
            .map(|(location, _)| location)
    }

    pub fn has_any_legal_order(&self) -> bool {
        self.entries.iter().any(|(_, orders)| !orders.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for PossibleOrders {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (location, orders) in &self.entries {
            map.serialize_entry(location, orders)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PossibleOrders {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PossibleOrdersVisitor;

        impl<'de> Visitor<'de> for PossibleOrdersVisitor {
            type Value = PossibleOrders;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of location to legal order list")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut possible = PossibleOrders::new();
                while let Some((location, orders)) =
                    access.next_entry::<Location, Vec<Order>>()?
                {
                    possible.insert(location, orders);
                }
                Ok(possible)
            }
        }

        deserializer.deserialize_map(PossibleOrdersVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::{Location, Order, PossibleOrders};

    #[test]
    fn hold_detection_uses_final_token() {
        assert!(Order::new("A PAR H").is_hold());
        assert!(!Order::new("F BRE - MAO").is_hold());
        assert!(!Order::new("A HOL - BEL").is_hold());
    }

    #[test]
    fn json_object_order_is_preserved() {
        let possible: PossibleOrders = serde_json::from_str(
            r#"{"PAR": ["A PAR H"], "BRE": ["F BRE - MAO", "F BRE H"], "MAR": ["A MAR H"]}"#,
        )
        .expect("possible orders should decode");

        let locations = possible.locations().map(Location::as_str).collect::<Vec<_>>();
        assert_eq!(locations, vec!["PAR", "BRE", "MAR"]);

        let encoded = serde_json::to_string(&possible).expect("possible orders should encode");
        assert!(encoded.starts_with(r#"{"PAR":"#));
    }

    #[test]
    fn location_lookup_finds_owning_location() {
        let possible = PossibleOrders::from_pairs([
            ("PAR", vec!["A PAR H", "A PAR - PIC"]),
            ("BRE", vec!["F BRE H"]),
        ]);

        assert_eq!(possible.location_of("A PAR - PIC").map(Location::as_str), Some("PAR"));
        assert_eq!(possible.location_of("A PAR - BUR"), None);
        assert_eq!(possible.legal_for(&Location::new("BRE")).map(<[Order]>::len), Some(1));
    }

    #[test]
    fn locations_without_orders_do_not_count_as_legal() {
        let mut possible = PossibleOrders::new();
        possible.insert(Location::new("PAR"), Vec::new());
        assert!(!possible.is_empty());
        assert!(!possible.has_any_legal_order());

        possible.insert(Location::new("PAR"), vec![Order::new("A PAR H")]);
        assert!(possible.has_any_legal_order());
    }
}
