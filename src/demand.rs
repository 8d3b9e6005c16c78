//! Transport demand between origin-destination pairs.
use crate::network::NodeID;
use crate::product::ProductID;
use indexmap::{IndexMap, IndexSet};

/// Key for a demand entry: (origin, destination, product, year)
pub type DemandKey = (NodeID, NodeID, ProductID, u32);

/// Demand in scaled weight units, keyed by origin, destination, product and year.
///
/// Triples which are not listed have zero demand.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct DemandMap(IndexMap<DemandKey, f64>);

impl DemandMap {
    /// Create an empty demand map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the demand for an entry, replacing any previous value
    pub fn insert(
        &mut self,
        origin: NodeID,
        destination: NodeID,
        product: ProductID,
        year: u32,
        amount: f64,
    ) {
        self.0.insert((origin, destination, product, year), amount);
    }

    /// The demand for an entry (zero if not listed)
    pub fn get(&self, origin: &NodeID, destination: &NodeID, product: &ProductID, year: u32) -> f64 {
        self.0
            .get(&(origin.clone(), destination.clone(), product.clone(), year))
            .copied()
            .unwrap_or(0.0)
    }

    /// Iterate over listed entries
    pub fn iter(&self) -> impl Iterator<Item = (&DemandKey, f64)> {
        self.0.iter().map(|(key, amount)| (key, *amount))
    }

    /// Iterate over listed entries for one year
    pub fn iter_year(&self, year: u32) -> impl Iterator<Item = (&DemandKey, f64)> {
        self.iter().filter(move |((_, _, _, y), _)| *y == year)
    }

    /// The distinct origin-destination pairs with positive demand, in input order
    pub fn iter_od_pairs(&self) -> impl Iterator<Item = (&NodeID, &NodeID)> {
        self.0
            .iter()
            .filter(|(_, amount)| **amount > 0.0)
            .map(|((origin, destination, _, _), _)| (origin, destination))
            .collect::<IndexSet<_>>()
            .into_iter()
    }

    /// The largest total demand in any single year
    pub fn max_total(&self) -> f64 {
        let mut totals: IndexMap<u32, f64> = IndexMap::new();
        for ((_, _, _, year), amount) in &self.0 {
            *totals.entry(*year).or_default() += amount;
        }

        totals.into_values().fold(0.0, f64::max)
    }

    /// The largest single demand entry
    pub fn max_amount(&self) -> f64 {
        self.0.values().copied().fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_demand_map() {
        let mut demand = DemandMap::new();
        demand.insert("A".into(), "B".into(), "Fish".into(), 2022, 2.0);
        demand.insert("A".into(), "B".into(), "Ore".into(), 2022, 3.0);
        demand.insert("B".into(), "A".into(), "Fish".into(), 2030, 4.0);
        demand.insert("C".into(), "A".into(), "Fish".into(), 2030, 0.0);

        assert_approx_eq!(f64, demand.get(&"A".into(), &"B".into(), &"Ore".into(), 2022), 3.0);
        assert_approx_eq!(f64, demand.get(&"A".into(), &"B".into(), &"Ore".into(), 2030), 0.0);
        assert_approx_eq!(f64, demand.max_total(), 5.0);
        assert_approx_eq!(f64, demand.max_amount(), 4.0);
        assert_eq!(demand.iter_year(2022).count(), 2);

        let pairs: Vec<_> = demand
            .iter_od_pairs()
            .map(|(o, d)| format!("{o}->{d}"))
            .collect();
        assert_eq!(pairs, ["A->B", "B->A"]);
    }
}
