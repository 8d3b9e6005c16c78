//! The catalogue of origin-destination paths and the indices derived from it.
//!
//! A path is an ordered sequence of arcs. The catalogue is either read from the model directory or
//! generated from the network for every origin-destination pair with demand.
use crate::demand::DemandMap;
use crate::mode::ModeID;
use crate::network::{ArcIndex, Network, NodeID};
use anyhow::{Result, bail, ensure};
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use petgraph::Directed;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Numeric identifier of a path
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, PartialOrd, Ord, Serialize)]
pub struct PathID(pub u32);

impl fmt::Display for PathID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered sequence of arcs from an origin to a destination
#[derive(PartialEq, Debug, Clone)]
pub struct Path {
    /// The path's identifier
    pub id: PathID,
    /// The legs of the path, in order
    pub arcs: Vec<ArcIndex>,
    /// The mode of each leg
    pub modes: Vec<ModeID>,
    /// First node
    pub origin: NodeID,
    /// Last node
    pub destination: NodeID,
}

impl Path {
    /// Create a new path, checking that consecutive legs connect
    pub fn new(id: PathID, arcs: Vec<ArcIndex>, network: &Network) -> Result<Self> {
        let (Some(first), Some(last)) = (arcs.first(), arcs.last()) else {
            bail!("Path {id} has no legs");
        };
        for (a, b) in arcs.iter().tuple_windows() {
            ensure!(
                network.arc(*a).to == network.arc(*b).from,
                "Legs of path {id} are not consecutive: {} does not connect to {}",
                network.arc(*a),
                network.arc(*b)
            );
        }

        Ok(Self {
            id,
            modes: arcs.iter().map(|a| network.arc(*a).mode.clone()).collect(),
            origin: network.arc(*first).from.clone(),
            destination: network.arc(*last).to.clone(),
            arcs,
        })
    }

    /// Whether any two consecutive legs use different modes
    pub fn is_multimodal(&self) -> bool {
        self.modes.iter().tuple_windows().any(|(a, b)| a != b)
    }

    /// The mode of the first leg
    pub fn first_mode(&self) -> &ModeID {
        &self.modes[0]
    }

    /// The mode of the last leg
    pub fn last_mode(&self) -> &ModeID {
        &self.modes[self.modes.len() - 1]
    }

    /// Iterate over the mode changes along the path as (node, from mode, to mode)
    pub fn iter_transfers<'a>(
        &'a self,
        network: &'a Network,
    ) -> impl Iterator<Item = (&'a NodeID, &'a ModeID, &'a ModeID)> {
        self.arcs
            .iter()
            .zip(self.modes.iter())
            .tuple_windows()
            .filter(|((_, m1), (_, m2))| m1 != m2)
            .map(|((a, m1), (_, m2))| (&network.arc(*a).to, m1, m2))
    }
}

/// The path catalogue with derived lookup indices
#[derive(Debug, Clone)]
pub struct PathCatalog {
    paths: IndexMap<PathID, Path>,
    od_paths: HashMap<(NodeID, NodeID), Vec<PathID>>,
    arc_paths: Vec<Vec<PathID>>,
    arc_paths_unimodal: Vec<Vec<PathID>>,
    origin_paths: HashMap<(NodeID, ModeID), Vec<PathID>>,
    destination_paths: HashMap<(NodeID, ModeID), Vec<PathID>>,
    transfer_paths: HashMap<(NodeID, ModeID), Vec<PathID>>,
}

impl PathCatalog {
    /// Build the catalogue and its indices from a set of paths
    pub fn new(paths: Vec<Path>, network: &Network) -> Result<Self> {
        let mut catalog = Self {
            paths: IndexMap::new(),
            od_paths: HashMap::new(),
            arc_paths: vec![Vec::new(); network.arcs().len()],
            arc_paths_unimodal: vec![Vec::new(); network.arcs().len()],
            origin_paths: HashMap::new(),
            destination_paths: HashMap::new(),
            transfer_paths: HashMap::new(),
        };

        for path in paths {
            ensure!(
                !catalog.paths.contains_key(&path.id),
                "Duplicate path ID {}",
                path.id
            );
            catalog.index_path(&path, network);
            catalog.paths.insert(path.id, path);
        }

        Ok(catalog)
    }

    fn index_path(&mut self, path: &Path, network: &Network) {
        let id = path.id;
        self.od_paths
            .entry((path.origin.clone(), path.destination.clone()))
            .or_default()
            .push(id);

        let multimodal = path.is_multimodal();
        for arc in path.arcs.iter().unique() {
            self.arc_paths[arc.0].push(id);
            if !multimodal {
                self.arc_paths_unimodal[arc.0].push(id);
            }
        }

        self.origin_paths
            .entry((path.origin.clone(), path.first_mode().clone()))
            .or_default()
            .push(id);
        self.destination_paths
            .entry((path.destination.clone(), path.last_mode().clone()))
            .or_default()
            .push(id);

        let mut transfers = IndexSet::new();
        for (node, from_mode, to_mode) in path.iter_transfers(network) {
            transfers.insert((node.clone(), from_mode.clone()));
            transfers.insert((node.clone(), to_mode.clone()));
        }
        for key in transfers {
            self.transfer_paths.entry(key).or_default().push(id);
        }
    }

    /// Generate the catalogue from the network.
    ///
    /// For every origin-destination pair with positive demand, all simple arc sequences with at
    /// most `max_legs` legs and at most `max_modes` distinct modes are enumerated. The reverse of
    /// each pair is enumerated too (after all demand pairs), as empty vehicles return along it.
    /// Paths are numbered from zero in a deterministic order (OD pairs in demand order, then
    /// depth-first in arc order).
    pub fn generate(
        network: &Network,
        demand: &DemandMap,
        max_legs: u32,
        max_modes: u32,
    ) -> Result<Self> {
        let graph = NetworkGraph::new(network);
        let od_pairs: IndexSet<_> = demand.iter_od_pairs().collect();
        let return_pairs: IndexSet<_> = od_pairs
            .iter()
            .map(|(origin, destination)| (*destination, *origin))
            .filter(|pair| !od_pairs.contains(pair))
            .collect();

        let mut paths = Vec::new();
        let mut missing = Vec::new();
        for (origin, destination) in od_pairs.iter().chain(&return_pairs) {
            let before = paths.len();
            for arcs in graph.simple_paths(origin, destination, max_legs as usize, max_modes as usize, network) {
                let id = PathID(paths.len() as u32);
                paths.push(Path::new(id, arcs, network)?);
            }
            if paths.len() == before && od_pairs.contains(&(*origin, *destination)) {
                missing.push(format!("{origin}->{destination}"));
            }
        }

        ensure!(
            missing.is_empty(),
            "No path found for the following origin-destination pairs with demand: {}",
            crate::input::format_items_with_cap(missing)
        );

        Self::new(paths, network)
    }

    /// Check that every origin-destination pair with positive demand has at least one path
    pub fn check_coverage(&self, demand: &DemandMap) -> Result<()> {
        let missing = demand
            .iter_od_pairs()
            .filter(|(o, d)| self.od_paths(o, d).is_empty())
            .map(|(o, d)| format!("{o}->{d}"))
            .collect_vec();
        ensure!(
            missing.is_empty(),
            "No path found for the following origin-destination pairs with demand: {}",
            crate::input::format_items_with_cap(missing)
        );

        Ok(())
    }

    /// Iterate over all paths
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.values()
    }

    /// Get a path by ID
    pub fn get(&self, id: PathID) -> Option<&Path> {
        self.paths.get(&id)
    }

    /// The number of paths
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the catalogue is empty
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// The paths from `origin` to `destination`
    pub fn od_paths(&self, origin: &NodeID, destination: &NodeID) -> &[PathID] {
        self.od_paths
            .get(&(origin.clone(), destination.clone()))
            .map_or(&[], Vec::as_slice)
    }

    /// The paths using an arc
    pub fn arc_paths(&self, arc: ArcIndex) -> &[PathID] {
        &self.arc_paths[arc.0]
    }

    /// The unimodal paths using an arc
    pub fn arc_paths_unimodal(&self, arc: ArcIndex) -> &[PathID] {
        &self.arc_paths_unimodal[arc.0]
    }

    /// Paths whose first leg starts at `node` with `mode`
    pub fn origin_paths(&self, node: &NodeID, mode: &ModeID) -> &[PathID] {
        lookup(&self.origin_paths, node, mode)
    }

    /// Paths whose last leg ends at `node` with `mode`
    pub fn destination_paths(&self, node: &NodeID, mode: &ModeID) -> &[PathID] {
        lookup(&self.destination_paths, node, mode)
    }

    /// Multimodal paths changing mode at `node`, either to or from `mode`
    pub fn transfer_paths(&self, node: &NodeID, mode: &ModeID) -> &[PathID] {
        lookup(&self.transfer_paths, node, mode)
    }
}

fn lookup<'a>(
    map: &'a HashMap<(NodeID, ModeID), Vec<PathID>>,
    node: &NodeID,
    mode: &ModeID,
) -> &'a [PathID] {
    map.get(&(node.clone(), mode.clone()))
        .map_or(&[], Vec::as_slice)
}

/// A directed graph of the network's arcs, used to enumerate paths
struct NetworkGraph {
    graph: Graph<NodeID, ArcIndex, Directed>,
    node_indices: HashMap<NodeID, NodeIndex>,
}

impl NetworkGraph {
    fn new(network: &Network) -> Self {
        let mut graph = Graph::new();
        let node_indices: HashMap<_, _> = network
            .nodes
            .keys()
            .map(|id| (id.clone(), graph.add_node(id.clone())))
            .collect();
        for (idx, arc) in network.iter_arcs() {
            graph.add_edge(node_indices[&arc.from], node_indices[&arc.to], idx);
        }

        Self {
            graph,
            node_indices,
        }
    }

    /// Enumerate simple arc sequences from `origin` to `destination`
    fn simple_paths(
        &self,
        origin: &NodeID,
        destination: &NodeID,
        max_legs: usize,
        max_modes: usize,
        network: &Network,
    ) -> Vec<Vec<ArcIndex>> {
        let (Some(&start), Some(&end)) = (
            self.node_indices.get(origin),
            self.node_indices.get(destination),
        ) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        let mut visited = vec![start];
        let mut arcs = Vec::new();
        self.visit(start, end, max_legs, max_modes, network, &mut visited, &mut arcs, &mut found);

        found
    }

    #[allow(clippy::too_many_arguments)]
    fn visit(
        &self,
        node: NodeIndex,
        end: NodeIndex,
        max_legs: usize,
        max_modes: usize,
        network: &Network,
        visited: &mut Vec<NodeIndex>,
        arcs: &mut Vec<ArcIndex>,
        found: &mut Vec<Vec<ArcIndex>>,
    ) {
        if node == end {
            found.push(arcs.clone());
            return;
        }
        if arcs.len() == max_legs {
            return;
        }

        // petgraph yields outgoing edges in reverse insertion order
        let mut edges = self.graph.edges(node).collect_vec();
        edges.sort_by_key(|edge| *edge.weight());
        for edge in edges {
            let next = edge.target();
            if visited.contains(&next) {
                continue;
            }

            arcs.push(*edge.weight());
            let num_modes = arcs
                .iter()
                .map(|a| &network.arc(*a).mode)
                .unique()
                .count();
            if num_modes <= max_modes {
                visited.push(next);
                self.visit(next, end, max_legs, max_modes, network, visited, arcs, found);
                visited.pop();
            }
            arcs.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, demand, network, path_catalog};
    use rstest::rstest;

    fn arc(network: &Network, from: &str, to: &str, mode: &str) -> ArcIndex {
        network
            .find_arc(&from.into(), &to.into(), &mode.into(), 1)
            .unwrap()
    }

    #[rstest]
    fn test_path_classification(network: Network) {
        let road = arc(&network, "Oslo", "Trondheim", "Road");
        let rail = arc(&network, "Oslo", "Trondheim", "Rail");
        let road_on = arc(&network, "Trondheim", "Bergen", "Road");

        let unimodal = Path::new(PathID(0), vec![road, road_on], &network).unwrap();
        assert!(!unimodal.is_multimodal());
        assert_eq!(unimodal.iter_transfers(&network).count(), 0);

        let multimodal = Path::new(PathID(1), vec![rail, road_on], &network).unwrap();
        assert!(multimodal.is_multimodal());
        let transfers: Vec<_> = multimodal.iter_transfers(&network).collect();
        assert_eq!(
            transfers,
            [(
                &NodeID::from("Trondheim"),
                &ModeID::from("Rail"),
                &ModeID::from("Road")
            )]
        );
        assert_eq!(multimodal.origin, NodeID::from("Oslo"));
        assert_eq!(multimodal.destination, NodeID::from("Bergen"));
    }

    #[rstest]
    fn test_path_not_consecutive(network: Network) {
        let a = arc(&network, "Oslo", "Trondheim", "Road");
        let b = arc(&network, "Oslo", "Bergen", "Road");
        assert!(Path::new(PathID(0), vec![a, b], &network).is_err());
        assert_error!(Path::new(PathID(3), vec![], &network), "Path 3 has no legs");
    }

    #[rstest]
    fn test_catalog_indices(path_catalog: PathCatalog) {
        let oslo = NodeID::from("Oslo");
        let bergen = NodeID::from("Bergen");
        let trondheim = NodeID::from("Trondheim");
        let ob_paths = path_catalog.od_paths(&oslo, &bergen);
        assert!(!ob_paths.is_empty());
        for id in ob_paths {
            let path = path_catalog.get(*id).unwrap();
            assert_eq!(path.origin, oslo);
            assert_eq!(path.destination, bergen);
        }

        // Every arc index is consistent with the paths' legs
        for path in path_catalog.iter() {
            for a in &path.arcs {
                assert!(path_catalog.arc_paths(*a).contains(&path.id));
                assert_eq!(
                    path_catalog.arc_paths_unimodal(*a).contains(&path.id),
                    !path.is_multimodal()
                );
            }
            assert!(
                path_catalog
                    .origin_paths(&path.origin, path.first_mode())
                    .contains(&path.id)
            );
            assert!(
                path_catalog
                    .destination_paths(&path.destination, path.last_mode())
                    .contains(&path.id)
            );
        }

        // Rail to road transfer at Trondheim
        let rail: ModeID = "Rail".into();
        let transfer = path_catalog.transfer_paths(&trondheim, &rail);
        assert!(!transfer.is_empty());
        for id in transfer {
            let path = path_catalog.get(*id).unwrap();
            assert!(path.is_multimodal());
            assert!(path.modes.contains(&rail));
        }
        assert!(path_catalog.transfer_paths(&oslo, &rail).is_empty());
    }

    #[rstest]
    fn test_generate(network: Network, demand: DemandMap) {
        let catalog = PathCatalog::generate(&network, &demand, 2, 2).unwrap();
        let oslo = NodeID::from("Oslo");
        let bergen = NodeID::from("Bergen");

        // Direct road, direct sea, road via Trondheim and rail+road via Trondheim
        let described: Vec<_> = catalog
            .od_paths(&oslo, &bergen)
            .iter()
            .map(|id| catalog.get(*id).unwrap().modes.iter().join("+"))
            .collect();
        assert_eq!(described, ["Road", "Sea", "Road+Road", "Rail+Road"]);

        // Return paths come after all demand paths
        let returns = catalog.od_paths(&bergen, &oslo);
        assert_eq!(returns.len(), 4);
        assert!(returns.iter().all(|id| id.0 >= 4));

        // Ids are consecutive from zero
        assert!(catalog.iter().enumerate().all(|(i, p)| p.id == PathID(i as u32)));

        // A single mode only allows unimodal paths
        let unimodal = PathCatalog::generate(&network, &demand, 2, 1).unwrap();
        assert!(unimodal.iter().all(|p| !p.is_multimodal()));
    }

    #[rstest]
    fn test_generate_no_path(network: Network, mut demand: DemandMap) {
        // Bergen can be reached from Trondheim in one leg, but Oslo cannot be left in zero
        demand.insert("Trondheim".into(), "Bergen".into(), "Timber".into(), 2022, 5.0);
        assert!(PathCatalog::generate(&network, &demand, 1, 1).is_ok());
        assert_error!(
            PathCatalog::generate(&network, &demand, 0, 1),
            "No path found for the following origin-destination pairs with demand: \
             Oslo->Bergen, Trondheim->Bergen"
        );
    }
}
