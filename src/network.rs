//! The transport network: nodes (zones), undirected edges and the directed arcs backing them.
use crate::id::{define_id_getter, define_id_type};
use crate::mode::{ModeFlag, ModeID};
use crate::units::Distance;
use anyhow::{Result, ensure};
use derive_more::Display;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

define_id_type! {NodeID}

/// A map of [`Node`]s, keyed by node ID
pub type NodeMap = IndexMap<NodeID, Node>;

/// A zone centroid in the network
#[derive(PartialEq, Debug, Clone)]
pub struct Node {
    /// Unique identifier for the node
    pub id: NodeID,
    /// Zone number
    pub zone_nr: u32,
    /// Human-readable zone name
    pub zone_name: String,
    /// Whether the node lies outside the country
    pub abroad: bool,
    /// Whether the node is served by road
    pub road: bool,
    /// Whether the node is served by rail
    pub rail: bool,
    /// Whether the node is served by sea
    pub sea: bool,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}
define_id_getter! {Node, NodeID}

impl Node {
    /// Whether the node has the given mode flag set
    pub fn has_flag(&self, flag: ModeFlag) -> bool {
        match flag {
            ModeFlag::Road => self.road,
            ModeFlag::Rail => self.rail,
            ModeFlag::Sea => self.sea,
        }
    }
}

/// Index of an [`Arc`] in the network
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, PartialOrd, Ord, Serialize, Display)]
#[display("arc{_0}")]
pub struct ArcIndex(pub usize);

/// Index of an [`Edge`] in the network
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, PartialOrd, Ord, Serialize, Display)]
#[display("edge{_0}")]
pub struct EdgeIndex(pub usize);

/// A directed link between two nodes
#[derive(PartialEq, Debug, Clone)]
pub struct Arc {
    /// Origin node
    pub from: NodeID,
    /// Destination node
    pub to: NodeID,
    /// Mode of transport
    pub mode: ModeID,
    /// Distinguishes parallel links between the same nodes with the same mode
    pub route: u32,
    /// Length of the arc
    pub distance: Distance,
    /// The edge this arc belongs to
    pub edge: EdgeIndex,
}

impl fmt::Display for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{} ({}, {})", self.from, self.to, self.mode, self.route)
    }
}

/// An undirected link, backed by a forward and a backward [`Arc`]
#[derive(PartialEq, Debug, Clone)]
pub struct Edge {
    /// First endpoint, as given in the input
    pub from: NodeID,
    /// Second endpoint, as given in the input
    pub to: NodeID,
    /// Mode of transport
    pub mode: ModeID,
    /// Route number
    pub route: u32,
    /// Length of the edge
    pub distance: Distance,
    /// The forward and backward arcs
    pub arcs: [ArcIndex; 2],
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} ({}, {})", self.from, self.to, self.mode, self.route)
    }
}

/// The key identifying an edge in input tables: (from, to, mode, route)
pub type EdgeKey = (NodeID, NodeID, ModeID, u32);

/// The whole network with derived adjacency indices
#[derive(Debug, Clone)]
pub struct Network {
    /// All nodes
    pub nodes: NodeMap,
    edges: Vec<Edge>,
    arcs: Vec<Arc>,
    edge_lookup: HashMap<EdgeKey, EdgeIndex>,
    arc_lookup: HashMap<EdgeKey, ArcIndex>,
    mode_nodes: IndexMap<ModeID, IndexSet<NodeID>>,
    mode_arcs: IndexMap<ModeID, Vec<ArcIndex>>,
    arcs_in: HashMap<(NodeID, ModeID), Vec<ArcIndex>>,
    arcs_out: HashMap<(NodeID, ModeID), Vec<ArcIndex>>,
}

impl Network {
    /// Build a network from its nodes and edge definitions.
    ///
    /// Each edge gives rise to a forward and a backward arc with the same distance. Nodes belong to
    /// a road, rail or sea mode according to their flags; other modes use every node one of their
    /// arcs touches.
    pub fn new<I>(nodes: NodeMap, modes: &IndexSet<ModeID>, edges: I) -> Result<Self>
    where
        I: IntoIterator<Item = (EdgeKey, Distance)>,
    {
        let mut network = Self {
            nodes,
            edges: Vec::new(),
            arcs: Vec::new(),
            edge_lookup: HashMap::new(),
            arc_lookup: HashMap::new(),
            mode_nodes: modes.iter().map(|m| (m.clone(), IndexSet::new())).collect(),
            mode_arcs: modes.iter().map(|m| (m.clone(), Vec::new())).collect(),
            arcs_in: HashMap::new(),
            arcs_out: HashMap::new(),
        };

        for ((from, to, mode, route), distance) in edges {
            network.add_edge(from, to, mode, route, distance)?;
        }
        network.build_mode_nodes();

        Ok(network)
    }

    fn add_edge(
        &mut self,
        from: NodeID,
        to: NodeID,
        mode: ModeID,
        route: u32,
        distance: Distance,
    ) -> Result<()> {
        ensure!(self.nodes.contains_key(&from), "Unknown node {from}");
        ensure!(self.nodes.contains_key(&to), "Unknown node {to}");
        ensure!(from != to, "Edge from {from} to itself is not allowed");
        ensure!(self.mode_arcs.contains_key(&mode), "Unknown mode {mode}");
        ensure!(
            distance.is_finite() && distance.value() > 0.0,
            "Distance for edge {from}-{to} ({mode}) must be positive"
        );

        let forward_key = (from.clone(), to.clone(), mode.clone(), route);
        let backward_key = (to.clone(), from.clone(), mode.clone(), route);
        ensure!(
            !self.arc_lookup.contains_key(&forward_key)
                && !self.arc_lookup.contains_key(&backward_key),
            "Duplicate edge {from}-{to} ({mode}, {route})"
        );

        let edge_idx = EdgeIndex(self.edges.len());
        let forward = self.push_arc(&from, &to, &mode, route, distance, edge_idx);
        let backward = self.push_arc(&to, &from, &mode, route, distance, edge_idx);
        self.edge_lookup.insert(forward_key.clone(), edge_idx);
        self.arc_lookup.insert(forward_key, forward);
        self.arc_lookup.insert(backward_key, backward);
        self.edges.push(Edge {
            from,
            to,
            mode,
            route,
            distance,
            arcs: [forward, backward],
        });

        Ok(())
    }

    fn push_arc(
        &mut self,
        from: &NodeID,
        to: &NodeID,
        mode: &ModeID,
        route: u32,
        distance: Distance,
        edge: EdgeIndex,
    ) -> ArcIndex {
        let idx = ArcIndex(self.arcs.len());
        self.arcs.push(Arc {
            from: from.clone(),
            to: to.clone(),
            mode: mode.clone(),
            route,
            distance,
            edge,
        });
        if let Some(arcs) = self.mode_arcs.get_mut(mode) {
            arcs.push(idx);
        }
        self.arcs_out
            .entry((from.clone(), mode.clone()))
            .or_default()
            .push(idx);
        self.arcs_in
            .entry((to.clone(), mode.clone()))
            .or_default()
            .push(idx);

        idx
    }

    fn build_mode_nodes(&mut self) {
        for (mode, nodes) in &mut self.mode_nodes {
            match ModeFlag::for_mode(mode) {
                Some(flag) => nodes.extend(
                    self.nodes
                        .values()
                        .filter(|node| node.has_flag(flag))
                        .map(|node| node.id.clone()),
                ),
                None => {
                    for arc in self.arcs.iter().filter(|arc| arc.mode == *mode) {
                        nodes.insert(arc.from.clone());
                        nodes.insert(arc.to.clone());
                    }
                }
            }
        }
    }

    /// All arcs in the network
    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    /// All edges in the network
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Iterate over arcs with their indices
    pub fn iter_arcs(&self) -> impl Iterator<Item = (ArcIndex, &Arc)> {
        self.arcs.iter().enumerate().map(|(i, arc)| (ArcIndex(i), arc))
    }

    /// Iterate over edges with their indices
    pub fn iter_edges(&self) -> impl Iterator<Item = (EdgeIndex, &Edge)> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, edge)| (EdgeIndex(i), edge))
    }

    /// Get an arc by index
    pub fn arc(&self, idx: ArcIndex) -> &Arc {
        &self.arcs[idx.0]
    }

    /// Get an edge by index
    pub fn edge(&self, idx: EdgeIndex) -> &Edge {
        &self.edges[idx.0]
    }

    /// Find the arc from `from` to `to` with the given mode and route
    pub fn find_arc(&self, from: &NodeID, to: &NodeID, mode: &ModeID, route: u32) -> Option<ArcIndex> {
        self.arc_lookup
            .get(&(from.clone(), to.clone(), mode.clone(), route))
            .copied()
    }

    /// Find the edge with the given endpoints, mode and route (in either direction)
    pub fn find_edge(&self, from: &NodeID, to: &NodeID, mode: &ModeID, route: u32) -> Option<EdgeIndex> {
        self.find_arc(from, to, mode, route)
            .map(|arc| self.arc(arc).edge)
    }

    /// The nodes served by a mode
    pub fn mode_nodes(&self, mode: &ModeID) -> impl Iterator<Item = &NodeID> {
        self.mode_nodes.get(mode).into_iter().flatten()
    }

    /// Whether a node is served by a mode
    pub fn node_has_mode(&self, node: &NodeID, mode: &ModeID) -> bool {
        self.mode_nodes
            .get(mode)
            .is_some_and(|nodes| nodes.contains(node))
    }

    /// The arcs of a mode
    pub fn mode_arcs(&self, mode: &ModeID) -> &[ArcIndex] {
        self.mode_arcs.get(mode).map_or(&[], Vec::as_slice)
    }

    /// The arcs of a mode arriving at a node
    pub fn arcs_in(&self, node: &NodeID, mode: &ModeID) -> &[ArcIndex] {
        self.arcs_in
            .get(&(node.clone(), mode.clone()))
            .map_or(&[], Vec::as_slice)
    }

    /// The arcs of a mode leaving a node
    pub fn arcs_out(&self, node: &NodeID, mode: &ModeID) -> &[ArcIndex] {
        self.arcs_out
            .get(&(node.clone(), mode.clone()))
            .map_or(&[], Vec::as_slice)
    }

    /// Whether an edge lies entirely abroad
    pub fn edge_is_abroad(&self, edge: EdgeIndex) -> bool {
        let edge = self.edge(edge);
        let abroad = |id: &NodeID| self.nodes.get(id).is_some_and(|node| node.abroad);
        abroad(&edge.from) && abroad(&edge.to)
    }
}
