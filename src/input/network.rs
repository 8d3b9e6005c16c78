//! Code for reading the network (zones and distances) from CSV files.
use super::*;
use crate::mode::{ModeID, ModeMap};
use crate::network::{Network, Node, NodeMap};
use crate::units::Distance;
use serde::Deserialize;

const ZONES_FILE_NAME: &str = "zones.csv";
const DISTANCES_FILE_NAME: &str = "distances.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct ZoneRaw {
    node: String,
    zone_nr: u32,
    zone_name: String,
    abroad: bool,
    road: bool,
    rail: bool,
    sea: bool,
    latitude: f64,
    longitude: f64,
}

#[derive(PartialEq, Debug, Deserialize)]
struct DistanceRaw {
    from: String,
    to: String,
    mode: String,
    route: u32,
    distance_km: f64,
}

/// Read the network.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `modes` - All modes
///
/// # Returns
///
/// The network with its adjacency indices or an error
pub fn read_network(model_dir: &Path, modes: &ModeMap) -> Result<Network> {
    let zones_path = model_dir.join(ZONES_FILE_NAME);
    let nodes = read_zones_from_iter(read_csv(&zones_path)?)
        .with_context(|| input_err_msg(&zones_path))?;

    let distances_path = model_dir.join(DISTANCES_FILE_NAME);
    let mode_ids: IndexSet<ModeID> = modes.keys().cloned().collect();
    let edges = read_csv::<DistanceRaw>(&distances_path)?.map(|raw| {
        (
            (raw.from.into(), raw.to.into(), raw.mode.into(), raw.route),
            Distance(raw.distance_km),
        )
    });

    Network::new(nodes, &mode_ids, edges).with_context(|| input_err_msg(&distances_path))
}

fn read_zones_from_iter<I>(iter: I) -> Result<NodeMap>
where
    I: Iterator<Item = ZoneRaw>,
{
    let mut nodes = NodeMap::new();
    for raw in iter {
        let node = Node {
            id: raw.node.into(),
            zone_nr: raw.zone_nr,
            zone_name: raw.zone_name,
            abroad: raw.abroad,
            road: raw.road,
            rail: raw.rail,
            sea: raw.sea,
            latitude: raw.latitude,
            longitude: raw.longitude,
        };
        insert_unique(&mut nodes, node, "node")?;
    }

    Ok(nodes)
}
