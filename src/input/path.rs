//! Code for reading a user-supplied path catalogue from a CSV file.
use super::*;
use crate::network::{ArcIndex, Network, NodeID};
use crate::path::{Path as TransportPath, PathCatalog, PathID};
use indexmap::IndexMap;
use serde::Deserialize;

/// The file holding the path catalogue, also used when writing a generated catalogue
pub const PATHS_FILE_NAME: &str = "paths.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct PathLegRaw {
    path_id: u32,
    leg: u32,
    from: String,
    to: String,
    mode: String,
    route: u32,
}

/// Read the path catalogue, if the model supplies one.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `network` - The network the paths' legs refer to
///
/// # Returns
///
/// `None` if the model has no `paths.csv`, so that paths should be generated
pub fn read_paths(model_dir: &Path, network: &Network) -> Result<Option<PathCatalog>> {
    let file_path = model_dir.join(PATHS_FILE_NAME);
    if !file_path.exists() {
        return Ok(None);
    }

    let catalog = read_paths_from_iter(read_csv(&file_path)?, network)
        .with_context(|| input_err_msg(&file_path))?;

    Ok(Some(catalog))
}

fn read_paths_from_iter<I>(iter: I, network: &Network) -> Result<PathCatalog>
where
    I: Iterator<Item = PathLegRaw>,
{
    let mut legs: IndexMap<u32, Vec<(u32, ArcIndex)>> = IndexMap::new();
    for raw in iter {
        let from = NodeID::from(raw.from);
        let to = NodeID::from(raw.to);
        let arc = network
            .find_arc(&from, &to, &raw.mode.as_str().into(), raw.route)
            .with_context(|| {
                format!(
                    "Leg {} of path {} does not exist: {from}->{to} ({}, {})",
                    raw.leg, raw.path_id, raw.mode, raw.route
                )
            })?;
        legs.entry(raw.path_id).or_default().push((raw.leg, arc));
    }

    let paths = legs
        .into_iter()
        .map(|(id, mut legs)| {
            legs.sort_by_key(|(leg, _)| *leg);
            ensure!(
                legs.iter().map(|(leg, _)| *leg).tuple_windows().all(|(a, b)| a < b),
                "Duplicate leg number in path {id}"
            );
            TransportPath::new(PathID(id), legs.into_iter().map(|(_, arc)| arc).collect(), network)
        })
        .collect::<Result<Vec<_>>>()?;

    PathCatalog::new(paths, network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, network};
    use rstest::rstest;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn leg(path_id: u32, leg: u32, from: &str, to: &str, mode: &str) -> PathLegRaw {
        PathLegRaw {
            path_id,
            leg,
            from: from.to_string(),
            to: to.to_string(),
            mode: mode.to_string(),
            route: 1,
        }
    }

    #[rstest]
    fn test_read_paths_missing_file(network: Network) {
        let dir = tempdir().unwrap();
        assert!(read_paths(dir.path(), &network).unwrap().is_none());
    }

    #[rstest]
    fn test_read_paths(network: Network) {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(PATHS_FILE_NAME)).unwrap();
            writeln!(
                file,
                "path_id,leg,from,to,mode,route
7,2,Trondheim,Bergen,Road,1
7,1,Oslo,Trondheim,Rail,1
9,1,Oslo,Bergen,Sea,1"
            )
            .unwrap();
        }

        let catalog = read_paths(dir.path(), &network).unwrap().unwrap();
        assert_eq!(catalog.len(), 2);
        let path = catalog.get(PathID(7)).unwrap();
        assert!(path.is_multimodal());
        assert_eq!(path.origin, "Oslo".into());
        assert_eq!(path.destination, "Bergen".into());
    }

    #[rstest]
    fn test_read_paths_unknown_arc(network: Network) {
        assert_error!(
            read_paths_from_iter([leg(0, 1, "Oslo", "Bergen", "Rail")].into_iter(), &network),
            "Leg 1 of path 0 does not exist: Oslo->Bergen (Rail, 1)"
        );
    }

    #[rstest]
    fn test_read_paths_duplicate_leg(network: Network) {
        assert_error!(
            read_paths_from_iter(
                [
                    leg(0, 1, "Oslo", "Bergen", "Road"),
                    leg(0, 1, "Oslo", "Bergen", "Sea")
                ]
                .into_iter(),
                &network
            ),
            "Duplicate leg number in path 0"
        );
    }
}
