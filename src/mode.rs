//! Transport modes and the fuels (drivetrains) available to each of them.
use crate::id::{define_id_getter, define_id_type};
use indexmap::IndexMap;
use serde_string_enum::DeserializeLabeledStringEnum;
use unicase::UniCase;

define_id_type! {ModeID}
define_id_type! {FuelID}
define_id_type! {FuelGroupID}

/// A map of [`Mode`]s, keyed by mode ID
pub type ModeMap = IndexMap<ModeID, Mode>;

/// A transport mode (e.g. road, rail or sea)
#[derive(PartialEq, Debug, Clone)]
pub struct Mode {
    /// Unique identifier for the mode
    pub id: ModeID,
    /// Whether the mode's edges have limited capacity
    pub capacitated: bool,
    /// Average vehicle lifetime in years, which limits how fast the fleet can be renewed
    pub lifetime: u32,
    /// The fuels this mode can use, in input order
    pub fuels: IndexMap<FuelID, Fuel>,
}
define_id_getter! {Mode, ModeID}

/// A fuel as used by a particular mode
#[derive(PartialEq, Debug, Clone)]
pub struct Fuel {
    /// The fuel's ID
    pub id: FuelID,
    /// The group of fuels sharing a cost trajectory in the scenario tree
    pub group: FuelGroupID,
    /// Whether the technology is already established
    pub novelty: Novelty,
}

/// Whether a mode-fuel technology is established or still diffusing into the market
#[derive(PartialEq, Eq, Debug, Clone, Copy, DeserializeLabeledStringEnum)]
pub enum Novelty {
    /// Already established
    #[string = "mature"]
    Mature,
    /// Still diffusing into the market
    #[string = "new"]
    New,
}

/// Which node flag in the zone table a mode corresponds to
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ModeFlag {
    /// Nodes with the `road` flag
    Road,
    /// Nodes with the `rail` flag
    Rail,
    /// Nodes with the `sea` flag
    Sea,
}

impl ModeFlag {
    /// The node flag for the given mode, matched on the mode name case-insensitively
    pub fn for_mode(mode_id: &ModeID) -> Option<Self> {
        let name = UniCase::new(&*mode_id.0);
        if name == UniCase::new("road") {
            Some(Self::Road)
        } else if name == UniCase::new("rail") {
            Some(Self::Rail)
        } else if name == UniCase::new("sea") {
            Some(Self::Sea)
        } else {
            None
        }
    }
}

impl Mode {
    /// Iterate over the IDs of this mode's fuels
    pub fn iter_fuel_ids(&self) -> impl Iterator<Item = &FuelID> {
        self.fuels.keys()
    }

    /// Whether the mode can use the given fuel
    pub fn has_fuel(&self, fuel_id: &FuelID) -> bool {
        self.fuels.contains_key(fuel_id)
    }
}

/// Iterate over every (mode, fuel) pair in the model
pub fn iter_mode_fuels(modes: &ModeMap) -> impl Iterator<Item = (&Mode, &Fuel)> {
    modes
        .values()
        .flat_map(|mode| mode.fuels.values().map(move |fuel| (mode, fuel)))
}
