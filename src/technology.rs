//! Technology readiness, phase-out restrictions and the initial fuel and mode mix.
use crate::bass::BassModel;
use crate::mode::{Fuel, FuelID, ModeID};
use crate::model::round_precision;
use crate::scenario::{CostPath, Scenario};
use crate::time_period::TimePeriods;
use indexmap::IndexMap;

/// How mature a mode-fuel technology is
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum Readiness {
    /// Fully available from the start
    Mature,
    /// Diffusing into the market according to a Bass model
    Diffusing {
        /// The base diffusion curve
        base: BassModel,
        /// Relative change in `p` and `q` on the optimistic and pessimistic cost paths
        p_q_variation: f64,
        /// Shift in start year on the optimistic and pessimistic cost paths
        t0_delay: f64,
    },
}

/// Technology data for every mode-fuel pair
#[derive(PartialEq, Debug, Clone)]
pub struct Technology {
    /// Readiness of each mode-fuel technology
    pub readiness: IndexMap<(ModeID, FuelID), Readiness>,
    /// Upper bound on a fuel's share of its mode's transport, for some years
    pub phase_out: IndexMap<(ModeID, FuelID, u32), f64>,
    /// Maximum share (percent) of a mode's transport a fuel may have in the first period
    pub init_fuel_share: IndexMap<(ModeID, FuelID), f64>,
    /// Share of total transport each listed mode has in the first period
    pub init_mode_share: IndexMap<ModeID, f64>,
    /// Whether diffusion parameters vary with the scenario's cost path
    pub scenario_variation: bool,
}

impl Technology {
    /// The readiness of a mode-fuel technology (mature if not listed)
    pub fn readiness(&self, mode: &ModeID, fuel: &FuelID) -> Readiness {
        self.readiness
            .get(&(mode.clone(), fuel.clone()))
            .copied()
            .unwrap_or(Readiness::Mature)
    }

    /// The diffusion curve governing a technology in a scenario, if it is not mature.
    ///
    /// Without scenario variation this is the base curve. Otherwise the optimistic path speeds up
    /// diffusion and brings its start forward; the pessimistic path does the reverse.
    pub fn active_bass_model(&self, mode: &ModeID, fuel: &Fuel, scenario: &Scenario) -> Option<BassModel> {
        let Readiness::Diffusing {
            base,
            p_q_variation,
            t0_delay,
        } = self.readiness(mode, &fuel.id)
        else {
            return None;
        };

        if !self.scenario_variation {
            return Some(base);
        }

        Some(match scenario.cost_path(&fuel.group) {
            CostPath::Base => base,
            CostPath::Optimistic => base.varied(p_q_variation, -t0_delay),
            CostPath::Pessimistic => base.varied(-p_q_variation, t0_delay),
        })
    }

    /// The base diffusion curve of a technology, if it is not mature
    pub fn base_bass_model(&self, mode: &ModeID, fuel: &FuelID) -> Option<BassModel> {
        match self.readiness(mode, fuel) {
            Readiness::Mature => None,
            Readiness::Diffusing { base, .. } => Some(base),
        }
    }

    /// The maximum share (percent) of its mode's transport a technology may have in a year.
    ///
    /// Mature technologies are unrestricted. First-stage years follow the base curve; second-stage
    /// years follow the scenario's curve, restarted from the base curve's adoption at the first
    /// second-stage year.
    pub fn readiness_percent(
        &self,
        mode: &ModeID,
        fuel: &Fuel,
        year: u32,
        scenario: &Scenario,
        time_periods: &TimePeriods,
    ) -> f64 {
        let Some(base) = self.base_bass_model(mode, &fuel.id) else {
            return 100.0;
        };

        let start_second_stage = match time_periods.first_second_stage_year() {
            Some(start) if self.scenario_variation && year >= start => start,
            _ => return round_precision(base.adoption(f64::from(year))),
        };

        let active = self
            .active_bass_model(mode, fuel, scenario)
            .unwrap_or(base);
        let initial = base.adoption(f64::from(start_second_stage));
        round_precision(active.adoption_from(f64::from(year), initial, f64::from(start_second_stage)))
    }

    /// The phase-out restriction for a technology in a year, if any
    pub fn phase_out(&self, mode: &ModeID, fuel: &FuelID, year: u32) -> Option<f64> {
        self.phase_out
            .get(&(mode.clone(), fuel.clone(), year))
            .copied()
    }
}
