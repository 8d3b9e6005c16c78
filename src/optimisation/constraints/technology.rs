//! Transport amounts by technology and the limits on how fast the technology and mode mix changes.
use super::{ConstraintContext, TermsByKey};
use crate::bass::BassModel;
use crate::index_sets::{ModeFuelKey, ScenarioIndexed};
use crate::mode::{Fuel, FuelID, ModeID};
use crate::model::{Model, round_precision};
use crate::optimisation::problem::{ConstraintFamily, Problem, Variable};
use crate::scenario::{Scenario, ScenarioID};
use itertools::iproduct;
use std::collections::HashMap;

/// Tolerance below the initial mode share within which a mode's first-period share may fall
const INIT_MODE_SHARE_TOLERANCE: f64 = 0.01;

fn find_fuel<'a>(model: &'a Model, mode: &ModeID, fuel: &FuelID) -> Option<&'a Fuel> {
    model.modes.get(mode)?.fuels.get(fuel)
}

fn find_scenario<'a>(ctx: &'a ConstraintContext, id: &ScenarioID) -> Option<&'a Scenario> {
    ctx.sets.scenarios().iter().find(|scenario| scenario.id == *id)
}

/// Transport amounts of all fuels of each mode: (mode, year, scenario) -> terms
fn mode_amounts(ctx: &ConstraintContext, coeff: f64) -> TermsByKey<(ModeID, u32, ScenarioID)> {
    let mut terms = TermsByKey::new();
    for ((mode, _, year, scenario), var) in ctx.variables.transport_amount.iter() {
        terms.add((mode.clone(), *year, scenario.clone()), var, coeff);
    }

    terms
}

/// Add a row bounding a technology's transport amount by a share of its mode's total
fn add_share_row(
    problem: &mut Problem,
    ctx: &ConstraintContext,
    family: ConstraintFamily,
    key: &ModeFuelKey,
    share: f64,
    upper: f64,
) {
    let (mode, _, year, scenario) = key;
    let Some(amount) = ctx.variables.transport_amount.get(key) else {
        return;
    };

    let mut terms = vec![(amount, 1.0)];
    terms.extend(
        ctx.variables
            .transport_amount
            .iter()
            .filter(|((m, _, y, s), _)| m == mode && y == year && s == scenario)
            .map(|(_, var)| (var, -share)),
    );
    problem.add_row(family, key.label(), ..=upper, terms);
}

/// Add constraints defining the transport amount (tonne-km) of each technology
pub fn add_transport_amount_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    let model = ctx.model;

    let mut terms = TermsByKey::new();
    for ((arc_idx, fuel, _, year, scenario), var) in ctx.variables.flow.iter() {
        let arc = model.network.arc(*arc_idx);
        let key = (arc.mode.clone(), fuel.clone(), *year, scenario.clone());
        terms.add(key, var, -arc.distance.value());
    }

    for (key, amount) in ctx.variables.transport_amount.iter() {
        let mut terms = terms.take(key);
        terms.push((amount, 1.0));
        problem.add_row(
            ConstraintFamily::TransportAmount,
            key.label(),
            0.0..=0.0,
            terms,
        );
    }
}

/// Add the technology readiness ceilings and phase-out restrictions.
///
/// A diffusing technology's share of its mode's transport is bounded by its adoption curve. A
/// phase-out restriction bounds the share directly; a restriction of zero bans the technology.
pub fn add_technology_share_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    let model = ctx.model;
    let technology = &model.technology;

    for key in ctx.sets.transport_amounts() {
        let (mode, fuel_id, year, scenario_id) = key;
        let (Some(fuel), Some(scenario)) = (
            find_fuel(model, mode, fuel_id),
            find_scenario(ctx, scenario_id),
        ) else {
            continue;
        };

        if technology.base_bass_model(mode, fuel_id).is_some() {
            let readiness = technology.readiness_percent(
                mode,
                fuel,
                *year,
                scenario,
                &model.time_periods,
            );
            add_share_row(
                problem,
                ctx,
                ConstraintFamily::TechMaturity,
                key,
                round_precision(readiness / 100.0),
                ctx.feas_relax(),
            );
        }

        if let Some(restriction) = technology.phase_out(mode, fuel_id, *year) {
            add_share_row(
                problem,
                ctx,
                ConstraintFamily::PhaseOut,
                key,
                restriction,
                0.0,
            );
        }
    }
}

/// Add the initial fuel and mode mix in the model's first year.
///
/// Capacitated modes get no minimum mode share, as their capacity may not admit it. Nothing is
/// added if the first year is not modelled.
pub fn add_initial_mix_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    let model = ctx.model;
    let technology = &model.technology;
    let t0 = model.time_periods.first_year();
    if !ctx.sets.years().contains(&t0) {
        return;
    }

    for (((mode, fuel), share), scenario) in
        iproduct!(&technology.init_fuel_share, ctx.sets.iter_scenario_ids())
    {
        let key = (mode.clone(), fuel.clone(), t0, scenario.clone());
        add_share_row(
            problem,
            ctx,
            ConstraintFamily::InitFuelShare,
            &key,
            round_precision(share / 100.0),
            0.0,
        );
    }

    for ((mode, share), scenario) in
        iproduct!(&technology.init_mode_share, ctx.sets.iter_scenario_ids())
    {
        if model.modes.get(mode).is_some_and(|m| m.capacitated) {
            continue;
        }
        let minimum = share - INIT_MODE_SHARE_TOLERANCE;
        let terms = ctx
            .variables
            .transport_amount
            .iter()
            .filter(|((_, _, year, s), _)| *year == t0 && s == scenario)
            .map(|((m, ..), var)| {
                let own = if m == mode { 1.0 } else { 0.0 };
                (var, own - minimum)
            });
        problem.add_row(
            ConstraintFamily::InitModeShare,
            format!("{mode},{scenario}"),
            0.0..,
            terms,
        );
    }
}

/// Add constraints limiting how fast the mode and fuel mix can change between decision years.
///
/// A mode's total transport may shrink by at most a factor `rho_star` per year and grow by at
/// most `2 - rho_star` per year. The combined decrease over a mode's fuels is limited by the share
/// of its fleet which reaches the end of its lifetime.
pub fn add_mode_shift_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    let model = ctx.model;
    let variables = ctx.variables;
    let rho = model.parameters.rho_star;

    // Auxiliary yearly amounts agree with the transport amounts in decision years
    for (key, aux) in variables.aux_transport_amount.iter() {
        let Some(amount) = variables.transport_amount.get(key) else {
            continue;
        };
        problem.add_row(
            ConstraintFamily::AuxTransportAmount,
            key.label(),
            0.0..=0.0,
            [(aux, 1.0), (amount, -1.0)],
        );
    }

    let mut totals = mode_amounts(ctx, -1.0);
    for (key, total) in variables.mode_total.iter() {
        let mut terms = totals.take(key);
        terms.push((total, 1.0));
        problem.add_row(ConstraintFamily::ModeTotal, key.label(), 0.0..=0.0, terms);
    }

    for (key, total) in variables.mode_total.iter() {
        let (mode, year, scenario) = key;
        let Some(previous_year) = ctx.sets.previous_year(*year) else {
            continue;
        };
        let Some(previous) = variables
            .mode_total
            .get(&(mode.clone(), previous_year, scenario.clone()))
        else {
            continue;
        };
        let elapsed = year - previous_year;
        let exponent = elapsed as i32;

        problem.add_row(
            ConstraintFamily::ModalShiftDecrease,
            key.label(),
            0.0..,
            [(total, 1.0), (previous, -rho.powi(exponent))],
        );
        problem.add_row(
            ConstraintFamily::ModalShiftIncrease,
            key.label(),
            ..=0.0,
            [(total, 1.0), (previous, -(2.0 - rho).powi(exponent))],
        );

        let Some(lifetime) = model.modes.get(mode).map(|mode| mode.lifetime) else {
            continue;
        };
        let renewal = f64::from(elapsed) / f64::from(lifetime);
        let mut terms: Vec<_> = variables
            .transport_decrease
            .iter()
            .filter(|((m, _, y, s), _)| m == mode && y == year && s == scenario)
            .map(|(_, var)| (var, 1.0))
            .collect();
        terms.push((previous, -renewal));
        problem.add_row(ConstraintFamily::FleetRenewal, key.label(), ..=0.0, terms);
    }

    // The decrease is at least the drop in transport amount since the previous decision year
    for (key, decrease) in variables.transport_decrease.iter() {
        let (mode, fuel, year, scenario) = key;
        let Some(previous_year) = ctx.sets.previous_year(*year) else {
            continue;
        };
        let (Some(amount), Some(previous)) = (
            variables.transport_amount.get(key),
            variables.transport_amount.get(&(
                mode.clone(),
                fuel.clone(),
                previous_year,
                scenario.clone(),
            )),
        ) else {
            continue;
        };
        problem.add_row(
            ConstraintFamily::TransportDecrease,
            key.label(),
            0.0..,
            [(decrease, 1.0), (previous, -1.0), (amount, 1.0)],
        );
    }
}

/// Add Bass diffusion limits on the growth of diffusing technologies.
///
/// In the first year, a technology may carry at most `(t0_model - t0)⁺ · p` of its mode's
/// transport. From then on, its yearly growth is at most `p` times its mode's total transport in
/// the most recent decision year plus `q` times its own transport in the previous year, once
/// diffusion has started. First-stage years use the base curve and second-stage years the
/// scenario's curve.
pub fn add_bass_diffusion_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    let model = ctx.model;
    let variables = ctx.variables;
    let time_periods = &model.time_periods;
    let first_year = ctx.sets.years().first().copied();

    // The diffusion curves of each technology in each scenario
    let mut curves: HashMap<(ModeID, FuelID, ScenarioID), (BassModel, BassModel)> = HashMap::new();
    for (mode, fuel_id, _, scenario_id) in ctx.sets.aux_transport_amounts() {
        let key = (mode.clone(), fuel_id.clone(), scenario_id.clone());
        if curves.contains_key(&key) {
            continue;
        }
        let (Some(fuel), Some(scenario)) = (
            find_fuel(model, mode, fuel_id),
            find_scenario(ctx, scenario_id),
        ) else {
            continue;
        };
        let Some(base) = model.technology.base_bass_model(mode, fuel_id) else {
            continue;
        };
        let active = model
            .technology
            .active_bass_model(mode, fuel, scenario)
            .unwrap_or(base);
        curves.insert(key, (base, active));
    }

    for ((mode, fuel, year, scenario), amount) in variables.transport_amount.iter() {
        if Some(*year) != first_year {
            continue;
        }
        let Some((base, _)) = curves.get(&(mode.clone(), fuel.clone(), scenario.clone())) else {
            continue;
        };
        let Some(total) = variables
            .mode_total
            .get(&(mode.clone(), *year, scenario.clone()))
        else {
            continue;
        };

        let elapsed = (f64::from(*year) - base.t0).max(0.0);
        problem.add_row(
            ConstraintFamily::BassFirstPeriod,
            format!("{mode},{fuel},{year},{scenario}"),
            ..=0.0,
            [(amount, 1.0), (total, -elapsed * base.p)],
        );
    }

    for (key, aux) in variables.aux_transport_amount.iter() {
        let (mode, fuel, year, scenario) = key;
        let Some(previous) = variables
            .aux_transport_amount
            .get(&(mode.clone(), fuel.clone(), year - 1, scenario.clone()))
        else {
            continue;
        };
        let Some((base, active)) = curves.get(&(mode.clone(), fuel.clone(), scenario.clone()))
        else {
            continue;
        };

        let mut terms: Vec<(Variable, f64)> = vec![(aux, 1.0), (previous, -1.0)];
        if base.has_started(f64::from(*year)) {
            let curve = if time_periods.is_first_stage(*year) {
                base
            } else {
                active
            };
            let decision_year = time_periods.most_recent_decision_year(year - 1);
            let Some(total) = variables
                .mode_total
                .get(&(mode.clone(), decision_year, scenario.clone()))
            else {
                continue;
            };
            terms.push((total, -curve.p));
            terms.push((previous, -curve.q));
        }

        problem.add_row(ConstraintFamily::BassGrowth, key.label(), ..=0.0, terms);
    }
}
