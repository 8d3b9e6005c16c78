//! Decision years and their assignment to the two stages of the stochastic program.
//!
//! Decision years are not annual: each one stands in for a block of years lasting until the next
//! decision year. The last block is as long as the one before it.
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// The stage of the stochastic program a decision year belongs to
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash, Serialize)]
pub enum Stage {
    /// Decisions made before uncertainty is revealed
    First,
    /// Decisions made once the scenario is known
    Second,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::First => write!(f, "1"),
            Stage::Second => write!(f, "2"),
        }
    }
}

/// The ordered decision years of the model
#[derive(PartialEq, Debug, Clone)]
pub struct TimePeriods(IndexMap<u32, Stage>);

impl TimePeriods {
    /// Create from years in order with their stages.
    ///
    /// Years must be unique and increasing, and first-stage years must form a non-empty prefix.
    pub fn new(periods: Vec<(u32, Stage)>) -> Result<Self> {
        ensure!(!periods.is_empty(), "At least one time period must be given");
        ensure!(
            periods.windows(2).all(|w| w[0].0 < w[1].0),
            "Time periods must be unique and in increasing order"
        );
        ensure!(
            periods[0].1 == Stage::First,
            "The first time period must belong to the first stage"
        );
        ensure!(
            periods
                .windows(2)
                .all(|w| !(w[0].1 == Stage::Second && w[1].1 == Stage::First)),
            "First-stage time periods must come before all second-stage time periods"
        );

        Ok(Self(periods.into_iter().collect()))
    }

    /// Iterate over all decision years
    pub fn iter_years(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }

    /// The number of decision years
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no decision years (never true for a validated instance)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `year` is a decision year
    pub fn contains(&self, year: u32) -> bool {
        self.0.contains_key(&year)
    }

    /// The stage of a decision year
    pub fn stage(&self, year: u32) -> Option<Stage> {
        self.0.get(&year).copied()
    }

    /// The first decision year
    pub fn first_year(&self) -> u32 {
        self.0.keys().next().copied().unwrap_or_default()
    }

    /// The last decision year
    pub fn last_year(&self) -> u32 {
        self.0.keys().last().copied().unwrap_or_default()
    }

    /// The first second-stage decision year, if there is a second stage
    pub fn first_second_stage_year(&self) -> Option<u32> {
        self.0
            .iter()
            .find(|(_, stage)| **stage == Stage::Second)
            .map(|(year, _)| *year)
    }

    /// Whether `year` (which need not be a decision year) lies in the first stage
    pub fn is_first_stage(&self, year: u32) -> bool {
        self.first_second_stage_year()
            .is_none_or(|second| year < second)
    }

    /// Iterate over first-stage decision years
    pub fn iter_first_stage(&self) -> impl Iterator<Item = u32> + '_ {
        self.iter_stage(Stage::First)
    }

    /// Iterate over second-stage decision years
    pub fn iter_second_stage(&self) -> impl Iterator<Item = u32> + '_ {
        self.iter_stage(Stage::Second)
    }

    fn iter_stage(&self, stage: Stage) -> impl Iterator<Item = u32> + '_ {
        self.0
            .iter()
            .filter(move |(_, s)| **s == stage)
            .map(|(year, _)| *year)
    }

    /// The decision year preceding `year`, if any
    pub fn previous(&self, year: u32) -> Option<u32> {
        let idx = self.0.get_index_of(&year)?;
        idx.checked_sub(1)
            .and_then(|i| self.0.get_index(i))
            .map(|(y, _)| *y)
    }

    /// The years covered by each decision year's block, as offsets from the first decision year.
    ///
    /// The last decision year's block has the same length as the block before it (or one year if
    /// there is only one decision year).
    pub fn covered_years(&self, year: u32) -> Vec<u32> {
        let first = self.first_year();
        let Some(idx) = self.0.get_index_of(&year) else {
            return Vec::new();
        };

        if let Some((next, _)) = self.0.get_index(idx + 1) {
            return (year - first..*next - first).collect();
        }

        let duration = match self.previous(year) {
            Some(previous) => year - previous,
            None => 1,
        };
        (year - first..year - first + duration).collect()
    }

    /// The most recent decision year at or before `year`.
    ///
    /// Years before the first decision year map to the first decision year.
    pub fn most_recent_decision_year(&self, year: u32) -> u32 {
        self.iter_years()
            .take_while(|&t| t <= year)
            .last()
            .unwrap_or_else(|| self.first_year())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, time_periods};
    use rstest::rstest;

    #[rstest]
    fn test_stages(time_periods: TimePeriods) {
        assert_eq!(time_periods.first_year(), 2022);
        assert_eq!(time_periods.last_year(), 2050);
        assert_eq!(time_periods.first_second_stage_year(), Some(2034));
        assert_eq!(
            time_periods.iter_first_stage().collect::<Vec<_>>(),
            [2022, 2026, 2030]
        );
        assert_eq!(
            time_periods.iter_second_stage().collect::<Vec<_>>(),
            [2034, 2040, 2050]
        );
        assert!(time_periods.is_first_stage(2033));
        assert!(!time_periods.is_first_stage(2034));
        assert_eq!(time_periods.previous(2026), Some(2022));
        assert_eq!(time_periods.previous(2022), None);
    }

    #[rstest]
    #[case(2022, vec![0, 1, 2, 3])]
    #[case(2040, (18..28).collect())]
    #[case(2050, (28..38).collect())] // Last block lasts as long as the one before
    fn test_covered_years(
        time_periods: TimePeriods,
        #[case] year: u32,
        #[case] expected: Vec<u32>,
    ) {
        assert_eq!(time_periods.covered_years(year), expected);
    }

    #[rstest]
    #[case(2022, 2022)]
    #[case(2025, 2022)]
    #[case(2026, 2026)]
    #[case(2049, 2040)]
    fn test_most_recent_decision_year(
        time_periods: TimePeriods,
        #[case] year: u32,
        #[case] expected: u32,
    ) {
        assert_eq!(time_periods.most_recent_decision_year(year), expected);
    }

    #[test]
    fn test_new_invalid() {
        assert_error!(
            TimePeriods::new(vec![(2022, Stage::First), (2022, Stage::Second)]),
            "Time periods must be unique and in increasing order"
        );
        assert_error!(
            TimePeriods::new(vec![(2022, Stage::Second)]),
            "The first time period must belong to the first stage"
        );
        assert_error!(
            TimePeriods::new(vec![
                (2022, Stage::First),
                (2026, Stage::Second),
                (2030, Stage::First)
            ]),
            "First-stage time periods must come before all second-stage time periods"
        );
    }

    #[test]
    fn test_single_period() {
        let periods = TimePeriods::new(vec![(2022, Stage::First)]).unwrap();
        assert_eq!(periods.covered_years(2022), [0]);
        assert_eq!(periods.first_second_stage_year(), None);
        assert!(periods.is_first_stage(2060));
    }
}
