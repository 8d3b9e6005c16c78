//! Code for reading decision years from a CSV file.
use super::*;
use crate::time_period::{Stage, TimePeriods};
use anyhow::bail;
use serde::Deserialize;

const TIME_PERIODS_FILE_NAME: &str = "time_periods.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct TimePeriodRaw {
    year: u32,
    stage: u8,
}

/// Read the decision years and their stages.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// The ordered decision years or an error
pub fn read_time_periods(model_dir: &Path) -> Result<TimePeriods> {
    let file_path = model_dir.join(TIME_PERIODS_FILE_NAME);
    let periods = read_csv(&file_path)?;
    read_time_periods_from_iter(periods).with_context(|| input_err_msg(&file_path))
}

fn read_time_periods_from_iter<I>(iter: I) -> Result<TimePeriods>
where
    I: Iterator<Item = TimePeriodRaw>,
{
    let periods = iter
        .map(|raw| {
            let stage = match raw.stage {
                1 => Stage::First,
                2 => Stage::Second,
                other => bail!("Invalid stage {other} for year {} (must be 1 or 2)", raw.year),
            };
            Ok((raw.year, stage))
        })
        .collect::<Result<Vec<_>>>()?;

    TimePeriods::new(periods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;

    fn raw(year: u32, stage: u8) -> TimePeriodRaw {
        TimePeriodRaw { year, stage }
    }

    #[test]
    fn test_read_time_periods_from_iter() {
        let periods =
            read_time_periods_from_iter([raw(2022, 1), raw(2030, 1), raw(2040, 2)].into_iter())
                .unwrap();
        assert_eq!(periods.iter_years().collect_vec(), [2022, 2030, 2040]);
        assert_eq!(periods.first_second_stage_year(), Some(2040));
    }

    #[test]
    fn test_read_time_periods_bad_stage() {
        assert_error!(
            read_time_periods_from_iter([raw(2022, 3)].into_iter()),
            "Invalid stage 3 for year 2022 (must be 1 or 2)"
        );
    }

    #[test]
    fn test_read_time_periods_unordered() {
        assert_error!(
            read_time_periods_from_iter([raw(2030, 1), raw(2022, 1)].into_iter()),
            "Time periods must be unique and in increasing order"
        );
    }
}
