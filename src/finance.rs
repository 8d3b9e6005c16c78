//! General functions related to finance.
use crate::model::round_precision;
use crate::units::{Dimensionless, Money};

/// Calculates the capital recovery factor (CRF) for a given lifetime and discount rate.
///
/// The CRF is used to annualise capital costs over the lifetime of a vehicle.
pub fn capital_recovery_factor(lifetime: u32, discount_rate: Dimensionless) -> Dimensionless {
    if lifetime == 0 {
        return Dimensionless(0.0);
    }
    if discount_rate == Dimensionless(0.0) {
        return Dimensionless(1.0) / Dimensionless(lifetime as f64);
    }
    let factor = (Dimensionless(1.0) + discount_rate).powi(lifetime as i32);
    (discount_rate * factor) / (factor - Dimensionless(1.0))
}

/// Calculates the annuity of a capital cost paid off over `lifetime` years at `discount_rate`
pub fn annual_capital_cost(capital_cost: Money, lifetime: u32, discount_rate: Dimensionless) -> Money {
    let crf = capital_recovery_factor(lifetime, discount_rate);
    capital_cost * crf
}

/// The one-year discount factor `1 / (1 + rate)`, rounded
pub fn discount_factor(rate: Dimensionless) -> f64 {
    round_precision(1.0 / (1.0 + rate.value()))
}

/// The discount factor applied to operating costs of a decision period.
///
/// A decision period stands in for a block of years; each year `n` of the block (counted from the
/// first decision year) is discounted by `factor^n`.
pub fn operating_discount(factor: f64, years: &[u32]) -> f64 {
    round_precision(years.iter().map(|&n| factor.powi(n as i32)).sum())
}

/// The discount factor applied to one-off investment costs of a decision period.
///
/// Investments are paid in the first year of the block.
pub fn investment_discount(factor: f64, years: &[u32]) -> f64 {
    let first = years.first().copied().unwrap_or(0);
    round_precision(factor.powi(first as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0.05, 0.0)] // Edge case: lifetime==0
    #[case(10, 0.0, 0.1)] // Other edge case: discount_rate==0
    #[case(10, 0.05, 0.1295045749654567)]
    #[case(5, 0.08, 0.2504564545668364)]
    fn test_capital_recovery_factor(
        #[case] lifetime: u32,
        #[case] discount_rate: f64,
        #[case] expected: f64,
    ) {
        let result = capital_recovery_factor(lifetime, Dimensionless(discount_rate));
        assert_approx_eq!(f64, result.0, expected, epsilon = 1e-10);
    }

    #[test]
    fn test_annual_capital_cost_matches_annuity_formula() {
        let (capex, lifetime, wacc) = (100_000.0, 8u32, 0.06f64);
        let factor = (1.0 + wacc).powi(8);
        let expected = factor * wacc * capex / (factor - 1.0);
        let result = annual_capital_cost(Money(capex), lifetime, Dimensionless(wacc));
        assert_approx_eq!(f64, result.value(), expected, epsilon = 1e-8);
    }

    #[test]
    fn test_discounting() {
        let factor = discount_factor(Dimensionless(0.038));
        assert_approx_eq!(f64, factor, 0.96339);

        // A five-year block starting three years after the first decision year
        let years = [3, 4, 5, 6, 7];
        let expected = round_precision(years.iter().map(|&n| factor.powi(n)).sum());
        assert_approx_eq!(f64, operating_discount(factor, &years), expected);
        assert_approx_eq!(
            f64,
            investment_discount(factor, &years),
            round_precision(factor.powi(3))
        );
    }
}
