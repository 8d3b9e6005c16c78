//! The Bass diffusion model of technology adoption.
//!
//! The cumulative adoption curve is
//!
//! ```text
//! A(t) = m * (1 - exp(-(p+q)(t-t0))) / (1 + (q/p) exp(-(p+q)(t-t0)))   for t >= t0
//! A(t) = 0                                                              for t < t0
//! ```
//!
//! where `p` is the coefficient of innovation, `q` the coefficient of imitation and `m` the market
//! potential.
use anyhow::{Result, ensure};

/// Parameters of a Bass diffusion curve
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct BassModel {
    /// Coefficient of innovation
    pub p: f64,
    /// Coefficient of imitation
    pub q: f64,
    /// Market potential (percent)
    pub m: f64,
    /// Year in which diffusion starts
    pub t0: f64,
}

impl BassModel {
    /// Create a new model, checking that the parameters are usable
    pub fn new(p: f64, q: f64, m: f64, t0: f64) -> Result<Self> {
        ensure!(
            p.is_finite() && p > 0.0,
            "Bass parameter p must be a finite number greater than zero"
        );
        ensure!(
            q.is_finite() && q >= 0.0,
            "Bass parameter q must be a finite number greater than or equal to zero"
        );
        ensure!(
            m.is_finite() && (0.0..=100.0).contains(&m),
            "Bass parameter m must be between 0 and 100"
        );
        ensure!(t0.is_finite(), "Bass parameter t0 must be finite");

        Ok(Self { p, q, m, t0 })
    }

    /// A copy of this model with `p` and `q` scaled by `1 + variation` and the start shifted
    pub fn varied(&self, variation: f64, t0_shift: f64) -> Self {
        Self {
            p: self.p * (1.0 + variation),
            q: self.q * (1.0 + variation),
            m: self.m,
            t0: self.t0 + t0_shift,
        }
    }

    /// Cumulative adoption at time `t`
    pub fn adoption(&self, t: f64) -> f64 {
        if t < self.t0 {
            return 0.0;
        }

        let decay = (-(self.p + self.q) * (t - self.t0)).exp();
        self.m * (1.0 - decay) / (1.0 + self.q / self.p * decay)
    }

    /// Cumulative adoption at time `t`, for a curve passing through `initial` at `t_init`.
    ///
    /// The curve is shifted in time so that it reaches `initial` at `t_init` and then continues
    /// with this model's dynamics.
    pub fn adoption_from(&self, t: f64, initial: f64, t_init: f64) -> f64 {
        if self.m <= 0.0 {
            return 0.0;
        }

        let fraction = initial / self.m;
        if fraction >= 1.0 {
            return self.m;
        }

        let elapsed = -((1.0 - fraction) / (1.0 + self.q * fraction / self.p)).ln() / (self.p + self.q);
        self.adoption(self.t0 + elapsed + (t - t_init))
    }

    /// Whether diffusion has started by year `t`
    pub fn has_started(&self, t: f64) -> bool {
        t >= self.t0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn model() -> BassModel {
        BassModel::new(0.03, 0.38, 100.0, 2025.0).unwrap()
    }

    #[rstest]
    fn test_adoption_is_zero_before_start(model: BassModel) {
        assert_approx_eq!(f64, model.adoption(2024.0), 0.0);
        assert_approx_eq!(f64, model.adoption(2025.0), 0.0);
        assert!(!model.has_started(2024.0));
        assert!(model.has_started(2025.0));
    }

    #[rstest]
    fn test_adoption_non_decreasing(model: BassModel) {
        let values: Vec<_> = (2025..2080).map(|t| model.adoption(f64::from(t))).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(values.iter().all(|v| (0.0..=100.0).contains(v)));

        // Approaches the market potential
        assert!(model.adoption(2100.0) > 99.9);
    }

    #[rstest]
    fn test_adoption_from_own_curve(model: BassModel) {
        // Restarting from a point on the curve reproduces the curve
        let initial = model.adoption(2030.0);
        for t in [2030.0, 2034.0, 2040.0] {
            assert_approx_eq!(
                f64,
                model.adoption_from(t, initial, 2030.0),
                model.adoption(t),
                epsilon = 1e-9
            );
        }
    }

    #[rstest]
    fn test_varied(model: BassModel) {
        let fast = model.varied(0.5, -2.0);
        assert_approx_eq!(f64, fast.p, 0.045);
        assert_approx_eq!(f64, fast.q, 0.57);
        assert_approx_eq!(f64, fast.t0, 2023.0);

        // A faster curve started at the same point overtakes the base curve
        let initial = model.adoption(2034.0);
        assert!(fast.adoption_from(2040.0, initial, 2034.0) > model.adoption(2040.0));
        assert_approx_eq!(f64, fast.adoption_from(2034.0, initial, 2034.0), initial, epsilon = 1e-9);
    }

    #[rstest]
    #[case(0.0, 0.38, 100.0)]
    #[case(0.03, -0.1, 100.0)]
    #[case(0.03, 0.38, 120.0)]
    fn test_new_invalid(#[case] p: f64, #[case] q: f64, #[case] m: f64) {
        assert!(BassModel::new(p, q, m, 2025.0).is_err());
    }
}
