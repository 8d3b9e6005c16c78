//! Weights of the per-scenario cost variables in the objective.
use crate::model::{ModelParameters, ObjectiveKind};

/// Objective coefficients of the stage cost and risk variables.
///
/// With `N` scenarios, the mean-CVaR objective is
///
/// `(1/N) Σ_s [FirstStage_s + λ·CvarAux + (1-λ)·SecondStage_s + λ/(1-α)·CvarPos_s]`
///
/// and the risk-neutral objective is the plain average of first- and second-stage costs.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ObjectiveWeights {
    /// Weight of each scenario's first-stage cost
    pub first_stage: f64,
    /// Weight of each scenario's second-stage cost
    pub second_stage: f64,
    /// Weight of the value-at-risk variable, if the objective is risk-averse
    pub cvar_aux: Option<f64>,
    /// Weight of each scenario's excess over the value at risk
    pub cvar_positive: f64,
}

impl ObjectiveWeights {
    /// Calculate the weights for a model with `num_scenarios` active scenarios
    pub fn new(parameters: &ModelParameters, num_scenarios: usize) -> Self {
        let n = num_scenarios as f64;
        match parameters.objective {
            ObjectiveKind::RiskNeutral => Self {
                first_stage: 1.0 / n,
                second_stage: 1.0 / n,
                cvar_aux: None,
                cvar_positive: 0.0,
            },
            ObjectiveKind::MeanCvar => {
                let lambda = parameters.cvar_coeff.value();
                let alpha = parameters.cvar_alpha.value();
                Self {
                    first_stage: 1.0 / n,
                    second_stage: (1.0 - lambda) / n,
                    cvar_aux: Some(lambda),
                    cvar_positive: lambda / ((1.0 - alpha) * n),
                }
            }
        }
    }

    /// Whether the objective includes CVaR variables
    pub fn is_risk_averse(&self) -> bool {
        self.cvar_aux.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::parameters;
    use crate::units::Dimensionless;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_mean_cvar_weights(mut parameters: ModelParameters) {
        parameters.objective = ObjectiveKind::MeanCvar;
        parameters.cvar_coeff = Dimensionless(0.3);
        parameters.cvar_alpha = Dimensionless(0.8);

        let weights = ObjectiveWeights::new(&parameters, 3);
        assert_approx_eq!(f64, weights.first_stage, 1.0 / 3.0);
        assert_approx_eq!(f64, weights.second_stage, 0.7 / 3.0);
        assert_approx_eq!(f64, weights.cvar_aux.unwrap(), 0.3);
        assert_approx_eq!(f64, weights.cvar_positive, 0.3 / (0.2 * 3.0));
        assert!(weights.is_risk_averse());
    }

    #[rstest]
    fn test_zero_risk_aversion_is_expectation(mut parameters: ModelParameters) {
        parameters.objective = ObjectiveKind::MeanCvar;
        parameters.cvar_coeff = Dimensionless(0.0);

        let weights = ObjectiveWeights::new(&parameters, 2);
        assert_approx_eq!(f64, weights.first_stage, 0.5);
        assert_approx_eq!(f64, weights.second_stage, 0.5);
        assert_approx_eq!(f64, weights.cvar_aux.unwrap(), 0.0);
        assert_approx_eq!(f64, weights.cvar_positive, 0.0);
    }

    #[rstest]
    fn test_risk_neutral_weights(mut parameters: ModelParameters) {
        parameters.objective = ObjectiveKind::RiskNeutral;

        let weights = ObjectiveWeights::new(&parameters, 4);
        assert_approx_eq!(f64, weights.first_stage, 0.25);
        assert_approx_eq!(f64, weights.second_stage, 0.25);
        assert!(!weights.is_risk_averse());
    }
}
