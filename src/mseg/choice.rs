//! Consumer choice: logistic market share between the measure and its
//! baseline alternative, and Bass diffusion of cumulative adoption.

use crate::params::AdoptionScheme;

/// Utility of an option: `b1 * installed_cost + b2 * annual_operating_cost`.
///
/// Coefficients are normally negative, so cheaper options score higher.
pub fn utility(b1: f64, b2: f64, installed_cost: f64, operating_cost: f64) -> f64 {
    b1 * installed_cost + b2 * operating_cost
}

/// Share of a binary logistic choice won by the measure.
pub fn logistic_share(u_baseline: f64, u_measure: f64) -> f64 {
    1.0 / (1.0 + (u_baseline - u_measure).exp())
}

/// Cumulative fraction adopted `t` periods after introduction under the Bass
/// model with innovation `p` and imitation `q`.
pub fn bass_fraction(p: f64, q: f64, t: f64) -> f64 {
    if p <= 0.0 || t <= 0.0 {
        return 0.0;
    }
    let decay = (-(p + q) * t).exp();
    ((1.0 - decay) / (1.0 + (q / p) * decay)).clamp(0.0, 1.0)
}

/// Inputs to one year's capture decision for one sample lane.
#[derive(Debug, Clone, Copy)]
pub struct ChoiceInputs {
    pub b1: f64,
    pub b2: f64,
    pub p: f64,
    pub q: f64,
    pub cost_baseline: f64,
    pub cost_measure: f64,
    pub op_cost_baseline: f64,
    pub op_cost_measure: f64,
    /// Years since market entry, counting the entry year as 1.
    pub periods: f64,
}

/// Fraction of the competed market captured by the measure.
pub fn capture_fraction(scheme: AdoptionScheme, c: &ChoiceInputs) -> f64 {
    let u_b = utility(c.b1, c.b2, c.cost_baseline, c.op_cost_baseline);
    let u_m = utility(c.b1, c.b2, c.cost_measure, c.op_cost_measure);
    let share = if u_m >= u_b {
        1.0
    } else {
        logistic_share(u_b, u_m)
    };
    match scheme {
        AdoptionScheme::TechnicalPotential => share,
        AdoptionScheme::MaxAdoptionPotential => share * bass_fraction(c.p, c.q, c.periods),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> ChoiceInputs {
        ChoiceInputs {
            b1: -0.01,
            b2: -0.1,
            p: 0.03,
            q: 0.38,
            cost_baseline: 800.0,
            cost_measure: 1000.0,
            op_cost_baseline: 200.0,
            op_cost_measure: 150.0,
            periods: 1.0,
        }
    }

    #[test]
    fn equal_utilities_split_evenly() {
        assert!((logistic_share(-3.0, -3.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn bass_starts_near_p_and_saturates() {
        let f1 = bass_fraction(0.03, 0.38, 1.0);
        assert!(f1 > 0.02 && f1 < 0.05, "f1 = {f1}");
        assert!(bass_fraction(0.03, 0.38, 60.0) > 0.999);
        assert_eq!(bass_fraction(0.0, 0.38, 5.0), 0.0);
        assert_eq!(bass_fraction(0.03, 0.38, 0.0), 0.0);
    }

    #[test]
    fn cost_effective_measure_wins_technical_potential() {
        // u_b = -8 - 20 = -28, u_m = -10 - 15 = -25
        let c = inputs();
        assert_eq!(capture_fraction(AdoptionScheme::TechnicalPotential, &c), 1.0);
        let map = capture_fraction(AdoptionScheme::MaxAdoptionPotential, &c);
        assert!((map - bass_fraction(0.03, 0.38, 1.0)).abs() < 1e-12);
    }

    #[test]
    fn costly_measure_gets_logistic_share() {
        let c = ChoiceInputs {
            cost_measure: 2000.0,
            ..inputs()
        };
        // u_m = -20 - 15 = -35 vs u_b = -28
        let share = capture_fraction(AdoptionScheme::TechnicalPotential, &c);
        assert!((share - 1.0 / (1.0 + 7.0_f64.exp())).abs() < 1e-12);
    }
}
