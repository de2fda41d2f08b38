use serde::{Serialize, Deserialize};
use std::fmt::{self, Display};
use std::f64::consts::PI;
use rand::Rng;
use crate::error::GraphError;

/// Declared prior distribution of an unknown model quantity. The prior is
/// the only state a variable carries besides its identity: it defines the
/// prior factor of the variable in the joint density, and it is the starting
/// point for the variable message before inference. Array-valued variables
/// apply the same prior independently to every element.
///
/// Priors are read from JSON model definitions with the "type" tag:
///
/// ```json
/// { "type" : "Gaussian", "mean" : 0.0, "sigma" : 1.0 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Prior {

    Gaussian { mean : f64, sigma : f64 },

    Uniform { lower : f64, upper : f64 },

    /// Uniform over the logarithm of the quantity (density proportional to 1/x
    /// over [lower, upper]).
    LogUniform { lower : f64, upper : f64 }

}

impl Prior {

    pub fn gaussian(mean : f64, sigma : f64) -> Self {
        Prior::Gaussian { mean, sigma }
    }

    pub fn uniform(lower : f64, upper : f64) -> Self {
        Prior::Uniform { lower, upper }
    }

    pub fn log_uniform(lower : f64, upper : f64) -> Self {
        Prior::LogUniform { lower, upper }
    }

    /// Verifies the parameters define a proper distribution.
    pub fn validate(&self) -> Result<(), GraphError> {
        match *self {
            Prior::Gaussian { mean, sigma } => {
                if !mean.is_finite() || !(sigma > 0.0 && sigma.is_finite()) {
                    return Err(GraphError::InvalidPrior(format!("Gaussian requires finite mean and positive sigma ({})", self)));
                }
            },
            Prior::Uniform { lower, upper } => {
                if !(lower.is_finite() && upper.is_finite() && lower < upper) {
                    return Err(GraphError::InvalidPrior(format!("Uniform requires finite lower < upper ({})", self)));
                }
            },
            Prior::LogUniform { lower, upper } => {
                if !(lower > 0.0 && upper.is_finite() && lower < upper) {
                    return Err(GraphError::InvalidPrior(format!("LogUniform requires 0 < lower < upper ({})", self)));
                }
            }
        }
        Ok(())
    }

    /// Normalized log-density at x; Returns negative infinity outside the support.
    pub fn log_prob(&self, x : f64) -> f64 {
        match *self {
            Prior::Gaussian { mean, sigma } => {
                let z = (x - mean) / sigma;
                -0.5 * (2. * PI).ln() - sigma.ln() - 0.5 * z.powi(2)
            },
            Prior::Uniform { lower, upper } => {
                if x >= lower && x <= upper {
                    -(upper - lower).ln()
                } else {
                    f64::NEG_INFINITY
                }
            },
            Prior::LogUniform { lower, upper } => {
                if x >= lower && x <= upper {
                    -x.ln() - (upper / lower).ln().ln()
                } else {
                    f64::NEG_INFINITY
                }
            }
        }
    }

    pub fn mean(&self) -> f64 {
        match *self {
            Prior::Gaussian { mean, .. } => mean,
            Prior::Uniform { lower, upper } => 0.5 * (lower + upper),
            Prior::LogUniform { lower, upper } => (upper - lower) / (upper / lower).ln()
        }
    }

    pub fn variance(&self) -> f64 {
        match *self {
            Prior::Gaussian { sigma, .. } => sigma.powi(2),
            Prior::Uniform { lower, upper } => (upper - lower).powi(2) / 12.,
            Prior::LogUniform { lower, upper } => {
                let log_ratio = (upper / lower).ln();
                (upper.powi(2) - lower.powi(2)) / (2. * log_ratio) - self.mean().powi(2)
            }
        }
    }

}

impl rand_distr::Distribution<f64> for Prior {

    fn sample<R>(&self, rng : &mut R) -> f64
    where
        R : Rng + ?Sized
    {
        match *self {
            Prior::Gaussian { mean, sigma } => {
                let z : f64 = rng.sample(rand_distr::StandardNormal);
                mean + sigma * z
            },
            Prior::Uniform { lower, upper } => rng.gen_range(lower..upper),
            Prior::LogUniform { lower, upper } => rng.gen_range(lower.ln()..upper.ln()).exp()
        }
    }

}

impl Display for Prior {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prior::Gaussian { mean, sigma } => write!(f, "Gaussian(mean={}, sigma={})", mean, sigma),
            Prior::Uniform { lower, upper } => write!(f, "Uniform(lower={}, upper={})", lower, upper),
            Prior::LogUniform { lower, upper } => write!(f, "LogUniform(lower={}, upper={})", lower, upper)
        }
    }

}

#[test]
fn gaussian_log_prob() {
    use approx::assert_abs_diff_eq;
    let p = Prior::gaussian(1.0, 2.0);
    let expected = -0.5 * (2. * PI).ln() - 2f64.ln() - 0.5 * 0.25;
    assert_abs_diff_eq!(p.log_prob(2.0), expected, epsilon = 1E-12);
    assert_abs_diff_eq!(p.variance(), 4.0);
}

#[test]
fn bounded_support() {
    let u = Prior::uniform(0.0, 4.0);
    assert!((u.log_prob(1.0) + 4f64.ln()).abs() < 1E-12);
    assert_eq!(u.log_prob(5.0), f64::NEG_INFINITY);
    assert!((u.mean() - 2.0).abs() < 1E-12);
    assert!((u.variance() - 16. / 12.).abs() < 1E-12);

    let lu = Prior::log_uniform(1.0, 10.0);
    assert_eq!(lu.log_prob(0.5), f64::NEG_INFINITY);
    assert!(lu.variance() > 0.0);
    assert!(lu.mean() > 1.0 && lu.mean() < 10.0);
}

#[test]
fn invalid_priors() {
    assert!(Prior::gaussian(0.0, 0.0).validate().is_err());
    assert!(Prior::uniform(1.0, 1.0).validate().is_err());
    assert!(Prior::log_uniform(0.0, 1.0).validate().is_err());
    assert!(Prior::gaussian(0.0, 1.0).validate().is_ok());
}

#[test]
fn prior_from_json() {
    let p : Prior = serde_json::from_str(r#"{ "type" : "Uniform", "lower" : -1.0, "upper" : 1.0 }"#).unwrap();
    assert_eq!(p, Prior::uniform(-1.0, 1.0));
}

#[test]
fn samples_stay_in_support() {
    use rand::{SeedableRng, rngs::StdRng};
    use rand_distr::Distribution;
    let mut rng = StdRng::seed_from_u64(7);
    let lu = Prior::log_uniform(1E-2, 1E2);
    let samples : Vec<f64> = (0..1000).map(|_| lu.sample(&mut rng) ).collect();
    assert!(samples.iter().all(|x| lu.log_prob(*x).is_finite() ));
    let below = samples.iter().filter(|x| **x < 1.0 ).count();
    assert!(below > 400 && below < 600);
}
