use serde::{Serialize, Deserialize};
use std::io::Read;
use crate::error::GraphError;

/// Rule used to take expectations of a factor over the messages of the variables
/// that are not being updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quadrature {

    /// Evaluates the factor with the other variables fixed at their message means
    /// (a single evaluation per stencil point; exact only for factors linear in them).
    PointEstimate,

    /// 2m points at mean +- sqrt(m) standard deviations along each of the m other
    /// elements, with equal weights. Exact for log-factors quadratic in the other elements.
    SigmaPoints,

    /// Three-point Gauss-Hermite rule over every other element (3^m evaluations, exact
    /// for polynomials of degree five in each element). Limited to MAX_QUADRATURE_POINTS.
    GaussHermite

}

/// Tuning parameters of the mean-field sweep loop. Settings can be built by chaining
/// the setters over the default value, or read from a JSON document where absent
/// fields keep their defaults. Setters do not check their values: settings are
/// validated when read from JSON and before every sweep.
///
/// ```
/// use graphfit::{MeanFieldSettings, Quadrature};
/// let settings = MeanFieldSettings::new()
///     .max_sweeps(500)
///     .tolerance(1E-12)
///     .quadrature(Quadrature::GaussHermite);
/// let read = MeanFieldSettings::load(&br#"{ "max_sweeps" : 500, "damping" : 0.5 }"#[..]).unwrap();
/// assert_eq!(read.max_sweeps, settings.max_sweeps);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanFieldSettings {

    /// Maximum number of sweeps before reporting non-convergence.
    pub max_sweeps : usize,

    /// Threshold for the change between two consecutive sweeps: the Euclidean norm of
    /// the differences of message means and variances, taken over every element of
    /// every variable.
    pub tolerance : f64,

    /// Weight of the previous message natural parameters at each update (zero
    /// replaces the message by its update).
    pub damping : f64,

    pub quadrature : Quadrature,

    /// Finite-difference step, in units of the current message standard deviation.
    pub step : f64,

    /// Evaluates the factors of a sweep in parallel.
    pub parallel : bool,

    /// Shows a progress bar over sweeps.
    pub progress : bool

}

impl Default for MeanFieldSettings {

    fn default() -> Self {
        Self {
            max_sweeps : 100,
            tolerance : 1E-8,
            damping : 0.0,
            quadrature : Quadrature::SigmaPoints,
            step : 1E-2,
            parallel : false,
            progress : false
        }
    }

}

impl MeanFieldSettings {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_sweeps(mut self, max_sweeps : usize) -> Self {
        self.max_sweeps = max_sweeps;
        self
    }

    pub fn tolerance(mut self, tolerance : f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn damping(mut self, damping : f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn quadrature(mut self, quadrature : Quadrature) -> Self {
        self.quadrature = quadrature;
        self
    }

    pub fn step(mut self, step : f64) -> Self {
        self.step = step;
        self
    }

    pub fn parallel(mut self, parallel : bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn progress(mut self, progress : bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        if !(self.tolerance >= 0.0) {
            return Err(GraphError::InvalidSettings(format!("tolerance should be non-negative (found {})", self.tolerance)));
        }
        if !(self.damping >= 0.0 && self.damping < 1.0) {
            return Err(GraphError::InvalidSettings(format!("damping should be in [0, 1) (found {})", self.damping)));
        }
        if !(self.step > 0.0 && self.step.is_finite()) {
            return Err(GraphError::InvalidSettings(format!("step should be positive (found {})", self.step)));
        }
        Ok(())
    }

    pub fn load<R>(reader : R) -> Result<Self, GraphError>
    where
        R : Read
    {
        let settings : Self = serde_json::from_reader(reader)?;
        settings.validate()?;
        Ok(settings)
    }

}

#[test]
fn rejects_invalid_damping() {
    assert!(matches!(
        MeanFieldSettings::load(&br#"{ "damping" : 1.0 }"#[..]),
        Err(GraphError::InvalidSettings(_))
    ));
    assert!(MeanFieldSettings::load(&br#"{ "step" : 0.0 }"#[..]).is_err());
    assert!(MeanFieldSettings::new().tolerance(-1.0).validate().is_err());
    assert!(MeanFieldSettings::new().step(f64::NAN).validate().is_err());
    assert!(MeanFieldSettings::new().damping(0.99).validate().is_ok());
    let s = MeanFieldSettings::load(&br#"{ "quadrature" : "PointEstimate", "parallel" : true }"#[..]).unwrap();
    assert_eq!(s.quadrature, Quadrature::PointEstimate);
    assert!(s.parallel);
    assert_eq!(s.max_sweeps, MeanFieldSettings::default().max_sweeps);
}
