use nalgebra::*;
use serde::{Serialize, Deserialize};
use std::fmt::{self, Debug, Display};
use std::f64::consts::PI;
use rand::Rng;
use crate::prior::Prior;
use crate::error::GraphError;

/// Identifier of the parametric family a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    Normal
}

/// Trait shared by parametric beliefs over the value of a variable. A message
/// is stored on its natural parameter scale, which makes the combination of two
/// messages of the same family (the product of their densities) a simple sum of
/// natural parameters, and the removal of one message from another (the quotient)
/// a difference. Messages are never mutated by the inference algorithm: every
/// update builds a new message that replaces the old one.
///
/// A message is allowed to be improper (e.g. the flat message with zero precision,
/// or the quotient between two messages that leaves a negative precision); Such
/// states are flagged by is_proper(.) and must not be used as the final belief
/// for a variable.
pub trait Message
where
    Self : Debug + Clone + Sized
{

    fn family(&self) -> Family;

    /// Number of elements of the variable this message refers to.
    fn dim(&self) -> usize;

    /// Natural parameter vector, with the first-order coefficients stacked over
    /// the second-order coefficients.
    fn natural(&self) -> DVector<f64>;

    fn mean(&self) -> DVector<f64>;

    /// Marginal variance of each element.
    fn variance(&self) -> DVector<f64>;

    /// Log-normalization constant, as a function of the natural parameter.
    /// Returns infinity for improper messages.
    fn log_partition(&self) -> f64;

    fn is_proper(&self) -> bool;

    /// Closed-form combination of two messages over the same variable.
    fn product(&self, other : &Self) -> Self;

    /// Inverse of product(.).
    fn quotient(&self, other : &Self) -> Self;

    /// Normalized log-density at x.
    fn log_prob(&self, x : &DVector<f64>) -> f64;

    /// Aggregate change between two messages, measured as the sum of squared
    /// differences of the means and variances of all elements.
    fn residual(&self, other : &Self) -> f64 {
        let dm = self.mean() - other.mean();
        let dv = self.variance() - other.variance();
        dm.norm_squared() + dv.norm_squared()
    }

}

/// Independent normal beliefs over the elements of a variable, parametrized
/// by the element precisions (1/variance) and shifts (precision * mean).
/// The shift and the negative half-precision are the natural parameters of
/// the normal, so product/quotient reduce to sums/differences of those vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalMessage {

    precision : DVector<f64>,

    shift : DVector<f64>

}

impl NormalMessage {

    /// Message with the informed mean and variance vectors. Non-positive variances
    /// yield an improper message. Fails if the vectors differ in length.
    pub fn new(mean : DVector<f64>, variance : DVector<f64>) -> Result<Self, GraphError> {
        if mean.nrows() != variance.nrows() {
            return Err(GraphError::Dimension {
                variable : String::from("variance"),
                expected : mean.nrows(),
                found : variance.nrows()
            });
        }
        Ok(Self::from_moments(&mean, &variance))
    }

    pub fn scalar(mean : f64, variance : f64) -> Self {
        Self::from_moments(&DVector::from_element(1, mean), &DVector::from_element(1, variance))
    }

    /// Message with the informed precisions and shifts. Fails if the vectors differ in length.
    pub fn from_natural(precision : DVector<f64>, shift : DVector<f64>) -> Result<Self, GraphError> {
        if precision.nrows() != shift.nrows() {
            return Err(GraphError::Dimension {
                variable : String::from("shift"),
                expected : precision.nrows(),
                found : shift.nrows()
            });
        }
        Ok(Self { precision, shift })
    }

    fn from_moments(mean : &DVector<f64>, variance : &DVector<f64>) -> Self {
        let precision = variance.map(|v| 1. / v );
        let shift = precision.component_mul(mean);
        Self { precision, shift }
    }

    /// The uniform (zero-precision) improper message, neutral element of product(.).
    pub fn flat(dim : usize) -> Self {
        Self { precision : DVector::zeros(dim), shift : DVector::zeros(dim) }
    }

    /// Converts a declared prior into the normal family, by matching its first two
    /// moments (this is exact for Gaussian priors).
    pub fn from_prior(prior : &Prior, dim : usize) -> Result<Self, GraphError> {
        prior.validate()?;
        Ok(Self::from_moments(
            &DVector::from_element(dim, prior.mean()),
            &DVector::from_element(dim, prior.variance())
        ))
    }

    pub fn precision(&self) -> &DVector<f64> {
        &self.precision
    }

    pub fn shift(&self) -> &DVector<f64> {
        &self.shift
    }

    /// Standard deviation of each element.
    pub fn sigma(&self) -> DVector<f64> {
        self.variance().map(|v| v.sqrt() )
    }

    /// Convex combination of natural parameters: weight = 1 returns other;
    /// weight = 0 returns self.
    pub fn interpolate(&self, other : &Self, weight : f64) -> Self {
        Self {
            precision : self.precision.scale(1. - weight) + other.precision.scale(weight),
            shift : self.shift.scale(1. - weight) + other.shift.scale(weight)
        }
    }

}

impl Message for NormalMessage {

    fn family(&self) -> Family {
        Family::Normal
    }

    fn dim(&self) -> usize {
        self.precision.nrows()
    }

    fn natural(&self) -> DVector<f64> {
        let mut eta = DVector::zeros(2 * self.dim());
        eta.rows_mut(0, self.dim()).copy_from(&self.shift);
        eta.rows_mut(self.dim(), self.dim()).copy_from(&self.precision.scale(-0.5));
        eta
    }

    fn mean(&self) -> DVector<f64> {
        self.shift.component_div(&self.precision)
    }

    fn variance(&self) -> DVector<f64> {
        self.precision.map(|p| 1. / p )
    }

    fn log_partition(&self) -> f64 {
        if !self.is_proper() {
            return f64::INFINITY;
        }
        self.precision.iter().zip(self.shift.iter())
            .fold(0.0, |a, (p, s)| a + s.powi(2) / (2. * p) - 0.5 * p.ln() + 0.5 * (2. * PI).ln() )
    }

    fn is_proper(&self) -> bool {
        self.precision.iter().all(|p| *p > 0.0 && p.is_finite() ) &&
            self.shift.iter().all(|s| s.is_finite() )
    }

    fn product(&self, other : &Self) -> Self {
        debug_assert_eq!(self.dim(), other.dim());
        Self { precision : &self.precision + &other.precision, shift : &self.shift + &other.shift }
    }

    fn quotient(&self, other : &Self) -> Self {
        debug_assert_eq!(self.dim(), other.dim());
        Self { precision : &self.precision - &other.precision, shift : &self.shift - &other.shift }
    }

    fn log_prob(&self, x : &DVector<f64>) -> f64 {
        debug_assert_eq!(x.nrows(), self.dim());
        let lin = self.shift.dot(x);
        let quad = self.precision.iter().zip(x.iter()).fold(0.0, |q, (p, x)| q + p * x.powi(2) );
        lin - 0.5 * quad - self.log_partition()
    }

}

impl rand_distr::Distribution<DVector<f64>> for NormalMessage {

    fn sample<R>(&self, rng : &mut R) -> DVector<f64>
    where
        R : Rng + ?Sized
    {
        let mean = self.mean();
        let sigma = self.sigma();
        DVector::from_fn(self.dim(), |i, _| {
            let z : f64 = rng.sample(rand_distr::StandardNormal);
            mean[i] + sigma[i] * z
        })
    }

}

impl Display for NormalMessage {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        let mean = self.mean();
        let var = self.variance();
        write!(f, "Normal(mean = [")?;
        for (i, m) in mean.iter().enumerate() {
            if i > 0 { write!(f, ", ")?; }
            write!(f, "{}", m)?;
        }
        write!(f, "], var = [")?;
        for (i, v) in var.iter().enumerate() {
            if i > 0 { write!(f, ", ")?; }
            write!(f, "{}", v)?;
        }
        write!(f, "])")
    }

}
