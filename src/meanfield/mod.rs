use nalgebra::*;
use std::collections::HashMap;
use std::fmt::{self, Display};
use serde::Serialize;
use rayon::prelude::*;
use indicatif::ProgressBar;
use tracing::{debug, info, warn};
use crate::graph::{Variable, Factor, FactorGraph, Assignment};
use crate::message::{Message, NormalMessage};
use crate::error::GraphError;

mod settings;

pub use settings::*;

mod projection;

pub use projection::MAX_QUADRATURE_POINTS;

/// Outcome of an iterative run. Running out of sweeps is not an error: the
/// approximation keeps the messages of the last sweep, and converged is false.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Convergence {

    pub sweeps : usize,

    pub residual : f64,

    pub converged : bool

}

impl Display for Convergence {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.converged {
            write!(f, "Converged after {} sweeps (residual = {:.3e})", self.sweeps, self.residual)
        } else {
            write!(f, "Did not converge after {} sweeps (residual = {:.3e})", self.sweeps, self.residual)
        }
    }

}

/// Approximate posterior marginal of a single variable.
#[derive(Debug, Clone)]
pub struct Marginal {

    pub variable : Variable,

    pub mean : DVector<f64>,

    pub variance : DVector<f64>

}

impl Marginal {

    pub fn sigma(&self) -> DVector<f64> {
        self.variance.map(|v| v.sqrt() )
    }

    /// Lower and upper limits at mean -+ n_sigma standard deviations, per element.
    pub fn interval(&self, n_sigma : f64) -> Vec<(f64, f64)> {
        self.mean.iter()
            .zip(self.sigma().iter())
            .map(|(m, s)| (m - n_sigma * s, m + n_sigma * s) )
            .collect()
    }

}

impl Display for Marginal {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ ", self.variable.label())?;
        for (i, (m, v)) in self.mean.iter().zip(self.variance.iter()).enumerate() {
            if i > 0 { write!(f, ", ")?; }
            write!(f, "N({:.4}, {:.4})", m, v)?;
        }
        Ok(())
    }

}

/// Mean-field approximation to the posterior represented by a factor graph: a product of
/// independent Gaussian factors q(v), one per variable (or per element, for array-valued
/// variables). Each sweep computes, for every factor f and each of its variables v, the
/// Gaussian projection of E_q(others)[log f] as a function of v (see Quadrature for how the
/// expectation is taken), then replaces each q(v) by the product of the contributions of
/// all factors touching v. Prior factors contribute their own closed-form Gaussian, so a
/// graph whose likelihoods are log-quadratic converges to the exact mean-field fixed point.
///
/// Updates are synchronous: all contributions of a sweep read the messages of the previous
/// sweep, and are committed together once every factor has been evaluated. The result of
/// a sweep does not depend on factor order, and factors can be evaluated in parallel. After
/// an update, the cavity of v with respect to f (its message with f's contribution removed)
/// is available through cavity(.).
///
/// ```
/// use graphfit::*;
///
/// let x = Variable::new("x", Prior::gaussian(0.0, 1.0));
/// let xc = x.clone();
/// let obs = Factor::new("obs", vec![x.clone()], move |asg : &Assignment| {
///     Ok(-0.5 * (2.0 - asg[&xc][0]).powi(2))
/// }).unwrap();
/// let graph = compose(vec![obs, Factor::prior(&x).unwrap()]);
/// let mut approx = MeanFieldApproximation::from_priors(graph).unwrap();
/// let conv = approx.run().unwrap();
/// assert!(conv.converged);
/// let q = approx.message(&x).unwrap();
/// assert!((q.mean()[0] - 1.0).abs() < 1E-6);
/// assert!((q.variance()[0] - 0.5).abs() < 1E-6);
/// ```
#[derive(Debug, Clone)]
pub struct MeanFieldApproximation {

    graph : FactorGraph,

    messages : HashMap<Variable, NormalMessage>,

    /// Contribution of each factor to each of its variables at the last sweep,
    /// keyed by factor id.
    contributions : HashMap<(usize, Variable), NormalMessage>,

    settings : MeanFieldSettings,

    sweeps : usize

}

impl MeanFieldApproximation {

    /// Starts the approximation from the informed messages, which should hold a proper
    /// message of the right dimension for every graph variable.
    pub fn new(graph : FactorGraph, mut messages : HashMap<Variable, NormalMessage>) -> Result<Self, GraphError> {
        let mut init = HashMap::with_capacity(messages.len());
        for v in graph.variables() {
            let msg = messages.remove(&v).ok_or_else(|| GraphError::MissingMessage { variable : v.label() })?;
            if msg.dim() != v.dim() {
                return Err(GraphError::Dimension { variable : v.label(), expected : v.dim(), found : msg.dim() });
            }
            if !msg.is_proper() {
                return Err(GraphError::ImproperMessage { variable : v.label() });
            }
            init.insert(v, msg);
        }
        if !messages.is_empty() {
            debug!(ignored = messages.len(), "initial messages for variables outside the graph");
        }
        Ok(Self {
            graph,
            messages : init,
            contributions : HashMap::new(),
            settings : MeanFieldSettings::default(),
            sweeps : 0
        })
    }

    /// Starts the approximation from the Gaussian messages matching the variable priors.
    pub fn from_priors(graph : FactorGraph) -> Result<Self, GraphError> {
        let mut messages = HashMap::new();
        for v in graph.variables() {
            let msg = NormalMessage::from_prior(v.prior(), v.dim())?;
            messages.insert(v, msg);
        }
        Self::new(graph, messages)
    }

    pub fn with_settings(mut self, settings : MeanFieldSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &MeanFieldSettings {
        &self.settings
    }

    pub fn graph(&self) -> &FactorGraph {
        &self.graph
    }

    /// Number of sweeps committed so far.
    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    pub fn message(&self, v : &Variable) -> Option<&NormalMessage> {
        self.messages.get(v)
    }

    pub fn messages(&self) -> &HashMap<Variable, NormalMessage> {
        &self.messages
    }

    /// Contribution of the factor to the variable message at the last sweep.
    pub fn contribution(&self, factor : &Factor, v : &Variable) -> Option<&NormalMessage> {
        self.contributions.get(&(factor.id(), v.clone()))
    }

    /// Message of the variable excluding the contribution of the informed factor.
    pub fn cavity(&self, factor : &Factor, v : &Variable) -> Option<NormalMessage> {
        let contrib = self.contribution(factor, v)?;
        self.messages.get(v).map(|m| m.quotient(contrib) )
    }

    /// Marginals of all graph variables, ordered by variable creation.
    pub fn marginals(&self) -> Vec<Marginal> {
        self.graph.variables()
            .into_iter()
            .filter_map(|v| self.messages.get(&v).map(|m| (v.clone(), m) ) )
            .map(|(variable, m)| Marginal { variable, mean : m.mean(), variance : m.variance() })
            .collect()
    }

    /// Assignment holding the current message mean of every variable.
    pub fn mean_assignment(&self) -> Assignment {
        self.messages.iter().map(|(v, m)| (v.clone(), m.mean()) ).collect()
    }

    /// Joint log-density of the graph evaluated at the message means.
    pub fn log_density_at_mean(&self) -> Result<f64, GraphError> {
        self.graph.evaluate(&self.mean_assignment())
    }

    /// Performs a single synchronous update of all messages, returning the Euclidean norm
    /// of the changes of message means and variances with respect to the previous sweep.
    /// If the settings are invalid or any factor fails, no message is changed.
    pub fn sweep(&mut self) -> Result<f64, GraphError> {
        self.settings.validate()?;
        let snapshot = &self.messages;
        let settings = &self.settings;
        let factors : Vec<&Factor> = self.graph.factors().collect();
        let projected : Vec<Vec<(Variable, NormalMessage)>> = if settings.parallel {
            factors.par_iter().map(|f| projection::project(f, snapshot, settings) ).collect::<Result<_, _>>()?
        } else {
            factors.iter().map(|f| projection::project(f, snapshot, settings) ).collect::<Result<_, _>>()?
        };

        let mut targets : HashMap<Variable, NormalMessage> = HashMap::with_capacity(self.messages.len());
        let mut contributions = HashMap::with_capacity(self.contributions.len());
        for (f, contribs) in factors.iter().zip(projected.into_iter()) {
            for (v, msg) in contribs {
                let target = targets.entry(v.clone()).or_insert_with(|| NormalMessage::flat(v.dim()) );
                *target = target.product(&msg);
                contributions.insert((f.id(), v), msg);
            }
        }

        let mut residual = 0.0;
        let mut updated = HashMap::with_capacity(self.messages.len());
        for (v, target) in targets {
            let old = self.messages.get(&v).ok_or_else(|| GraphError::MissingMessage { variable : v.label() })?;
            let new = if self.settings.damping > 0.0 {
                old.interpolate(&target, 1.0 - self.settings.damping)
            } else {
                target
            };
            if !new.is_proper() {
                return Err(GraphError::ImproperMessage { variable : v.label() });
            }
            residual += new.residual(old);
            updated.insert(v, new);
        }
        let residual = residual.sqrt();
        self.messages = updated;
        self.contributions = contributions;
        self.sweeps += 1;
        debug!(sweep = self.sweeps, residual, "mean-field sweep");
        Ok(residual)
    }

    /// Sweeps until the residual falls below the tolerance or the maximum number of
    /// sweeps is reached.
    pub fn run(&mut self) -> Result<Convergence, GraphError> {
        self.settings.validate()?;
        let max_sweeps = self.settings.max_sweeps;
        let bar = if self.settings.progress {
            ProgressBar::new(max_sweeps as u64)
        } else {
            ProgressBar::hidden()
        };
        let mut residual = f64::INFINITY;
        for i in 0..max_sweeps {
            residual = match self.sweep() {
                Ok(r) => r,
                Err(e) => {
                    bar.abandon();
                    return Err(e);
                }
            };
            bar.inc(1);
            bar.set_message(format!("residual {:.3e}", residual));
            if residual < self.settings.tolerance {
                bar.finish_and_clear();
                let conv = Convergence { sweeps : i + 1, residual, converged : true };
                info!(sweeps = conv.sweeps, residual, "mean-field approximation converged");
                return Ok(conv);
            }
        }
        bar.finish_and_clear();
        warn!(sweeps = max_sweeps, residual, "mean-field approximation did not converge");
        Ok(Convergence { sweeps : max_sweeps, residual, converged : false })
    }

}

impl Display for MeanFieldApproximation {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MeanFieldApproximation ({} sweeps)", self.sweeps)?;
        for m in self.marginals() {
            writeln!(f, "\t{}", m)?;
        }
        Ok(())
    }

}
