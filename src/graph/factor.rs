use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::fmt::{self, Debug, Display};
use std::collections::HashSet;
use crate::error::GraphError;
use crate::message::NormalMessage;
use super::variable::*;

static NEXT_FACTOR_ID : AtomicUsize = AtomicUsize::new(0);

/// Log-contribution of a factor, as a function of the values of its variables.
pub type FactorFn = dyn Fn(&Assignment) -> anyhow::Result<f64> + Send + Sync;

/// A term of a joint log-density: a pure function of a declared set of variables
/// to a scalar log-contribution (a log-likelihood or a log-prior). The function
/// receives an assignment holding exactly the declared variables, keyed by the
/// variables themselves; it should not hold any state that changes between calls.
///
/// Factors are immutable after creation. Clones share the same function and identity,
/// so composing a factor with a clone of itself keeps a single copy in the graph.
#[derive(Clone)]
pub struct Factor {

    id : usize,

    name : String,

    variables : Vec<Variable>,

    function : Arc<FactorFn>,

    /// Contribution in the message family, for factors whose approximation is
    /// known in closed form (the prior factors).
    message : Option<NormalMessage>

}

impl Factor {

    /// Creates a factor over the informed variables. Fails if the same variable is declared twice.
    pub fn new<F>(name : &str, variables : Vec<Variable>, f : F) -> Result<Self, GraphError>
    where
        F : Fn(&Assignment) -> anyhow::Result<f64> + Send + Sync + 'static
    {
        let mut seen = HashSet::new();
        for v in variables.iter() {
            if !seen.insert(v.id()) {
                return Err(GraphError::DuplicateVariable { factor : name.to_string(), variable : v.label() });
            }
        }
        let id = NEXT_FACTOR_ID.fetch_add(1, Ordering::Relaxed);
        Ok(Self { id, name : name.to_string(), variables, function : Arc::new(f), message : None })
    }

    /// The identity factor of a variable, evaluating the log-density of its own declared
    /// prior (summed over the variable elements).
    pub fn prior(variable : &Variable) -> Result<Self, GraphError> {
        let message = NormalMessage::from_prior(variable.prior(), variable.dim())?;
        let prior = *variable.prior();
        let target = variable.clone();
        let name = format!("prior_{}", variable.label());
        let mut factor = Self::new(&name[..], vec![variable.clone()], move |asg : &Assignment| {
            let x = asg.get(&target).ok_or_else(|| GraphError::IncompleteAssignment {
                factor : format!("prior_{}", target.label()),
                variable : target.label()
            })?;
            Ok(x.iter().fold(0.0, |lp, x| lp + prior.log_prob(*x) ))
        })?;
        factor.message = Some(message);
        Ok(factor)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name[..]
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables[..]
    }

    pub fn contains(&self, v : &Variable) -> bool {
        self.variables.iter().any(|var| var == v )
    }

    /// Closed-form message contributed by this factor to its single variable, if any.
    pub fn closed_form(&self) -> Option<&NormalMessage> {
        self.message.as_ref()
    }

    /// Evaluates the log-contribution over the values the assignment holds
    /// for the factor variables; Entries for other variables are ignored.
    pub fn evaluate(&self, assignment : &Assignment) -> Result<f64, GraphError> {
        for v in self.variables.iter() {
            match assignment.get(v) {
                Some(x) => if x.nrows() != v.dim() {
                    return Err(GraphError::Dimension { variable : v.label(), expected : v.dim(), found : x.nrows() });
                },
                None => return Err(GraphError::IncompleteAssignment { factor : self.name.clone(), variable : v.label() })
            }
        }
        let lp = if assignment.len() == self.variables.len() {
            (self.function)(assignment)
        } else {
            let restricted : Assignment = self.variables.iter()
                .filter_map(|v| assignment.get(v).map(|x| (v.clone(), x.clone()) ) )
                .collect();
            (self.function)(&restricted)
        };
        match lp {
            Ok(lp) if lp.is_nan() => Err(GraphError::NonFinite { factor : self.name.clone() }),
            Ok(lp) => Ok(lp),
            Err(e) => Err(self.failure(e))
        }
    }

    // Errors raised by the crate itself (e.g. identity resolution inside a model factor)
    // keep their kind; anything else is a likelihood failure.
    fn failure(&self, e : anyhow::Error) -> GraphError {
        match e.downcast::<GraphError>() {
            Ok(err) => err,
            Err(e) => GraphError::Likelihood { factor : self.name.clone(), source : e.into() }
        }
    }

}

impl Debug for Factor {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("variables", &self.variables.iter().map(|v| v.label() ).collect::<Vec<_>>())
            .field("closed_form", &self.message.is_some())
            .finish()
    }

}

impl Display for Factor {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, v) in self.variables.iter().enumerate() {
            if i > 0 { write!(f, ", ")?; }
            write!(f, "{}", v.label())?;
        }
        write!(f, ")")
    }

}
