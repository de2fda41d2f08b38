use nalgebra::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::hash::{Hash, Hasher};
use std::cmp::Ordering as CmpOrdering;
use std::fmt::{self, Display};
use crate::prior::Prior;
use crate::error::GraphError;

static NEXT_VARIABLE_ID : AtomicUsize = AtomicUsize::new(0);

#[derive(Debug)]
struct VariableInfo {

    id : usize,

    name : String,

    dim : usize,

    prior : Prior

}

/// Identity-stable handle to one unknown quantity of a model. Clones of a variable
/// share its identity, so the same variable can be referenced by several factors
/// (and several sub-models), which is what links otherwise independent factors into
/// a single graph. Equality, ordering and hashing only consider the identity: two
/// variables created with the same name and prior are still distinct.
#[derive(Debug, Clone)]
pub struct Variable {
    info : Arc<VariableInfo>
}

impl Variable {

    /// Creates a new scalar variable with a fresh identity.
    pub fn new(name : &str, prior : Prior) -> Self {
        Self::create(name, prior, 1)
    }

    /// Creates a new variable holding dim elements, each independently
    /// distributed a priori according to prior. Fails if dim is zero.
    pub fn with_dim(name : &str, prior : Prior, dim : usize) -> Result<Self, GraphError> {
        if dim == 0 {
            return Err(GraphError::Dimension { variable : name.to_string(), expected : 1, found : 0 });
        }
        Ok(Self::create(name, prior, dim))
    }

    fn create(name : &str, prior : Prior, dim : usize) -> Self {
        let id = NEXT_VARIABLE_ID.fetch_add(1, Ordering::Relaxed);
        Self { info : Arc::new(VariableInfo { id, name : name.to_string(), dim, prior }) }
    }

    pub fn id(&self) -> usize {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name[..]
    }

    pub fn dim(&self) -> usize {
        self.info.dim
    }

    pub fn prior(&self) -> &Prior {
        &self.info.prior
    }

    /// Unique label, used when reporting errors.
    pub fn label(&self) -> String {
        format!("{}#{}", self.info.name, self.info.id)
    }

}

impl PartialEq for Variable {

    fn eq(&self, other : &Self) -> bool {
        self.info.id == other.info.id
    }

}

impl Eq for Variable { }

impl Hash for Variable {

    fn hash<H : Hasher>(&self, state : &mut H) {
        self.info.id.hash(state);
    }

}

impl PartialOrd for Variable {

    fn partial_cmp(&self, other : &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }

}

impl Ord for Variable {

    fn cmp(&self, other : &Self) -> CmpOrdering {
        self.info.id.cmp(&other.info.id)
    }

}

impl Display for Variable {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ {}", self.label(), self.info.prior)
    }

}

/// Values informed for a set of variables.
pub type Assignment = HashMap<Variable, DVector<f64>>;

/// Builds an assignment of scalar values.
pub fn scalar_assignment<'a>(values : impl IntoIterator<Item=(&'a Variable, f64)>) -> Assignment {
    values.into_iter()
        .map(|(v, x)| (v.clone(), DVector::from_element(v.dim(), x)) )
        .collect()
}

#[test]
fn identity_not_name() {
    let a = Variable::new("centre", Prior::gaussian(0.0, 1.0));
    let b = Variable::new("centre", Prior::gaussian(0.0, 1.0));
    assert!(a != b);
    assert_eq!(a.clone(), a);
    let mut asg = Assignment::new();
    asg.insert(a.clone(), DVector::from_element(1, 1.0));
    assert!(asg.contains_key(&a));
    assert!(!asg.contains_key(&b));
}

#[test]
fn empty_variable_is_rejected() {
    assert!(matches!(
        Variable::with_dim("weights", Prior::gaussian(0.0, 1.0), 0),
        Err(GraphError::Dimension { found : 0, .. })
    ));
    assert_eq!(Variable::with_dim("weights", Prior::gaussian(0.0, 1.0), 3).unwrap().dim(), 3);
}
