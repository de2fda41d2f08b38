use nalgebra::*;
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display};
use crate::graph::{Variable, Assignment};
use crate::message::{Message, NormalMessage};
use crate::prior::Prior;
use crate::error::GraphError;

/// Concrete model instances, rebuilt from a tree by substituting values for its parameters.
mod instance;

pub use instance::*;

/// Reading and writing model trees as JSON.
pub mod parse;

/// Hierarchical parameter tree of a (possibly composed) model. Each node is either
/// a parameter (a handle to a variable with a declared prior), a fixed constant,
/// or a branch mapping names to nested nodes in insertion order. Sub-models are
/// composed by nesting their trees under a common branch; the unknown quantities
/// of the composed model are the flattened set of parameters over all leaves.
///
/// The same variable might appear at several positions (in the same tree or in
/// the trees of different sub-models). The tree addresses parameters by variable
/// identity, never by position or name, so a value informed for a variable is
/// substituted at every position it occupies.
///
/// ```
/// use graphfit::{ModelTree, Prior};
/// # fn main() -> Result<(), graphfit::GraphError> {
/// let gaussian = ModelTree::branch()
///     .with_prior("centre", Prior::gaussian(50.0, 10.0))?
///     .with_prior("intensity", Prior::log_uniform(1E-2, 1E2))?
///     .with("sigma", 5.0)?;
/// assert_eq!(gaussian.prior_count(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub enum ModelTree {

    Parameter(Variable),

    Constant(f64),

    Branch(Vec<(String, ModelTree)>)

}

impl From<Variable> for ModelTree {

    fn from(v : Variable) -> Self {
        ModelTree::Parameter(v)
    }

}

impl From<&Variable> for ModelTree {

    fn from(v : &Variable) -> Self {
        ModelTree::Parameter(v.clone())
    }

}

impl From<f64> for ModelTree {

    fn from(c : f64) -> Self {
        ModelTree::Constant(c)
    }

}

impl ModelTree {

    /// Empty branch, to which named nodes are added via with(.), with_prior(.) or push(.).
    pub fn branch() -> Self {
        ModelTree::Branch(Vec::new())
    }

    /// Inserts a named node at this branch. If the name is already in use, the node at this
    /// position is replaced. Fails with NotABranch if self is a leaf.
    pub fn with<N>(mut self, name : &str, node : N) -> Result<Self, GraphError>
    where
        N : Into<ModelTree>
    {
        match self {
            ModelTree::Branch(ref mut items) => {
                let node = node.into();
                match items.iter_mut().find(|(k, _)| &k[..] == name ) {
                    Some(item) => item.1 = node,
                    None => items.push((name.to_string(), node))
                }
                Ok(self)
            },
            _ => Err(GraphError::NotABranch { name : name.to_string() })
        }
    }

    /// Inserts a new parameter, with a fresh variable named after the node.
    pub fn with_prior(self, name : &str, prior : Prior) -> Result<Self, GraphError> {
        let v = Variable::new(name, prior);
        self.with(name, v)
    }

    /// Appends a node named after the current number of items at this branch.
    pub fn push<N>(self, node : N) -> Result<Self, GraphError>
    where
        N : Into<ModelTree>
    {
        let name = self.len().to_string();
        self.with(&name[..], node)
    }

    pub fn get(&self, name : &str) -> Option<&ModelTree> {
        match self {
            ModelTree::Branch(items) => items.iter().find(|(k, _)| &k[..] == name ).map(|(_, n)| n ),
            _ => None
        }
    }

    /// Number of immediate children (zero for leaves).
    pub fn len(&self) -> usize {
        match self {
            ModelTree::Branch(items) => items.len(),
            _ => 0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every parameter position, with the path of names leading to it.
    pub fn parameters(&self) -> Vec<(Vec<String>, Variable)> {
        let mut params = Vec::new();
        self.collect_parameters(&mut Vec::new(), &mut params);
        params
    }

    fn collect_parameters(&self, path : &mut Vec<String>, params : &mut Vec<(Vec<String>, Variable)>) {
        match self {
            ModelTree::Parameter(v) => params.push((path.clone(), v.clone())),
            ModelTree::Constant(_) => { },
            ModelTree::Branch(items) => {
                for (k, node) in items.iter() {
                    path.push(k.clone());
                    node.collect_parameters(path, params);
                    path.pop();
                }
            }
        }
    }

    /// Distinct variables of this tree, in order of first appearance.
    pub fn priors(&self) -> Vec<Variable> {
        let mut seen = HashSet::new();
        self.parameters().into_iter()
            .filter_map(|(_, v)| if seen.insert(v.id()) { Some(v) } else { None } )
            .collect()
    }

    pub fn prior_count(&self) -> usize {
        self.priors().len()
    }

    /// Resolves a variable identity back to the variable, if it is a parameter of this tree.
    pub fn prior_with_id(&self, id : usize) -> Option<Variable> {
        self.parameters().into_iter().map(|(_, v)| v ).find(|v| v.id() == id )
    }

    /// Path to the first position of the variable at this tree.
    pub fn path_for(&self, v : &Variable) -> Option<Vec<String>> {
        self.parameters().into_iter().find(|(_, var)| var == v ).map(|(path, _)| path )
    }

    /// Path to the variable with names joined by underscores (e.g. gaussian_centre).
    pub fn name_for_prior(&self, v : &Variable) -> Option<String> {
        self.path_for(v).map(|path| {
            if path.is_empty() {
                v.name().to_string()
            } else {
                path.join("_")
            }
        })
    }

    /// Builds a concrete instance by substituting the value informed for each variable
    /// at every position it occupies. Fails if any parameter of the tree does not have
    /// a value at the arguments.
    pub fn instance_for_arguments(&self, arguments : &Assignment) -> Result<Instance, GraphError> {
        match self {
            ModelTree::Parameter(v) => {
                let value = arguments.get(v)
                    .ok_or_else(|| GraphError::UnknownVariable { variable : v.label() })?;
                if value.nrows() != v.dim() {
                    return Err(GraphError::Dimension { variable : v.label(), expected : v.dim(), found : value.nrows() });
                }
                Ok(Instance::Value(value.clone()))
            },
            ModelTree::Constant(c) => Ok(Instance::Value(DVector::from_element(1, *c))),
            ModelTree::Branch(items) => {
                let mut inst_items = Vec::with_capacity(items.len());
                for (k, node) in items.iter() {
                    inst_items.push((k.clone(), node.instance_for_arguments(arguments)?));
                }
                Ok(Instance::Branch(inst_items))
            }
        }
    }

    /// Builds a tree with the same structure, where each parameter is replaced by a fresh
    /// variable with a Gaussian prior centered at the mean of the informed message (and with
    /// the message standard deviation as its scale). Positions that shared a variable keep
    /// sharing the corresponding new variable. This is used to pass the posterior of one fit
    /// as the prior for the next. Only scalar parameters are supported, since the independent
    /// element posteriors of array-valued parameters cannot be expressed as a single prior.
    pub fn gaussian_tree_for(
        &self,
        messages : &HashMap<Variable, NormalMessage>
    ) -> Result<ModelTree, GraphError> {
        let mut renamed : HashMap<usize, Variable> = HashMap::new();
        self.gaussian_node_for(messages, &mut renamed)
    }

    fn gaussian_node_for(
        &self,
        messages : &HashMap<Variable, NormalMessage>,
        renamed : &mut HashMap<usize, Variable>
    ) -> Result<ModelTree, GraphError> {
        match self {
            ModelTree::Parameter(v) => {
                if let Some(new_v) = renamed.get(&v.id()) {
                    return Ok(ModelTree::Parameter(new_v.clone()));
                }
                if v.dim() != 1 {
                    return Err(GraphError::Dimension { variable : v.label(), expected : 1, found : v.dim() });
                }
                let msg = messages.get(v)
                    .ok_or_else(|| GraphError::MissingMessage { variable : v.label() })?;
                if !msg.is_proper() {
                    return Err(GraphError::ImproperMessage { variable : v.label() });
                }
                let prior = Prior::gaussian(msg.mean()[0], msg.variance()[0].sqrt());
                let new_v = Variable::new(v.name(), prior);
                renamed.insert(v.id(), new_v.clone());
                Ok(ModelTree::Parameter(new_v))
            },
            ModelTree::Constant(c) => Ok(ModelTree::Constant(*c)),
            ModelTree::Branch(items) => {
                let mut new_items = Vec::with_capacity(items.len());
                for (k, node) in items.iter() {
                    new_items.push((k.clone(), node.gaussian_node_for(messages, renamed)?));
                }
                Ok(ModelTree::Branch(new_items))
            }
        }
    }

    fn fmt_indented(&self, f : &mut fmt::Formatter<'_>, depth : usize) -> fmt::Result {
        if let ModelTree::Branch(items) = self {
            for (k, node) in items.iter() {
                let pad = "    ".repeat(depth);
                match node {
                    ModelTree::Parameter(v) => writeln!(f, "{}{} : {}", pad, k, v)?,
                    ModelTree::Constant(c) => writeln!(f, "{}{} : {}", pad, k, c)?,
                    ModelTree::Branch(_) => {
                        writeln!(f, "{}{}", pad, k)?;
                        node.fmt_indented(f, depth + 1)?;
                    }
                }
            }
        }
        Ok(())
    }

}

impl Display for ModelTree {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTree::Parameter(v) => write!(f, "{}", v),
            ModelTree::Constant(c) => write!(f, "{}", c),
            ModelTree::Branch(_) => self.fmt_indented(f, 0)
        }
    }

}
