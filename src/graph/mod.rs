use petgraph::graph::{UnGraph, NodeIndex};
use std::collections::HashMap;
use std::ops::Mul;
use std::iter::FromIterator;
use std::fmt::{self, Display};
use rayon::prelude::*;
use tracing::debug;
use crate::error::GraphError;

mod variable;

pub use variable::*;

mod factor;

pub use factor::*;

/// A node in the bipartite graph: either a factor (indexed by its position
/// in the factor list) or a variable.
#[derive(Debug, Clone)]
enum GraphNode {
    Factor(usize),
    Variable(Variable)
}

/// A joint log-density expressed as a product of factors, represented as a bipartite
/// undirected graph where each factor node is linked to the nodes of the variables it
/// depends on. Variables are merged by identity: if two factors reference clones of the
/// same variable, a single variable node links to both of them (this is what makes the
/// composition of independent sub-models a graph rather than a forest). The log-density
/// of the graph for a full assignment is the sum of the log-contributions of all factors.
///
/// Composition (via compose(.) or the Mul operator) behaves as a set union over factors:
/// it is associative and commutative, and factors already present (same identity) are
/// not duplicated.
#[derive(Debug, Clone, Default)]
pub struct FactorGraph {

    graph : UnGraph<GraphNode, ()>,

    /// Factors, in insertion order.
    factors : Vec<Factor>,

    factor_nodes : HashMap<usize, NodeIndex>,

    variable_nodes : HashMap<Variable, NodeIndex>

}

/// Builds the graph formed by the product of all informed factors.
pub fn compose<I>(factors : I) -> FactorGraph
where
    I : IntoIterator<Item=Factor>
{
    let graph : FactorGraph = factors.into_iter().collect();
    debug!(factors = graph.len(), variables = graph.variable_nodes.len(), "composed factor graph");
    graph
}

impl FactorGraph {

    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a factor to the graph, linking it to its variables. Returns false
    /// if the factor was already present.
    pub fn insert(&mut self, factor : Factor) -> bool {
        if self.factor_nodes.contains_key(&factor.id()) {
            return false;
        }
        let pos = self.factors.len();
        let f_ix = self.graph.add_node(GraphNode::Factor(pos));
        for v in factor.variables().iter() {
            let v_ix = match self.variable_nodes.get(v) {
                Some(ix) => *ix,
                None => {
                    let ix = self.graph.add_node(GraphNode::Variable(v.clone()));
                    self.variable_nodes.insert(v.clone(), ix);
                    ix
                }
            };
            self.graph.add_edge(f_ix, v_ix, ());
        }
        self.factor_nodes.insert(factor.id(), f_ix);
        self.factors.push(factor);
        true
    }

    /// Number of factors.
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn factors(&self) -> impl Iterator<Item=&Factor> {
        self.factors.iter()
    }

    pub fn contains_factor(&self, factor : &Factor) -> bool {
        self.factor_nodes.contains_key(&factor.id())
    }

    pub fn contains_variable(&self, v : &Variable) -> bool {
        self.variable_nodes.contains_key(v)
    }

    /// Distinct variables referenced by any factor, ordered by creation.
    pub fn variables(&self) -> Vec<Variable> {
        let mut vars : Vec<Variable> = self.variable_nodes.keys().cloned().collect();
        vars.sort();
        vars
    }

    /// Factors linked to the informed variable, in insertion order.
    pub fn factors_for(&self, v : &Variable) -> Vec<&Factor> {
        let ix = match self.variable_nodes.get(v) {
            Some(ix) => *ix,
            None => return Vec::new()
        };
        let mut positions : Vec<usize> = self.graph.neighbors(ix)
            .filter_map(|n| match self.graph[n] {
                GraphNode::Factor(pos) => Some(pos),
                GraphNode::Variable(_) => None
            })
            .collect();
        positions.sort();
        positions.dedup();
        positions.iter().map(|pos| &self.factors[*pos] ).collect()
    }

    /// Log-contribution of every factor (in insertion order) for the informed assignment.
    /// Factors are independent during evaluation, so they can be evaluated in parallel.
    pub fn contributions(&self, assignment : &Assignment, parallel : bool) -> Result<Vec<f64>, GraphError> {
        if parallel {
            self.factors.par_iter().map(|f| f.evaluate(assignment) ).collect()
        } else {
            self.factors.iter().map(|f| f.evaluate(assignment) ).collect()
        }
    }

    /// Joint log-density: the sum of the log-contributions of all factors. Fails if
    /// the assignment misses a variable declared by any factor.
    pub fn evaluate(&self, assignment : &Assignment) -> Result<f64, GraphError> {
        let mut lp = 0.0;
        for f in self.factors.iter() {
            lp += f.evaluate(assignment)?;
        }
        Ok(lp)
    }

}

impl FromIterator<Factor> for FactorGraph {

    fn from_iter<I : IntoIterator<Item=Factor>>(iter : I) -> Self {
        let mut graph = FactorGraph::new();
        graph.extend(iter);
        graph
    }

}

impl Extend<Factor> for FactorGraph {

    fn extend<I : IntoIterator<Item=Factor>>(&mut self, iter : I) {
        for f in iter {
            self.insert(f);
        }
    }

}

impl Mul<Factor> for Factor {

    type Output = FactorGraph;

    fn mul(self, rhs : Factor) -> FactorGraph {
        compose(vec![self, rhs])
    }

}

impl Mul<Factor> for FactorGraph {

    type Output = FactorGraph;

    fn mul(mut self, rhs : Factor) -> FactorGraph {
        self.insert(rhs);
        self
    }

}

impl Mul<FactorGraph> for Factor {

    type Output = FactorGraph;

    fn mul(self, rhs : FactorGraph) -> FactorGraph {
        rhs * self
    }

}

impl Mul<FactorGraph> for FactorGraph {

    type Output = FactorGraph;

    fn mul(mut self, rhs : FactorGraph) -> FactorGraph {
        self.extend(rhs.factors.into_iter());
        self
    }

}

impl Display for FactorGraph {

    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FactorGraph ({} factors, {} variables)", self.len(), self.variable_nodes.len())?;
        for factor in self.factors.iter() {
            writeln!(f, "\t{}", factor)?;
        }
        Ok(())
    }

}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::prior::Prior;
    use approx::assert_relative_eq;

    fn quadratic(name : &str, vars : &[&Variable], centre : f64) -> Factor {
        let owned : Vec<Variable> = vars.iter().map(|v| (*v).clone() ).collect();
        let inner = owned.clone();
        Factor::new(name, owned, move |asg : &Assignment| {
            let s : f64 = inner.iter().map(|v| asg[v][0] ).sum();
            Ok(-0.5 * (s - centre).powi(2))
        }).unwrap()
    }

    fn abc() -> (Variable, Variable, Variable, Factor, Factor, Factor) {
        let x = Variable::new("x", Prior::gaussian(0.0, 1.0));
        let y = Variable::new("y", Prior::gaussian(0.0, 1.0));
        let z = Variable::new("z", Prior::gaussian(0.0, 1.0));
        let a = quadratic("a", &[&x, &y], 1.0);
        let b = quadratic("b", &[&y, &z], -2.0);
        let c = quadratic("c", &[&z], 0.5);
        (x, y, z, a, b, c)
    }

    #[test]
    fn composition_is_associative_and_commutative() {
        let (x, y, z, a, b, c) = abc();
        let assignments = [(0.0, 0.0, 0.0), (1.0, -2.0, 3.5), (-0.3, 0.7, 12.0)];
        for (vx, vy, vz) in assignments.iter() {
            let asg = scalar_assignment(vec![(&x, *vx), (&y, *vy), (&z, *vz)]);
            let separate = a.evaluate(&asg).unwrap() + b.evaluate(&asg).unwrap() + c.evaluate(&asg).unwrap();
            let left = ((a.clone() * b.clone()) * c.clone()).evaluate(&asg).unwrap();
            let right = (a.clone() * (b.clone() * c.clone())).evaluate(&asg).unwrap();
            let swapped = compose(vec![c.clone(), a.clone(), b.clone()]).evaluate(&asg).unwrap();
            assert_relative_eq!(left, separate, epsilon = 1E-12);
            assert_relative_eq!(right, separate, epsilon = 1E-12);
            assert_relative_eq!(swapped, separate, epsilon = 1E-12);
        }
    }

    #[test]
    fn variables_are_merged_by_identity() {
        let (x, y, z, a, b, c) = abc();
        let g = compose(vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(g.variables(), vec![x.clone(), y.clone(), z.clone()]);
        assert_eq!(g.factors_for(&y).len(), 2);
        assert_eq!(g.factors_for(&x).len(), 1);
        assert_eq!(g.factors_for(&z).iter().map(|f| f.name() ).collect::<Vec<_>>(), vec!["b", "c"]);

        // Composing with a factor already present leaves the graph unchanged.
        let g = g * a.clone();
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn incomplete_assignment_is_rejected() {
        let (x, y, _z, a, b, c) = abc();
        let g = compose(vec![a, b, c]);
        let asg = scalar_assignment(vec![(&x, 1.0), (&y, 1.0)]);
        match g.evaluate(&asg) {
            Err(GraphError::IncompleteAssignment { variable, .. }) => assert!(variable.starts_with("z#")),
            other => panic!("Unexpected result: {:?}", other)
        }
    }

    #[test]
    fn parallel_contributions() {
        let (x, y, z, a, b, c) = abc();
        let g = compose(vec![a, b, c]);
        let asg = scalar_assignment(vec![(&x, 0.5), (&y, 1.5), (&z, -1.0)]);
        let seq = g.contributions(&asg, false).unwrap();
        let par = g.contributions(&asg, true).unwrap();
        assert_eq!(seq, par);
        assert_relative_eq!(seq.iter().sum::<f64>(), g.evaluate(&asg).unwrap());
    }

}
