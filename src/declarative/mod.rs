use std::collections::{HashMap, HashSet};
use std::iter::FromIterator;
use std::ops::Mul;
use std::sync::Arc;
use tracing::debug;
use crate::graph::{Variable, Assignment, Factor, FactorGraph, compose};
use crate::model::{ModelTree, Instance};
use crate::message::{Message, NormalMessage};
use crate::meanfield::MeanFieldApproximation;
use crate::text::{self, FormatterConfig, TextFormatter};
use crate::error::GraphError;

/// Log-likelihood of a model, as a function of a concrete instance of it.
pub type LikelihoodFn = dyn Fn(&Instance) -> anyhow::Result<f64> + Send + Sync;

/// A factor whose variables are the distinct parameters of a model tree, and whose
/// function rebuilds a concrete instance of the model from the values it receives
/// before calling the likelihood. Values are matched to tree positions by variable
/// identity: a value for a variable that is not a parameter of the tree fails with
/// an unknown-variable error rather than being dropped.
#[derive(Clone)]
pub struct ModelFactor {

    tree : Arc<ModelTree>,

    likelihood : Arc<LikelihoodFn>,

    /// Parameters of the tree, by identity.
    index : Arc<HashMap<usize, Variable>>,

    factor : Factor

}

impl ModelFactor {

    pub fn new<F>(name : &str, tree : ModelTree, likelihood : F) -> Result<Self, GraphError>
    where
        F : Fn(&Instance) -> anyhow::Result<f64> + Send + Sync + 'static
    {
        let tree = Arc::new(tree);
        let likelihood : Arc<LikelihoodFn> = Arc::new(likelihood);
        let variables = tree.priors();
        let index : Arc<HashMap<usize, Variable>> = Arc::new(variables.iter().map(|v| (v.id(), v.clone()) ).collect());
        let (t, l, ix) = (tree.clone(), likelihood.clone(), index.clone());
        let factor = Factor::new(name, variables, move |asg : &Assignment| {
            let instance = resolve(&t, &ix, asg)?;
            l(&instance)
        })?;
        debug!(factor = name, parameters = index.len(), "created model factor");
        Ok(Self { tree, likelihood, index, factor })
    }

    /// Evaluates the likelihood for the informed values, which should cover every
    /// parameter of the tree and nothing else.
    pub fn call(&self, arguments : &Assignment) -> Result<f64, GraphError> {
        let instance = resolve(&self.tree, &self.index, arguments)?;
        match (self.likelihood)(&instance) {
            Ok(lp) if lp.is_nan() => Err(GraphError::NonFinite { factor : self.factor.name().to_string() }),
            Ok(lp) => Ok(lp),
            Err(e) => match e.downcast::<GraphError>() {
                Ok(err) => Err(err),
                Err(e) => Err(GraphError::Likelihood { factor : self.factor.name().to_string(), source : e.into() })
            }
        }
    }

    pub fn factor(&self) -> &Factor {
        &self.factor
    }

    pub fn tree(&self) -> &ModelTree {
        &self.tree
    }

    pub fn name(&self) -> &str {
        self.factor.name()
    }

}

fn resolve(
    tree : &ModelTree,
    index : &HashMap<usize, Variable>,
    arguments : &Assignment
) -> Result<Instance, GraphError> {
    let mut resolved = Assignment::with_capacity(arguments.len());
    for (v, x) in arguments.iter() {
        let param = index.get(&v.id()).ok_or_else(|| GraphError::UnknownVariable { variable : v.label() })?;
        resolved.insert(param.clone(), x.clone());
    }
    tree.instance_for_arguments(&resolved)
}

/// A sub-model paired with its likelihood: the unit users declare. The model factor
/// is built once, so composing the same model twice (or clones of it) keeps a
/// single copy of its likelihood in the graph.
///
/// ```
/// use graphfit::*;
/// # fn main() -> Result<(), GraphError> {
/// let tree = ModelTree::branch().with_prior("centre", Prior::gaussian(0.0, 10.0))?;
/// let model = LikelihoodModel::new("obs", tree, |inst : &Instance| {
///     Ok(-0.5 * (3.0 - inst.scalar("centre")?).powi(2))
/// })?;
/// let graph = model.graph()?;
/// assert_eq!(graph.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LikelihoodModel {
    factor : ModelFactor
}

impl LikelihoodModel {

    pub fn new<F>(name : &str, tree : ModelTree, likelihood : F) -> Result<Self, GraphError>
    where
        F : Fn(&Instance) -> anyhow::Result<f64> + Send + Sync + 'static
    {
        Ok(Self { factor : ModelFactor::new(name, tree, likelihood)? })
    }

    pub fn name(&self) -> &str {
        self.factor.name()
    }

    pub fn tree(&self) -> &ModelTree {
        self.factor.tree()
    }

    pub fn model_factor(&self) -> &ModelFactor {
        &self.factor
    }

    pub fn factor(&self) -> &Factor {
        self.factor.factor()
    }

    /// Collection holding only this model.
    pub fn collection(&self) -> LikelihoodModelCollection {
        LikelihoodModelCollection::new(vec![self.clone()])
    }

    pub fn priors(&self) -> Vec<Variable> {
        self.tree().priors()
    }

    pub fn prior_factors(&self) -> Result<Vec<Factor>, GraphError> {
        self.collection().prior_factors()
    }

    /// Initial message of each variable of this model, converted from its prior.
    pub fn message_dict(&self) -> Result<HashMap<Variable, NormalMessage>, GraphError> {
        self.collection().message_dict()
    }

    pub fn graph(&self) -> Result<FactorGraph, GraphError> {
        self.collection().graph()
    }

    pub fn mean_field_approximation(&self) -> Result<MeanFieldApproximation, GraphError> {
        self.collection().mean_field_approximation()
    }

}

/// An ordered set of likelihood models fit jointly. Sub-models sharing a variable (the
/// same variable object in their trees) constrain it together; the joint graph holds
/// every model factor plus one prior factor per distinct variable.
#[derive(Clone, Default)]
pub struct LikelihoodModelCollection {
    models : Vec<LikelihoodModel>
}

impl LikelihoodModelCollection {

    pub fn new(models : Vec<LikelihoodModel>) -> Self {
        let mut coll = Self::default();
        coll.extend(models);
        coll
    }

    pub fn models(&self) -> &[LikelihoodModel] {
        &self.models[..]
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Distinct variables over all models, in order of first appearance.
    pub fn priors(&self) -> Vec<Variable> {
        let mut seen = HashSet::new();
        self.models.iter()
            .flat_map(|m| m.priors().into_iter() )
            .filter(|v| seen.insert(v.id()) )
            .collect()
    }

    pub fn prior_factors(&self) -> Result<Vec<Factor>, GraphError> {
        self.priors().iter().map(Factor::prior).collect()
    }

    /// Initial messages, matching the declared prior of each variable.
    pub fn message_dict(&self) -> Result<HashMap<Variable, NormalMessage>, GraphError> {
        let mut messages = HashMap::new();
        for v in self.priors() {
            let msg = NormalMessage::from_prior(v.prior(), v.dim())?;
            messages.insert(v, msg);
        }
        Ok(messages)
    }

    /// Joint graph: every model factor followed by the prior factors.
    pub fn graph(&self) -> Result<FactorGraph, GraphError> {
        let factors = self.models.iter().map(|m| m.factor().clone() ).chain(self.prior_factors()?.into_iter());
        Ok(compose(factors))
    }

    pub fn mean_field_approximation(&self) -> Result<MeanFieldApproximation, GraphError> {
        MeanFieldApproximation::new(self.graph()?, self.message_dict()?)
    }

    /// Path of the variable at the first model holding it, joined by underscores.
    pub fn name_for_prior(&self, v : &Variable) -> Option<String> {
        self.models.iter().find_map(|m| m.tree().name_for_prior(v) )
    }

    /// Fixed-width report of the approximate posterior: for each model, the mean and the
    /// mean -+ sigma standard deviation interval of each of its parameters, nested by
    /// tree path. Variables shared by several models are reported under the first one.
    pub fn summary(
        &self,
        approx : &MeanFieldApproximation,
        config : &FormatterConfig,
        sigma : f64
    ) -> Result<String, GraphError> {
        let mut out = TextFormatter::new(config.clone());
        let mut seen = HashSet::new();
        for (i, model) in self.models.iter().enumerate() {
            let prefix = if self.models.iter().filter(|m| m.name() == model.name() ).count() > 1 {
                format!("{}_{}", model.name(), i)
            } else {
                model.name().to_string()
            };
            for (mut path, v) in model.tree().parameters() {
                if !seen.insert(v.id()) {
                    continue;
                }
                let msg = approx.message(&v).ok_or_else(|| GraphError::MissingMessage { variable : v.label() })?;
                let (mean, sd) = (msg.mean(), msg.sigma());
                if path.is_empty() {
                    path.push(v.name().to_string());
                }
                let name = path.join("_");
                for j in 0..v.dim() {
                    let limits = (mean[j] - sigma * sd[j], mean[j] + sigma * sd[j]);
                    let value = text::value_with_limits_string(config, &name[..], mean[j], Some(limits), None)?;
                    let mut keys : Vec<String> = path.clone();
                    if v.dim() > 1 {
                        if let Some(last) = keys.last_mut() {
                            *last = format!("{}_{}", last, j);
                        }
                    }
                    let mut full : Vec<&str> = Vec::with_capacity(keys.len() + 1);
                    if self.models.len() > 1 {
                        full.push(&prefix[..]);
                    }
                    full.extend(keys.iter().map(|k| &k[..] ));
                    out.add(&full[..], value);
                }
            }
        }
        Ok(out.text())
    }

}

impl FromIterator<LikelihoodModel> for LikelihoodModelCollection {

    fn from_iter<I : IntoIterator<Item=LikelihoodModel>>(iter : I) -> Self {
        let mut coll = Self::default();
        coll.extend(iter);
        coll
    }

}

impl Extend<LikelihoodModel> for LikelihoodModelCollection {

    // Models already present (same factor identity) are not repeated.
    fn extend<I : IntoIterator<Item=LikelihoodModel>>(&mut self, iter : I) {
        for m in iter {
            if !self.models.iter().any(|other| other.factor().id() == m.factor().id() ) {
                self.models.push(m);
            }
        }
    }

}

impl From<LikelihoodModel> for LikelihoodModelCollection {

    fn from(model : LikelihoodModel) -> Self {
        model.collection()
    }

}

impl Mul<LikelihoodModel> for LikelihoodModel {

    type Output = LikelihoodModelCollection;

    fn mul(self, rhs : LikelihoodModel) -> LikelihoodModelCollection {
        LikelihoodModelCollection::new(vec![self, rhs])
    }

}

impl Mul<LikelihoodModel> for LikelihoodModelCollection {

    type Output = LikelihoodModelCollection;

    fn mul(mut self, rhs : LikelihoodModel) -> LikelihoodModelCollection {
        self.extend(Some(rhs));
        self
    }

}

impl Mul<LikelihoodModelCollection> for LikelihoodModel {

    type Output = LikelihoodModelCollection;

    fn mul(self, rhs : LikelihoodModelCollection) -> LikelihoodModelCollection {
        let mut coll = self.collection();
        coll.extend(rhs.models);
        coll
    }

}

impl Mul<LikelihoodModelCollection> for LikelihoodModelCollection {

    type Output = LikelihoodModelCollection;

    fn mul(mut self, rhs : LikelihoodModelCollection) -> LikelihoodModelCollection {
        self.extend(rhs.models);
        self
    }

}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::prior::Prior;
    use crate::graph::scalar_assignment;
    use approx::assert_relative_eq;

    fn profile(centre : &Variable, obs : f64) -> LikelihoodModel {
        let tree = ModelTree::branch()
            .with("centre", centre).unwrap()
            .with_prior("intensity", Prior::gaussian(1.0, 1.0)).unwrap()
            .with("sigma", 1.0).unwrap();
        LikelihoodModel::new("profile", tree, move |inst : &Instance| {
            let c = inst.scalar("centre")?;
            let s = inst.scalar("sigma")?;
            Ok(-0.5 * ((obs - c) / s).powi(2))
        }).unwrap()
    }

    #[test]
    fn foreign_identity_is_rejected() {
        let centre = Variable::new("centre", Prior::gaussian(0.0, 1.0));
        let model = profile(&centre, 1.0);
        let intensity = model.priors()[1].clone();
        let impostor = Variable::new("centre", Prior::gaussian(0.0, 1.0));
        let asg = scalar_assignment(vec![(&impostor, 1.0), (&intensity, 1.0)]);
        assert!(matches!(model.model_factor().call(&asg), Err(GraphError::UnknownVariable { .. })));

        let asg = scalar_assignment(vec![(&centre, 0.0), (&intensity, 1.0)]);
        assert_relative_eq!(model.model_factor().call(&asg).unwrap(), -0.5);
        assert_relative_eq!(model.factor().evaluate(&asg).unwrap(), -0.5);
    }

    #[test]
    fn shared_variables_are_counted_once() {
        let centre = Variable::new("centre", Prior::gaussian(0.0, 1.0));
        let a = profile(&centre, 1.0);
        let b = profile(&centre, 2.0);
        let coll = a.clone() * b.clone();
        assert_eq!(a.priors().len() + b.priors().len(), 4);
        assert_eq!(coll.priors().len(), 3);
        let graph = coll.graph().unwrap();
        assert_eq!(graph.len(), 2 + 3);
        assert_eq!(graph.factors_for(&centre).len(), 3);

        let (ia, ib) = (a.priors()[1].clone(), b.priors()[1].clone());
        let asg = scalar_assignment(vec![(&centre, 0.5), (&ia, 2.0), (&ib, -1.0)]);
        let expected = a.factor().evaluate(&asg).unwrap()
            + b.factor().evaluate(&asg).unwrap()
            + [(&centre, 0.5), (&ia, 2.0), (&ib, -1.0)].iter().map(|(v, x)| v.prior().log_prob(*x) ).sum::<f64>();
        assert_relative_eq!(graph.evaluate(&asg).unwrap(), expected, epsilon = 1E-12);

        // Composing a model already in the collection does not duplicate it.
        let coll = coll * a;
        assert_eq!(coll.len(), 2);
    }

    #[test]
    fn likelihood_errors_name_the_model() {
        let tree = ModelTree::branch().with_prior("rate", Prior::uniform(0.0, 1.0)).unwrap();
        let model = LikelihoodModel::new("decay", tree, |_ : &Instance| Err(anyhow::anyhow!("negative rate")) ).unwrap();
        let mut approx = model.mean_field_approximation().unwrap();
        match approx.sweep() {
            Err(GraphError::Likelihood { factor, .. }) => assert_eq!(factor, "decay"),
            other => panic!("Unexpected result: {:?}", other)
        }
    }

    #[test]
    fn summary_reports_shared_variables_once() {
        let centre = Variable::new("centre", Prior::gaussian(0.0, 1.0));
        let coll = profile(&centre, 1.0) * profile(&centre, 2.0);
        let mut approx = coll.mean_field_approximation().unwrap();
        approx.run().unwrap();
        let config = FormatterConfig::default().with_format("centre", 2);
        let text = coll.summary(&approx, &config, 1.0).unwrap();
        println!("{}", text);
        assert_eq!(text.matches("centre").count(), 1);
        assert_eq!(text.matches("intensity").count(), 2);
        assert!(text.contains("profile_0"));
        assert!(text.contains("profile_1"));
    }

    #[test]
    fn single_model_exposes_prior_factors_and_messages() {
        let centre = Variable::new("centre", Prior::gaussian(2.0, 3.0));
        let model = profile(&centre, 1.0);
        let factors = model.prior_factors().unwrap();
        assert_eq!(factors.len(), 2);
        assert!(factors.iter().all(|f| f.closed_form().is_some() ));
        assert_eq!(factors[0].variables(), &[centre.clone()]);

        let messages = model.message_dict().unwrap();
        assert_eq!(messages.len(), 2);
        assert_relative_eq!(messages[&centre].mean()[0], 2.0);
        assert_relative_eq!(messages[&centre].variance()[0], 9.0);
        assert_eq!(messages, model.collection().message_dict().unwrap());
    }

}
