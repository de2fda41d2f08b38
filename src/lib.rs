/// Error type shared by graph construction, model reconstruction, inference and reporting.
pub mod error;

/// Declared prior distributions attached to each unknown quantity of a model.
pub mod prior;

/// Parametric beliefs over variables (Normal messages on the natural parameter scale),
/// closed under product and quotient.
pub mod message;

/// Variables, factors and their bipartite composition into factor graphs.
pub mod graph;

/// Hierarchical parameter trees: the tagged-variant representation of
/// composed sub-models and the concrete instances rebuilt from them.
pub mod model;

/// Declarative layer wrapping (sub-model, likelihood function) pairs into factors
/// and aggregating them, together with their prior factors, into a single graph.
pub mod declarative;

/// Mean-field variational approximation over a factor graph (iterative, synchronous
/// message updates with convergence diagnostics).
pub mod meanfield;

/// Fixed-width text rendering of posterior summaries.
pub mod text;

pub use error::GraphError;

pub use prior::Prior;

pub use message::{Message, Family, NormalMessage};

pub use graph::{Variable, Assignment, Factor, FactorGraph, compose};

pub use model::{ModelTree, Instance};

pub use declarative::{ModelFactor, LikelihoodModel, LikelihoodModelCollection};

pub use meanfield::{MeanFieldApproximation, MeanFieldSettings, Quadrature, Convergence, Marginal};

pub use text::{FormatterConfig, TextFormatter};
