use thiserror::Error;

/// Errors raised while building, evaluating or approximating a factor graph.
/// None of those conditions is recovered internally: they propagate up to the
/// caller that triggered the model evaluation or the inference sweep.
/// Failing to converge is not an error (see meanfield::Convergence).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GraphError {

    /// A value was supplied for a variable whose identity does not map to any
    /// parameter of the model tree (stale or foreign variable), or a model tree
    /// parameter has no value in the supplied arguments.
    #[error("no parameter for variable {variable}")]
    UnknownVariable { variable : String },

    /// Graph or factor evaluation without a value for every declared variable.
    #[error("factor {factor} requires a value for variable {variable}")]
    IncompleteAssignment { factor : String, variable : String },

    /// The wrapped likelihood function failed for the informed assignment.
    #[error("likelihood evaluation failed at factor {factor}: {source}")]
    Likelihood {
        factor : String,
        #[source]
        source : Box<dyn std::error::Error + Send + Sync + 'static>
    },

    #[error("factor {factor} returned a non-finite log-density")]
    NonFinite { factor : String },

    #[error("variable {variable} expects {expected} elements but {found} were informed")]
    Dimension { variable : String, expected : usize, found : usize },

    #[error("variable {variable} declared more than once by factor {factor}")]
    DuplicateVariable { factor : String, variable : String },

    /// The approximation was initialized without a message for a graph variable.
    #[error("no message informed for variable {variable}")]
    MissingMessage { variable : String },

    /// An update produced a message with non-positive precision.
    #[error("update for variable {variable} yielded an improper message")]
    ImproperMessage { variable : String },

    #[error("invalid prior: {0}")]
    InvalidPrior(String),

    /// Expectation over the neighbours of a factor would require too many evaluations.
    #[error("quadrature over factor {factor} requires {points} points")]
    Quadrature { factor : String, points : usize },

    #[error("parse error: {0}")]
    Parse(String),

    /// A node was inserted at a tree leaf (parameter or constant) instead of a branch.
    #[error("cannot insert node {name} at a leaf")]
    NotABranch { name : String },

    #[error("invalid mean-field settings: {0}")]
    InvalidSettings(String),

    #[error("no label for parameter {0}")]
    MissingLabel(String),

    #[error("no format for parameter {0}")]
    MissingFormat(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error)

}
