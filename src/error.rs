use thiserror::Error;

/// Errors raised while setting up a problem or a schedule.
///
/// Nothing that happens inside a running search is reported here: failed
/// evaluations fold to zero satisfaction and misbehaving algorithms are simply
/// excluded from further runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("variable `{name}`: {reason}")]
    InvalidVariable { name: String, reason: String },

    #[error("duplicate variable name `{0}`")]
    DuplicateVariable(String),

    #[error("problem has no variables")]
    EmptyProblem,

    #[error("problem has no evaluator")]
    MissingEvaluator,

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("no value supplied for variable `{0}`")]
    MissingValue(String),

    #[error("expected {expected} values, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("invalid schedule configuration: {0}")]
    InvalidConfig(String),

    #[error("no search algorithms registered with the schedule")]
    NoAlgorithms,
}

pub type Result<T> = std::result::Result<T, Error>;
