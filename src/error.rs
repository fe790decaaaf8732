use thiserror::Error;

use crate::types::DataType;

pub type Result<T, E = QueryError> = std::result::Result<T, E>;

/// Errors raised while compiling or evaluating a query.
///
/// Analysis-time variants carry the offending subtree rendered with the
/// plan/expression formatter so callers can print it without holding on
/// to the tree itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("relation not found: {0}")]
    RelationNotFound(String),

    #[error("ambiguous reference {name}, candidates: {candidates}")]
    AmbiguousReference { name: String, candidates: String },

    #[error("unresolved attribute {name} in:\n{plan}")]
    UnresolvedAttribute { name: String, plan: String },

    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("expression {expr} is neither an aggregate nor part of the grouping expressions {grouping}")]
    NonGroupingReference { expr: String, grouping: String },

    #[error("incompatible types {0} and {1}")]
    IncompatibleTypes(DataType, DataType),

    #[error("cannot cast value {value} to {target}")]
    CastFailed { value: String, target: DataType },

    #[error("division by zero")]
    DivisionByZero,

    #[error("index {index} out of bounds, length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("null value passed to a function that does not accept nulls: {0}")]
    NullDereference(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("invariant violated after batch {batch}: {description}")]
    InvariantViolated { batch: String, description: String },

    #[error("batch {batch} did not reach a fixpoint in {max_iterations} iterations")]
    RuleFixpointExceeded { batch: String, max_iterations: usize },

    #[error("node {node} rebuilt with {actual} children, expected {expected}")]
    TreeShapeMismatch { node: String, expected: usize, actual: usize },

    #[error("analysis error: {message}\n{plan}")]
    Analysis { message: String, plan: String },

    #[error("plan error: {0}")]
    Plan(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl QueryError {
    pub fn analysis(message: impl Into<String>, plan: impl Into<String>) -> Self {
        QueryError::Analysis { message: message.into(), plan: plan.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        QueryError::Internal(message.into())
    }
}
