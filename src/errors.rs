use thiserror::Error;

/// Failure modes of the loader and allocation engine.
///
/// Every variant is fatal to the computation that raised it: a partially
/// reconciled table would violate the exact-sum contract, so callers get a
/// failed `Result` instead of partial rows.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("required subcategory '{0}' is missing from the aggregate record set")]
    MissingKey(String),
    #[error("value for '{field}' cannot be parsed as a number: '{value}'")]
    InvalidFormat { field: String, value: String },
    #[error("division by zero: {0}")]
    DivisionByZero(&'static str),
    #[error("no regions configured")]
    EmptyInput,
    #[error("region '{0}' has a non-positive weight")]
    NonPositiveWeight(String),
}
