use thiserror::Error;

/// Failure to turn expression text into an [`Expression`](crate::expression::Expression).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("expression is empty")]
    EmptyExpression,

    #[error("unexpected character `{found}` at offset {position}")]
    UnexpectedCharacter { position: usize, found: char },

    #[error("unexpected `{found}` at offset {position}, expected {expected}")]
    UnexpectedToken {
        position: usize,
        found: String,
        expected: &'static str,
    },

    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("expression nests too deeply at offset {position}")]
    TooDeep { position: usize },
}

/// Failure to evaluate an expression for a single row.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("column `{0}` has no result for this row")]
    MissingResult(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("function `{name}` expects {expected} argument(s), got {got}")]
    Arity {
        name: &'static str,
        expected: String,
        got: usize,
    },
}

/// Structural failures of calculation mutations. These block the mutation.
#[derive(Debug, Error)]
pub enum CalculationError {
    #[error("a calculation named `{0}` already exists")]
    DuplicateName(String),

    #[error("calculation name must not be empty")]
    EmptyName,

    #[error("unknown calculation `{0}`")]
    UnknownCalculation(String),

    #[error("dependency cycle: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid rows: {0}")]
    InvalidRows(String),
}

pub type CalcResult<T> = Result<T, CalculationError>;
