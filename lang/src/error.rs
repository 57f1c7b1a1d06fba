use crate::evaluator::EvalError;
use crate::tokenizer::TokenizeError;
use std::fmt;

/// Structural failure found before any term executes: unbalanced brackets
/// or parentheses, or illegal `lambda` nesting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateError {
    pub message: String,
}

impl ValidateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Unified error type over every stage of a calculation.
#[derive(Debug)]
pub enum CalcError {
    Tokenize(TokenizeError),
    Validate(ValidateError),
    Eval(EvalError),
}

impl From<TokenizeError> for CalcError {
    fn from(err: TokenizeError) -> Self {
        CalcError::Tokenize(err)
    }
}

impl From<ValidateError> for CalcError {
    fn from(err: ValidateError) -> Self {
        CalcError::Validate(err)
    }
}

impl From<EvalError> for CalcError {
    fn from(err: EvalError) -> Self {
        CalcError::Eval(err)
    }
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalcError::Tokenize(err) => write!(f, "{}", err.message),
            CalcError::Validate(err) => write!(f, "{}", err.message),
            CalcError::Eval(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CalcError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_error_display() {
        let err = CalcError::Validate(ValidateError::new("mismatched brackets (count: 1)"));
        assert_eq!(err.to_string(), "mismatched brackets (count: 1)");
    }

    #[test]
    fn eval_error_display_carries_term_index() {
        let err = CalcError::Eval(EvalError::at("division by zero", 4));
        let display = err.to_string();
        assert!(display.contains("term 4"));
        assert!(display.contains("division by zero"));
    }
}
