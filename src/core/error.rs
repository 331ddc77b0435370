//! Errors raised at the token-ingestion boundary.
//!
//! The engine itself never fails: a misprediction is a signal, and an empty
//! energy budget degrades magnitudes instead of aborting a tick.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FieldError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("empty token")]
    EmptyToken,

    #[error("invalid token {0:?}: tokens may not contain whitespace")]
    InvalidToken(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Check a single token before it reaches the field.
pub fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(FieldError::EmptyToken);
    }
    if token.chars().any(char::is_whitespace) {
        return Err(FieldError::InvalidToken(token.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_spaced_tokens_are_rejected() {
        assert_eq!(validate_token(""), Err(FieldError::EmptyToken));
        assert_eq!(
            validate_token("a b"),
            Err(FieldError::InvalidToken("a b".to_string()))
        );
        assert!(validate_token("42").is_ok());
    }
}
