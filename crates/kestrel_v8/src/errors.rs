//! Failure taxonomy of the call protocol.
//!
//! `Display` of every variant is exactly the flat string the embedding
//! boundary returns, so `to_string()` bridges the tagged API and the
//! legacy single-channel result without loss.

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    /// The script failed to compile; carries the exception text.
    #[error("{0}")]
    Compile(String),

    /// Execution threw; carries the stack trace when one is available,
    /// the bare exception text otherwise.
    #[error("{0}")]
    Exception(String),

    /// The looked-up global is missing or not callable.
    #[error("TypeError: '{0}' is not a function")]
    NotAFunction(String),

    /// The argument payload did not parse as a JSON array.
    #[error("TypeError: '{0}' is not an array")]
    NotAnArray(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_the_flat_protocol() {
        assert_eq!(
            ScriptError::NotAFunction("missingFn".to_owned()).to_string(),
            "TypeError: 'missingFn' is not a function"
        );
        assert_eq!(
            ScriptError::NotAnArray("{}".to_owned()).to_string(),
            "TypeError: '{}' is not an array"
        );
        assert_eq!(
            ScriptError::Compile("SyntaxError: Unexpected end of input".to_owned()).to_string(),
            "SyntaxError: Unexpected end of input"
        );
        assert_eq!(
            ScriptError::Exception("Error: boom".to_owned()).to_string(),
            "Error: boom"
        );
    }
}
