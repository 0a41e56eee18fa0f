//! Error types for the engine.

use thiserror::Error;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A command-line argument was missing its value
    #[error("Missing value for argument: {0}")]
    MissingArgument(String),

    /// A command-line argument could not be parsed
    #[error("Invalid value for {name}: {value}")]
    InvalidArgument {
        /// Argument name as given on the command line
        name: String,
        /// Raw value that failed to parse
        value: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
