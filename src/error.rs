//! Error types for the lottery client.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that terminate a client run.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The bets source could not be opened
    #[error("failed to open bets source {}: {source}", .path.display())]
    SourceOpen { path: PathBuf, source: io::Error },

    /// I/O fault while reading the bets source
    #[error("failed to read bets source at line {line}: {source}")]
    SourceRead { line: usize, source: io::Error },

    /// Could not establish the server connection
    #[error("failed to connect to {address}: {source}")]
    Connect { address: String, source: io::Error },

    /// Failed to write a full message to the server
    #[error("failed to send message: {source}")]
    Write { source: io::Error },

    /// Failed to read a full response line from the server
    #[error("failed to read response: {source}")]
    Read { source: io::Error },

    /// Response does not match the expected framing
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Server answered a batch with something other than the success token
    #[error("server rejected batch {batch} ({records} bets): {response}")]
    RejectedBatch {
        batch: usize,
        records: usize,
        response: String,
    },

    /// The run was interrupted by a termination request
    #[error("client run cancelled by shutdown request")]
    Cancelled,

    /// The termination handler could not be registered
    #[error("failed to install termination handler: {0}")]
    Signal(#[from] ctrlc::Error),

    /// Invalid or unreadable configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::Config(err.to_string())
    }
}

/// Reasons a single source line is skipped.
///
/// These never abort a run; the batch reader logs and counts them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("empty line")]
    Empty,

    #[error("failed to parse CSV line: {0}")]
    Csv(String),

    #[error("invalid CSV format: expected {expected} fields, got {got}")]
    FieldCount { expected: usize, got: usize },

    #[error("missing value for field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' contains reserved protocol token {token:?}")]
    ReservedToken { field: &'static str, token: String },

    #[error("invalid number '{0}': expected a positive integer")]
    InvalidNumber(String),
}
