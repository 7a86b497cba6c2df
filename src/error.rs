//! Error module for the Rusty DYNAP-se toolkit.
use std::error::Error;
use std::fmt;

/// Error types for the library.
#[derive(Debug, PartialEq, Clone)]
pub enum DynapseError {
    /// Error for invalid configuration, e.g., unknown synapse type or bad connection policy parameters.
    InvalidConfiguration(String),
    /// Error for out of range values, e.g., address overflow beyond the physical chips or oversized delays.
    OutOfRange(String),
    /// Error for operations producing no result, e.g., a filter matching no event.
    EmptyResult(String),
    /// Error for I/O operations.
    Io(String),
}

impl fmt::Display for DynapseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DynapseError::InvalidConfiguration(e) => write!(f, "Invalid configuration: {}", e),
            DynapseError::OutOfRange(e) => write!(f, "Out of range: {}", e),
            DynapseError::EmptyResult(e) => write!(f, "Empty result: {}", e),
            DynapseError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl Error for DynapseError {}

impl From<std::io::Error> for DynapseError {
    fn from(e: std::io::Error) -> Self {
        DynapseError::Io(e.to_string())
    }
}
