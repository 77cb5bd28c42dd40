//! Error types for the simulation pipeline
//!
//! The per-frame pipeline never fails; it degrades through sentinel values
//! instead. Errors only occur at the configuration boundary.

use std::fmt;

/// Errors that can occur while configuring or reseeding a simulation
#[derive(Debug, Clone)]
pub enum SimulationError {
    /// Configuration validation failed
    InvalidConfig(String),
    /// A position override did not match the active site count
    SiteCountMismatch {
        /// Number of active sites the simulation expects
        expected: usize,
        /// Number of positions that were provided
        provided: usize,
    },
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            SimulationError::SiteCountMismatch { expected, provided } => write!(
                f,
                "site count mismatch: expected {} positions, got {}",
                expected, provided
            ),
        }
    }
}

impl std::error::Error for SimulationError {}

/// Result type alias for simulation operations
pub type Result<T> = std::result::Result<T, SimulationError>;
