//! Error types for the estimation primitives
//!
//! Expected "no value yet" conditions (an unseeded regression, an empty
//! statistic) are ordinary `Option` results, not errors. Errors here are
//! reserved for construction-time parameter problems.

use thiserror::Error;

/// Error type for the estimation primitives
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameter provided to a constructor
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Numerical computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error for a parameter outside its valid range
    pub fn out_of_range(name: &str, value: f64, range: &str) -> Self {
        Self::InvalidParameter(format!("{name} = {value} must be in {range}"))
    }

    /// Create an error for NaN/Inf parameter values
    pub fn non_finite(name: &str) -> Self {
        Self::InvalidParameter(format!("{name} must be finite"))
    }
}
