//! Core error type for Switchboard.
//!
//! `SwitchboardError` is used at the seams where a failure has to cross a
//! component boundary (config loading, discovery, oracle transport, query
//! rejection). Invocation errors never become a `SwitchboardError`: they are
//! captured in `CapabilityResult`s, and normalization is infallible.

use crate::oracle::OracleError;

#[derive(Debug, thiserror::Error)]
pub enum SwitchboardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Query rejected: {0}")]
    Validation(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, SwitchboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_is_distinct_from_other_errors() {
        let err = SwitchboardError::Validation("mutating keyword: drop".into());
        assert_eq!(err.to_string(), "Query rejected: mutating keyword: drop");
    }

    #[test]
    fn test_oracle_error_converts() {
        let err: SwitchboardError = OracleError::NotConfigured("no api key".into()).into();
        assert!(err.to_string().starts_with("Oracle error:"));
    }
}
