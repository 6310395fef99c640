//! Error handling for the tcpsweep scanner
//!
//! Only configuration problems are fatal. Address parse errors are recovered
//! by the expander, host task failures by the coordinator, and probe failures
//! never leave the prober at all (see [`crate::network::ProbeOutcome`]).

use std::net::IpAddr;
use thiserror::Error;

/// Main error type for scanning operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid address spec '{spec}': {reason}")]
    AddressParse { spec: String, reason: String },

    #[error("Scan of {address} failed: {reason}")]
    TaskFailed { address: IpAddr, reason: String },
}

impl ScanError {
    /// Shorthand for building a [`ScanError::ConfigError`]
    pub fn config(message: impl Into<String>) -> Self {
        ScanError::ConfigError(message.into())
    }

    /// Shorthand for building a [`ScanError::AddressParse`]
    pub fn address(spec: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ScanError::AddressParse {
            spec: spec.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error must stop the run before it starts
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::ConfigError(_))
    }
}

/// Result type alias for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(ScanError::config("tcp_ports missing").is_fatal());
        assert!(!ScanError::address("not-an-ip", "bad").is_fatal());
        assert!(!ScanError::TaskFailed {
            address: "10.0.0.1".parse().unwrap(),
            reason: "panicked".into(),
        }
        .is_fatal());
    }

    #[test]
    fn test_address_error_message_names_the_spec() {
        let err = ScanError::address("10.0.0.0/33", "invalid prefix");
        assert_eq!(
            err.to_string(),
            "Invalid address spec '10.0.0.0/33': invalid prefix"
        );
    }
}
