//! Error types for the Encounter routing engine

use thiserror::Error;

/// Top-level error type for the Encounter routing engine
#[derive(Debug, Error)]
pub enum EncounterError {
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors related to node identity
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid identity format: {0}")]
    InvalidFormat(String),

    #[error("Identity has no ordinal index: {0}")]
    MissingIndex(String),
}

/// Fatal configuration errors
///
/// These are raised when a node is constructed, never while it routes.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing setting: {0}")]
    Missing(&'static str),

    #[error("Setting {name} must be finite and non-negative, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("Setting {name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("Initial energy range is inverted: {min} > {max}")]
    InvertedRange { min: f64, max: f64 },

    #[error("Initial energy must have one or two values, got {0}")]
    EnergyArity(usize),

    #[error("Initial replica count must be at least 1")]
    NoCopies,
}

/// Result type alias for Encounter operations
pub type EncounterResult<T> = Result<T, EncounterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_error_display() {
        let err = IdentityError::InvalidFormat("bad".to_string());
        assert!(format!("{}", err).contains("Invalid identity format"));
        assert!(format!("{}", err).contains("bad"));

        let err = IdentityError::MissingIndex("n".to_string());
        assert!(format!("{}", err).contains("no ordinal"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Negative {
            name: "scan_energy",
            value: -1.0,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("scan_energy"));
        assert!(msg.contains("-1"));

        let err = ConfigError::InvertedRange { min: 5.0, max: 1.0 };
        assert!(format!("{}", err).contains("inverted"));

        assert!(format!("{}", ConfigError::EnergyArity(3)).contains("3"));
        assert!(format!("{}", ConfigError::Missing("transmit_energy")).contains("transmit_energy"));
    }

    #[test]
    fn test_error_conversions() {
        let err: EncounterError = IdentityError::InvalidFormat("x".to_string()).into();
        assert!(matches!(err, EncounterError::Identity(_)));

        let err: EncounterError = ConfigError::NoCopies.into();
        assert!(matches!(err, EncounterError::Config(_)));
        assert!(format!("{}", err).contains("Configuration error"));
    }
}
