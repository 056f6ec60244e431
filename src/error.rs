//! Error types for the fleet engine

use std::io;
use thiserror::Error;

/// Result type alias for fleet operations
pub type Result<T> = std::result::Result<T, FleetError>;

/// Coarse error classes, used by callers that only care about the category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rack, device, zone or policy absent
    NotFound,
    /// Re-registration of an existing rack or device
    DuplicateEntity,
    /// Non-positive capacity fields, empty zone names, inconsistent thresholds
    InvalidConfig,
    /// Telemetry arrived for a zone without a thermal policy
    PolicyNotConfigured,
    /// Store or I/O failure
    Internal,
}

/// Main error type for the fleet engine
#[derive(Error, Debug)]
pub enum FleetError {
    /// Rack not registered
    #[error("Rack not found: {0}")]
    RackNotFound(String),

    /// Device not registered
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// No rack references the zone
    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    /// No policy stored at the requested scope
    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    /// Rack already registered
    #[error("Rack already registered: {0}")]
    DuplicateRack(String),

    /// Device already registered
    #[error("Device already registered: {0}")]
    DuplicateDevice(String),

    /// Invalid rack or policy configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Telemetry value that cannot be evaluated (NaN, infinite)
    #[error("Invalid telemetry: {0}")]
    InvalidTelemetry(String),

    /// Zone has no thermal policy
    #[error("No thermal policy configured for zone {0}")]
    PolicyNotConfigured(String),

    /// Registry lock poisoned by a panicking writer
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FleetError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RackNotFound(_)
            | Self::DeviceNotFound(_)
            | Self::ZoneNotFound(_)
            | Self::PolicyNotFound(_) => ErrorKind::NotFound,
            Self::DuplicateRack(_) | Self::DuplicateDevice(_) => ErrorKind::DuplicateEntity,
            Self::InvalidConfig(_) | Self::InvalidTelemetry(_) | Self::Configuration(_) => {
                ErrorKind::InvalidConfig
            }
            Self::PolicyNotConfigured(_) => ErrorKind::PolicyNotConfigured,
            Self::StoreUnavailable(_) | Self::Io(_) | Self::Json(_) => ErrorKind::Internal,
        }
    }

    /// Whether this is a not-found error of any entity type
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn poisoned(what: &str) -> Self {
        Self::StoreUnavailable(format!("{} lock poisoned", what))
    }
}
