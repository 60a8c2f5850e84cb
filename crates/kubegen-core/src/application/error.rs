//! Application layer errors.
//!
//! These errors represent failures in orchestration and at the ports, not
//! in generation logic. Generation errors are `DomainError` from
//! `crate::domain`.

use thiserror::Error;

use crate::domain::FileId;
use crate::error::ErrorCategory;

/// Errors that occur while serializing or persisting output.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApplicationError {
    /// A driver could not place, write or publish a file.
    #[error("Output driver error at {location}: {reason}")]
    Driver { location: String, reason: String },

    /// Documents could not be serialized.
    #[error("Failed to serialize {file}: {reason}")]
    Serialization { file: String, reason: String },

    /// The publish target already exists.
    #[error("Output already exists at {location}")]
    OutputExists { location: String },

    /// A driver chose the same location for two files.
    #[error("Files {first} and {second} were both placed at {location}")]
    LocationConflict {
        location: String,
        first: FileId,
        second: FileId,
    },

    /// Driver state lock poisoned.
    #[error("Output driver state is unavailable")]
    DriverLockError,

    /// Rollback failed (best-effort cleanup failed).
    #[error("Rollback failed: {reason}")]
    RollbackFailed { reason: String },

    /// Values or patch file could not be read or parsed.
    #[error("Invalid input file {path}: {reason}")]
    InvalidInput { path: String, reason: String },
}

impl ApplicationError {
    pub fn driver(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::Driver {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    /// Get user-actionable suggestions.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Driver { location, .. } => vec![
                format!("Failed to write: {}", location),
                "Check that you have write permissions".into(),
                "Nothing was published; the run can be retried once fixed".into(),
            ],
            Self::OutputExists { location } => vec![
                format!("Directory already exists: {}", location),
                "Choose a different --output directory".into(),
                "Or keep timestamped output directories enabled".into(),
            ],
            Self::LocationConflict { .. } => vec![
                "Give every output file a distinct name".into(),
            ],
            Self::InvalidInput { path, .. } => vec![
                format!("Check the syntax of {}", path),
                "Values files are YAML mappings; patch files are YAML lists of rules".into(),
            ],
            Self::RollbackFailed { .. } => vec![
                "Remove the leftover staging directory by hand".into(),
            ],
            _ => vec!["Check the error details above".into()],
        }
    }

    /// Get error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Driver { .. } | Self::DriverLockError | Self::RollbackFailed { .. } => {
                ErrorCategory::Output
            }
            Self::Serialization { .. } => ErrorCategory::Internal,
            Self::OutputExists { .. } | Self::LocationConflict { .. } => ErrorCategory::Assembly,
            Self::InvalidInput { .. } => ErrorCategory::Configuration,
        }
    }
}
