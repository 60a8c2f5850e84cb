//! Unified error handling for kubegen core.
//!
//! This module provides a unified error type that wraps domain and application
//! errors, with rich context and user-actionable suggestions.

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::{self, DomainError};

/// Root error type for kubegen core operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KubegenError {
    /// Errors from the domain layer (configuration, build, patch, assembly).
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// Errors from the application layer (serialization, drivers).
    #[error("{0}")]
    Application(#[from] ApplicationError),

    /// Configuration or setup errors.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Unexpected internal errors (bugs).
    #[error("Internal error: {message}. This is a bug, please report it.")]
    Internal { message: String },
}

impl KubegenError {
    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Domain(e) => e.suggestions(),
            Self::Application(e) => e.suggestions(),
            Self::Configuration { message } => vec![
                format!("Configuration issue: {}", message),
                "Run `kubegen config list` to inspect the effective configuration".into(),
            ],
            Self::Internal { .. } => vec!["This appears to be a bug in kubegen".into()],
        }
    }

    /// Get error category for display/styling purposes.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Domain(_) if self.is_not_found() => ErrorCategory::NotFound,
            Self::Domain(e) => e.category().into(),
            Self::Application(e) => e.category(),
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Whether the error names something that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Domain(
                DomainError::PathNotFound { .. }
                    | DomainError::UnknownProvider { .. }
                    | DomainError::UnknownRole { .. }
                    | DomainError::UnknownFile { .. }
            )
        )
    }
}

/// Error categories for UI display and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    NotFound,
    Build,
    Patch,
    Assembly,
    Output,
    Internal,
}

impl From<domain::ErrorCategory> for ErrorCategory {
    fn from(category: domain::ErrorCategory) -> Self {
        match category {
            domain::ErrorCategory::Configuration => Self::Configuration,
            domain::ErrorCategory::Build => Self::Build,
            domain::ErrorCategory::Patch => Self::Patch,
            domain::ErrorCategory::Assembly => Self::Assembly,
        }
    }
}

/// Convenient result type alias.
pub type KubegenResult<T> = Result<T, KubegenError>;

/// Extension trait for adding context to errors.
pub trait Context<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> KubegenResult<T>;
}

impl<T, E> Context<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: impl Into<String>) -> KubegenResult<T> {
        self.map_err(|e| KubegenError::Internal {
            message: format!("{}: {}", msg.into(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_takes_precedence_over_domain_category() {
        let err = KubegenError::from(DomainError::UnknownProvider {
            name: "azure".into(),
        });
        assert_eq!(err.category(), ErrorCategory::NotFound);

        let err = KubegenError::from(DomainError::CyclicReference {
            cycle: "a -> b -> a".into(),
        });
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn context_wraps_as_internal() {
        let res: Result<(), std::io::Error> = Err(std::io::Error::other("boom"));
        let err = res.context("reading").unwrap_err();
        assert!(matches!(err, KubegenError::Internal { .. }));
        assert!(err.to_string().contains("reading: boom"));
    }
}
