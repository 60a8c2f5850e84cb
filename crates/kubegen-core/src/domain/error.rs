// ============================================================================
// domain/error.rs - GENERATION PIPELINE ERRORS
// ============================================================================

use thiserror::Error;

use crate::domain::value_objects::FileId;

/// Root domain error type.
///
/// All errors are:
/// - Cloneable (builders and patches are pure, so errors are plain data)
/// - Categorizable (for CLI display and exit codes)
/// - Actionable (provides suggestions)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    // ========================================================================
    // Configuration Errors (always raised before any output is produced)
    // ========================================================================
    #[error("option path not found: '{path}'")]
    PathNotFound { path: String },

    #[error("cyclic option reference: {cycle}")]
    CyclicReference { cycle: String },

    #[error("invalid option path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("option '{path}' must be a {expected}")]
    InvalidOptionValue { path: String, expected: &'static str },

    #[error("builder '{builder}' is missing required option '{path}'")]
    MissingConfig { builder: String, path: String },

    #[error("build item '{item}' cannot be built, missing options: {}", missing.join(", "))]
    UnbuildableItem { item: String, missing: Vec<String> },

    #[error("{family} role '{role}' is already registered")]
    DuplicateRole { family: &'static str, role: String },

    #[error("no {family} registered for role '{role}'")]
    UnknownRole { family: &'static str, role: String },

    #[error("{kind} '{name}' is already declared")]
    DuplicateResource { kind: &'static str, name: String },

    #[error("unknown provider '{name}'")]
    UnknownProvider { name: String },

    // ========================================================================
    // Build Errors
    // ========================================================================
    #[error("builder '{builder}' has no build item named '{item}'")]
    UnknownBuildItem { builder: String, item: String },

    #[error("builder '{builder}' never emits an object named '{name}'")]
    UnknownObject { builder: String, name: String },

    #[error("duplicate object identity in strict build: {identity}")]
    DuplicateIdentity { identity: String },

    // ========================================================================
    // Patch Errors
    // ========================================================================
    #[error("patch target '{path}' is not a mapping in object {object}")]
    PathNotMapping { path: String, object: String },

    // ========================================================================
    // Assembly Errors
    // ========================================================================
    #[error("file {file} references file {referenced}, which was never appended")]
    DanglingReference { file: FileId, referenced: FileId },

    #[error("file {file} references file {referenced}, which is appended after it")]
    ForwardReference { file: FileId, referenced: FileId },

    #[error("invalid file template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("no output file with identity {id}")]
    UnknownFile { id: FileId },

    #[error("output file {id} is not a {expected} file")]
    FileKindMismatch { id: FileId, expected: &'static str },
}

impl DomainError {
    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::PathNotFound { path } => vec![
                format!("Define '{}' in the option tree or a values file", path),
                "Check deferred references for typos in their target path".into(),
            ],
            Self::CyclicReference { cycle } => vec![
                "Deferred references must eventually point at a concrete value".into(),
                format!("Break the cycle: {}", cycle),
            ],
            Self::MissingConfig { builder, path } => vec![
                format!("Builder '{}' needs option '{}'", builder, path),
                "Pass it in the builder options or as a !root reference".into(),
            ],
            Self::UnbuildableItem { item, missing } => vec![
                format!("Build item '{}' needs: {}", item, missing.join(", ")),
                "Validation ran before any output was produced; nothing was written".into(),
            ],
            Self::UnknownRole { family, role } => vec![
                format!("Register a {} under role '{}' before building", family, role),
                "Providers register their defaults under role 'default'".into(),
            ],
            Self::UnknownProvider { name } => vec![
                format!("'{}' is not a supported provider", name),
                "Supported: k3d, google-gke, amazon-eks, digitalocean-kubernetes".into(),
            ],
            Self::UnknownBuildItem { builder, .. } => vec![format!(
                "Use one of the build items declared by builder '{}'",
                builder
            )],
            Self::PathNotMapping { path, .. } => vec![
                format!("'{}' must already exist as a mapping to merge into it", path),
                "Use a replace operation to create new subtrees".into(),
            ],
            Self::DanglingReference { referenced, .. } => vec![
                format!("Append file {} to the project before materializing", referenced),
                "File identities are only assigned by OutputProject::append".into(),
            ],
            Self::ForwardReference { .. } => vec![
                "Strict reference mode only allows references to earlier files".into(),
                "Append the referenced file first or disable strict references".into(),
            ],
            _ => vec!["See documentation for more details".into()],
        }
    }

    /// Error category, following the pipeline stage that raised it.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PathNotFound { .. }
            | Self::CyclicReference { .. }
            | Self::InvalidPath { .. }
            | Self::InvalidOptionValue { .. }
            | Self::MissingConfig { .. }
            | Self::UnbuildableItem { .. }
            | Self::DuplicateRole { .. }
            | Self::UnknownRole { .. }
            | Self::DuplicateResource { .. }
            | Self::UnknownProvider { .. } => ErrorCategory::Configuration,
            Self::UnknownBuildItem { .. }
            | Self::UnknownObject { .. }
            | Self::DuplicateIdentity { .. } => ErrorCategory::Build,
            Self::PathNotMapping { .. } => ErrorCategory::Patch,
            Self::DanglingReference { .. }
            | Self::ForwardReference { .. }
            | Self::InvalidTemplate { .. }
            | Self::UnknownFile { .. }
            | Self::FileKindMismatch { .. } => ErrorCategory::Assembly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Build,
    Patch,
    Assembly,
}

pub type DomainResult<T> = Result<T, DomainError>;
