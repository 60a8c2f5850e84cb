//! kubegen Core - Hexagonal Architecture Implementation
//!
//! This crate provides the domain and application layers for kubegen, a
//! declarative generator of Kubernetes manifests and apply scripts.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           kubegen-cli (CLI)             │
//! │     (Generation pipeline, commands)     │
//! └──────────────────┬──────────────────────┘
//!                    │ calls
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │         Application Services            │
//! │  (Generator, OutputProject::materialize)│
//! └──────────────────┬──────────────────────┘
//!                    │ uses
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │      Application Ports (Traits)         │
//! │  (OutputDriver, DocumentSerializer)     │
//! └──────────────────┬──────────────────────┘
//!                    │ implemented by
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │   kubegen-adapters (Infrastructure)     │
//! │ (Drivers, YAML, providers, stacks)      │
//! └─────────────────────────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │         Domain Layer (Pure Logic)       │
//! │ (OptionStore, Builder, Patch, Output)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kubegen_core::prelude::*;
//! # fn run(provider: std::sync::Arc<Provider>, driver: &dyn OutputDriver, yaml: &dyn DocumentSerializer) -> KubegenResult<()> {
//! let options = OptionStore::build(serde_json::json!({
//!     "namespaces": {"default": "default", "mon": "monitoring"},
//! }))?;
//! let kg = Generator::new(provider, options);
//!
//! let mut project = OutputProject::new();
//! let script = project.append(ScriptFile::new("create.sh"));
//! let mut storage = DocumentFile::new("storage.yaml");
//! storage.extend(kg.persistent_volume_build()?);
//! let storage = project.append(storage);
//! project
//!     .script_mut(script)?
//!     .append_template_str(&format!("kubectl apply -f {}", FileTemplate::placeholder(storage)))?;
//!
//! project.materialize(driver, yaml)?;
//! # Ok(())
//! # }
//! ```

// Re-export domain layer (stable, well-defined API)
pub mod domain;

// Re-export application layer (orchestration logic)
pub mod application;

// Re-export error types
pub mod error;

// Public API - what external crates should use
pub mod prelude {
    pub use crate::application::{
        ApplicationError, Generator, WrittenFile,
        ports::{DocumentSerializer, OutputDriver},
    };
    pub use crate::domain::{
        BuildContext, BuildItem, BuildSource, Builder, DocumentFile, DomainError, FileId,
        FileKind, FileTemplate, Location, ObjectFilter, ObjectIdentity, OptionStore, OptionValue,
        OutputProject, PatchOp, PatchRule, Provider, ProviderKind, ProviderTarget, ScriptFile,
        StructuralObject,
    };
    pub use crate::error::{KubegenError, KubegenResult};
}

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
