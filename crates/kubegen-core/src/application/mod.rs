//! Application layer for kubegen.
//!
//! This layer contains:
//! - **Services**: Use case orchestration (`Generator`, project materialization)
//! - **Ports**: Interface definitions (traits) for external dependencies
//! - **Errors**: Application-specific error types
//!
//! The application layer coordinates the domain layer but contains no
//! generation logic itself. All generation rules live in `crate::domain`.

pub mod error;
pub mod ports;
pub mod services;

// Re-export main services
pub use services::{Generator, WrittenFile};

// Re-export port traits (for adapter implementation)
pub use ports::{DocumentSerializer, OutputDriver};

pub use error::ApplicationError;
