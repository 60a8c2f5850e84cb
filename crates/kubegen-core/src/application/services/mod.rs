//! Application services - orchestrate use cases.
//!
//! Services coordinate the domain layer and ports to accomplish
//! high-level use cases like "declare storage for a provider" or
//! "publish an assembled project".

pub mod generator;
pub mod materialize;

pub use generator::Generator;
pub use materialize::WrittenFile;
