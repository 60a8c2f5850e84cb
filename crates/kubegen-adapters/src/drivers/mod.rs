//! Output drivers: where materialized files end up.

mod directory;
mod memory;
mod stream;

pub use directory::DirectoryDriver;
pub use memory::MemoryDriver;
pub use stream::StreamDriver;
