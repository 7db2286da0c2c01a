//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the Repository port
//! - Plain vectors for the Repository port (dry runs, tests)
//! - Local directories for the FileProvider port

pub mod duckdb;
mod memory;
mod staging;

pub use self::duckdb::DuckDbRepository;
pub use memory::InMemoryRepository;
pub use staging::StagingDirectoryProvider;
