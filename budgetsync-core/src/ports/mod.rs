//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The pipeline
//! depends only on these traits, not on concrete implementations.

mod file_provider;
mod repository;

pub use file_provider::{FetchResult, FileProvider};
pub use repository::Repository;
