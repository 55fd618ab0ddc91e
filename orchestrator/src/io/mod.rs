//! Side-effecting helpers: configuration, cache storage, processes, GitHub.

pub mod cache;
pub mod config;
pub mod gh;
pub mod process;
pub mod prompt;
pub mod workspace;
