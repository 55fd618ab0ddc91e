//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod capabilities;
pub mod extract;
pub mod invariants;
pub mod schema;
pub mod types;
