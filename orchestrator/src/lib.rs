//! Command-gated plan/execute pipeline.
//!
//! A free-text instruction passes the command gate ([`control_plane`]), is
//! turned into a validated [`core::types::Plan`] by the [`planner`], and is run
//! step by step by the [`executor`] under the capability gate ([`gate`]). The
//! whole plan-and-execute attempt is retried once by [`recovery`].
//!
//! - **[`core`]**: Pure, deterministic logic (plan types, schema, invariants,
//!   capability registry). No I/O.
//! - **[`io`]**: Side-effecting operations (config, cache, processes, GitHub).
//! - **[`providers`]** and **[`tools`]**: the generation capability and the
//!   action implementations the pipeline dispatches to.

pub mod control_plane;
pub mod core;
pub mod error;
pub mod executor;
pub mod exit_codes;
pub mod gate;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod planner;
pub mod providers;
pub mod recovery;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
