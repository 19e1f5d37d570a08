//! Omni - High performance task runner with content-addressed caching
//!
//! Executes pipelines of shell tasks across workspace targets in
//! dependency order, replaying cached logs and restoring cached outputs
//! for any task whose inputs are unchanged since the last run.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod graph;
pub mod lock;
pub mod transport;
pub mod ui;

pub use error::{OmniError, OmniResult};
