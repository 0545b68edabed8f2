//! CLI command implementations

pub mod analyze;
pub mod completions;
pub mod config;
pub mod entity;
pub mod io;
pub mod query;
pub mod relation;
