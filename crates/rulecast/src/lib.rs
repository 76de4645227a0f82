//! rulecast - Simulate rule activation across inheritable quality profiles
//!
//! Reads a YAML description of a workspace (rule catalog, built-in profile
//! declarations, custom profiles, and a script of operations), runs it
//! through [`rulecast_core::ProfileEngine`] against in-memory storage, and
//! reports every change the engine made.

pub mod config;
pub mod logging;
pub mod output;
pub mod simulate;

pub use config::Config;
pub use simulate::{SimulationReport, run};
