//! Shared utilities for agent-rs
//!
//! This crate provides the ambient pieces every binary in the workspace needs:
//! tracing setup and API key resolution.

pub mod config;
pub mod logging;

pub use config::{ApiKeys, ConfigError, DEFAULT_KEY_FILE};
pub use logging::{LogFormat, init_tracing, init_tracing_with};
