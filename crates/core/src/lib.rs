//! Core functionality shared by the manufacturing provisioning crates.
//!
//! This crate provides the ambient pieces every station tool needs:
//! the common error type, structured logging setup and TOML configuration.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, ExportConfig, LoggingConfig, PersonalizationConfig, ResumePolicy};
pub use error::{Error, Result};
