//! # Configuration
//!
//! Client configuration: defaults, an optional file, `BARD_*` environment variables, and
//! command-line overrides, in increasing order of precedence.

pub mod client;

pub use client::{
    ClientConfig, ConfigError, ConfigFormat, ConfigOverrides, LogFormat, LoggingConfig,
};
