//! Configuration for pyeps
//!
//! Holds the optional config file (`config.toml`) and the path helpers used
//! to read a Python virtual environment without running its interpreter.

pub mod config;
pub mod venv_paths;

pub use config::{Config, ConfigError};
