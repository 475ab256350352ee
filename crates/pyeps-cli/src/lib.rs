//! pyeps library - expose modules for testing
//!
//! Each subcommand produces its complete output as a string so that
//! nothing reaches stdout when an operation fails.

pub mod commands;
pub mod common;
pub mod exit_codes;
pub mod runtime;

pub use common::GlobalOpts;
pub use pyeps_logger as logger;
