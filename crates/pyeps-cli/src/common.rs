//! Common types shared across commands

use clap::Parser;
use std::path::PathBuf;

/// Global CLI options available to all commands
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    #[arg(short, long, global = true, help = "Suppress all diagnostics")]
    pub quiet: bool,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase verbosity (-v for debug, -vv for trace)")]
    pub verbose: u8,

    #[arg(long, global = true, value_name = "EXE", help = "Python interpreter to answer for")]
    pub python: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        conflicts_with = "python",
        help = "Virtual environment to read without running its interpreter"
    )]
    pub venv: Option<PathBuf>,

    #[arg(long, global = true, value_name = "FILE", help = "Config file to use instead of the default")]
    pub config: Option<PathBuf>,
}

impl GlobalOpts {
    /// Get the effective verbosity level
    /// - 0: warnings only
    /// - 1: debug (-v)
    /// - 2: trace (-vv)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}
