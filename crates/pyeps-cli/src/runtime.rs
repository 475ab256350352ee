//! Host runtime selection from flags and the config file

use crate::common::GlobalOpts;
use pyeps_config::Config;
use pyeps_core::LocateError;
use pyeps_logger as logger;
use pyeps_python::HostRuntime;
use std::path::PathBuf;

/// Interpreter and environment to discover the runtime from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeSelection {
    pub python: Option<PathBuf>,
    pub venv: Option<PathBuf>,
}

impl RuntimeSelection {
    /// Flags win over the config file; with neither, discovery falls back
    /// to `PATH`.
    pub fn new(opts: &GlobalOpts, config: &Config) -> Self {
        if opts.python.is_some() || opts.venv.is_some() {
            return RuntimeSelection {
                python: opts.python.clone(),
                venv: opts.venv.clone(),
            };
        }
        RuntimeSelection {
            python: config.python_path(),
            venv: config.venv_path(),
        }
    }

    pub fn discover(&self) -> Result<HostRuntime, LocateError> {
        let runtime = HostRuntime::discover(self.python.as_deref(), self.venv.as_deref())?;
        logger::debug(&format!(
            "Using Python {} with {} search path entries",
            runtime.version,
            runtime.search_path.len()
        ));
        Ok(runtime)
    }
}

/// Load the config file, ignoring one that cannot be read
pub fn load_config(opts: &GlobalOpts) -> Config {
    match Config::load(opts.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            logger::warn(&format!("Ignoring config file: {}", e));
            Config::default()
        }
    }
}
