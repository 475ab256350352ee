//! Python runtime discovery
//!
//! Discovery order:
//! 1. An explicit interpreter, which is probed once
//! 2. An explicit virtual environment, which is read without running it
//! 3. `python3` / `python` on PATH, which is probed

use pyeps_config::venv_paths::{
    find_interpreter_on_path, read_pth_paths, read_pyvenv_cfg, resolve_python_exe,
    resolve_site_packages, VenvPathError,
};
use pyeps_core::{LocateError, PythonVersion};
use pyeps_logger as logger;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Minimum supported Python version
pub const MIN_PYTHON_VERSION: PythonVersion = PythonVersion::new(3, 8);

/// Prints the interpreter generation, `sys.path` and the built-in modules.
const PROBE_SCRIPT: &str = "import json, sys; print(json.dumps({'version': list(sys.version_info[:2]), 'path': sys.path, 'builtins': list(sys.builtin_module_names)}))";

/// The interpreter pyeps answers for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRuntime {
    /// Interpreter that was probed, if any
    pub executable: Option<PathBuf>,
    pub version: PythonVersion,
    /// Package search path in lookup order
    pub search_path: Vec<PathBuf>,
    /// Modules compiled into the interpreter (no origin file)
    pub builtin_modules: Vec<String>,
}

/// Errors during runtime discovery
#[derive(Debug)]
pub enum DiscoveryError {
    /// No Python installation found
    NoPython(String),
    /// The interpreter ran but its report could not be used
    ProbeFailed(String),
    /// Python found but version too old
    VersionTooOld {
        found: PythonVersion,
        required: PythonVersion,
    },
    /// Virtual environment layout could not be read
    Venv(VenvPathError),
    /// IO error during discovery
    Io(std::io::Error),
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryError::NoPython(msg) => write!(f, "No Python found: {}", msg),
            DiscoveryError::ProbeFailed(msg) => write!(f, "Python probe failed: {}", msg),
            DiscoveryError::VersionTooOld { found, required } => {
                write!(f, "Python {} found, but {} or newer is required", found, required)
            }
            DiscoveryError::Venv(e) => write!(f, "{}", e),
            DiscoveryError::Io(e) => write!(f, "IO error during discovery: {}", e),
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<std::io::Error> for DiscoveryError {
    fn from(e: std::io::Error) -> Self {
        DiscoveryError::Io(e)
    }
}

impl From<VenvPathError> for DiscoveryError {
    fn from(e: VenvPathError) -> Self {
        DiscoveryError::Venv(e)
    }
}

impl From<DiscoveryError> for LocateError {
    fn from(e: DiscoveryError) -> Self {
        match e {
            DiscoveryError::VersionTooOld { found, required } => {
                LocateError::UnsupportedRuntime { found, required }
            }
            other => LocateError::MetadataUnavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeReport {
    version: (u8, u8),
    path: Vec<String>,
    #[serde(default)]
    builtins: Vec<String>,
}

impl HostRuntime {
    /// Runtime with an explicit search path, used by tests and embedders
    pub fn new(version: PythonVersion, search_path: Vec<PathBuf>) -> Self {
        HostRuntime {
            executable: None,
            version,
            search_path,
            builtin_modules: Vec::new(),
        }
    }

    /// Discover the host runtime
    ///
    /// The returned runtime has not been checked against
    /// [`MIN_PYTHON_VERSION`]; see [`HostRuntime::ensure_supported`].
    pub fn discover(python: Option<&Path>, venv: Option<&Path>) -> Result<Self, DiscoveryError> {
        logger::debug("Starting Python runtime discovery");

        if let Some(executable) = python {
            return Self::probe(executable);
        }

        if let Some(venv) = venv {
            return Self::from_venv(venv);
        }

        let executable = find_interpreter_on_path().ok_or_else(|| {
            DiscoveryError::NoPython(
                "no python3 or python executable on PATH; pass --python or --venv".to_string(),
            )
        })?;
        Self::probe(&executable)
    }

    /// Run `executable` once and read its version and `sys.path`
    pub fn probe(executable: &Path) -> Result<Self, DiscoveryError> {
        logger::debug(&format!("Probing Python at: {}", executable.display()));

        let output = Command::new(executable)
            .args(["-c", PROBE_SCRIPT])
            .output()
            .map_err(|e| {
                DiscoveryError::NoPython(format!("failed to run {}: {}", executable.display(), e))
            })?;

        if !output.status.success() {
            return Err(DiscoveryError::ProbeFailed(format!(
                "{} exited with {:?}",
                executable.display(),
                output.status.code()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let report: ProbeReport = serde_json::from_str(stdout.trim())
            .map_err(|e| DiscoveryError::ProbeFailed(format!("unreadable probe output: {}", e)))?;

        let runtime = HostRuntime {
            executable: Some(executable.to_path_buf()),
            version: PythonVersion::new(report.version.0, report.version.1),
            search_path: report
                .path
                .into_iter()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect(),
            builtin_modules: report.builtins,
        };

        logger::info(&format!(
            "Using Python {} at {}",
            runtime.version,
            executable.display()
        ));
        Ok(runtime)
    }

    /// Rebuild the search path of a virtual environment from its files
    ///
    /// The order is `PYTHONPATH`, the base interpreter's standard library,
    /// site-packages, then `.pth` additions, matching what `site` produces.
    /// With `include-system-site-packages = true` the base interpreter's
    /// site-packages and its `.pth` additions follow.
    /// Without a usable `pyvenv.cfg` version the environment's interpreter
    /// is probed instead.
    pub fn from_venv(venv: &Path) -> Result<Self, DiscoveryError> {
        logger::debug(&format!("Reading virtual environment at: {}", venv.display()));

        let cfg = read_pyvenv_cfg(venv)?;
        let Some(version) = cfg.version.as_deref().and_then(PythonVersion::parse) else {
            logger::debug("pyvenv.cfg has no version, probing the environment interpreter");
            let executable = resolve_python_exe(venv)?;
            return Self::probe(&executable);
        };

        let site_packages = resolve_site_packages(venv)?;

        let mut search_path = python_path_from_env();
        if let Some(home) = cfg.home.as_deref() {
            search_path.extend(base_stdlib_dirs(home, version));
        }
        search_path.push(site_packages.clone());
        search_path.extend(read_pth_paths(&site_packages));

        if cfg.include_system_site_packages {
            if let Some(base_site) = cfg.home.as_deref().and_then(|h| base_site_packages(h, version)) {
                logger::debug(&format!(
                    "Including system site-packages: {}",
                    base_site.display()
                ));
                let additions = read_pth_paths(&base_site);
                search_path.push(base_site);
                search_path.extend(additions);
            }
        }

        Ok(HostRuntime {
            executable: None,
            version,
            search_path,
            builtin_modules: Vec::new(),
        })
    }

    /// Reject interpreters older than [`MIN_PYTHON_VERSION`]
    pub fn ensure_supported(&self) -> Result<(), DiscoveryError> {
        if self.version < MIN_PYTHON_VERSION {
            return Err(DiscoveryError::VersionTooOld {
                found: self.version,
                required: MIN_PYTHON_VERSION,
            });
        }
        Ok(())
    }
}

fn python_path_from_env() -> Vec<PathBuf> {
    std::env::var_os("PYTHONPATH")
        .map(|value| {
            std::env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// site-packages of the interpreter a venv was created from
fn base_site_packages(home: &Path, version: PythonVersion) -> Option<PathBuf> {
    #[cfg(not(windows))]
    let site = {
        let prefix = home.parent().unwrap_or(home);
        prefix
            .join("lib")
            .join(format!("python{}", version))
            .join("site-packages")
    };

    #[cfg(windows)]
    let site = {
        let _ = version;
        home.join("Lib").join("site-packages")
    };

    site.is_dir().then_some(site)
}

/// Standard library directories of the interpreter a venv was created from
fn base_stdlib_dirs(home: &Path, version: PythonVersion) -> Vec<PathBuf> {
    #[cfg(not(windows))]
    let candidates = {
        let prefix = home.parent().unwrap_or(home);
        let stdlib = prefix.join("lib").join(format!("python{}", version));
        vec![stdlib.clone(), stdlib.join("lib-dynload")]
    };

    #[cfg(windows)]
    let candidates = {
        let _ = version;
        vec![home.join("DLLs"), home.join("Lib")]
    };

    candidates.into_iter().filter(|p| p.is_dir()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_venv(root: &Path, cfg: &str) -> PathBuf {
        let site_packages = if cfg!(windows) {
            root.join("Lib").join("site-packages")
        } else {
            root.join("lib").join("python3.11").join("site-packages")
        };
        fs::create_dir_all(&site_packages).unwrap();
        fs::write(root.join("pyvenv.cfg"), cfg).unwrap();
        site_packages
    }

    #[test]
    fn test_min_version_constant() {
        assert_eq!(MIN_PYTHON_VERSION, PythonVersion::new(3, 8));
    }

    #[test]
    fn test_from_venv_reads_version_and_site_packages() {
        let temp_dir = TempDir::new().unwrap();
        let site_packages = write_venv(temp_dir.path(), "version_info = 3.11.9\n");

        let runtime = HostRuntime::from_venv(temp_dir.path()).unwrap();
        assert_eq!(runtime.version, PythonVersion::new(3, 11));
        assert!(runtime.search_path.contains(&site_packages));
        assert!(runtime.executable.is_none());
    }

    #[test]
    fn test_from_venv_includes_pth_directories() {
        let temp_dir = TempDir::new().unwrap();
        let site_packages = write_venv(temp_dir.path(), "version = 3.9.18\n");
        let src = temp_dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(
            site_packages.join("__editable__.demo-0.1.pth"),
            format!("{}\n", src.display()),
        )
        .unwrap();

        let runtime = HostRuntime::from_venv(temp_dir.path()).unwrap();
        let site_idx = runtime.search_path.iter().position(|p| p == &site_packages);
        let src_idx = runtime.search_path.iter().position(|p| p == &src);
        assert!(site_idx.is_some() && src_idx.is_some());
        assert!(site_idx < src_idx);
    }

    #[test]
    fn test_from_venv_includes_system_site_packages() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("base");
        let home = if cfg!(windows) { base.clone() } else { base.join("bin") };
        let base_site = if cfg!(windows) {
            base.join("Lib").join("site-packages")
        } else {
            base.join("lib").join("python3.11").join("site-packages")
        };
        fs::create_dir_all(&home).unwrap();
        fs::create_dir_all(&base_site).unwrap();

        let venv = temp_dir.path().join("venv");
        let cfg = format!(
            "home = {}\ninclude-system-site-packages = true\nversion = 3.11.4\n",
            home.display()
        );
        let site_packages = write_venv(&venv, &cfg);

        let runtime = HostRuntime::from_venv(&venv).unwrap();
        let site_idx = runtime.search_path.iter().position(|p| p == &site_packages);
        let base_idx = runtime.search_path.iter().position(|p| p == &base_site);
        assert!(site_idx.is_some() && base_idx.is_some());
        assert!(site_idx < base_idx);

        fs::write(
            venv.join("pyvenv.cfg"),
            cfg.replace("= true", "= false"),
        )
        .unwrap();
        let isolated = HostRuntime::from_venv(&venv).unwrap();
        assert!(!isolated.search_path.contains(&base_site));
    }

    #[test]
    fn test_from_venv_missing_cfg() {
        let temp_dir = TempDir::new().unwrap();
        let err = HostRuntime::from_venv(temp_dir.path()).unwrap_err();
        assert!(matches!(err, DiscoveryError::Venv(_)));
        assert!(matches!(
            LocateError::from(err),
            LocateError::MetadataUnavailable(_)
        ));
    }

    #[test]
    fn test_probe_missing_interpreter() {
        let err = HostRuntime::probe(Path::new("/nonexistent/bin/python3")).unwrap_err();
        assert!(matches!(err, DiscoveryError::NoPython(_)));
    }

    #[test]
    fn test_ensure_supported() {
        let old = HostRuntime::new(PythonVersion::new(3, 7), Vec::new());
        let err = old.ensure_supported().unwrap_err();
        assert!(err.to_string().contains("3.7"));
        assert!(matches!(
            LocateError::from(err),
            LocateError::UnsupportedRuntime { .. }
        ));

        let current = HostRuntime::new(PythonVersion::new(3, 12), Vec::new());
        assert!(current.ensure_supported().is_ok());
    }

    #[test]
    fn test_probe_report_parsing() {
        let report: ProbeReport = serde_json::from_str(
            r#"{"version": [3, 10], "path": ["", "/usr/lib/python3.10"], "builtins": ["sys"]}"#,
        )
        .unwrap();
        assert_eq!(report.version, (3, 10));
        assert_eq!(report.path.len(), 2);
        assert_eq!(report.builtins, vec!["sys"]);
    }
}
