//! Utility functions for resolving paths in Python virtual environments
//!
//! This module provides platform-specific path resolution for:
//! - site-packages directory
//! - Python executable
//! - `pyvenv.cfg` metadata
//! - directories added to the search path by `.pth` files
//!
//! Together they let pyeps rebuild an environment's package search path
//! without starting its interpreter.

use std::fs;
use std::path::{Path, PathBuf};

/// The name of the library directory in a Python venv
/// "Lib" on Windows, "lib" on Unix
#[cfg(windows)]
pub const PYTHON_LIB_DIR: &str = "Lib";
#[cfg(not(windows))]
pub const PYTHON_LIB_DIR: &str = "lib";

/// The name of the binaries/scripts directory in a Python venv
/// "Scripts" on Windows, "bin" on Unix
#[cfg(windows)]
pub const PYTHON_BIN_DIR: &str = "Scripts";
#[cfg(not(windows))]
pub const PYTHON_BIN_DIR: &str = "bin";

/// Candidate executable names in a venv or on PATH
#[cfg(not(windows))]
pub const PYTHON_EXE_CANDIDATES: &[&str] = &["python3", "python"];
#[cfg(windows)]
pub const PYTHON_EXE_CANDIDATES: &[&str] = &["python.exe", "python3.exe"];

/// Error type for venv path resolution
#[derive(Debug, Clone)]
pub enum VenvPathError {
    /// The venv path does not exist or is not a directory
    VenvNotFound(PathBuf),
    /// Failed to find a required directory or file
    PathResolution(String),
}

impl std::fmt::Display for VenvPathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VenvPathError::VenvNotFound(path) => {
                write!(f, "Virtual environment not found: {}", path.display())
            }
            VenvPathError::PathResolution(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for VenvPathError {}

/// Key/value pairs of a venv's `pyvenv.cfg`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PyvenvCfg {
    /// Directory of the base interpreter
    pub home: Option<PathBuf>,
    /// `version_info` (uv, virtualenv) or `version` (stdlib venv)
    pub version: Option<String>,
    pub include_system_site_packages: bool,
}

/// Resolve the site-packages path for a Python virtual environment
///
/// # Platform differences
///
/// - **Unix/macOS**: `.venv/lib/python3.X/site-packages`
/// - **Windows**: `.venv/Lib/site-packages`
pub fn resolve_site_packages(venv_path: &Path) -> Result<PathBuf, VenvPathError> {
    if !venv_path.is_dir() {
        return Err(VenvPathError::VenvNotFound(venv_path.to_path_buf()));
    }

    #[cfg(windows)]
    {
        let site_packages = venv_path.join(PYTHON_LIB_DIR).join("site-packages");
        if !site_packages.is_dir() {
            return Err(VenvPathError::PathResolution(format!(
                "site-packages not found: {}",
                site_packages.display()
            )));
        }
        Ok(site_packages)
    }

    #[cfg(not(windows))]
    {
        let lib_dir = venv_path.join(PYTHON_LIB_DIR);
        if !lib_dir.is_dir() {
            return Err(VenvPathError::PathResolution(format!(
                "lib directory not found: {}",
                lib_dir.display()
            )));
        }

        // Find the python version directory (e.g., python3.12)
        let python_version_dir = fs::read_dir(&lib_dir)
            .map_err(|e| VenvPathError::PathResolution(format!("Failed to read lib dir: {}", e)))?
            .filter_map(|e| e.ok())
            .find(|e| e.file_name().to_string_lossy().starts_with("python"))
            .ok_or_else(|| {
                VenvPathError::PathResolution(
                    "No python3.X directory found in venv/lib".to_string(),
                )
            })?;

        let site_packages = python_version_dir.path().join("site-packages");
        if !site_packages.is_dir() {
            return Err(VenvPathError::PathResolution(format!(
                "site-packages not found: {}",
                site_packages.display()
            )));
        }

        Ok(site_packages)
    }
}

/// Resolve the Python executable path for a virtual environment
///
/// # Platform differences
///
/// - **Unix/macOS**: `.venv/bin/python3` or `.venv/bin/python`
/// - **Windows**: `.venv/Scripts/python.exe`
pub fn resolve_python_exe(venv_path: &Path) -> Result<PathBuf, VenvPathError> {
    if !venv_path.is_dir() {
        return Err(VenvPathError::VenvNotFound(venv_path.to_path_buf()));
    }

    let bin_dir = venv_path.join(PYTHON_BIN_DIR);
    if !bin_dir.is_dir() {
        return Err(VenvPathError::PathResolution(format!(
            "bin directory not found: {}",
            bin_dir.display()
        )));
    }

    for exe in PYTHON_EXE_CANDIDATES {
        let candidate = bin_dir.join(exe);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(VenvPathError::PathResolution(format!(
        "Python executable not found in {}",
        bin_dir.display()
    )))
}

/// Read `pyvenv.cfg` at the root of a virtual environment
pub fn read_pyvenv_cfg(venv_path: &Path) -> Result<PyvenvCfg, VenvPathError> {
    let cfg_path = venv_path.join("pyvenv.cfg");
    let content = fs::read_to_string(&cfg_path).map_err(|e| {
        VenvPathError::PathResolution(format!("Failed to read {}: {}", cfg_path.display(), e))
    })?;

    let mut cfg = PyvenvCfg::default();
    let mut version = None;
    let mut version_info = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "home" => cfg.home = Some(PathBuf::from(value)),
            "version" => version = Some(value.to_string()),
            "version_info" => version_info = Some(value.to_string()),
            "include-system-site-packages" => {
                cfg.include_system_site_packages = value.eq_ignore_ascii_case("true");
            }
            _ => {}
        }
    }

    cfg.version = version_info.or(version);
    Ok(cfg)
}

/// Directories appended to the search path by `.pth` files in `site_dir`
///
/// Mirrors `site.addpackage`: blank lines and comments are skipped, lines
/// starting with `import` are executable hooks and are ignored, relative
/// entries resolve against `site_dir`, missing directories are dropped.
pub fn read_pth_paths(site_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(site_dir) else {
        return Vec::new();
    };

    let mut pth_files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|ext| ext.to_str()) == Some("pth"))
        .collect();
    pth_files.sort();

    let mut paths = Vec::new();
    for pth in pth_files {
        let Ok(content) = fs::read_to_string(&pth) else {
            continue;
        };
        for line in content.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with("import ") || line.starts_with("import\t") {
                continue;
            }
            let candidate = site_dir.join(line);
            if candidate.is_dir() && !paths.contains(&candidate) {
                paths.push(candidate);
            }
        }
    }
    paths
}

/// First Python interpreter on PATH
pub fn find_interpreter_on_path() -> Option<PathBuf> {
    PYTHON_EXE_CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(not(windows))]
    fn create_mock_venv_unix(python_version: &str) -> Option<TempDir> {
        let temp_dir = TempDir::new().ok()?;
        let venv_path = temp_dir.path();

        // Create Unix structure: .venv/lib/python3.X/site-packages
        let lib_dir = venv_path.join("lib");
        let python_dir = lib_dir.join(python_version);
        let site_packages = python_dir.join("site-packages");
        fs::create_dir_all(&site_packages).ok()?;

        // Create bin directory with python executable
        let bin_dir = venv_path.join("bin");
        fs::create_dir_all(&bin_dir).ok()?;
        fs::write(bin_dir.join("python3"), "").ok()?;

        Some(temp_dir)
    }

    #[test]
    #[cfg(not(windows))]
    fn test_resolve_site_packages_unix() {
        let Some(temp_venv) = create_mock_venv_unix("python3.12") else {
            return;
        };
        let result = resolve_site_packages(temp_venv.path());
        assert!(result.is_ok_and(|p| p.ends_with("lib/python3.12/site-packages")));
    }

    #[test]
    #[cfg(not(windows))]
    fn test_resolve_python_exe_unix() {
        let Some(temp_venv) = create_mock_venv_unix("python3.12") else {
            return;
        };
        let result = resolve_python_exe(temp_venv.path());
        assert!(result.is_ok_and(|p| p.ends_with("bin/python3")));
    }

    #[test]
    fn test_venv_not_found() {
        let non_existent = PathBuf::from("/tmp/non_existent_venv_12345");
        let result = resolve_site_packages(&non_existent);
        assert!(matches!(result, Err(VenvPathError::VenvNotFound(_))));
    }

    #[test]
    fn test_read_pyvenv_cfg_prefers_version_info() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("pyvenv.cfg"),
            "home = /usr/bin\ninclude-system-site-packages = false\nversion = 3.11.2\nversion_info = 3.11.4\n",
        )
        .unwrap();

        let cfg = read_pyvenv_cfg(temp_dir.path()).unwrap();
        assert_eq!(cfg.home, Some(PathBuf::from("/usr/bin")));
        assert_eq!(cfg.version.as_deref(), Some("3.11.4"));
        assert!(!cfg.include_system_site_packages);
    }

    #[test]
    fn test_read_pyvenv_cfg_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_pyvenv_cfg(temp_dir.path()).is_err());
    }

    #[test]
    fn test_read_pth_paths() {
        let temp_dir = TempDir::new().unwrap();
        let site = temp_dir.path().join("site-packages");
        let src = temp_dir.path().join("project").join("src");
        fs::create_dir_all(&site).unwrap();
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(site.join("vendored")).unwrap();

        fs::write(
            site.join("__editable__.project-0.1.0.pth"),
            format!("# editable\n{}\nimport _virtualenv\n", src.display()),
        )
        .unwrap();
        fs::write(site.join("extra.pth"), "vendored\nmissing-dir\n").unwrap();

        let paths = read_pth_paths(&site);
        assert_eq!(paths, vec![src, site.join("vendored")]);
    }

    #[test]
    fn test_platform_constants() {
        #[cfg(not(windows))]
        {
            assert_eq!(PYTHON_LIB_DIR, "lib");
            assert_eq!(PYTHON_BIN_DIR, "bin");
        }
        #[cfg(windows)]
        {
            assert_eq!(PYTHON_LIB_DIR, "Lib");
            assert_eq!(PYTHON_BIN_DIR, "Scripts");
        }
    }
}
