//! User configuration file
//!
//! The file is optional. A missing file is the default configuration; the
//! CLI decides what to do with a file that fails to parse.

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Interpreter to probe for the package search path
    pub python_path: Option<String>,
    /// Virtual environment to read statically instead of probing
    pub venv_path: Option<String>,
}

impl Config {
    /// Default config file location, e.g. `~/.config/pyeps/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        #[cfg(not(target_os = "windows"))]
        let base = dirs::home_dir().map(|home| home.join(".config"));

        #[cfg(target_os = "windows")]
        let base = dirs::config_dir();

        base.map(|dir| dir.join("pyeps").join(CONFIG_FILE_NAME))
    }

    /// Load the config from `path`, or from [`Config::default_path`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Config::default()),
            },
        };

        match fs::read_to_string(&path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    pub fn python_path(&self) -> Option<PathBuf> {
        self.python_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    pub fn venv_path(&self) -> Option<PathBuf> {
        self.venv_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    pub fn is_empty(&self) -> bool {
        self.python_path().is_none() && self.venv_path().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(Some(&temp_dir.path().join("config.toml"))).unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_load_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "python_path = \"/usr/bin/python3\"\nvenv_path = \"  \"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.python_path(), Some(PathBuf::from("/usr/bin/python3")));
        assert_eq!(config.venv_path(), None);
        assert!(!config.is_empty());
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "python_path = [unterminated").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_default_path_file_name() {
        if let Some(path) = Config::default_path() {
            assert!(path.ends_with("pyeps/config.toml"));
        }
    }
}
