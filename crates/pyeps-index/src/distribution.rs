//! Installed distributions on a search path
//!
//! A distribution is one `*.dist-info` or `*.egg-info` directory. Its name
//! comes from the `Name:` header of `METADATA` / `PKG-INFO`, falling back to
//! the directory name, and its entry points from `entry_points.txt`.

use ahash::AHashSet;
use pyeps_core::{parse_entry_points_txt, EntryPoint};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const METADATA_SUFFIXES: &[&str] = &[".dist-info", ".egg-info"];
const METADATA_FILES: &[&str] = &["METADATA", "PKG-INFO"];
const ENTRY_POINTS_FILE: &str = "entry_points.txt";

/// One search-path directory, listed once
#[derive(Debug, Clone)]
pub struct PackageLocator {
    /// Cached directory entries sorted by file name
    dir_entries: Vec<(String, PathBuf)>,
}

impl PackageLocator {
    /// List `root`, or `None` when it is not a readable directory.
    ///
    /// Unreadable entries are skipped the way `sys.path` skips them.
    pub fn new(root: &Path) -> Option<Self> {
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Skipping search path entry {}: {}", root.display(), e);
                return None;
            }
        };

        let mut dir_entries: Vec<(String, PathBuf)> = entries
            .flatten()
            .map(|entry| (entry.file_name().to_string_lossy().to_string(), entry.path()))
            .collect();
        dir_entries.sort_by(|a, b| a.0.cmp(&b.0));

        Some(PackageLocator {
            dir_entries,
        })
    }

    /// Metadata directories in this entry, in file name order
    pub fn metadata_dirs(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.dir_entries
            .iter()
            .filter(|(name, path)| {
                METADATA_SUFFIXES.iter().any(|s| name.ends_with(s)) && path.is_dir()
            })
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    /// Read every distribution in this entry
    pub fn distributions(&self) -> Vec<Distribution> {
        self.metadata_dirs()
            .map(|(dir_name, path)| Distribution::load(dir_name, path))
            .collect()
    }
}

/// An installed distribution and the entry points it declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub name: String,
    /// The metadata directory
    pub location: PathBuf,
    pub entry_points: Vec<EntryPoint>,
}

impl Distribution {
    /// Load a metadata directory; missing files yield an empty distribution
    pub fn load(dir_name: &str, path: &Path) -> Self {
        let name = read_metadata_name(path).unwrap_or_else(|| name_from_dir(dir_name));

        let entry_points = match fs::read_to_string(path.join(ENTRY_POINTS_FILE)) {
            Ok(content) => parse_entry_points_txt(&content),
            Err(_) => Vec::new(),
        };

        debug!(
            "Distribution {} at {} declares {} entry points",
            name,
            path.display(),
            entry_points.len()
        );

        Distribution {
            name,
            location: path.to_path_buf(),
            entry_points,
        }
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// PEP 503 name normalization: runs of `-`, `_` and `.` collapse to `-`,
/// lowercased.
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut pending_separator = false;
    for ch in name.trim().chars() {
        if matches!(ch, '-' | '_' | '.') {
            pending_separator = true;
            continue;
        }
        if pending_separator && !normalized.is_empty() {
            normalized.push('-');
        }
        pending_separator = false;
        normalized.extend(ch.to_lowercase());
    }
    normalized
}

/// Every distribution on `search_path`, in search-path order
pub fn scan_distributions(search_path: &[PathBuf]) -> Vec<Distribution> {
    let mut distributions = Vec::new();
    for entry in search_path {
        if let Some(locator) = PackageLocator::new(entry) {
            distributions.extend(locator.distributions());
        }
    }
    debug!("Found {} distributions", distributions.len());
    distributions
}

/// Keep the first distribution of each normalized name
pub fn unique_distributions(distributions: Vec<Distribution>) -> Vec<Distribution> {
    let mut seen = AHashSet::new();
    distributions
        .into_iter()
        .filter(|dist| seen.insert(dist.normalized_name()))
        .collect()
}

fn read_metadata_name(dir: &Path) -> Option<String> {
    METADATA_FILES.iter().find_map(|file| {
        let content = fs::read_to_string(dir.join(file)).ok()?;
        content
            .lines()
            // Headers end at the first blank line
            .take_while(|line| !line.trim().is_empty())
            .find_map(|line| line.strip_prefix("Name:"))
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    })
}

/// `demo_pkg-1.0.dist-info` -> `demo_pkg`
fn name_from_dir(dir_name: &str) -> String {
    let stem = METADATA_SUFFIXES
        .iter()
        .find_map(|s| dir_name.strip_suffix(s))
        .unwrap_or(dir_name);
    stem.split('-').next().unwrap_or(stem).to_string()
}
