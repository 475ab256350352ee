//! Entry point queries across runtime generations
//!
//! `importlib.metadata` answered entry point queries three different ways
//! over its lifetime. Each shape is one [`PackageIndex`] implementation and
//! [`select_index`] picks the one matching the host runtime. Callers go
//! through [`enumerate`], which applies the duplicate collapse for the
//! generation that needs it.

use crate::distribution::{scan_distributions, unique_distributions, Distribution};
use ahash::AHashSet;
use pyeps_core::{EntryPoint, LocateError, PythonVersion};
use pyeps_python::HostRuntime;
use std::collections::BTreeMap;
use tracing::debug;

/// Query capability generation of the host's package index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// 3.8 and 3.9: a mapping of group to entry points
    Grouped,
    /// 3.10 and 3.11: `entry_points(group=..., name=...)`
    Selectable,
    /// 3.12 onwards: a flat collection filtered by the caller
    Flat,
}

impl Generation {
    /// `None` for runtimes older than the grouped generation
    pub fn for_version(version: PythonVersion) -> Option<Self> {
        if version < PythonVersion::new(3, 8) {
            None
        } else if version < PythonVersion::new(3, 10) {
            Some(Generation::Grouped)
        } else if version < PythonVersion::new(3, 12) {
            Some(Generation::Selectable)
        } else {
            Some(Generation::Flat)
        }
    }
}

/// Installed entry point declarations
pub trait PackageIndex {
    fn generation(&self) -> Generation;

    /// Entry points in `group`, or all of them
    fn entry_points(&self, group: Option<&str>) -> Vec<EntryPoint>;

    /// First entry point named `name` in `group`
    fn find(&self, name: &str, group: &str) -> Option<EntryPoint> {
        self.entry_points(Some(group))
            .into_iter()
            .find(|ep| ep.name == name)
    }

    /// Whether the same declaration can be reported more than once
    fn reports_duplicates(&self) -> bool {
        false
    }
}

/// Build the group-keyed view used by the older generations
///
/// Groups are sorted by name, entries within a group keep distribution order.
fn by_group(entry_points: impl IntoIterator<Item = EntryPoint>) -> BTreeMap<String, Vec<EntryPoint>> {
    let mut groups: BTreeMap<String, Vec<EntryPoint>> = BTreeMap::new();
    for ep in entry_points {
        groups.entry(ep.group.clone()).or_default().push(ep);
    }
    groups
}

fn flatten(distributions: Vec<Distribution>) -> Vec<EntryPoint> {
    distributions
        .into_iter()
        .flat_map(|dist| dist.entry_points)
        .collect()
}

// ===== GROUPED (3.8, 3.9) =====

/// Group-keyed lookup over every distribution on the path
///
/// Distributions are not de-duplicated, so a package visible from two
/// search-path entries reports its declarations twice.
#[derive(Debug, Clone, Default)]
pub struct GroupedIndex {
    groups: BTreeMap<String, Vec<EntryPoint>>,
}

impl GroupedIndex {
    pub fn new(distributions: Vec<Distribution>) -> Self {
        GroupedIndex {
            groups: by_group(flatten(distributions)),
        }
    }
}

impl PackageIndex for GroupedIndex {
    fn generation(&self) -> Generation {
        Generation::Grouped
    }

    fn entry_points(&self, group: Option<&str>) -> Vec<EntryPoint> {
        match group {
            Some(group) => self.groups.get(group).cloned().unwrap_or_default(),
            None => self.groups.values().flatten().cloned().collect(),
        }
    }

    fn reports_duplicates(&self) -> bool {
        true
    }
}

// ===== SELECTABLE (3.10, 3.11) =====

/// Direct group/name selection over unique distributions
#[derive(Debug, Clone, Default)]
pub struct SelectableIndex {
    entry_points: Vec<EntryPoint>,
}

impl SelectableIndex {
    pub fn new(distributions: Vec<Distribution>) -> Self {
        SelectableIndex {
            entry_points: flatten(unique_distributions(distributions)),
        }
    }

    /// `EntryPoints.select(group=..., name=...)`
    fn select<'a>(
        &'a self,
        group: Option<&'a str>,
        name: Option<&'a str>,
    ) -> impl Iterator<Item = &'a EntryPoint> + 'a {
        self.entry_points.iter().filter(move |ep| {
            group.map_or(true, |g| ep.group == g) && name.map_or(true, |n| ep.name == n)
        })
    }
}

impl PackageIndex for SelectableIndex {
    fn generation(&self) -> Generation {
        Generation::Selectable
    }

    fn entry_points(&self, group: Option<&str>) -> Vec<EntryPoint> {
        match group {
            Some(_) => self.select(group, None).cloned().collect(),
            // Without a selection the result is the group-keyed view
            None => by_group(self.entry_points.iter().cloned())
                .into_values()
                .flatten()
                .collect(),
        }
    }

    fn find(&self, name: &str, group: &str) -> Option<EntryPoint> {
        self.select(Some(group), Some(name)).next().cloned()
    }
}

// ===== FLAT (3.12+) =====

/// Flat iteration with the group filter applied here
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    entry_points: Vec<EntryPoint>,
}

impl FlatIndex {
    pub fn new(distributions: Vec<Distribution>) -> Self {
        FlatIndex {
            entry_points: flatten(unique_distributions(distributions)),
        }
    }
}

impl PackageIndex for FlatIndex {
    fn generation(&self) -> Generation {
        Generation::Flat
    }

    fn entry_points(&self, group: Option<&str>) -> Vec<EntryPoint> {
        self.entry_points
            .iter()
            .filter(|ep| group.map_or(true, |g| ep.group == g))
            .cloned()
            .collect()
    }
}

/// Pick the index variant for `runtime` and load it from its search path
pub fn select_index(runtime: &HostRuntime) -> Result<Box<dyn PackageIndex>, LocateError> {
    runtime.ensure_supported()?;
    let generation = Generation::for_version(runtime.version).ok_or(
        LocateError::UnsupportedRuntime {
            found: runtime.version,
            required: pyeps_python::MIN_PYTHON_VERSION,
        },
    )?;

    debug!(
        "Python {} uses the {:?} package index",
        runtime.version, generation
    );

    let distributions = scan_distributions(&runtime.search_path);
    let index: Box<dyn PackageIndex> = match generation {
        Generation::Grouped => Box::new(GroupedIndex::new(distributions)),
        Generation::Selectable => Box::new(SelectableIndex::new(distributions)),
        Generation::Flat => Box::new(FlatIndex::new(distributions)),
    };
    Ok(index)
}

/// Entry points of `index`, duplicates collapsed where the index reports them
///
/// The first occurrence of each `(name, group, value)` triple is kept in
/// place.
pub fn enumerate(index: &dyn PackageIndex, group: Option<&str>) -> Vec<EntryPoint> {
    let entry_points = index.entry_points(group);
    if !index.reports_duplicates() {
        return entry_points;
    }

    let before = entry_points.len();
    let mut seen = AHashSet::with_capacity(before);
    let unique: Vec<EntryPoint> = entry_points
        .into_iter()
        .filter(|ep| seen.insert(ep.clone()))
        .collect();
    if unique.len() != before {
        debug!("Collapsed {} duplicate entry points", before - unique.len());
    }
    unique
}

/// `enumerateInstalled`: entry points installed for `runtime`
pub fn enumerate_installed(
    runtime: &HostRuntime,
    group: Option<&str>,
) -> Result<Vec<EntryPoint>, LocateError> {
    let index = select_index(runtime)?;
    Ok(enumerate(index.as_ref(), group))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyeps_core::parse_entry_points_txt;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn dist(name: &str, entry_points: &str) -> Distribution {
        Distribution {
            name: name.to_string(),
            location: PathBuf::from(format!("/site/{}-1.0.dist-info", name)),
            entry_points: parse_entry_points_txt(entry_points),
        }
    }

    fn sample() -> Vec<Distribution> {
        vec![
            dist("zeta", "[gui_scripts]\nzgui = zeta.gui:run\n[console_scripts]\nz = zeta:main\n"),
            dist("alpha", "[console_scripts]\na = alpha.cli:main\n"),
            // Same distribution seen again through a second path entry
            dist("Zeta", "[console_scripts]\nz = zeta:main\n"),
        ]
    }

    fn names(entry_points: &[EntryPoint]) -> Vec<&str> {
        entry_points.iter().map(|ep| ep.name.as_str()).collect()
    }

    #[test]
    fn test_generation_for_version() {
        assert_eq!(Generation::for_version(PythonVersion::new(3, 7)), None);
        assert_eq!(
            Generation::for_version(PythonVersion::new(3, 8)),
            Some(Generation::Grouped)
        );
        assert_eq!(
            Generation::for_version(PythonVersion::new(3, 9)),
            Some(Generation::Grouped)
        );
        assert_eq!(
            Generation::for_version(PythonVersion::new(3, 11)),
            Some(Generation::Selectable)
        );
        assert_eq!(
            Generation::for_version(PythonVersion::new(3, 13)),
            Some(Generation::Flat)
        );
    }

    #[test]
    fn test_grouped_index_reports_duplicates() {
        let index = GroupedIndex::new(sample());
        assert!(index.reports_duplicates());
        assert_eq!(names(&index.entry_points(Some("console_scripts"))), vec!["z", "a", "z"]);
        assert_eq!(names(&enumerate(&index, Some("console_scripts"))), vec!["z", "a"]);
    }

    #[test]
    fn test_grouped_index_ungrouped_is_sorted_by_group() {
        let index = GroupedIndex::new(sample());
        let all = enumerate(&index, None);
        let groups: Vec<&str> = all.iter().map(|ep| ep.group.as_str()).collect();
        assert_eq!(groups, vec!["console_scripts", "console_scripts", "gui_scripts"]);
    }

    #[test]
    fn test_selectable_index_dedupes_distributions() {
        let index = SelectableIndex::new(sample());
        assert!(!index.reports_duplicates());
        assert_eq!(names(&index.entry_points(Some("console_scripts"))), vec!["z", "a"]);
        assert_eq!(
            index.find("a", "console_scripts").map(|ep| ep.value.joined()),
            Some("alpha.cli:main".to_string())
        );
        assert!(index.find("a", "gui_scripts").is_none());
    }

    #[test]
    fn test_flat_index_keeps_distribution_order() {
        let index = FlatIndex::new(sample());
        assert_eq!(names(&enumerate(&index, None)), vec!["zgui", "z", "a"]);
        assert_eq!(names(&enumerate(&index, Some("gui_scripts"))), vec!["zgui"]);
        assert!(enumerate(&index, Some("missing")).is_empty());
    }

    #[test]
    fn test_ungrouped_is_superset_of_every_group() {
        let indexes: Vec<Box<dyn PackageIndex>> = vec![
            Box::new(GroupedIndex::new(sample())),
            Box::new(SelectableIndex::new(sample())),
            Box::new(FlatIndex::new(sample())),
        ];
        for index in &indexes {
            let all = enumerate(index.as_ref(), None);
            for group in ["console_scripts", "gui_scripts"] {
                for ep in enumerate(index.as_ref(), Some(group)) {
                    assert!(all.contains(&ep), "{:?} missing {:?}", index.generation(), ep);
                }
            }
        }
    }

    fn write_site(site: &Path) {
        let dir = site.join("demo-1.0.dist-info");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("METADATA"), "Name: demo\nVersion: 1.0\n").unwrap();
        fs::write(
            dir.join("entry_points.txt"),
            "[console_scripts]\ndemo = pkg.mod:attr\n",
        )
        .unwrap();
    }

    #[test]
    fn test_enumerate_installed_from_search_path() {
        let temp_dir = TempDir::new().unwrap();
        write_site(temp_dir.path());

        let runtime = HostRuntime::new(
            PythonVersion::new(3, 11),
            vec![temp_dir.path().to_path_buf()],
        );
        let found = enumerate_installed(&runtime, Some("console_scripts")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value.segments(), ["pkg.mod", "attr"]);
    }

    #[test]
    fn test_enumerate_installed_collapses_legacy_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        write_site(temp_dir.path());

        // The same directory twice on the path
        let runtime = HostRuntime::new(
            PythonVersion::new(3, 8),
            vec![temp_dir.path().to_path_buf(), temp_dir.path().to_path_buf()],
        );
        let index = select_index(&runtime).unwrap();
        assert_eq!(index.entry_points(None).len(), 2);
        assert_eq!(enumerate(index.as_ref(), None).len(), 1);
    }

    #[test]
    fn test_select_index_rejects_old_runtime() {
        let runtime = HostRuntime::new(PythonVersion::new(3, 7), Vec::new());
        let err = enumerate_installed(&runtime, None).unwrap_err();
        assert!(matches!(err, LocateError::UnsupportedRuntime { .. }));
    }
}
