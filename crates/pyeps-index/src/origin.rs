//! Module origin lookup
//!
//! Finds the file the runtime's path-based finder would load for a module
//! name, checking the filesystem only: nothing is imported.
//!
//! Within one search-path directory the order is:
//! 1. a package directory with an `__init__` file
//! 2. an extension module (`name.<tag>.so`, `name.so`, `name.pyd`)
//! 3. a source module (`name.py`)
//! 4. a bytecode module (`name.pyc`)
//!
//! A directory without `__init__` is a namespace portion; it only wins when
//! no directory on the path has a regular module of that name.

use pyeps_core::LocateError;
use pyeps_python::HostRuntime;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const SOURCE_SUFFIX: &str = ".py";
const BYTECODE_SUFFIX: &str = ".pyc";
#[cfg(not(windows))]
const EXTENSION_SUFFIX: &str = ".so";
#[cfg(windows)]
const EXTENSION_SUFFIX: &str = ".pyd";

/// How a module would be loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// Regular package; the origin is its `__init__` file
    Package,
    Source,
    Extension,
    Bytecode,
    /// Namespace package, no origin
    Namespace,
    /// Compiled into the interpreter, no origin
    Builtin,
}

/// What the finder knows about a module without loading it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    pub name: String,
    pub kind: ModuleKind,
    pub origin: Option<PathBuf>,
    /// Where submodules are looked up (packages only)
    pub search_locations: Vec<PathBuf>,
}

impl ModuleSpec {
    fn file(name: &str, kind: ModuleKind, origin: PathBuf) -> Self {
        let search_locations = match (kind, origin.parent()) {
            (ModuleKind::Package, Some(dir)) => vec![dir.to_path_buf()],
            _ => Vec::new(),
        };
        ModuleSpec {
            name: name.to_string(),
            kind,
            origin: Some(origin),
            search_locations,
        }
    }

    pub fn is_package(&self) -> bool {
        !self.search_locations.is_empty()
    }
}

/// Path-based module finder over a fixed search path
#[derive(Debug, Clone, Default)]
pub struct OriginResolver {
    search_path: Vec<PathBuf>,
    builtin_modules: Vec<String>,
}

impl OriginResolver {
    pub fn new(search_path: Vec<PathBuf>, builtin_modules: Vec<String>) -> Self {
        OriginResolver {
            search_path: search_path.into_iter().map(absolute).collect(),
            builtin_modules,
        }
    }

    pub fn from_runtime(runtime: &HostRuntime) -> Self {
        Self::new(runtime.search_path.clone(), runtime.builtin_modules.clone())
    }

    /// Spec for a dotted module name, descending through parent packages
    pub fn find_spec(&self, module: &str) -> Option<ModuleSpec> {
        if !is_valid_module_name(module) {
            debug!("Not a module name: {:?}", module);
            return None;
        }

        if self.builtin_modules.iter().any(|m| m == module) {
            return Some(ModuleSpec {
                name: module.to_string(),
                kind: ModuleKind::Builtin,
                origin: None,
                search_locations: Vec::new(),
            });
        }

        let mut locations = self.search_path.clone();
        let mut qualified = String::new();
        let mut spec: Option<ModuleSpec> = None;

        for part in module.split('.') {
            if let Some(parent) = spec.take() {
                if !parent.is_package() {
                    trace!("{} is not a package", parent.name);
                    return None;
                }
                locations = parent.search_locations;
                qualified.push('.');
            }
            qualified.push_str(part);
            spec = Some(find_in_locations(&qualified, part, &locations)?);
        }
        spec
    }

    /// `resolveOrigin`: the file `module` would be loaded from
    pub fn resolve_origin(&self, module: &str) -> Result<PathBuf, LocateError> {
        self.find_spec(module)
            .and_then(|spec| spec.origin)
            .ok_or_else(|| LocateError::OriginNotFound(module.to_string()))
    }
}

fn find_in_locations(qualified: &str, part: &str, locations: &[PathBuf]) -> Option<ModuleSpec> {
    let mut namespace_portions = Vec::new();

    for dir in locations {
        let package_dir = dir.join(part);
        if package_dir.is_dir() {
            if let Some(init) = find_module_file(&package_dir, "__init__") {
                return Some(ModuleSpec::file(qualified, ModuleKind::Package, init.0));
            }
            namespace_portions.push(package_dir);
        }

        if let Some((path, kind)) = find_module_file(dir, part) {
            return Some(ModuleSpec::file(qualified, kind, path));
        }
    }

    if namespace_portions.is_empty() {
        return None;
    }
    Some(ModuleSpec {
        name: qualified.to_string(),
        kind: ModuleKind::Namespace,
        origin: None,
        search_locations: namespace_portions,
    })
}

/// A loadable file for module `stem` directly inside `dir`
fn find_module_file(dir: &Path, stem: &str) -> Option<(PathBuf, ModuleKind)> {
    if let Some(extension) = find_extension(dir, stem) {
        return Some((extension, ModuleKind::Extension));
    }

    let source = dir.join(format!("{}{}", stem, SOURCE_SUFFIX));
    if source.is_file() {
        return Some((source, ModuleKind::Source));
    }

    let bytecode = dir.join(format!("{}{}", stem, BYTECODE_SUFFIX));
    if bytecode.is_file() {
        return Some((bytecode, ModuleKind::Bytecode));
    }
    None
}

/// `stem.so` or `stem.<abi tag>.so`
fn find_extension(dir: &Path, stem: &str) -> Option<PathBuf> {
    let plain = dir.join(format!("{}{}", stem, EXTENSION_SUFFIX));
    if plain.is_file() {
        return Some(plain);
    }

    let prefix = format!("{}.", stem);
    let mut tagged: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(EXTENSION_SUFFIX))
                .is_some_and(|tag| !tag.is_empty() && !tag.contains('.'))
        })
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    tagged.sort();
    tagged.into_iter().next()
}

fn is_valid_module_name(module: &str) -> bool {
    !module.is_empty() && module.split('.').all(is_identifier)
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {
            chars.all(|c| c == '_' || c.is_alphanumeric())
        }
        _ => false,
    }
}

/// Relative search-path entries are relative to the working directory
fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "").unwrap();
    }

    fn resolver(dirs: &[&Path]) -> OriginResolver {
        OriginResolver::new(dirs.iter().map(|d| d.to_path_buf()).collect(), vec!["sys".to_string()])
    }

    #[test]
    fn test_source_module() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("hello.py"));

        let origin = resolver(&[temp_dir.path()]).resolve_origin("hello").unwrap();
        assert_eq!(origin, temp_dir.path().join("hello.py"));
        assert!(origin.is_absolute());
    }

    #[test]
    fn test_package_wins_over_module() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("pkg").join("__init__.py"));
        touch(&temp_dir.path().join("pkg.py"));

        let spec = resolver(&[temp_dir.path()]).find_spec("pkg").unwrap();
        assert_eq!(spec.kind, ModuleKind::Package);
        assert_eq!(spec.origin, Some(temp_dir.path().join("pkg").join("__init__.py")));
    }

    #[test]
    fn test_submodule_of_package() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("pkg").join("__init__.py"));
        touch(&temp_dir.path().join("pkg").join("sub").join("__init__.py"));
        touch(&temp_dir.path().join("pkg").join("sub").join("mod.py"));

        let r = resolver(&[temp_dir.path()]);
        let spec = r.find_spec("pkg.sub.mod").unwrap();
        assert_eq!(spec.name, "pkg.sub.mod");
        assert_eq!(spec.kind, ModuleKind::Source);
        assert!(r.find_spec("pkg.sub.mod.deeper").is_none());
        assert!(r.find_spec("pkg.missing").is_none());
    }

    #[test]
    fn test_extension_and_bytecode() {
        let temp_dir = TempDir::new().unwrap();
        let tagged = format!("fast.cpython-311-x86_64-linux-gnu{}", EXTENSION_SUFFIX);
        touch(&temp_dir.path().join(&tagged));
        touch(&temp_dir.path().join("fast.py"));
        touch(&temp_dir.path().join("compiled.pyc"));

        let r = resolver(&[temp_dir.path()]);
        let fast = r.find_spec("fast").unwrap();
        assert_eq!(fast.kind, ModuleKind::Extension);
        assert_eq!(fast.origin, Some(temp_dir.path().join(tagged)));

        let compiled = r.find_spec("compiled").unwrap();
        assert_eq!(compiled.kind, ModuleKind::Bytecode);
    }

    #[test]
    fn test_first_search_path_entry_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch(&first.path().join("dup.py"));
        touch(&second.path().join("dup.py"));

        let origin = resolver(&[first.path(), second.path()])
            .resolve_origin("dup")
            .unwrap();
        assert_eq!(origin, first.path().join("dup.py"));
    }

    #[test]
    fn test_namespace_package_has_no_origin() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch(&first.path().join("ns").join("a.py"));
        touch(&second.path().join("ns").join("b.py"));

        let r = resolver(&[first.path(), second.path()]);
        let spec = r.find_spec("ns").unwrap();
        assert_eq!(spec.kind, ModuleKind::Namespace);
        assert_eq!(spec.search_locations.len(), 2);
        assert!(matches!(
            r.resolve_origin("ns"),
            Err(LocateError::OriginNotFound(_))
        ));

        // Portions from both entries are searched
        assert_eq!(
            r.resolve_origin("ns.b").unwrap(),
            second.path().join("ns").join("b.py")
        );
    }

    #[test]
    fn test_module_in_later_entry_beats_namespace_portion() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        fs::create_dir_all(first.path().join("thing")).unwrap();
        touch(&second.path().join("thing.py"));

        let spec = resolver(&[first.path(), second.path()]).find_spec("thing").unwrap();
        assert_eq!(spec.kind, ModuleKind::Source);
    }

    #[test]
    fn test_builtin_and_invalid_names() {
        let temp_dir = TempDir::new().unwrap();
        let r = resolver(&[temp_dir.path()]);

        assert_eq!(r.find_spec("sys").map(|s| s.kind), Some(ModuleKind::Builtin));
        assert!(matches!(r.resolve_origin("sys"), Err(LocateError::OriginNotFound(_))));
        for name in ["", "a..b", "1abc", "has-dash", "trailing."] {
            assert!(r.find_spec(name).is_none(), "{:?}", name);
        }
        assert!(matches!(
            r.resolve_origin("nonexistent_module_xyz"),
            Err(LocateError::OriginNotFound(_))
        ));
    }
}
