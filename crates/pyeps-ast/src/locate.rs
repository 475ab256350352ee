//! Definition site lookup for installed entry points

use crate::reference::{ReferenceResolver, SourceTreeResolver};
use pyeps_core::{LocateError, ResolvedEntryPoint};
use pyeps_index::{select_index, PackageIndex};
use pyeps_logger as logger;
use pyeps_python::HostRuntime;

/// `resolveEntryPoint`: file and line defining entry point `name` in `group`
///
/// Each stage fails with its own error: lookup in the index, resolution of
/// the reference, the source file of the callable and its first line.
pub fn resolve_entry_point(
    index: &dyn PackageIndex,
    resolver: &dyn ReferenceResolver,
    name: &str,
    group: &str,
) -> Result<ResolvedEntryPoint, LocateError> {
    let entry_point = index
        .find(name, group)
        .ok_or_else(|| LocateError::EntryPointNotFound {
            name: name.to_string(),
            group: group.to_string(),
        })?;
    let label = entry_point.value.joined();
    logger::debug(&format!("Resolving {} = {}", entry_point.name, label));

    let reference = entry_point
        .reference()
        .map_err(|e| LocateError::CallableUnresolvable {
            reference: label.clone(),
            reason: e.to_string(),
        })?;

    let handle = resolver
        .resolve_reference(&reference.module, &reference.attributes)
        .map_err(|e| LocateError::CallableUnresolvable {
            reference: label.clone(),
            reason: e.to_string(),
        })?;

    let filename = handle
        .source_file()
        .map_err(|e| LocateError::SourceFileUnresolvable {
            reference: label.clone(),
            reason: e.to_string(),
        })?
        .display()
        .to_string();

    let lineno = handle
        .first_line()
        .map_err(|e| LocateError::LineResolutionFailed {
            reference: label,
            reason: e.to_string(),
        })?;

    Ok(ResolvedEntryPoint {
        name: entry_point.name,
        group: entry_point.group,
        filename,
        lineno,
    })
}

/// [`resolve_entry_point`] against the installed packages of `runtime`
pub fn resolve_installed(
    runtime: &HostRuntime,
    name: &str,
    group: &str,
) -> Result<ResolvedEntryPoint, LocateError> {
    let index = select_index(runtime)?;
    let resolver = SourceTreeResolver::from_runtime(runtime);
    resolve_entry_point(index.as_ref(), &resolver, name, group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{CallableHandle, ResolveError};
    use pyeps_core::{parse_entry_points_txt, PythonVersion};
    use pyeps_index::{Distribution, FlatIndex};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const ENTRY_POINTS_TXT: &str = "\
[console_scripts]
ep1 = hello:ep1
gone = hello:removed
made = hello:made
ext = fast:run
";

    const HELLO_PY: &str = "\
import functools


@functools.cache
def ep1():
    pass


made = functools.partial(ep1)
";

    /// Resolver that always returns the same handle
    struct FixedResolver(CallableHandle);

    impl ReferenceResolver for FixedResolver {
        fn resolve_reference(
            &self,
            _module_path: &str,
            _attribute_chain: &[String],
        ) -> Result<CallableHandle, ResolveError> {
            Ok(self.0.clone())
        }
    }

    fn index() -> FlatIndex {
        FlatIndex::new(vec![Distribution {
            name: "hello".to_string(),
            location: PathBuf::from("/site/hello-1.0.dist-info"),
            entry_points: parse_entry_points_txt(ENTRY_POINTS_TXT),
        }])
    }

    fn site_packages() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("hello.py"), HELLO_PY).unwrap();
        fs::write(temp_dir.path().join("fast.so"), "").unwrap();
        temp_dir
    }

    fn runtime(site: &Path) -> HostRuntime {
        HostRuntime::new(PythonVersion::new(3, 12), vec![site.to_path_buf()])
    }

    #[test]
    fn test_resolve_entry_point() {
        let site = site_packages();
        let dist_info = site.path().join("hello-1.0.dist-info");
        fs::create_dir_all(&dist_info).unwrap();
        fs::write(dist_info.join("entry_points.txt"), ENTRY_POINTS_TXT).unwrap();

        let resolved = resolve_installed(&runtime(site.path()), "ep1", "console_scripts").unwrap();
        assert_eq!(resolved.name, "ep1");
        assert_eq!(resolved.group, "console_scripts");
        assert_eq!(
            resolved.filename,
            site.path().join("hello.py").display().to_string()
        );
        assert_eq!(resolved.lineno, 4);
    }

    #[test]
    fn test_each_stage_has_its_own_error() {
        let site = site_packages();
        let resolver = SourceTreeResolver::from_runtime(&runtime(site.path()));
        let index = index();
        let resolve = |name: &str| resolve_entry_point(&index, &resolver, name, "console_scripts");

        assert!(matches!(
            resolve("missing"),
            Err(LocateError::EntryPointNotFound { .. })
        ));
        assert!(matches!(
            resolve("gone"),
            Err(LocateError::CallableUnresolvable { .. })
        ));
        assert!(matches!(
            resolve("made"),
            Err(LocateError::SourceFileUnresolvable { .. })
        ));
        assert!(matches!(
            resolve("ext"),
            Err(LocateError::SourceFileUnresolvable { .. })
        ));
    }

    #[test]
    fn test_group_must_match() {
        let site = site_packages();
        let resolver = SourceTreeResolver::from_runtime(&runtime(site.path()));
        let result = resolve_entry_point(&index(), &resolver, "ep1", "gui_scripts");
        assert!(matches!(result, Err(LocateError::EntryPointNotFound { .. })));
    }

    #[test]
    fn test_line_resolution_failure() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = FixedResolver(CallableHandle::CodeUnit {
            file: temp_dir.path().join("deleted.py"),
            offset: 0,
            anchor: "def ep1():".to_string(),
        });
        let result = resolve_entry_point(&index(), &resolver, "ep1", "console_scripts");
        assert!(matches!(
            result,
            Err(LocateError::LineResolutionFailed { .. })
        ));
    }

    #[test]
    fn test_unsupported_runtime() {
        let site = site_packages();
        let old = HostRuntime::new(PythonVersion::new(3, 7), vec![site.path().to_path_buf()]);
        assert!(matches!(
            resolve_installed(&old, "ep1", "console_scripts"),
            Err(LocateError::UnsupportedRuntime { .. })
        ));
    }
}
