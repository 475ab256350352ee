//! pyproject.toml entry point parser (PEP 621)
//!
//! `[project.scripts]` and `[project.gui-scripts]` map to the
//! `console_scripts` and `gui_scripts` groups; every table under
//! `[project.entry-points]` is a group of its own.

use crate::source_text::SourceText;
use pyeps_core::{EntryPoint, EntryPointValue, LocateError};
use pyeps_logger as logger;

/// Tables of `[project]` that map onto a fixed group
const SCRIPT_TABLES: [(&str, &str); 2] = [
    ("scripts", "console_scripts"),
    ("gui-scripts", "gui_scripts"),
];

/// `projectEntryPoints`: entry points declared by a project manifest
pub fn project_entry_points(
    source: &SourceText,
    group: Option<&str>,
) -> Result<Vec<EntryPoint>, LocateError> {
    let content = source.read()?;
    let entries = parse_pyproject_entry_points(&content)?;
    Ok(match group {
        Some(group) => entries.into_iter().filter(|ep| ep.group == group).collect(),
        None => entries,
    })
}

/// Parse entry points from pyproject.toml content
///
/// Order is scripts, gui-scripts, then entry-point groups in document
/// order. Non-string values and values without a `:` are skipped.
pub fn parse_pyproject_entry_points(content: &str) -> Result<Vec<EntryPoint>, LocateError> {
    let parsed: toml::Value =
        toml::from_str(content).map_err(|e| LocateError::ProjectManifestInvalid(e.to_string()))?;

    let Some(project) = parsed.get("project").and_then(|p| p.as_table()) else {
        logger::debug("pyproject.toml has no [project] table");
        return Ok(Vec::new());
    };

    let mut entries = Vec::new();
    for (table, group) in SCRIPT_TABLES {
        if let Some(declarations) = project.get(table).and_then(|t| t.as_table()) {
            collect_group(group, declarations, &mut entries);
        }
    }

    if let Some(groups) = project.get("entry-points").and_then(|t| t.as_table()) {
        for (group, declarations) in groups {
            let Some(declarations) = declarations.as_table() else {
                continue;
            };
            collect_group(group, declarations, &mut entries);
        }
    }

    if !entries.is_empty() {
        logger::debug(&format!(
            "Parsed {} entry points from pyproject.toml",
            entries.len()
        ));
    }

    Ok(entries)
}

fn collect_group(group: &str, declarations: &toml::Table, entries: &mut Vec<EntryPoint>) {
    for (name, target) in declarations {
        let Some(target) = target.as_str() else {
            continue;
        };
        match EntryPointValue::parse(target.trim()) {
            Ok(value) => entries.push(EntryPoint::new(name.trim(), group, value)),
            Err(err) => logger::debug(&format!("Skipping {} in [{}]: {}", name, group, err)),
        }
    }
}
