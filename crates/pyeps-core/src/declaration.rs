//! Declaration grammar
//!
//! A declaration is a single `name = module:attr.chain` string. Declarations
//! appear one per line in `entry_points.txt` (PEP 566 metadata), grouped
//! under `[group]` headers, and as list items or INI text in legacy
//! `setup()` calls.

use crate::types::{EntryPoint, EntryPointValue};
use thiserror::Error;
use tracing::debug;

/// Errors raised while parsing declaration strings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("declaration '{0}' has no '=' separator")]
    MissingSeparator(String),

    #[error("declaration '{0}' has an empty name")]
    EmptyName(String),

    #[error("entry point value '{0}' has no ':' separator")]
    MissingAttribute(String),

    #[error("entry point value '{0}' is not a valid object reference")]
    InvalidReference(String),

    #[error("declaration '{0}' is not inside a [group] section")]
    OutsideGroup(String),
}

/// Parse one declaration belonging to `group`.
///
/// The text is split on the first `=`, both sides are trimmed and the right
/// side is split on `:`.
pub fn parse_declaration(group: &str, text: &str) -> Result<EntryPoint, DeclarationError> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| DeclarationError::MissingSeparator(text.to_string()))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(DeclarationError::EmptyName(text.to_string()));
    }

    let value = EntryPointValue::parse(value.trim())?;
    Ok(EntryPoint::new(name, group, value))
}

/// One meaningful line of an INI-style entry point listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SectionedLine<'a> {
    section: Option<&'a str>,
    text: &'a str,
}

/// Iterate the non-blank, non-comment, non-header lines of `content`
/// together with the section they belong to.
fn sectioned(content: &str) -> impl Iterator<Item = SectionedLine<'_>> {
    let mut section: Option<&str> = None;
    content.lines().filter_map(move |line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            return None;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = Some(line[1..line.len() - 1].trim());
            return None;
        }
        Some(SectionedLine {
            section,
            text: line,
        })
    })
}

/// Parse the contents of an installed `entry_points.txt`.
///
/// Installed metadata is trusted to be well formed; lines that do not parse
/// are logged and skipped.
pub fn parse_entry_points_txt(content: &str) -> Vec<EntryPoint> {
    let mut entries = Vec::new();

    for line in sectioned(content) {
        let Some(group) = line.section else {
            debug!("Skipping entry point line outside of a section: {}", line.text);
            continue;
        };
        match parse_declaration(group, line.text) {
            Ok(entry) => entries.push(entry),
            Err(err) => debug!("Skipping malformed entry point line: {}", err),
        }
    }

    entries
}

/// Parse INI text handed to `setup(entry_points=...)`.
///
/// Unlike installed metadata, every line must be a valid declaration.
pub fn parse_entry_points_ini(content: &str) -> Result<Vec<EntryPoint>, DeclarationError> {
    sectioned(content)
        .map(|line| match line.section {
            Some(group) => parse_declaration(group, line.text),
            None => Err(DeclarationError::OutsideGroup(line.text.to_string())),
        })
        .collect()
}

/// Parse a group body given as one multi-line string.
pub fn parse_declaration_lines(
    group: &str,
    content: &str,
) -> Result<Vec<EntryPoint>, DeclarationError> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| parse_declaration(group, line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_declaration_trims_both_sides() {
        let entry = parse_declaration("console_scripts", " ep1 =hello:ep1").unwrap();
        assert_eq!(entry.name, "ep1");
        assert_eq!(entry.group, "console_scripts");
        assert_eq!(entry.value.segments(), ["hello", "ep1"]);
    }

    #[test]
    fn test_parse_declaration_splits_on_first_equals() {
        let entry = parse_declaration("g", "name = pkg:attr=odd").unwrap();
        assert_eq!(entry.name, "name");
        assert_eq!(entry.value.joined(), "pkg:attr=odd");
    }

    #[test]
    fn test_parse_declaration_errors() {
        assert!(matches!(
            parse_declaration("g", "no separator"),
            Err(DeclarationError::MissingSeparator(_))
        ));
        assert!(matches!(
            parse_declaration("g", " = pkg:attr"),
            Err(DeclarationError::EmptyName(_))
        ));
        assert!(matches!(
            parse_declaration("g", "name = pkg"),
            Err(DeclarationError::MissingAttribute(_))
        ));
    }

    #[test]
    fn test_parse_entry_points_txt_multiple_sections() {
        let content = r"
# generated by setuptools
[console_scripts]
hello = hello.cli:main

[myapp.plugins]
add-defaults = pkg.sysmod.defaults:add_defaults
; ignored comment
broken line

[gui_scripts]
viewer = pkg.gui:App.run
";
        let entries = parse_entry_points_txt(content);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].group, "console_scripts");
        assert_eq!(entries[1].name, "add-defaults");
        assert_eq!(entries[1].group, "myapp.plugins");
        assert_eq!(entries[2].value.segments(), ["pkg.gui", "App.run"]);
    }

    #[test]
    fn test_parse_entry_points_txt_skips_lines_before_sections() {
        let entries = parse_entry_points_txt("orphan = pkg:main\n[g]\nok = pkg:ok\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "ok");
    }

    #[test]
    fn test_parse_entry_points_ini_is_strict() {
        let parsed = parse_entry_points_ini("[console_scripts]\nrun = app:run\n").unwrap();
        assert_eq!(parsed.len(), 1);

        assert!(matches!(
            parse_entry_points_ini("run = app:run\n"),
            Err(DeclarationError::OutsideGroup(_))
        ));
        assert!(parse_entry_points_ini("[g]\nnot a declaration\n").is_err());
    }

    #[test]
    fn test_parse_declaration_lines() {
        let parsed = parse_declaration_lines("g", "a = m:a\n\n  b = m:b  \n").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].name, "b");
        assert_eq!(parsed[1].value.joined(), "m:b");
    }
}
