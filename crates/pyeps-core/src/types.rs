//! Entry point records
//!
//! Records are created once per invocation and never mutated afterwards.
//! Field order of the structs is the key order of the encoded JSON objects.

use crate::declaration::DeclarationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Object reference grammar used by `importlib.metadata`.
static REFERENCE_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(?P<module>[\w.]+)\s*(:\s*(?P<attr>[\w.]+)\s*)?((?P<extras>\[.*\])\s*)?$").ok()
});

// =============================================================================
// ENTRY POINT VALUE
// =============================================================================

/// Right-hand side of a declaration, split on `:`
///
/// The first segment is the module path and the remaining segment is the
/// attribute chain inside that module. There are always at least two
/// segments, and [`EntryPointValue::joined`] reproduces the text the value
/// was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct EntryPointValue(SmallVec<[String; 2]>);

impl EntryPointValue {
    /// Split a trimmed right-hand side such as `pkg.mod:attr.chain`.
    pub fn parse(raw: &str) -> Result<Self, DeclarationError> {
        let segments: SmallVec<[String; 2]> = raw.split(':').map(str::to_string).collect();
        if segments.len() < 2 {
            return Err(DeclarationError::MissingAttribute(raw.to_string()));
        }
        Ok(Self(segments))
    }

    /// Module path segment.
    pub fn module(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Rejoin the segments with `:`.
    pub fn joined(&self) -> String {
        self.0.join(":")
    }
}

impl TryFrom<Vec<String>> for EntryPointValue {
    type Error = DeclarationError;

    fn try_from(segments: Vec<String>) -> Result<Self, Self::Error> {
        if segments.len() < 2 {
            return Err(DeclarationError::MissingAttribute(segments.join(":")));
        }
        Ok(Self(SmallVec::from_vec(segments)))
    }
}

impl From<EntryPointValue> for Vec<String> {
    fn from(value: EntryPointValue) -> Self {
        value.0.into_vec()
    }
}

impl fmt::Display for EntryPointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.joined())
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// A named, grouped reference to a callable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryPoint {
    pub name: String,
    pub group: String,
    pub value: EntryPointValue,
}

impl EntryPoint {
    pub fn new(name: impl Into<String>, group: impl Into<String>, value: EntryPointValue) -> Self {
        EntryPoint {
            name: name.into(),
            group: group.into(),
            value,
        }
    }

    /// Parse the value into a resolvable [`Reference`].
    pub fn reference(&self) -> Result<Reference, DeclarationError> {
        Reference::from_value(&self.value)
    }
}

/// Definition site of the callable an [`EntryPoint`] references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntryPoint {
    pub name: String,
    pub group: String,
    /// Absolute path of the defining source file
    pub filename: String,
    /// 1-based line of the definition
    pub lineno: usize,
}

// =============================================================================
// REFERENCE
// =============================================================================

/// Resolver view of an entry point value
///
/// `pkg.mod : Outer.inner [extra]` becomes module `pkg.mod`, attributes
/// `["Outer", "inner"]` and extras `["extra"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub module: String,
    pub attributes: Vec<String>,
    pub extras: Vec<String>,
}

impl Reference {
    pub fn from_value(value: &EntryPointValue) -> Result<Self, DeclarationError> {
        let joined = value.joined();
        let invalid = || DeclarationError::InvalidReference(joined.clone());

        let pattern = REFERENCE_PATTERN.as_ref().ok_or_else(invalid)?;
        let captures = pattern.captures(joined.trim()).ok_or_else(invalid)?;

        let module = captures
            .name("module")
            .map(|m| m.as_str().to_string())
            .ok_or_else(invalid)?;
        let attr = captures.name("attr").map(|m| m.as_str()).ok_or_else(invalid)?;

        let attributes: Vec<String> = attr.split('.').map(str::to_string).collect();
        if module.split('.').any(str::is_empty) || attributes.iter().any(String::is_empty) {
            return Err(invalid());
        }

        let extras = captures
            .name("extras")
            .map(|m| {
                m.as_str()
                    .trim_matches(|c| c == '[' || c == ']')
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Reference {
            module,
            attributes,
            extras,
        })
    }

    /// Dotted attribute chain, e.g. `Outer.inner`.
    pub fn qualname(&self) -> String {
        self.attributes.join(".")
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.qualname())
    }
}

// =============================================================================
// PYTHON VERSION
// =============================================================================

/// Host interpreter generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PythonVersion {
    pub major: u8,
    pub minor: u8,
}

impl PythonVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        PythonVersion { major, minor }
    }

    /// Parse `3.11`, `3.11.4` or `3.12.0rc1` style strings.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().split('.');
        let major = parts.next()?.trim().parse().ok()?;
        let minor_digits: String = parts
            .next()?
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        let minor = minor_digits.parse().ok()?;
        Some(PythonVersion { major, minor })
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(raw: &str) -> EntryPointValue {
        EntryPointValue::parse(raw).unwrap()
    }

    #[test]
    fn test_value_round_trip() {
        for raw in ["pkg.mod:attr", "hello:ep1", "a:b:c", "pkg : attr [extra]"] {
            let parsed = value(raw);
            assert_eq!(parsed.joined(), raw);
            assert_eq!(EntryPointValue::parse(&parsed.joined()).unwrap(), parsed);
        }
    }

    #[test]
    fn test_value_requires_attribute() {
        assert!(matches!(
            EntryPointValue::parse("pkg.mod"),
            Err(DeclarationError::MissingAttribute(_))
        ));
        assert!(EntryPointValue::try_from(vec!["only".to_string()]).is_err());
    }

    #[test]
    fn test_value_serializes_as_array() {
        let encoded = serde_json::to_string(&value("pkg.mod:attr")).unwrap();
        assert_eq!(encoded, r#"["pkg.mod","attr"]"#);

        let decoded: EntryPointValue = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(decoded.module(), "a");
        assert!(serde_json::from_str::<EntryPointValue>(r#"["a"]"#).is_err());
    }

    #[test]
    fn test_reference_from_value() {
        let reference = Reference::from_value(&value("pkg.cli : Outer.main [color, fast]")).unwrap();
        assert_eq!(reference.module, "pkg.cli");
        assert_eq!(reference.attributes, vec!["Outer", "main"]);
        assert_eq!(reference.extras, vec!["color", "fast"]);
        assert_eq!(reference.to_string(), "pkg.cli:Outer.main");
    }

    #[test]
    fn test_reference_rejects_bad_values() {
        assert!(Reference::from_value(&value("a:b:c")).is_err());
        assert!(Reference::from_value(&value(":main")).is_err());
        assert!(Reference::from_value(&value("pkg:main.")).is_err());
        assert!(Reference::from_value(&value("pkg..mod:main")).is_err());
    }

    #[test]
    fn test_python_version_parse() {
        assert_eq!(PythonVersion::parse("3.11.4"), Some(PythonVersion::new(3, 11)));
        assert_eq!(PythonVersion::parse("3.12.0rc1"), Some(PythonVersion::new(3, 12)));
        assert_eq!(PythonVersion::parse("3.8"), Some(PythonVersion::new(3, 8)));
        assert_eq!(PythonVersion::parse("three"), None);
        assert!(PythonVersion::new(3, 9) < PythonVersion::new(3, 10));
        assert_eq!(PythonVersion::new(3, 10).to_string(), "3.10");
    }
}
