//! Reference resolution and source inspection
//!
//! An entry point value names a module and an attribute chain inside it.
//! A [`ReferenceResolver`] turns that pair into a [`CallableHandle`], which
//! knows the file and byte offset of the definition when there is one.
//! [`SourceTreeResolver`] does this statically over the host's search path.

mod bindings;
mod source_tree;

pub use source_tree::SourceTreeResolver;

use crate::syntax::line_of;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a reference could not be followed to a callable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No module named '{0}'")]
    ModuleNotFound(String),

    #[error("module '{module}' has no attribute '{attribute}'")]
    AttributeNotFound { module: String, attribute: String },

    #[error("cannot read {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("invalid syntax in {} at line {line}", path.display())]
    Syntax { path: PathBuf, line: usize },

    #[error("relative import beyond the top-level package in '{0}'")]
    RelativeImport(String),

    #[error("import chain too deep while resolving '{0}'")]
    TooDeep(String),
}

/// Why a handle has no usable source location
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InspectError {
    #[error("{0}")]
    NoSourceFile(String),

    #[error("cannot read {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("definition no longer found at byte {offset} of {}", path.display())]
    DefinitionMoved { path: PathBuf, offset: usize },
}

/// What an attribute chain resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallableHandle {
    /// A `def`, `class` or `lambda` in a source file
    ///
    /// `offset` is where the definition starts, decorators included, and
    /// `anchor` is the source text of its first line from that offset.
    CodeUnit {
        file: PathBuf,
        offset: usize,
        anchor: String,
    },
    /// A source module
    Module { file: PathBuf },
    /// A value computed at import time, such as the result of a call
    Synthesized { description: String },
    /// Something defined in an extension, bytecode-only or built-in module
    Native {
        module: String,
        origin: Option<PathBuf>,
    },
}

impl CallableHandle {
    /// File the definition lives in
    pub fn source_file(&self) -> Result<&Path, InspectError> {
        match self {
            CallableHandle::CodeUnit { file, .. } | CallableHandle::Module { file } => Ok(file),
            CallableHandle::Synthesized { description } => {
                Err(InspectError::NoSourceFile(description.clone()))
            }
            CallableHandle::Native {
                module,
                origin: Some(origin),
            } => Err(InspectError::NoSourceFile(format!(
                "module '{}' is loaded from {}",
                module,
                origin.display()
            ))),
            CallableHandle::Native {
                module,
                origin: None,
            } => Err(InspectError::NoSourceFile(format!(
                "module '{}' is built into the interpreter",
                module
            ))),
        }
    }

    /// 1-based first line, read from the file as it is now
    pub fn first_line(&self) -> Result<usize, InspectError> {
        match self {
            CallableHandle::CodeUnit {
                file,
                offset,
                anchor,
            } => {
                let source = read_source(file)?;
                let found = source
                    .get(*offset..)
                    .is_some_and(|rest| rest.starts_with(anchor.as_str()));
                if !found {
                    return Err(InspectError::DefinitionMoved {
                        path: file.clone(),
                        offset: *offset,
                    });
                }
                Ok(line_of(&source, *offset))
            }
            CallableHandle::Module { file } => {
                read_source(file)?;
                Ok(1)
            }
            other => other.source_file().map(|_| 1),
        }
    }
}

fn read_source(file: &Path) -> Result<String, InspectError> {
    fs::read_to_string(file).map_err(|e| InspectError::Unreadable {
        path: file.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Follows `module:attr.chain` references to callables
pub trait ReferenceResolver {
    fn resolve_reference(
        &self,
        module_path: &str,
        attribute_chain: &[String],
    ) -> Result<CallableHandle, ResolveError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_code_unit_first_line() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("hello.py");
        let source = "import os\n\n@wrap\ndef ep1():\n    pass\n";
        fs::write(&file, source).unwrap();

        let handle = CallableHandle::CodeUnit {
            file: file.clone(),
            offset: source.find('@').unwrap(),
            anchor: "@wrap".to_string(),
        };
        assert_eq!(handle.source_file().unwrap(), file.as_path());
        assert_eq!(handle.first_line().unwrap(), 3);
    }

    #[test]
    fn test_code_unit_definition_moved() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("hello.py");
        fs::write(&file, "def ep1():\n    pass\n").unwrap();

        let handle = CallableHandle::CodeUnit {
            file,
            offset: 4,
            anchor: "def ep1():".to_string(),
        };
        assert!(matches!(
            handle.first_line(),
            Err(InspectError::DefinitionMoved { offset: 4, .. })
        ));
    }

    #[test]
    fn test_code_unit_file_removed() {
        let temp_dir = TempDir::new().unwrap();
        let handle = CallableHandle::CodeUnit {
            file: temp_dir.path().join("gone.py"),
            offset: 0,
            anchor: "def".to_string(),
        };
        assert!(handle.source_file().is_ok());
        assert!(matches!(
            handle.first_line(),
            Err(InspectError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_handles_without_source() {
        let synthesized = CallableHandle::Synthesized {
            description: "result of a call at line 4".to_string(),
        };
        assert!(matches!(
            synthesized.source_file(),
            Err(InspectError::NoSourceFile(_))
        ));

        let native = CallableHandle::Native {
            module: "_speedups".to_string(),
            origin: Some(PathBuf::from("/site/_speedups.so")),
        };
        let err = native.source_file().unwrap_err();
        assert!(err.to_string().contains("_speedups.so"));
    }

    #[test]
    fn test_module_handle_is_line_one() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("mod.py");
        fs::write(&file, "x = 1\n").unwrap();
        assert_eq!(CallableHandle::Module { file }.first_line().unwrap(), 1);
    }
}
