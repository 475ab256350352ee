//! Boundary error taxonomy
//!
//! Every pyeps operation fails with exactly one of these variants. The CLI
//! maps them onto per-operation exit codes; nothing else crosses the
//! operation boundary.

use crate::declaration::DeclarationError;
use crate::types::PythonVersion;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("Python {found} is not supported, {required} or newer is required")]
    UnsupportedRuntime {
        found: PythonVersion,
        required: PythonVersion,
    },

    #[error("Package metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Descriptor not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("Descriptor unreadable: {}: {reason}", path.display())]
    ScriptUnreadable { path: PathBuf, reason: String },

    #[error("Descriptor evaluation failed: {0}")]
    ScriptEvaluationFailed(String),

    #[error("Project manifest invalid: {0}")]
    ProjectManifestInvalid(String),

    #[error("Entry point '{name}' not found in group '{group}'")]
    EntryPointNotFound { name: String, group: String },

    #[error("Failed to load '{reference}': {reason}")]
    CallableUnresolvable { reference: String, reason: String },

    #[error("No source file for '{reference}': {reason}")]
    SourceFileUnresolvable { reference: String, reason: String },

    #[error("Cannot determine the definition line of '{reference}': {reason}")]
    LineResolutionFailed { reference: String, reason: String },

    #[error("No origin available for module '{0}'")]
    OriginNotFound(String),
}

impl LocateError {
    /// Build the error for a descriptor or manifest read failure.
    pub fn from_read_error(path: PathBuf, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            LocateError::ScriptNotFound(path)
        } else {
            LocateError::ScriptUnreadable {
                path,
                reason: err.to_string(),
            }
        }
    }
}

impl From<DeclarationError> for LocateError {
    fn from(err: DeclarationError) -> Self {
        LocateError::ScriptEvaluationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_unsupported_runtime_display() {
        let err = LocateError::UnsupportedRuntime {
            found: PythonVersion::new(3, 7),
            required: PythonVersion::new(3, 8),
        };
        assert_eq!(
            err.to_string(),
            "Python 3.7 is not supported, 3.8 or newer is required"
        );
    }

    #[test]
    fn test_from_read_error() {
        let missing = LocateError::from_read_error(
            PathBuf::from("setup.py"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(missing, LocateError::ScriptNotFound(_)));

        let denied = LocateError::from_read_error(
            PathBuf::from("setup.py"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(denied, LocateError::ScriptUnreadable { .. }));
        assert!(denied.to_string().contains("setup.py"));
    }

    #[test]
    fn test_declaration_error_is_evaluation_failure() {
        let err: LocateError = DeclarationError::MissingSeparator("x".to_string()).into();
        assert!(matches!(err, LocateError::ScriptEvaluationFailed(_)));
    }
}
