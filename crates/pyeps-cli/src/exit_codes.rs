//! Exit codes per command family
//!
//! Codes are stable within a family: 0 is success, 1 an unexpected
//! failure, and each [`LocateError`] variant a family can produce has its
//! own code from 2 upwards. Usage errors keep clap's exit code.

use pyeps_core::LocateError;

pub const SUCCESS: i32 = 0;
pub const UNEXPECTED: i32 = 1;

/// Which subcommand an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    List,
    Descriptor,
    Project,
    Find,
    Origin,
}

impl Family {
    /// Exit code for `err` raised by this family
    pub fn exit_code(self, err: &LocateError) -> i32 {
        use LocateError as E;
        match (self, err) {
            (Family::List, E::MetadataUnavailable(_)) => 2,
            (Family::List, E::UnsupportedRuntime { .. }) => 3,

            (Family::Descriptor, E::ScriptEvaluationFailed(_)) => 2,
            (Family::Descriptor, E::ScriptNotFound(_)) => 3,
            (Family::Descriptor, E::ScriptUnreadable { .. }) => 4,

            (Family::Project, E::ProjectManifestInvalid(_)) => 2,
            (Family::Project, E::ScriptNotFound(_)) => 3,
            (Family::Project, E::ScriptUnreadable { .. }) => 4,

            (Family::Find, E::MetadataUnavailable(_)) => 2,
            (Family::Find, E::EntryPointNotFound { .. }) => 3,
            (Family::Find, E::SourceFileUnresolvable { .. }) => 4,
            (Family::Find, E::LineResolutionFailed { .. }) => 5,
            (Family::Find, E::UnsupportedRuntime { .. }) => 6,
            (Family::Find, E::CallableUnresolvable { .. }) => 7,

            (Family::Origin, E::MetadataUnavailable(_)) => 2,
            (Family::Origin, E::OriginNotFound(_)) => 3,
            (Family::Origin, E::UnsupportedRuntime { .. }) => 4,

            _ => UNEXPECTED,
        }
    }
}

/// Exit code for any failure of a command
///
/// Errors that are not a [`LocateError`] are unexpected.
pub fn for_error(family: Family, err: &anyhow::Error) -> i32 {
    err.downcast_ref::<LocateError>()
        .map_or(UNEXPECTED, |e| family.exit_code(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyeps_core::PythonVersion;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn unsupported() -> LocateError {
        LocateError::UnsupportedRuntime {
            found: PythonVersion::new(3, 7),
            required: PythonVersion::new(3, 8),
        }
    }

    fn reasoned(make: fn(String, String) -> LocateError) -> LocateError {
        make("hello:ep1".to_string(), "reason".to_string())
    }

    #[test]
    fn test_find_codes_are_distinct() {
        let errors = vec![
            LocateError::MetadataUnavailable("no python".to_string()),
            LocateError::EntryPointNotFound {
                name: "ep1".to_string(),
                group: "console_scripts".to_string(),
            },
            reasoned(|reference, reason| LocateError::SourceFileUnresolvable { reference, reason }),
            reasoned(|reference, reason| LocateError::LineResolutionFailed { reference, reason }),
            unsupported(),
            reasoned(|reference, reason| LocateError::CallableUnresolvable { reference, reason }),
        ];
        let codes: Vec<i32> = errors.iter().map(|e| Family::Find.exit_code(e)).collect();
        assert_eq!(codes, vec![2, 3, 4, 5, 6, 7]);
        assert_eq!(codes.iter().collect::<HashSet<_>>().len(), codes.len());
    }

    #[test]
    fn test_family_tables() {
        let missing = LocateError::ScriptNotFound(PathBuf::from("setup.py"));
        assert_eq!(Family::Descriptor.exit_code(&missing), 3);
        assert_eq!(Family::Project.exit_code(&missing), 3);
        assert_eq!(
            Family::Project.exit_code(&LocateError::ProjectManifestInvalid("x".to_string())),
            2
        );
        assert_eq!(Family::List.exit_code(&unsupported()), 3);
        assert_eq!(Family::Origin.exit_code(&unsupported()), 4);
        assert_eq!(
            Family::Origin.exit_code(&LocateError::OriginNotFound("nope".to_string())),
            3
        );
    }

    #[test]
    fn test_foreign_errors_are_unexpected() {
        let err = anyhow::anyhow!("encoder failed");
        assert_eq!(for_error(Family::List, &err), UNEXPECTED);

        let err = anyhow::Error::new(LocateError::OriginNotFound("x".to_string()));
        assert_eq!(for_error(Family::Origin, &err), 3);
        assert_eq!(
            Family::List.exit_code(&LocateError::OriginNotFound("x".to_string())),
            UNEXPECTED
        );
    }
}
