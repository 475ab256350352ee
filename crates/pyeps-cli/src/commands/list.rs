use crate::runtime::RuntimeSelection;
use anyhow::Result;
use pyeps_core::codec::encode_list;
use pyeps_index::enumerate_installed;
use pyeps_logger as logger;

/// `pyeps list [GROUP]`
pub fn handle_list(group: Option<&str>, selection: &RuntimeSelection) -> Result<String> {
    let runtime = selection.discover()?;
    let entry_points = enumerate_installed(&runtime, group)?;
    logger::debug(&format!("Found {} installed entry points", entry_points.len()));
    Ok(encode_list(&entry_points)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{fake_venv, install};
    use pyeps_core::LocateError;
    use tempfile::TempDir;

    #[test]
    fn test_list_group() {
        let temp_dir = TempDir::new().unwrap();
        let site = fake_venv(temp_dir.path());
        install(
            &site,
            "hello",
            "[console_scripts]\nep1 = hello:ep1\n\n[other]\nep2 = hello:ep2\n",
            &[],
        );
        let selection = RuntimeSelection {
            python: None,
            venv: Some(temp_dir.path().to_path_buf()),
        };

        let output = handle_list(Some("console_scripts"), &selection).unwrap();
        assert_eq!(
            output,
            "[{\"name\":\"ep1\",\"group\":\"console_scripts\",\"value\":[\"hello\",\"ep1\"]}]\n"
        );

        let all = handle_list(None, &selection).unwrap();
        assert!(all.contains("\"ep1\"") && all.contains("\"ep2\""));
    }

    #[test]
    fn test_list_without_runtime() {
        let temp_dir = TempDir::new().unwrap();
        let selection = RuntimeSelection {
            python: None,
            venv: Some(temp_dir.path().join("missing")),
        };
        let err = handle_list(None, &selection).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LocateError>(),
            Some(LocateError::MetadataUnavailable(_))
        ));
    }
}
