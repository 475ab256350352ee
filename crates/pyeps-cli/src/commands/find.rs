use crate::runtime::RuntimeSelection;
use anyhow::Result;
use pyeps_ast::resolve_installed;
use pyeps_core::codec::encode_record;

/// `pyeps find NAME GROUP`
pub fn handle_find(name: &str, group: &str, selection: &RuntimeSelection) -> Result<String> {
    let runtime = selection.discover()?;
    let resolved = resolve_installed(&runtime, name, group)?;
    Ok(encode_record(&resolved)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{fake_venv, install};
    use pyeps_core::LocateError;
    use tempfile::TempDir;

    const HELLO_PY: &str = "def ep1():\n    pass\n\n\n@staticmethod\ndef ep2():\n    pass\n";

    #[test]
    fn test_find_installed_entry_point() {
        let temp_dir = TempDir::new().unwrap();
        let site = fake_venv(temp_dir.path());
        install(
            &site,
            "hello",
            "[console_scripts]\nep1 = hello:ep1\nep2 = hello:ep2\n",
            &[("hello.py", HELLO_PY)],
        );
        let selection = RuntimeSelection {
            python: None,
            venv: Some(temp_dir.path().to_path_buf()),
        };

        let filename = site.join("hello.py").display().to_string();
        let output = handle_find("ep2", "console_scripts", &selection).unwrap();
        assert_eq!(
            output,
            format!(
                "{{\"name\":\"ep2\",\"group\":\"console_scripts\",\"filename\":{},\"lineno\":5}}",
                serde_json::to_string(&filename).unwrap()
            )
        );

        let err = handle_find("ep3", "console_scripts", &selection).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LocateError>(),
            Some(LocateError::EntryPointNotFound { .. })
        ));
    }
}
