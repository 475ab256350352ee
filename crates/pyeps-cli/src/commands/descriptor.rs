use anyhow::Result;
use pyeps_ast::{evaluate_descriptor, SourceText};
use pyeps_core::codec::encode_list;

/// `pyeps descriptor [--inline] SOURCE [GROUP]`
pub fn handle_descriptor(source: &str, inline: bool, group: Option<&str>) -> Result<String> {
    let source = SourceText::from_argument(source, inline);
    let entry_points = evaluate_descriptor(&source, group)?;
    Ok(encode_list(&entry_points)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyeps_core::LocateError;

    #[test]
    fn test_inline_descriptor() {
        let source = "from setuptools import setup\n\
                      setup(entry_points={'console_scripts': [' ep1 =hello:ep1']})\n";
        let output = handle_descriptor(source, false, Some("console_scripts")).unwrap();
        assert_eq!(
            output,
            "[{\"name\":\"ep1\",\"group\":\"console_scripts\",\"value\":[\"hello\",\"ep1\"]}]\n"
        );
    }

    #[test]
    fn test_inline_flag_forces_text() {
        let output = handle_descriptor("x = 1", true, None).unwrap();
        assert_eq!(output, "[]\n");

        let err = handle_descriptor("x = 1", false, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LocateError>(),
            Some(LocateError::ScriptNotFound(_))
        ));
    }
}
