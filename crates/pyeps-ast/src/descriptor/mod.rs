//! Legacy `setup.py` descriptors
//!
//! A descriptor registers entry points by calling `setup(entry_points=...)`.
//! The script is interpreted by a small evaluator in an explicit
//! [`ExecutionContext`] whose `setup` records its argument and whose package
//! discovery helpers return nothing, so evaluating a descriptor never
//! touches real packaging machinery or the filesystem.
//!
//! When the script takes a path the evaluator cannot follow and that path
//! could call `setup()`, the capture is opaque and evaluation fails rather
//! than report entry points from a guessed path.

mod context;
mod eval;
mod value;

pub use context::ExecutionContext;
pub use eval::EvalError;
pub use value::{Routine, Value};

use crate::source_text::SourceText;
use crate::syntax::{first_syntax_error, line_of, parse};
use eval::Evaluator;
use pyeps_core::declaration::{parse_declaration_lines, parse_entry_points_ini};
use pyeps_core::{parse_declaration, EntryPoint, LocateError};
use pyeps_logger as logger;

impl From<EvalError> for LocateError {
    fn from(err: EvalError) -> Self {
        LocateError::ScriptEvaluationFailed(err.to_string())
    }
}

/// `evaluateDescriptor`: entry points registered by a descriptor script
pub fn evaluate_descriptor(
    source: &SourceText,
    group: Option<&str>,
) -> Result<Vec<EntryPoint>, LocateError> {
    let text = source.read()?;

    let mut context = ExecutionContext::sandboxed();
    if let Some(path) = source.path() {
        context.set_global("__file__", Value::Str(path.display().to_string()));
    }

    let entry_points = evaluate_in(&mut context, &text)?;
    logger::debug(&format!(
        "Descriptor registered {} entry points",
        entry_points.len()
    ));

    Ok(match group {
        Some(group) => entry_points
            .into_iter()
            .filter(|ep| ep.group == group)
            .collect(),
        None => entry_points,
    })
}

/// Run `source` in `context` and collect what its `setup()` calls captured
pub fn evaluate_in(
    context: &mut ExecutionContext,
    source: &str,
) -> Result<Vec<EntryPoint>, EvalError> {
    run(context, source)?;
    collect_entry_points(context.captured())
}

/// Execute `source` as a script, including the functions it calls
pub fn run(context: &mut ExecutionContext, source: &str) -> Result<(), EvalError> {
    let grep = parse(source);
    let root = grep.root();
    if let Some(offset) = first_syntax_error(&root) {
        return Err(EvalError::Syntax {
            line: line_of(source, offset),
        });
    }
    Evaluator::new(context, source).exec_module(&root)
}

/// Turn captured `entry_points` arguments into entry points
///
/// Accepted shapes: a mapping of group to a list or tuple of declarations,
/// a mapping of group to one multi-line string, or one INI string.
pub fn collect_entry_points(captured: &[Value]) -> Result<Vec<EntryPoint>, EvalError> {
    let mut entry_points = Vec::new();
    for value in captured {
        match value {
            Value::None => {}
            Value::Str(text) => entry_points.extend(parse_entry_points_ini(text)?),
            Value::Dict(_) => {
                let Some(groups) = value.pairs() else {
                    return Err(shape_error(value));
                };
                for (group, declarations) in &groups {
                    let Value::Str(group) = group else {
                        return Err(shape_error(group));
                    };
                    entry_points.extend(group_entry_points(group, declarations)?);
                }
            }
            other => return Err(shape_error(other)),
        }
    }
    Ok(entry_points)
}

fn group_entry_points(group: &str, declarations: &Value) -> Result<Vec<EntryPoint>, EvalError> {
    match declarations {
        Value::Str(text) => Ok(parse_declaration_lines(group, text)?),
        Value::List(_) | Value::Tuple(_) => {
            let Some(items) = declarations.sequence() else {
                return Err(shape_error(declarations));
            };
            items
                .iter()
                .map(|item| match item {
                    Value::Str(text) => Ok(parse_declaration(group, text)?),
                    other => Err(shape_error(other)),
                })
                .collect()
        }
        other => Err(shape_error(other)),
    }
}

fn shape_error(value: &Value) -> EvalError {
    if value.is_static() {
        EvalError::UnsupportedEntryPoints(value.type_name())
    } else {
        EvalError::NotStatic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyeps_core::codec::encode_list;
    use std::fs;
    use tempfile::TempDir;

    const MOCK_SETUP_PY: &str = r#"from setuptools import setup, find_packages, find_namespace_packages

_ = find_packages()
_ = find_namespace_packages()

var = "ep2 = hello:ep2"

_ = setup(
    name="mock-setup_py-repo",
    version="0.1.0",
    entry_points={
        "console_scripts": [
            " ep1 =hello:ep1",
        ],
        "other": [
            var,
        ],
    },
)
"#;

    fn inline(text: &str) -> SourceText {
        SourceText::Inline(text.to_string())
    }

    #[test]
    fn test_mock_setup_py_by_group() {
        let entry_points =
            evaluate_descriptor(&inline(MOCK_SETUP_PY), Some("console_scripts")).unwrap();
        assert_eq!(
            encode_list(&entry_points).unwrap(),
            "[{\"name\":\"ep1\",\"group\":\"console_scripts\",\"value\":[\"hello\",\"ep1\"]}]\n"
        );
    }

    #[test]
    fn test_mock_setup_py_all_groups() {
        let entry_points = evaluate_descriptor(&inline(MOCK_SETUP_PY), None).unwrap();
        let names: Vec<(&str, &str)> = entry_points
            .iter()
            .map(|ep| (ep.group.as_str(), ep.name.as_str()))
            .collect();
        assert_eq!(names, vec![("console_scripts", "ep1"), ("other", "ep2")]);
    }

    #[test]
    fn test_descriptor_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("setup.py");
        fs::write(&path, MOCK_SETUP_PY).unwrap();

        let entry_points =
            evaluate_descriptor(&SourceText::Path(path), Some("other")).unwrap();
        assert_eq!(entry_points.len(), 1);
        assert_eq!(entry_points[0].value.segments(), ["hello", "ep2"]);
    }

    #[test]
    fn test_discovery_helpers_return_empty_lists() {
        let mut context = ExecutionContext::sandboxed();
        run(
            &mut context,
            "import setuptools\npackages = setuptools.find_packages(where='src')\n",
        )
        .unwrap();
        assert_eq!(context.global("packages"), Some(&Value::list(Vec::new())));
    }

    #[test]
    fn test_ini_and_multiline_shapes() {
        let source = r#"
from distutils.core import setup
setup(entry_points="""
[console_scripts]
a = pkg.cli:main
""")
setup(entry_points={"gui_scripts": "g = pkg.gui:run\n  h = pkg.gui:other"})
"#;
        let entry_points = evaluate_descriptor(&inline(source), None).unwrap();
        let names: Vec<&str> = entry_points.iter().map(|ep| ep.name.as_str()).collect();
        assert_eq!(names, vec!["a", "g", "h"]);
    }

    #[test]
    fn test_no_setup_call_is_empty() {
        let entry_points = evaluate_descriptor(&inline("x = 1\n"), None).unwrap();
        assert!(entry_points.is_empty());
    }

    #[test]
    fn test_failures_are_evaluation_errors() {
        let cases = [
            "setup(entry_points={\n",
            "raise RuntimeError('boom')\n",
            "from setuptools import setup\nsetup(entry_points=load())\n",
            "from setuptools import setup\nsetup(entry_points={'g': ['no separator']})\n",
            "from setuptools import setup\nsetup(entry_points=[1])\n",
        ];
        for source in cases {
            let result = evaluate_descriptor(&inline(source), None);
            assert!(
                matches!(result, Err(LocateError::ScriptEvaluationFailed(_))),
                "{:?}",
                source
            );
        }
    }

    #[test]
    fn test_missing_descriptor() {
        let result = evaluate_descriptor(
            &SourceText::Path("/nonexistent/setup.py".into()),
            None,
        );
        assert!(matches!(result, Err(LocateError::ScriptNotFound(_))));
    }

    #[test]
    fn test_unknown_setup_is_not_trusted() {
        // Without substitutes `setup` is unknown code that may register anything
        let mut context = ExecutionContext::empty();
        let result = evaluate_in(
            &mut context,
            "from setuptools import setup\nsetup(entry_points={'g': ['a = m:a']})\n",
        );
        assert_eq!(result.err(), Some(EvalError::NotStatic));

        let source = "from skbuild import setup\nsetup(entry_points={'g': ['a = m:a']})\n";
        let result = evaluate_descriptor(&inline(source), None);
        assert!(matches!(result, Err(LocateError::ScriptEvaluationFailed(_))));
    }

    #[test]
    fn test_version_dependent_setup_fails() {
        let source = r#"
import sys
from setuptools import setup
if sys.version_info >= (3, 0):
    setup(entry_points={"console_scripts": ["new = pkg:new"]})
else:
    setup(entry_points={"console_scripts": ["legacy = pkg:legacy"]})
"#;
        let result = evaluate_descriptor(&inline(source), None);
        assert!(matches!(result, Err(LocateError::ScriptEvaluationFailed(_))));
    }

    #[test]
    fn test_main_function_with_loop() {
        let source = r#"
from setuptools import setup

COMMANDS = ("build", "serve")

def main():
    scripts = []
    for command in COMMANDS:
        scripts.append(f"{command} = pkg.commands:{command}")
    setup(name="pkg", entry_points={"console_scripts": scripts})

if __name__ == "__main__":
    main()
"#;
        let entry_points = evaluate_descriptor(&inline(source), None).unwrap();
        let names: Vec<&str> = entry_points.iter().map(|ep| ep.name.as_str()).collect();
        assert_eq!(names, vec!["build", "serve"]);
        assert_eq!(entry_points[1].value.segments(), ["pkg.commands", "serve"]);
    }

    #[test]
    fn test_comprehension_inside_setup() {
        let source = r#"
from setuptools import setup
TOOLS = ["fmt", "lint"]
setup(entry_points={"console_scripts": [f"{t} = tools.{t}:main" for t in TOOLS]})
"#;
        let entry_points =
            evaluate_descriptor(&inline(source), Some("console_scripts")).unwrap();
        let names: Vec<&str> = entry_points.iter().map(|ep| ep.name.as_str()).collect();
        assert_eq!(names, vec!["fmt", "lint"]);
    }

    #[test]
    fn test_changes_after_setup_are_ignored() {
        let source = r#"
from setuptools import setup
eps = {"console_scripts": ["a = m:a"]}
setup(entry_points=eps)
eps["console_scripts"].append("b = m:b")
"#;
        let entry_points = evaluate_descriptor(&inline(source), None).unwrap();
        assert_eq!(entry_points.len(), 1);
    }
}
