//! Name bindings of a module or class body
//!
//! Bindings are collected in statement order, descending into `if` and
//! `with` bodies. A `try` statement becomes one [`Binding::Guarded`] so the
//! resolver can tell the path that runs when the body's imports load from
//! the handler that runs when they fail. Function bodies and loops are not
//! searched.

use crate::syntax::{named_children, nested_blocks, statements, PyNode};

/// Module named by a `from ... import` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ImportBase {
    Absolute(String),
    /// `from ..pkg import x` is level 2 with module `pkg`
    Relative { level: usize, module: Option<String> },
}

/// One statement that binds a name
pub(crate) enum Binding<'r> {
    /// `def`, `class` (decorated or not) or a `lambda` expression
    Definition(PyNode<'r>),
    /// `import a.b as c` binds `c` to `a.b`; `import a.b` binds `a` to `a`
    Module(String),
    /// `from base import name`
    Imported { base: ImportBase, name: String },
    /// `from base import *`; may or may not bind the name
    Wildcard(ImportBase),
    /// Another name or a dotted attribute chain
    Alias(Vec<String>),
    /// Any other value, such as the result of a call
    Value { kind: String, offset: usize },
    /// Bindings made inside a `try` statement
    ///
    /// `primary` holds the body and `else` bindings, `fallback` those of
    /// the first `except` clause. `body` is the `try` block itself.
    Guarded {
        body: PyNode<'r>,
        primary: Vec<Binding<'r>>,
        fallback: Vec<Binding<'r>>,
    },
}

/// Bindings of `name` in `scope`, in statement order
pub(crate) fn bindings_of<'r>(scope: &PyNode<'r>, name: &str) -> Vec<Binding<'r>> {
    let mut found = Vec::new();
    collect_block(scope, name, &mut found);
    found
}

fn collect_block<'r>(block: &PyNode<'r>, name: &str, found: &mut Vec<Binding<'r>>) {
    for statement in statements(block) {
        collect_statement(&statement, name, found);
    }
}

fn collect_statement<'r>(statement: &PyNode<'r>, name: &str, found: &mut Vec<Binding<'r>>) {
    match statement.kind().as_ref() {
        "function_definition" | "class_definition" => {
            if defines(statement, name) {
                found.push(Binding::Definition(statement.clone()));
            }
        }
        "decorated_definition" => {
            if statement
                .field("definition")
                .is_some_and(|definition| defines(&definition, name))
            {
                found.push(Binding::Definition(statement.clone()));
            }
        }
        "expression_statement" => {
            for child in named_children(statement) {
                match child.kind().as_ref() {
                    "assignment" => collect_assignment(&child, name, found),
                    "augmented_assignment" => {
                        if child.field("left").is_some_and(|left| left.text() == name) {
                            found.push(Binding::Value {
                                kind: "augmented assignment".to_string(),
                                offset: child.range().start,
                            });
                        }
                    }
                    _ => {}
                }
            }
        }
        "import_statement" => collect_import(statement, name, found),
        "import_from_statement" => collect_import_from(statement, name, found),
        "try_statement" => collect_try(statement, name, found),
        "if_statement" | "with_statement" => {
            for block in nested_blocks(statement) {
                collect_block(&block, name, found);
            }
        }
        _ => {}
    }
}

fn collect_try<'r>(statement: &PyNode<'r>, name: &str, found: &mut Vec<Binding<'r>>) {
    let Some(body) = statement.field("body") else {
        return;
    };
    let mut primary = Vec::new();
    let mut fallback = Vec::new();
    let mut finally = Vec::new();
    let mut handled = false;
    collect_block(&body, name, &mut primary);

    for clause in named_children(statement) {
        let Some(block) = clause_block(&clause) else {
            continue;
        };
        match clause.kind().as_ref() {
            "else_clause" => collect_block(&block, name, &mut primary),
            "except_clause" | "except_group_clause" if !handled => {
                handled = true;
                collect_block(&block, name, &mut fallback);
            }
            "finally_clause" => collect_block(&block, name, &mut finally),
            _ => {}
        }
    }

    if !primary.is_empty() || !fallback.is_empty() {
        found.push(Binding::Guarded {
            body,
            primary,
            fallback,
        });
    }
    // `finally` runs on both paths
    found.extend(finally);
}

fn clause_block<'r>(clause: &PyNode<'r>) -> Option<PyNode<'r>> {
    clause.field("body").or_else(|| {
        named_children(clause)
            .into_iter()
            .find(|child| child.kind() == "block")
    })
}

fn defines(definition: &PyNode<'_>, name: &str) -> bool {
    definition
        .field("name")
        .is_some_and(|ident| ident.text() == name)
}

// ===== ASSIGNMENTS =====

fn collect_assignment<'r>(node: &PyNode<'r>, name: &str, found: &mut Vec<Binding<'r>>) {
    // `a = b = value` nests the second assignment as the right side
    let mut targets = Vec::new();
    let mut current = node.clone();
    let value = loop {
        if let Some(left) = current.field("left") {
            targets.push(left);
        }
        match current.field("right") {
            Some(right) if right.kind() == "assignment" => current = right,
            Some(right) => break right,
            // Annotation without a value
            None => return,
        }
    };

    for target in targets {
        match target.kind().as_ref() {
            "identifier" => {
                if target.text() == name {
                    found.push(value_binding(&value));
                }
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" => {
                collect_unpacking(&target, &value, name, found);
            }
            _ => {}
        }
    }
}

fn collect_unpacking<'r>(
    target: &PyNode<'r>,
    value: &PyNode<'r>,
    name: &str,
    found: &mut Vec<Binding<'r>>,
) {
    let elements = named_children(target);
    let Some(position) = elements
        .iter()
        .position(|element| element.kind() == "identifier" && element.text() == name)
    else {
        return;
    };

    let items = match value.kind().as_ref() {
        "expression_list" | "tuple" | "list" => named_children(value),
        _ => Vec::new(),
    };
    match items.get(position) {
        Some(item) if items.len() == elements.len() => found.push(value_binding(item)),
        _ => found.push(Binding::Value {
            kind: "unpacked value".to_string(),
            offset: value.range().start,
        }),
    }
}

fn value_binding<'r>(value: &PyNode<'r>) -> Binding<'r> {
    match value.kind().as_ref() {
        "lambda" => Binding::Definition(value.clone()),
        "identifier" | "attribute" => match dotted_path(value) {
            Some(path) => Binding::Alias(path),
            None => Binding::Value {
                kind: "attribute".to_string(),
                offset: value.range().start,
            },
        },
        "parenthesized_expression" => match named_children(value).first() {
            Some(inner) => value_binding(inner),
            None => Binding::Value {
                kind: "tuple".to_string(),
                offset: value.range().start,
            },
        },
        other => Binding::Value {
            kind: other.to_string(),
            offset: value.range().start,
        },
    }
}

/// `a.b.c` as `["a", "b", "c"]`, if every part is a plain name
fn dotted_path(node: &PyNode<'_>) -> Option<Vec<String>> {
    match node.kind().as_ref() {
        "identifier" => Some(vec![node.text().to_string()]),
        "attribute" => {
            let mut path = dotted_path(&node.field("object")?)?;
            path.push(node.field("attribute")?.text().to_string());
            Some(path)
        }
        _ => None,
    }
}

// ===== IMPORTS =====

fn collect_import<'r>(statement: &PyNode<'r>, name: &str, found: &mut Vec<Binding<'r>>) {
    for child in named_children(statement) {
        match child.kind().as_ref() {
            "dotted_name" => {
                let module = child.text();
                let top = module.split('.').next().unwrap_or_default();
                if top == name {
                    found.push(Binding::Module(top.to_string()));
                }
            }
            "aliased_import" => {
                if let (Some(module), Some(alias)) = (child.field("name"), child.field("alias")) {
                    if alias.text() == name {
                        found.push(Binding::Module(module.text().to_string()));
                    }
                }
            }
            _ => {}
        }
    }
}

fn collect_import_from<'r>(statement: &PyNode<'r>, name: &str, found: &mut Vec<Binding<'r>>) {
    let Some(module_node) = statement.field("module_name") else {
        return;
    };
    let base = import_base(&module_node);
    let names_start = module_node.range().end;

    for child in named_children(statement) {
        if child.range().start < names_start {
            continue;
        }
        match child.kind().as_ref() {
            "dotted_name" => {
                if child.text() == name {
                    found.push(Binding::Imported {
                        base: base.clone(),
                        name: name.to_string(),
                    });
                }
            }
            "aliased_import" => {
                if let (Some(imported), Some(alias)) = (child.field("name"), child.field("alias"))
                {
                    if alias.text() == name {
                        found.push(Binding::Imported {
                            base: base.clone(),
                            name: imported.text().to_string(),
                        });
                    }
                }
            }
            "wildcard_import" => found.push(Binding::Wildcard(base.clone())),
            _ => {}
        }
    }
}

pub(crate) fn import_base(module_node: &PyNode<'_>) -> ImportBase {
    if module_node.kind() != "relative_import" {
        return ImportBase::Absolute(module_node.text().to_string());
    }
    let mut level = 0;
    let mut module = None;
    for child in named_children(module_node) {
        match child.kind().as_ref() {
            "import_prefix" => level = child.text().chars().filter(|c| *c == '.').count(),
            "dotted_name" => module = Some(child.text().to_string()),
            _ => {}
        }
    }
    ImportBase::Relative { level, module }
}

/// Body of a class definition, looking through decorators
pub(crate) fn class_body<'r>(definition: &PyNode<'r>) -> Option<PyNode<'r>> {
    let class = match definition.kind().as_ref() {
        "decorated_definition" => definition.field("definition")?,
        _ => definition.clone(),
    };
    if class.kind() != "class_definition" {
        return None;
    }
    class.field("body")
}
