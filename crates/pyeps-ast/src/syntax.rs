//! Shared helpers over the ast-grep Python tree

use ast_grep_core::source::StrDoc;
use ast_grep_core::{AstGrep, Node};
use ast_grep_language::Python;
use std::ops::Range;

pub(crate) type PyNode<'r> = Node<'r, StrDoc<Python>>;

pub(crate) fn parse(source: &str) -> AstGrep<StrDoc<Python>> {
    AstGrep::new(source, Python)
}

/// Byte offset of the first error or missing node, if the tree has one.
pub(crate) fn first_syntax_error(root: &PyNode<'_>) -> Option<usize> {
    root.dfs()
        .find(|node| {
            node.kind() == "ERROR"
                || (node.is_named() && node.range().is_empty() && node.kind() != "module")
        })
        .map(|node| node.range().start)
}

/// 1-based line of a byte offset
pub(crate) fn line_of(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}

/// Named children, comments excluded
pub(crate) fn named_children<'r>(node: &PyNode<'r>) -> Vec<PyNode<'r>> {
    node.children()
        .filter(|child| child.is_named() && child.kind() != "comment")
        .collect()
}

/// Statements of a `module` or `block`
pub(crate) fn statements<'r>(node: &PyNode<'r>) -> Vec<PyNode<'r>> {
    named_children(node)
}

/// Body blocks of an `if` / `try` / `with` / `for` / `while` statement, in
/// source order
pub(crate) fn nested_blocks<'r>(statement: &PyNode<'r>) -> Vec<PyNode<'r>> {
    let mut blocks = Vec::new();
    for child in named_children(statement) {
        match child.kind().as_ref() {
            "block" => blocks.push(child),
            "elif_clause" | "else_clause" | "except_clause" | "except_group_clause"
            | "finally_clause" => {
                blocks.extend(
                    named_children(&child)
                        .into_iter()
                        .filter(|n| n.kind() == "block"),
                );
            }
            _ => {}
        }
    }
    blocks
}

/// Prefix flags and content bounds of a string token
pub(crate) struct StringShape {
    pub raw: bool,
    pub bytes: bool,
    pub formatted: bool,
    /// Byte range of the text between the quotes
    pub content: Range<usize>,
}

pub(crate) fn string_shape(text: &str) -> Option<StringShape> {
    let quote_at = text.find(['"', '\''])?;
    let prefix = text[..quote_at].to_ascii_lowercase();
    let body = &text[quote_at..];
    let quote_len = if body.starts_with("\"\"\"") || body.starts_with("'''") {
        3
    } else {
        1
    };
    if body.len() < quote_len * 2 {
        return None;
    }
    Some(StringShape {
        raw: prefix.contains('r'),
        bytes: prefix.contains('b'),
        formatted: prefix.contains('f'),
        content: quote_at + quote_len..text.len() - quote_len,
    })
}

/// Decode a single `string` node
///
/// Returns `None` for bytes literals and for f-strings with replacement
/// fields, which the evaluator splits itself.
pub(crate) fn string_literal(text: &str) -> Option<String> {
    let shape = string_shape(text)?;
    if shape.bytes {
        return None;
    }
    let content = text.get(shape.content.clone())?;

    if shape.formatted {
        // `{{` and `}}` are the only braces allowed in a constant f-string
        let stripped = content.replace("{{", "").replace("}}", "");
        if stripped.contains(['{', '}']) {
            return None;
        }
        return Some(fstring_segment(content, shape.raw));
    }

    if shape.raw {
        Some(content.to_string())
    } else {
        Some(unescape(content))
    }
}

/// Literal text between the replacement fields of an f-string
pub(crate) fn fstring_segment(segment: &str, raw: bool) -> String {
    let collapsed = segment.replace("{{", "{").replace("}}", "}");
    if raw {
        collapsed
    } else {
        unescape(&collapsed)
    }
}

fn unescape(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(escaped) = chars.next() else {
            out.push('\\');
            break;
        };
        match escaped {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            'x' => push_code_point(&mut out, &mut chars, 2, "\\x"),
            'u' => push_code_point(&mut out, &mut chars, 4, "\\u"),
            'U' => push_code_point(&mut out, &mut chars, 8, "\\U"),
            '0'..='7' => {
                let mut value = escaped.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.extend(char::from_u32(value));
            }
            other => {
                // Unknown escapes are kept verbatim
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

fn push_code_point(
    out: &mut String,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    width: usize,
    marker: &str,
) {
    let mut digits = String::with_capacity(width);
    for _ in 0..width {
        match chars.peek() {
            Some(c) if c.is_ascii_hexdigit() => {
                digits.push(*c);
                chars.next();
            }
            _ => break,
        }
    }
    match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
        Some(c) if digits.len() == width => out.push(c),
        _ => {
            out.push_str(marker);
            out.push_str(&digits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_literal_quotes_and_prefixes() {
        assert_eq!(string_literal("'plain'").as_deref(), Some("plain"));
        assert_eq!(string_literal("\"double\"").as_deref(), Some("double"));
        assert_eq!(
            string_literal("\"\"\"multi\nline\"\"\"").as_deref(),
            Some("multi\nline")
        );
        assert_eq!(string_literal("r'a\\nb'").as_deref(), Some("a\\nb"));
        assert_eq!(string_literal("u'text'").as_deref(), Some("text"));
        assert_eq!(string_literal("''").as_deref(), Some(""));
    }

    #[test]
    fn test_string_literal_escapes() {
        assert_eq!(string_literal("'a\\tb\\n'").as_deref(), Some("a\tb\n"));
        assert_eq!(string_literal("'\\x41\\u00e9\\101'").as_deref(), Some("AéA"));
        assert_eq!(string_literal("'\\q'").as_deref(), Some("\\q"));
        assert_eq!(string_literal("'it\\'s'").as_deref(), Some("it's"));
    }

    #[test]
    fn test_string_literal_not_static() {
        assert_eq!(string_literal("b'bytes'"), None);
        assert_eq!(string_literal("f'{name} = m:f'"), None);
        assert_eq!(string_literal("f'a {{b}}'").as_deref(), Some("a {b}"));
    }

    #[test]
    fn test_fstring_segments() {
        assert_eq!(fstring_segment("{{x}}\\t", false), "{x}\t");
        assert_eq!(fstring_segment("a\\n{{", true), "a\\n{");

        let shape = string_shape("rf'''{a}'''").unwrap();
        assert!(shape.raw && shape.formatted && !shape.bytes);
        assert_eq!(shape.content, 5..8);
    }

    #[test]
    fn test_line_of() {
        let source = "a = 1\n\ndef f():\n    pass\n";
        assert_eq!(line_of(source, 0), 1);
        assert_eq!(line_of(source, source.find("def").unwrap()), 3);
        assert_eq!(line_of(source, usize::MAX), 5);
    }

    #[test]
    fn test_first_syntax_error() {
        let ok = parse("x = [1, 2]\n");
        assert_eq!(first_syntax_error(&ok.root()), None);

        let broken = parse("setup(entry_points={\n");
        assert!(first_syntax_error(&broken.root()).is_some());
    }

    #[test]
    fn test_nested_blocks() {
        let grep = parse("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        let root = grep.root();
        let statement = statements(&root).remove(0);
        assert_eq!(nested_blocks(&statement).len(), 3);
    }
}
