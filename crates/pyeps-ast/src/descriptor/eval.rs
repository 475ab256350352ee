//! Tree-walking evaluator for descriptor scripts
//!
//! Statements run in order, including the bodies of functions the script
//! calls and of classes it defines. `for` loops run over known iterables
//! and `while` loops run while their condition is known.
//!
//! Code the evaluator cannot follow is never guessed at. A condition or
//! iterable that is not known skips the code it guards, and skipping
//! makes every name that code could bind opaque and every container it
//! could change unknown. A `setup()` call it could reach is captured as an
//! opaque value, so the descriptor fails to evaluate instead of reporting
//! a partial result.

use super::context::ExecutionContext;
use super::value::{order, Routine, Value};
use crate::syntax::{
    fstring_segment, line_of, named_children, statements, string_literal, string_shape, PyNode,
};
use pyeps_core::DeclarationError;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("invalid syntax at line {line}")]
    Syntax { line: usize },

    #[error("exception raised at line {line}")]
    Raised { line: usize },

    #[error("{message} at line {line}")]
    Type { message: String, line: usize },

    #[error("key {key} not found at line {line}")]
    Key { key: String, line: usize },

    #[error("{construct} at line {line} cannot be evaluated")]
    Unsupported { construct: String, line: usize },

    #[error("entry_points passed to setup() is not statically known")]
    NotStatic,

    #[error("entry_points of type {0} is not supported")]
    UnsupportedEntryPoints(&'static str),

    #[error(transparent)]
    Declaration(#[from] DeclarationError),
}

impl EvalError {
    /// Errors a surrounding `try` would catch
    fn is_exception(&self) -> bool {
        matches!(
            self,
            EvalError::Raised { .. } | EvalError::Type { .. } | EvalError::Key { .. }
        )
    }
}

/// Script function calls nested deeper than this are not followed
const MAX_CALL_DEPTH: usize = 16;

/// Iterations one `while` loop may run
const MAX_ITERATIONS: usize = 10_000;

/// Longest list `range()` builds
const MAX_RANGE: usize = 10_000;

/// Container methods that change their receiver
const MUTATING_METHODS: &[&str] = &[
    "append",
    "extend",
    "insert",
    "update",
    "setdefault",
    "pop",
    "popitem",
    "remove",
    "clear",
    "sort",
    "reverse",
];

/// Builtins that neither keep nor change their arguments
const INERT_BUILTINS: &[&str] = &[
    "open",
    "isinstance",
    "issubclass",
    "hasattr",
    "getattr",
    "repr",
    "int",
    "bool",
    "format",
    "min",
    "max",
    "any",
    "all",
    "set",
    "frozenset",
    "type",
    "id",
    "hash",
];

/// How a block of statements finished
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

#[derive(Default)]
struct Arguments {
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
    /// A `*` or `**` argument whose contents are not known
    unknown: bool,
}

impl Arguments {
    fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.positional
            .iter()
            .chain(self.keywords.iter().map(|(_, value)| value))
    }

    fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .rev()
            .find(|(keyword, _)| keyword == name)
            .map(|(_, value)| value)
    }
}

#[derive(Clone)]
struct Parameter {
    name: String,
    default: Option<Value>,
    keyword_only: bool,
}

/// A `def` the script has executed
#[derive(Clone)]
struct Function<'r> {
    name: String,
    body: Option<PyNode<'r>>,
    parameters: Vec<Parameter>,
    star: Option<String>,
    double_star: Option<String>,
    /// Enclosing function locals when the `def` ran
    closure: HashMap<String, Value>,
}

/// Local scope of a running function or class body
#[derive(Default)]
struct Frame {
    locals: HashMap<String, Value>,
    closure: HashMap<String, Value>,
    /// Names declared `global`
    globals: HashSet<String>,
    class_body: bool,
}

/// What a piece of skipped code could have done
#[derive(Default)]
struct Effects {
    bound: Vec<String>,
    /// Variables holding containers the code could change
    mutated: Vec<String>,
    declared_global: Vec<String>,
    captures: bool,
    /// Script functions already scanned
    visited: HashSet<String>,
}

pub(crate) struct Evaluator<'a, 'r> {
    context: &'a mut ExecutionContext,
    source: &'a str,
    functions: Vec<Function<'r>>,
    frames: Vec<Frame>,
    /// Every `def` in the script by name, consulted when a call cannot be
    /// followed
    definitions: HashMap<String, Vec<PyNode<'r>>>,
}

impl<'a, 'r> Evaluator<'a, 'r> {
    pub(crate) fn new(context: &'a mut ExecutionContext, source: &'a str) -> Self {
        Evaluator {
            context,
            source,
            functions: Vec::new(),
            frames: Vec::new(),
            definitions: HashMap::new(),
        }
    }

    fn line(&self, node: &PyNode<'r>) -> usize {
        line_of(self.source, node.range().start)
    }

    fn type_error(&self, node: &PyNode<'r>, message: String) -> EvalError {
        EvalError::Type {
            message,
            line: self.line(node),
        }
    }

    fn key_error(&self, node: &PyNode<'r>, key: &Value) -> EvalError {
        EvalError::Key {
            key: key.repr().unwrap_or_else(|| key.type_name().to_string()),
            line: self.line(node),
        }
    }

    fn unsupported(&self, node: &PyNode<'r>, construct: impl Into<String>) -> EvalError {
        EvalError::Unsupported {
            construct: construct.into(),
            line: self.line(node),
        }
    }

    /// Run a parsed module
    pub(crate) fn exec_module(&mut self, root: &PyNode<'r>) -> Result<(), EvalError> {
        for node in root.dfs() {
            if node.kind() != "function_definition" {
                continue;
            }
            let Some(name) = node.field("name") else {
                continue;
            };
            let name = name.text().to_string();
            self.definitions.entry(name).or_default().push(node);
        }
        self.exec_block(root)?;
        Ok(())
    }

    // ===== SCOPES =====

    /// Innermost frame, unless `name` is declared global in it
    fn local_frame(&self, name: &str) -> Option<&Frame> {
        self.frames
            .last()
            .filter(|frame| !frame.globals.contains(name))
    }

    fn lookup(&self, name: &str) -> Value {
        if let Some(frame) = self.local_frame(name) {
            if let Some(value) = frame.locals.get(name).or_else(|| frame.closure.get(name)) {
                return value.clone();
            }
        }
        if let Some(value) = self.context.global(name) {
            return value.clone();
        }
        Routine::builtin(name).map_or(Value::Opaque, Value::Routine)
    }

    fn set_name(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) if !frame.globals.contains(name) => {
                frame.locals.insert(name.to_string(), value);
            }
            _ => self.context.set_global(name, value),
        }
    }

    fn unset_name(&mut self, name: &str) -> Option<Value> {
        match self.frames.last_mut() {
            Some(frame) if !frame.globals.contains(name) => frame.locals.remove(name),
            _ => self.context.remove_global(name),
        }
    }

    /// Value bound to `name` in the current scope itself
    fn scoped(&self, name: &str) -> Option<Value> {
        match self.local_frame(name) {
            Some(frame) => frame.locals.get(name).cloned(),
            None => self.context.global(name).cloned(),
        }
    }

    /// Locals a function defined now can see
    fn closure(&self) -> HashMap<String, Value> {
        let Some(frame) = self.frames.last() else {
            return HashMap::new();
        };
        let mut closure = frame.closure.clone();
        if !frame.class_body {
            closure.extend(frame.locals.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        closure
    }

    // ===== STATEMENTS =====

    fn exec_block(&mut self, block: &PyNode<'r>) -> Result<Flow, EvalError> {
        for statement in statements(block) {
            match self.exec(&statement)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_optional(&mut self, block: Option<&PyNode<'r>>) -> Result<Flow, EvalError> {
        match block {
            Some(block) => self.exec_block(block),
            None => Ok(Flow::Normal),
        }
    }

    fn exec(&mut self, statement: &PyNode<'r>) -> Result<Flow, EvalError> {
        match statement.kind().as_ref() {
            "expression_statement" => {
                for child in named_children(statement) {
                    match child.kind().as_ref() {
                        "assignment" => {
                            self.assign(&child)?;
                        }
                        "augmented_assignment" => self.augmented_assign(&child)?,
                        _ => {
                            self.eval(&child)?;
                        }
                    }
                }
            }
            "import_statement" => self.import(statement),
            "import_from_statement" => self.import_from(statement),
            "if_statement" => return self.exec_if(statement),
            "for_statement" => return self.exec_for(statement),
            "while_statement" => return self.exec_while(statement),
            "try_statement" => return self.exec_try(statement),
            "with_statement" => return self.exec_with(statement),
            "function_definition" => {
                if let Some(name) = statement.field("name") {
                    let function = self.define_function(statement)?;
                    self.set_name(&name.text(), function);
                }
            }
            "class_definition" => self.define_class(statement)?,
            "decorated_definition" => self.define_decorated(statement)?,
            "return_statement" => {
                let value = match named_children(statement).first() {
                    Some(value) => self.eval(value)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            "break_statement" => return Ok(Flow::Break),
            "continue_statement" => return Ok(Flow::Continue),
            "raise_statement" => {
                return Err(EvalError::Raised {
                    line: self.line(statement),
                })
            }
            "assert_statement" => {
                if let Some(test) = named_children(statement).first() {
                    if self.eval(test)?.truthy() == Some(false) {
                        return Err(EvalError::Raised {
                            line: self.line(statement),
                        });
                    }
                }
            }
            "delete_statement" => {
                for target in named_children(statement) {
                    self.delete(&target)?;
                }
            }
            "global_statement" => {
                if let Some(frame) = self.frames.last_mut() {
                    for name in named_children(statement) {
                        frame.globals.insert(name.text().to_string());
                    }
                }
            }
            "nonlocal_statement" => return Err(self.unsupported(statement, "nonlocal")),
            "pass_statement" | "future_import_statement" | "print_statement" => {}
            other => {
                trace!("Not following {} at line {}", other, self.line(statement));
                self.skip(std::slice::from_ref(statement));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_if(&mut self, statement: &PyNode<'r>) -> Result<Flow, EvalError> {
        // One (condition, body) per arm; `else` has no condition
        let mut arms = vec![(statement.field("condition"), statement.field("consequence"))];
        for clause in named_children(statement) {
            match clause.kind().as_ref() {
                "elif_clause" => {
                    arms.push((clause.field("condition"), clause.field("consequence")));
                }
                "else_clause" => arms.push((None, clause.field("body"))),
                _ => {}
            }
        }

        for (index, (condition, body)) in arms.iter().enumerate() {
            let taken = match condition {
                Some(condition) => self.eval(condition)?.truthy(),
                None => Some(true),
            };
            match taken {
                Some(true) => return self.exec_optional(body.as_ref()),
                Some(false) => {}
                None => {
                    trace!("Condition at line {} is not known", self.line(statement));
                    let skipped: Vec<PyNode<'r>> =
                        arms[index..].iter().filter_map(|(_, body)| body.clone()).collect();
                    self.skip(&skipped);
                    return Ok(Flow::Normal);
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for(&mut self, statement: &PyNode<'r>) -> Result<Flow, EvalError> {
        let (Some(target), Some(iterable)) = (statement.field("left"), statement.field("right"))
        else {
            return Ok(Flow::Normal);
        };
        let body = statement.field("body");
        let else_body = else_body(statement);

        let Some(items) = self.eval(&iterable)?.iterate() else {
            trace!("Iterable at line {} is not known", self.line(statement));
            self.skip(std::slice::from_ref(statement));
            return Ok(Flow::Normal);
        };

        for item in items {
            self.bind(&target, item)?;
            match self.exec_optional(body.as_ref())? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        self.exec_optional(else_body.as_ref())
    }

    fn exec_while(&mut self, statement: &PyNode<'r>) -> Result<Flow, EvalError> {
        let Some(condition) = statement.field("condition") else {
            return Ok(Flow::Normal);
        };
        let body = statement.field("body");
        let else_body = else_body(statement);

        let mut iterations = 0;
        loop {
            match self.eval(&condition)?.truthy() {
                Some(true) => {
                    iterations += 1;
                    if iterations > MAX_ITERATIONS {
                        return Err(self.unsupported(
                            statement,
                            format!("while loop running over {} times", MAX_ITERATIONS),
                        ));
                    }
                    match self.exec_optional(body.as_ref())? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Some(false) => return self.exec_optional(else_body.as_ref()),
                None => {
                    trace!("Loop condition at line {} is not known", self.line(statement));
                    self.skip(std::slice::from_ref(statement));
                    return Ok(Flow::Normal);
                }
            }
        }
    }

    fn exec_try(&mut self, statement: &PyNode<'r>) -> Result<Flow, EvalError> {
        let mut handler = None;
        let mut else_block = None;
        let mut finally_block = None;
        for clause in named_children(statement) {
            match clause.kind().as_ref() {
                "except_clause" | "except_group_clause" if handler.is_none() => {
                    handler = block_child(&clause);
                }
                "else_clause" => else_block = clause.field("body"),
                "finally_clause" => finally_block = block_child(&clause),
                _ => {}
            }
        }

        let outcome = self.exec_optional(statement.field("body").as_ref());
        let outcome = match outcome {
            Ok(Flow::Normal) => self.exec_optional(else_block.as_ref()),
            Ok(flow) => Ok(flow),
            Err(err) if err.is_exception() => match &handler {
                Some(body) => {
                    trace!("Handling {} in the first except clause", err);
                    self.exec_block(body)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        };

        if let Some(body) = &finally_block {
            match self.exec_block(body)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        outcome
    }

    fn exec_with(&mut self, statement: &PyNode<'r>) -> Result<Flow, EvalError> {
        for clause in named_children(statement) {
            if clause.kind() != "with_clause" {
                continue;
            }
            for item in named_children(&clause) {
                let Some(value) = item.field("value") else {
                    continue;
                };
                if value.kind() != "as_pattern" {
                    self.eval(&value)?;
                    continue;
                }
                if let Some(manager) = named_children(&value).first() {
                    self.eval(manager)?;
                }
                if let Some(alias) = value.field("alias") {
                    let mut effects = Effects::default();
                    collect_targets(&alias, &mut effects);
                    for name in &effects.bound {
                        self.set_name(name, Value::Opaque);
                    }
                }
            }
        }
        self.exec_optional(statement.field("body").as_ref())
    }

    fn delete(&mut self, target: &PyNode<'r>) -> Result<(), EvalError> {
        match target.kind().as_ref() {
            "identifier" => {
                self.unset_name(&target.text());
            }
            "expression_list" | "tuple" | "list" | "pattern_list" | "parenthesized_expression" => {
                for inner in named_children(target) {
                    self.delete(&inner)?;
                }
            }
            "subscript" => {
                let (Some(container), Some(key)) = (target.field("value"), target.field("subscript"))
                else {
                    return Ok(());
                };
                let container = self.eval(&container)?;
                let key = self.eval(&key)?;
                match &container {
                    Value::Dict(dict) if key.is_static() && container.is_known() => {
                        let mut dict = dict.borrow_mut();
                        match dict.items.iter().position(|(k, _)| *k == key) {
                            Some(index) => {
                                dict.items.remove(index);
                            }
                            None => return Err(self.key_error(target, &key)),
                        }
                    }
                    Value::List(list) if container.is_known() => {
                        let mut list = list.borrow_mut();
                        match list_index(list.items.len(), &key) {
                            Some(index) => {
                                list.items.remove(index);
                            }
                            None if matches!(key, Value::Int(_)) => {
                                return Err(self.type_error(
                                    target,
                                    "list assignment index out of range".to_string(),
                                ))
                            }
                            None => list.known = false,
                        }
                    }
                    _ => container.forget(),
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ===== DEFINITIONS =====

    fn define_function(&mut self, definition: &PyNode<'r>) -> Result<Value, EvalError> {
        let mut parameters = Vec::new();
        let mut star = None;
        let mut double_star = None;
        let mut keyword_only = false;

        if let Some(list) = definition.field("parameters") {
            for parameter in named_children(&list) {
                match parameter.kind().as_ref() {
                    "identifier" => parameters.push(Parameter {
                        name: parameter.text().to_string(),
                        default: None,
                        keyword_only,
                    }),
                    "default_parameter" | "typed_default_parameter" => {
                        let Some(name) = parameter.field("name") else {
                            continue;
                        };
                        // Defaults are evaluated once, when the `def` runs
                        let default = match parameter.field("value") {
                            Some(value) => self.eval(&value)?,
                            None => Value::Opaque,
                        };
                        parameters.push(Parameter {
                            name: name.text().to_string(),
                            default: Some(default),
                            keyword_only,
                        });
                    }
                    "typed_parameter" => {
                        let Some(inner) = named_children(&parameter).into_iter().next() else {
                            continue;
                        };
                        match inner.kind().as_ref() {
                            "identifier" => parameters.push(Parameter {
                                name: inner.text().to_string(),
                                default: None,
                                keyword_only,
                            }),
                            "list_splat_pattern" => {
                                star = splat_name(&inner);
                                keyword_only = true;
                            }
                            "dictionary_splat_pattern" => double_star = splat_name(&inner),
                            _ => {}
                        }
                    }
                    "list_splat_pattern" => {
                        star = splat_name(&parameter);
                        keyword_only = true;
                    }
                    "dictionary_splat_pattern" => double_star = splat_name(&parameter),
                    "keyword_separator" => keyword_only = true,
                    _ => {}
                }
            }
        }

        let name = definition
            .field("name")
            .map(|name| name.text().to_string())
            .unwrap_or_default();
        let closure = self.closure();
        self.functions.push(Function {
            name,
            body: definition.field("body"),
            parameters,
            star,
            double_star,
            closure,
        });
        Ok(Value::Function(self.functions.len() - 1))
    }

    fn define_class(&mut self, definition: &PyNode<'r>) -> Result<(), EvalError> {
        if let Some(body) = definition.field("body") {
            let frame = Frame {
                closure: self.closure(),
                class_body: true,
                ..Frame::default()
            };
            self.frames.push(frame);
            let outcome = self.exec_block(&body);
            self.frames.pop();
            outcome?;
        }
        if let Some(name) = definition.field("name") {
            self.set_name(&name.text(), Value::Opaque);
        }
        Ok(())
    }

    fn define_decorated(&mut self, statement: &PyNode<'r>) -> Result<(), EvalError> {
        let mut decorators = Vec::new();
        for decorator in named_children(statement) {
            if decorator.kind() != "decorator" {
                continue;
            }
            if let Some(expression) = named_children(&decorator).first() {
                decorators.push(self.eval(expression)?);
            }
        }
        let Some(definition) = statement.field("definition") else {
            return Ok(());
        };
        let Some(name) = definition.field("name") else {
            return Ok(());
        };

        let mut value = if definition.kind() == "function_definition" {
            self.define_function(&definition)?
        } else {
            self.define_class(&definition)?;
            Value::Opaque
        };
        // The innermost decorator applies first
        for decorator in decorators.into_iter().rev() {
            let arguments = Arguments {
                positional: vec![value],
                ..Arguments::default()
            };
            value = match decorator {
                Value::Function(id) => self.call_function(statement, id, arguments)?,
                _ => {
                    self.opaque_call(None, &arguments);
                    Value::Opaque
                }
            };
        }
        self.set_name(&name.text(), value);
        Ok(())
    }

    // ===== IMPORTS =====

    fn import(&mut self, statement: &PyNode<'r>) {
        for child in named_children(statement) {
            match child.kind().as_ref() {
                "dotted_name" => {
                    let module = child.text().to_string();
                    let top = module.split('.').next().unwrap_or_default().to_string();
                    self.set_name(&top, Value::Module(top.clone()));
                }
                "aliased_import" => {
                    if let (Some(name), Some(alias)) = (child.field("name"), child.field("alias")) {
                        self.set_name(&alias.text(), Value::Module(name.text().to_string()));
                    }
                }
                _ => {}
            }
        }
    }

    fn import_from(&mut self, statement: &PyNode<'r>) {
        let Some(module_node) = statement.field("module_name") else {
            return;
        };
        // Relative imports never reach a substituted module
        let module = (module_node.kind() == "dotted_name").then(|| module_node.text().to_string());
        let names_start = module_node.range().end;

        for child in named_children(statement) {
            if child.range().start < names_start {
                continue;
            }
            let (name, alias) = match child.kind().as_ref() {
                "dotted_name" => (child.text().to_string(), None),
                "aliased_import" => match (child.field("name"), child.field("alias")) {
                    (Some(name), Some(alias)) => {
                        (name.text().to_string(), Some(alias.text().to_string()))
                    }
                    _ => continue,
                },
                "wildcard_import" => {
                    if let Some(module) = &module {
                        for (name, value) in self.context.module_exports(module) {
                            self.set_name(&name, value);
                        }
                    }
                    continue;
                }
                _ => continue,
            };
            let value = match &module {
                Some(module) => self.context.module_attribute(module, &name),
                None => Value::Opaque,
            };
            self.set_name(alias.as_deref().unwrap_or(&name), value);
        }
    }

    // ===== ASSIGNMENT =====

    fn assign(&mut self, node: &PyNode<'r>) -> Result<Value, EvalError> {
        let Some(right) = node.field("right") else {
            // Bare annotation
            return Ok(Value::None);
        };
        let value = match right.kind().as_ref() {
            "assignment" => self.assign(&right)?,
            "augmented_assignment" => {
                self.augmented_assign(&right)?;
                Value::Opaque
            }
            _ => self.eval(&right)?,
        };
        if let Some(left) = node.field("left") {
            self.bind(&left, value.clone())?;
        }
        Ok(value)
    }

    fn augmented_assign(&mut self, node: &PyNode<'r>) -> Result<(), EvalError> {
        let (Some(left), Some(right)) = (node.field("left"), node.field("right")) else {
            return Ok(());
        };
        let operator = node
            .field("operator")
            .map(|op| op.text().to_string())
            .unwrap_or_default();
        let current = self.eval(&left)?;
        let operand = self.eval(&right)?;

        let value = match (operator.as_str(), &current) {
            // Lists and dicts change in place
            ("+=", Value::List(list)) => {
                match operand.iterate() {
                    Some(items) if current.is_known() => {
                        self.check_store(node, &current, &items)?;
                        list.borrow_mut().items.extend(items);
                    }
                    _ => current.forget(),
                }
                current.clone()
            }
            ("|=", Value::Dict(dict)) => {
                match operand.pairs() {
                    Some(pairs) if current.is_known() => {
                        let values: Vec<Value> = pairs.iter().map(|(_, v)| v.clone()).collect();
                        self.check_store(node, &current, &values)?;
                        let mut dict = dict.borrow_mut();
                        for (key, value) in pairs {
                            Value::dict_set(&mut dict.items, key, value);
                        }
                    }
                    _ => current.forget(),
                }
                current.clone()
            }
            ("+=", _) => self.add(node, &current, &operand)?,
            ("|=", _) => merge_dicts(&current, &operand),
            _ => Value::Opaque,
        };
        self.bind(&left, value)
    }

    fn bind(&mut self, target: &PyNode<'r>, value: Value) -> Result<(), EvalError> {
        match target.kind().as_ref() {
            "identifier" => self.set_name(&target.text(), value),
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list" => {
                let targets = named_children(target);
                let starred = targets.iter().any(|t| t.kind() == "list_splat_pattern");
                match value.iterate() {
                    Some(items) if !starred && items.len() != targets.len() => {
                        return Err(self.type_error(
                            target,
                            format!(
                                "cannot unpack {} values into {} targets",
                                items.len(),
                                targets.len()
                            ),
                        ));
                    }
                    Some(items) if !starred => {
                        for (target, item) in targets.iter().zip(items) {
                            self.bind(target, item)?;
                        }
                    }
                    _ => {
                        value.forget();
                        for target in &targets {
                            self.bind(target, Value::Opaque)?;
                        }
                    }
                }
            }
            "parenthesized_expression" | "list_splat_pattern" => {
                if let Some(inner) = named_children(target).first() {
                    let value = if target.kind() == "list_splat_pattern" {
                        Value::Opaque
                    } else {
                        value
                    };
                    self.bind(inner, value)?;
                }
            }
            "subscript" => self.bind_subscript(target, value)?,
            "attribute" => {
                if let Some(object) = target.field("object") {
                    self.eval(&object)?;
                }
                // The value now lives in an object the evaluator does not model
                value.forget();
            }
            _ => {}
        }
        Ok(())
    }

    fn bind_subscript(&mut self, target: &PyNode<'r>, value: Value) -> Result<(), EvalError> {
        let (Some(container), Some(key)) = (target.field("value"), target.field("subscript")) else {
            return Ok(());
        };
        let container = self.eval(&container)?;
        let key = self.eval(&key)?;

        match &container {
            Value::Dict(dict) => {
                if !key.is_static() {
                    container.forget();
                    value.forget();
                    return Ok(());
                }
                if !key.is_hashable() {
                    return Err(self.type_error(
                        target,
                        format!("unhashable type: '{}'", key.type_name()),
                    ));
                }
                self.check_store(target, &container, std::slice::from_ref(&value))?;
                Value::dict_set(&mut dict.borrow_mut().items, key, value);
            }
            Value::List(list) => {
                self.check_store(target, &container, std::slice::from_ref(&value))?;
                let mut list = list.borrow_mut();
                match list_index(list.items.len(), &key) {
                    Some(index) => {
                        if let Some(slot) = list.items.get_mut(index) {
                            *slot = value;
                        }
                    }
                    None if list.known && matches!(key, Value::Int(_)) => {
                        return Err(self.type_error(
                            target,
                            "list assignment index out of range".to_string(),
                        ));
                    }
                    None => {
                        list.known = false;
                        drop(list);
                        value.forget();
                    }
                }
            }
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Str(_) | Value::Tuple(_) => {
                return Err(self.type_error(
                    target,
                    format!(
                        "'{}' object does not support item assignment",
                        container.type_name()
                    ),
                ));
            }
            _ => value.forget(),
        }
        Ok(())
    }

    /// Refuse to put a container inside itself
    fn check_store(
        &self,
        node: &PyNode<'r>,
        container: &Value,
        values: &[Value],
    ) -> Result<(), EvalError> {
        if values.iter().any(|value| value.refers_to(container)) {
            return Err(self.unsupported(node, "a container holding itself"));
        }
        Ok(())
    }

    // ===== SKIPPED CODE =====

    /// Account for code that does not run
    ///
    /// Every name the code could bind becomes opaque and every container it
    /// could change is forgotten. A `setup()` call it could reach is
    /// captured as an opaque value.
    fn skip(&mut self, blocks: &[PyNode<'r>]) {
        let mut effects = Effects::default();
        for block in blocks {
            self.scan_effects(block, &mut effects);
        }
        for name in &effects.mutated {
            self.lookup(name).forget();
        }
        for name in &effects.bound {
            self.set_name(name, Value::Opaque);
        }
        if effects.captures {
            trace!("Skipped code may call setup()");
            self.context.capture(Value::Opaque);
        }
    }

    fn scan_effects(&self, node: &PyNode<'r>, effects: &mut Effects) {
        match node.kind().as_ref() {
            "function_definition" => {
                if let Some(name) = node.field("name") {
                    effects.bound.push(name.text().to_string());
                }
                return;
            }
            "lambda" => return,
            "class_definition" => {
                if let Some(name) = node.field("name") {
                    effects.bound.push(name.text().to_string());
                }
            }
            "assignment" | "augmented_assignment" | "for_statement" => {
                if let Some(left) = node.field("left") {
                    collect_targets(&left, effects);
                }
            }
            "named_expression" => {
                if let Some(name) = node.field("name") {
                    effects.bound.push(name.text().to_string());
                }
            }
            "as_pattern" => {
                if let Some(alias) = node.field("alias") {
                    collect_targets(&alias, effects);
                }
            }
            "import_statement" | "import_from_statement" => {
                effects.bound.extend(imported_names(node));
            }
            "delete_statement" => {
                for target in named_children(node) {
                    collect_targets(&target, effects);
                }
            }
            "global_statement" => {
                for name in named_children(node) {
                    effects.declared_global.push(name.text().to_string());
                }
            }
            "call" => self.scan_call(node, effects),
            _ => {}
        }
        for child in named_children(node) {
            self.scan_effects(&child, effects);
        }
    }

    fn scan_call(&self, call: &PyNode<'r>, effects: &mut Effects) {
        let Some(function) = call.field("function") else {
            return;
        };
        if self.callee_may_capture(&function, &mut HashSet::new()) {
            effects.captures = true;
        }

        if function.kind() == "attribute" {
            if let (Some(object), Some(method)) = (function.field("object"), function.field("attribute"))
            {
                if MUTATING_METHODS.contains(&method.text().as_ref()) {
                    effects.mutated.extend(root_name(&object));
                }
            }
        }

        let inert = matches!(self.static_value(&function), Some(Value::Routine(_)))
            || (function.kind() == "identifier"
                && INERT_BUILTINS.contains(&function.text().as_ref()));
        if !inert {
            if let Some(list) = call.field("arguments") {
                for argument in named_children(&list) {
                    let value = argument.field("value").unwrap_or(argument);
                    effects.mutated.extend(root_name(&value));
                }
            }
        }

        // A script function changes what its body changes
        let Some(name) = callee_name(&function) else {
            return;
        };
        if !effects.visited.insert(name.clone()) {
            return;
        }
        let Some(definitions) = self.definitions.get(&name) else {
            return;
        };
        for definition in definitions {
            let Some(body) = definition.field("body") else {
                continue;
            };
            let mut inner = Effects {
                visited: std::mem::take(&mut effects.visited),
                ..Effects::default()
            };
            self.scan_effects(&body, &mut inner);
            effects.mutated.extend(inner.mutated);
            effects.captures |= inner.captures;
            let declared = inner.declared_global;
            effects
                .bound
                .extend(inner.bound.into_iter().filter(|n| declared.contains(n)));
            effects.visited = inner.visited;
        }
    }

    /// Whether running `node` could reach a `setup()` call
    fn may_capture(&self, node: &PyNode<'r>, visited: &mut HashSet<String>) -> bool {
        match node.kind().as_ref() {
            "function_definition" | "lambda" => return false,
            "call" => {
                if let Some(function) = node.field("function") {
                    if self.callee_may_capture(&function, visited) {
                        return true;
                    }
                }
            }
            _ => {}
        }
        named_children(node)
            .iter()
            .any(|child| self.may_capture(child, visited))
    }

    fn callee_may_capture(&self, function: &PyNode<'r>, visited: &mut HashSet<String>) -> bool {
        match self.static_value(function) {
            Some(Value::Routine(Routine::Setup)) => return true,
            Some(Value::Function(id)) => return self.function_may_capture(id, visited),
            _ => {}
        }
        match callee_name(function) {
            Some(name) => name == "setup" || self.definition_may_capture(&name, visited),
            None => false,
        }
    }

    fn function_may_capture(&self, id: usize, visited: &mut HashSet<String>) -> bool {
        let Some(function) = self.functions.get(id) else {
            return false;
        };
        if !visited.insert(function.name.clone()) {
            return false;
        }
        function
            .body
            .as_ref()
            .is_some_and(|body| self.may_capture(body, visited))
    }

    fn definition_may_capture(&self, name: &str, visited: &mut HashSet<String>) -> bool {
        if !visited.insert(name.to_string()) {
            return false;
        }
        let Some(definitions) = self.definitions.get(name) else {
            return false;
        };
        definitions.iter().any(|definition| {
            definition
                .field("body")
                .is_some_and(|body| self.may_capture(&body, visited))
        })
    }

    /// Value of a name or attribute chain, without running anything
    fn static_value(&self, node: &PyNode<'r>) -> Option<Value> {
        match node.kind().as_ref() {
            "identifier" => Some(self.lookup(&node.text())),
            "attribute" => {
                let object = self.static_value(&node.field("object")?)?;
                let attribute = node.field("attribute")?;
                Some(self.attribute(&object, &attribute.text()))
            }
            _ => None,
        }
    }

    // ===== EXPRESSIONS =====

    pub(crate) fn eval(&mut self, node: &PyNode<'r>) -> Result<Value, EvalError> {
        let value = match node.kind().as_ref() {
            "string" => self.string(node)?,
            "concatenated_string" => {
                let mut joined = String::new();
                for part in named_children(node) {
                    match self.eval(&part)? {
                        Value::Str(text) => joined.push_str(&text),
                        _ => return Ok(Value::Opaque),
                    }
                }
                Value::Str(joined)
            }
            "integer" => parse_integer(&node.text()).map_or(Value::Opaque, Value::Int),
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "none" => Value::None,
            "identifier" => self.lookup(&node.text()),
            "attribute" => {
                let (Some(object), Some(attribute)) = (node.field("object"), node.field("attribute"))
                else {
                    return Ok(Value::Opaque);
                };
                let object = self.eval(&object)?;
                self.attribute(&object, &attribute.text())
            }
            "subscript" => self.subscript(node)?,
            "list" => self.display_items(node)?.map_or(Value::Opaque, Value::list),
            "tuple" | "expression_list" => {
                self.display_items(node)?.map_or(Value::Opaque, Value::Tuple)
            }
            "dictionary" => self.dictionary(node)?,
            "list_comprehension" | "generator_expression" => self.comprehension(node, false)?,
            "dictionary_comprehension" => self.comprehension(node, true)?,
            "parenthesized_expression" => match named_children(node).first() {
                Some(inner) => self.eval(inner)?,
                None => Value::Tuple(Vec::new()),
            },
            "binary_operator" => self.binary(node)?,
            "unary_operator" => {
                let operand = match node.field("argument") {
                    Some(argument) => self.eval(&argument)?,
                    None => Value::Opaque,
                };
                let operator = node.field("operator").map(|op| op.text().to_string());
                match (operator.as_deref(), operand) {
                    (Some("-"), Value::Int(i)) => i.checked_neg().map_or(Value::Opaque, Value::Int),
                    (Some("+"), Value::Int(i)) => Value::Int(i),
                    _ => Value::Opaque,
                }
            }
            "not_operator" => {
                let operand = match node.field("argument") {
                    Some(argument) => self.eval(&argument)?,
                    None => Value::Opaque,
                };
                operand.truthy().map_or(Value::Opaque, |b| Value::Bool(!b))
            }
            "boolean_operator" => self.boolean(node)?,
            "comparison_operator" => self.comparison(node)?,
            "conditional_expression" => {
                let parts = named_children(node);
                let [then, test, otherwise] = parts.as_slice() else {
                    return Ok(Value::Opaque);
                };
                match self.eval(test)?.truthy() {
                    Some(true) => self.eval(then)?,
                    Some(false) => self.eval(otherwise)?,
                    None => Value::Opaque,
                }
            }
            "named_expression" => {
                let (Some(name), Some(value)) = (node.field("name"), node.field("value")) else {
                    return Ok(Value::Opaque);
                };
                let value = self.eval(&value)?;
                self.set_name(&name.text(), value.clone());
                value
            }
            "call" => self.call(node)?,
            _ => Value::Opaque,
        };
        Ok(value)
    }

    fn attribute(&self, object: &Value, attribute: &str) -> Value {
        match object {
            Value::Module(module) => self.context.module_attribute(module, attribute),
            _ => Value::Opaque,
        }
    }

    /// A string literal, with f-string replacement fields evaluated
    fn string(&mut self, node: &PyNode<'r>) -> Result<Value, EvalError> {
        let text = node.text();
        let fields: Vec<PyNode<'r>> = named_children(node)
            .into_iter()
            .filter(|child| child.kind() == "interpolation")
            .collect();
        if fields.is_empty() {
            return Ok(string_literal(&text).map_or(Value::Opaque, Value::Str));
        }
        let Some(shape) = string_shape(&text) else {
            return Ok(Value::Opaque);
        };
        if shape.bytes || !shape.formatted {
            return Ok(Value::Opaque);
        }

        let start = node.range().start;
        let end = start + shape.content.end;
        let mut cursor = start + shape.content.start;
        let mut out = String::new();
        for field in &fields {
            let range = field.range();
            let Some(segment) = self.source.get(cursor..range.start) else {
                return Ok(Value::Opaque);
            };
            out.push_str(&fstring_segment(segment, shape.raw));
            match self.interpolation(field)? {
                Some(text) => out.push_str(&text),
                None => return Ok(Value::Opaque),
            }
            cursor = range.end;
        }
        let Some(segment) = self.source.get(cursor..end) else {
            return Ok(Value::Opaque);
        };
        out.push_str(&fstring_segment(segment, shape.raw));
        Ok(Value::Str(out))
    }

    /// Text of one `{...}` field; `None` when it is not known
    fn interpolation(&mut self, field: &PyNode<'r>) -> Result<Option<String>, EvalError> {
        let mut expression = None;
        let mut conversion = None;
        for child in named_children(field) {
            match child.kind().as_ref() {
                "type_conversion" => conversion = Some(child.text().to_string()),
                "format_specifier" if !child.text().trim_start_matches(':').is_empty() => {
                    return Ok(None)
                }
                "format_specifier" => {}
                _ if expression.is_none() => expression = Some(child),
                _ => {}
            }
        }
        // `{name=}` repeats its own source text
        if field
            .children()
            .any(|child| !child.is_named() && child.kind() == "=")
        {
            return Ok(None);
        }
        let Some(expression) = expression else {
            return Ok(None);
        };
        let value = self.eval(&expression)?;
        Ok(match conversion.as_deref() {
            Some("!r") => value.repr(),
            Some("!a") => None,
            _ => value.to_str(),
        })
    }

    fn subscript(&mut self, node: &PyNode<'r>) -> Result<Value, EvalError> {
        let (Some(container), Some(key)) = (node.field("value"), node.field("subscript")) else {
            return Ok(Value::Opaque);
        };
        let container = self.eval(&container)?;
        let key = self.eval(&key)?;
        if !key.is_static() {
            return Ok(Value::Opaque);
        }
        match &container {
            Value::Dict(_) if !container.is_known() => Ok(Value::Opaque),
            Value::Dict(_) => match container.dict_get(&key) {
                Some(value) => Ok(value),
                None => Err(self.key_error(node, &key)),
            },
            Value::List(_) | Value::Tuple(_) => {
                let Some(items) = container.sequence() else {
                    return Ok(Value::Opaque);
                };
                match list_index(items.len(), &key).and_then(|i| items.get(i)) {
                    Some(item) => Ok(item.clone()),
                    None if matches!(key, Value::Int(_)) => {
                        Err(self.type_error(node, "index out of range".to_string()))
                    }
                    None => Ok(Value::Opaque),
                }
            }
            Value::Str(text) => {
                let chars: Vec<char> = text.chars().collect();
                match list_index(chars.len(), &key).and_then(|i| chars.get(i)) {
                    Some(c) => Ok(Value::Str(c.to_string())),
                    None if matches!(key, Value::Int(_)) => {
                        Err(self.type_error(node, "string index out of range".to_string()))
                    }
                    None => Ok(Value::Opaque),
                }
            }
            _ => Ok(Value::Opaque),
        }
    }

    /// Elements of a list or tuple display; `None` when a `*splat` is unknown
    fn display_items(&mut self, node: &PyNode<'r>) -> Result<Option<Vec<Value>>, EvalError> {
        let mut items = Vec::new();
        let mut known = true;
        for element in named_children(node) {
            if element.kind() != "list_splat" {
                items.push(self.eval(&element)?);
                continue;
            }
            let splat = match named_children(&element).first() {
                Some(inner) => self.eval(inner)?,
                None => Value::Opaque,
            };
            match splat.iterate() {
                Some(inner) => items.extend(inner),
                None => known = false,
            }
        }
        if known {
            Ok(Some(items))
        } else {
            items.iter().for_each(Value::forget);
            Ok(None)
        }
    }

    fn dictionary(&mut self, node: &PyNode<'r>) -> Result<Value, EvalError> {
        let mut pairs = Vec::new();
        let mut known = true;
        for element in named_children(node) {
            match element.kind().as_ref() {
                "pair" => {
                    let (Some(key), Some(value)) = (element.field("key"), element.field("value"))
                    else {
                        continue;
                    };
                    let key = self.eval(&key)?;
                    let value = self.eval(&value)?;
                    if !key.is_static() {
                        known = false;
                        value.forget();
                        continue;
                    }
                    if !key.is_hashable() {
                        return Err(self.type_error(
                            &element,
                            format!("unhashable type: '{}'", key.type_name()),
                        ));
                    }
                    Value::dict_set(&mut pairs, key, value);
                }
                "dictionary_splat" => {
                    let splat = match named_children(&element).first() {
                        Some(inner) => self.eval(inner)?,
                        None => Value::Opaque,
                    };
                    match splat.pairs() {
                        Some(more) => {
                            for (key, value) in more {
                                Value::dict_set(&mut pairs, key, value);
                            }
                        }
                        None => known = false,
                    }
                }
                _ => known = false,
            }
        }
        let dict = Value::dict(pairs);
        if !known {
            dict.forget();
        }
        Ok(dict)
    }

    /// List, generator or dict comprehension over known iterables
    fn comprehension(&mut self, node: &PyNode<'r>, mapping: bool) -> Result<Value, EvalError> {
        let Some(body) = node.field("body") else {
            return Ok(Value::Opaque);
        };
        let clauses: Vec<PyNode<'r>> = named_children(node)
            .into_iter()
            .filter(|child| matches!(child.kind().as_ref(), "for_in_clause" | "if_clause"))
            .collect();

        // Loop variables do not outlive the comprehension
        let mut variables = Effects::default();
        for clause in &clauses {
            if let Some(target) = clause.field("left") {
                collect_targets(&target, &mut variables);
            }
        }
        let saved: Vec<(String, Option<Value>)> = variables
            .bound
            .iter()
            .map(|name| (name.clone(), self.scoped(name)))
            .collect();

        let mut results = Vec::new();
        let outcome = self.comprehend(&body, &clauses, &mut results);
        for (name, value) in saved {
            match value {
                Some(value) => self.set_name(&name, value),
                None => {
                    self.unset_name(&name);
                }
            }
        }
        if !outcome? {
            trace!("Comprehension at line {} is not known", self.line(node));
            self.skip(std::slice::from_ref(node));
            return Ok(Value::Opaque);
        }

        if !mapping {
            return Ok(Value::list(results));
        }
        let mut pairs = Vec::new();
        for result in results {
            let Value::Tuple(pair) = result else {
                return Ok(Value::Opaque);
            };
            let [key, value]: [Value; 2] = match pair.try_into() {
                Ok(pair) => pair,
                Err(_) => return Ok(Value::Opaque),
            };
            if !key.is_static() || !key.is_hashable() {
                return Ok(Value::Opaque);
            }
            Value::dict_set(&mut pairs, key, value);
        }
        Ok(Value::dict(pairs))
    }

    /// Expand `clauses` into `results`; false when an iterable or a
    /// condition is not known
    fn comprehend(
        &mut self,
        body: &PyNode<'r>,
        clauses: &[PyNode<'r>],
        results: &mut Vec<Value>,
    ) -> Result<bool, EvalError> {
        let Some((clause, rest)) = clauses.split_first() else {
            let value = if body.kind() == "pair" {
                let (Some(key), Some(value)) = (body.field("key"), body.field("value")) else {
                    return Ok(false);
                };
                Value::Tuple(vec![self.eval(&key)?, self.eval(&value)?])
            } else {
                self.eval(body)?
            };
            results.push(value);
            return Ok(true);
        };

        if clause.kind() == "if_clause" {
            let Some(test) = named_children(clause).into_iter().next() else {
                return Ok(false);
            };
            return match self.eval(&test)?.truthy() {
                Some(true) => self.comprehend(body, rest, results),
                Some(false) => Ok(true),
                None => Ok(false),
            };
        }

        let (Some(target), Some(iterable)) = (clause.field("left"), clause.field("right")) else {
            return Ok(false);
        };
        let Some(items) = self.eval(&iterable)?.iterate() else {
            return Ok(false);
        };
        for item in items {
            self.bind(&target, item)?;
            if !self.comprehend(body, rest, results)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn binary(&mut self, node: &PyNode<'r>) -> Result<Value, EvalError> {
        let (Some(left), Some(right)) = (node.field("left"), node.field("right")) else {
            return Ok(Value::Opaque);
        };
        let operator = node
            .field("operator")
            .map(|op| op.text().to_string())
            .unwrap_or_default();
        let left = self.eval(&left)?;
        let right = self.eval(&right)?;
        match (operator.as_str(), &left) {
            ("+", _) => self.add(node, &left, &right),
            ("|", _) => Ok(merge_dicts(&left, &right)),
            ("%", Value::Str(template)) => {
                Ok(percent_format(template, &right).map_or(Value::Opaque, Value::Str))
            }
            _ => Ok(Value::Opaque),
        }
    }

    fn add(&self, node: &PyNode<'r>, left: &Value, right: &Value) -> Result<Value, EvalError> {
        match (left, right) {
            (Value::Opaque, _) | (_, Value::Opaque) => Ok(Value::Opaque),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (Value::List(_), Value::List(_)) => match (left.sequence(), right.sequence()) {
                (Some(mut a), Some(b)) => {
                    a.extend(b);
                    Ok(Value::list(a))
                }
                _ => Ok(Value::Opaque),
            },
            (Value::Tuple(a), Value::Tuple(b)) => {
                Ok(Value::Tuple(a.iter().chain(b).cloned().collect()))
            }
            (Value::Int(a), Value::Int(b)) => Ok(a.checked_add(*b).map_or(Value::Opaque, Value::Int)),
            (Value::Bool(_) | Value::Int(_), Value::Bool(_) | Value::Int(_)) => Ok(Value::Opaque),
            (a, b) => Err(self.type_error(
                node,
                format!(
                    "unsupported operand types for +: '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ),
            )),
        }
    }

    fn boolean(&mut self, node: &PyNode<'r>) -> Result<Value, EvalError> {
        let (Some(left), Some(right)) = (node.field("left"), node.field("right")) else {
            return Ok(Value::Opaque);
        };
        let operator = node
            .field("operator")
            .map(|op| op.text().to_string())
            .unwrap_or_default();
        let left = self.eval(&left)?;
        match (operator.as_str(), left.truthy()) {
            ("and", Some(false)) | ("or", Some(true)) => Ok(left),
            ("and", Some(true)) | ("or", Some(false)) => self.eval(&right),
            _ => Ok(Value::Opaque),
        }
    }

    /// Comparison chain, stopping at the first false link
    fn comparison(&mut self, node: &PyNode<'r>) -> Result<Value, EvalError> {
        let operands = named_children(node);
        let operators: Vec<String> = node
            .children()
            .filter(|child| !child.is_named())
            .map(|child| child.kind().to_string())
            .collect();
        let Some((first, rest)) = operands.split_first() else {
            return Ok(Value::Opaque);
        };
        if operators.is_empty() || operators.len() != rest.len() {
            return Ok(Value::Opaque);
        }

        let mut left = self.eval(first)?;
        for (operator, operand) in operators.iter().zip(rest) {
            let right = self.eval(operand)?;
            match compare(operator, &left, &right) {
                Some(true) => {}
                Some(false) => return Ok(Value::Bool(false)),
                None => return Ok(Value::Opaque),
            }
            left = right;
        }
        Ok(Value::Bool(true))
    }

    // ===== CALLS =====

    fn call(&mut self, node: &PyNode<'r>) -> Result<Value, EvalError> {
        let Some(function) = node.field("function") else {
            return Ok(Value::Opaque);
        };

        if function.kind() == "attribute" {
            let (Some(object), Some(attribute)) =
                (function.field("object"), function.field("attribute"))
            else {
                return Ok(Value::Opaque);
            };
            let receiver = self.eval(&object)?;
            let method = attribute.text().to_string();
            let arguments = self.arguments(node)?;
            if let Value::Module(_) = receiver {
                let callee = self.attribute(&receiver, &method);
                return self.invoke(node, &function, callee, arguments);
            }
            return self.call_method(node, &function, &receiver, &method, arguments);
        }

        let callee = self.eval(&function)?;
        let arguments = self.arguments(node)?;
        self.invoke(node, &function, callee, arguments)
    }

    fn invoke(
        &mut self,
        node: &PyNode<'r>,
        function: &PyNode<'r>,
        callee: Value,
        arguments: Arguments,
    ) -> Result<Value, EvalError> {
        match callee {
            Value::Routine(routine) => self.run_routine(node, routine, arguments),
            Value::Function(id) => self.call_function(node, id, arguments),
            _ => {
                self.opaque_call(Some(function), &arguments);
                Ok(Value::Opaque)
            }
        }
    }

    /// Account for a call into code the evaluator does not have
    ///
    /// Unknown code may change any container passed to it. A call to
    /// something named `setup`, or to a name whose script definition
    /// reaches `setup()`, captures an opaque value.
    fn opaque_call(&mut self, function: Option<&PyNode<'r>>, arguments: &Arguments) {
        let name = function.and_then(callee_name);
        let inert = function.is_some_and(|f| f.kind() == "identifier")
            && name
                .as_deref()
                .is_some_and(|name| INERT_BUILTINS.contains(&name));

        let mut captures = match name.as_deref() {
            Some("setup") => arguments.unknown || arguments.keyword("entry_points").is_some(),
            Some(name) => self.definition_may_capture(name, &mut HashSet::new()),
            None => false,
        };
        for value in arguments.values() {
            if let Value::Function(id) = value {
                captures |= self.function_may_capture(*id, &mut HashSet::new());
            }
            if !inert {
                value.forget();
            }
        }
        if captures {
            trace!("Call to unknown code may reach setup()");
            self.context.capture(Value::Opaque);
        }
    }

    fn call_function(
        &mut self,
        call: &PyNode<'r>,
        id: usize,
        arguments: Arguments,
    ) -> Result<Value, EvalError> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(self.unsupported(
                call,
                format!("call nesting deeper than {}", MAX_CALL_DEPTH),
            ));
        }
        let Some(function) = self.functions.get(id).cloned() else {
            return Ok(Value::Opaque);
        };
        let Some(body) = function.body.clone() else {
            return Ok(Value::None);
        };
        if yields(&body) {
            // A generator's body runs only as it is consumed
            if self.function_may_capture(id, &mut HashSet::new()) {
                self.context.capture(Value::Opaque);
            }
            arguments.values().for_each(Value::forget);
            return Ok(Value::Opaque);
        }

        let locals = self.bind_parameters(call, &function, arguments)?;
        self.frames.push(Frame {
            locals,
            closure: function.closure,
            ..Frame::default()
        });
        let outcome = self.exec_block(&body);
        self.frames.pop();
        match outcome? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    fn bind_parameters(
        &self,
        call: &PyNode<'r>,
        function: &Function<'r>,
        arguments: Arguments,
    ) -> Result<HashMap<String, Value>, EvalError> {
        let mut locals = HashMap::new();
        if arguments.unknown {
            // Which parameter receives what is not known
            arguments.values().for_each(Value::forget);
            let names = function
                .parameters
                .iter()
                .map(|p| p.name.clone())
                .chain(function.star.clone())
                .chain(function.double_star.clone());
            for name in names {
                locals.insert(name, Value::Opaque);
            }
            return Ok(locals);
        }

        let Arguments {
            positional,
            keywords,
            ..
        } = arguments;
        let given = positional.len();
        let mut positional = positional.into_iter();
        for parameter in function.parameters.iter().filter(|p| !p.keyword_only) {
            let Some(value) = positional.next() else {
                break;
            };
            locals.insert(parameter.name.clone(), value);
        }
        let extra: Vec<Value> = positional.collect();
        match &function.star {
            Some(star) => {
                locals.insert(star.clone(), Value::Tuple(extra));
            }
            None if !extra.is_empty() => {
                return Err(self.type_error(
                    call,
                    format!(
                        "{}() takes {} positional arguments but {} were given",
                        function.name,
                        given - extra.len(),
                        given
                    ),
                ));
            }
            None => {}
        }

        let mut extra_keywords = Vec::new();
        for (keyword, value) in keywords {
            if !function.parameters.iter().any(|p| p.name == keyword) {
                Value::dict_set(&mut extra_keywords, Value::Str(keyword), value);
                continue;
            }
            if locals.insert(keyword.clone(), value).is_some() {
                return Err(self.type_error(
                    call,
                    format!(
                        "{}() got multiple values for argument '{}'",
                        function.name, keyword
                    ),
                ));
            }
        }
        match &function.double_star {
            Some(name) => {
                locals.insert(name.clone(), Value::dict(extra_keywords));
            }
            None => {
                if let Some((keyword, _)) = extra_keywords.first() {
                    return Err(self.type_error(
                        call,
                        format!(
                            "{}() got an unexpected keyword argument {}",
                            function.name,
                            keyword.repr().unwrap_or_default()
                        ),
                    ));
                }
            }
        }

        for parameter in &function.parameters {
            if locals.contains_key(&parameter.name) {
                continue;
            }
            match &parameter.default {
                Some(default) => {
                    locals.insert(parameter.name.clone(), default.clone());
                }
                None => {
                    return Err(self.type_error(
                        call,
                        format!(
                            "{}() missing required argument '{}'",
                            function.name, parameter.name
                        ),
                    ))
                }
            }
        }
        Ok(locals)
    }

    fn arguments(&mut self, call: &PyNode<'r>) -> Result<Arguments, EvalError> {
        let mut arguments = Arguments::default();
        let Some(list) = call.field("arguments") else {
            return Ok(arguments);
        };
        if list.kind() != "argument_list" {
            // `f(x for x in items)`
            arguments.positional.push(self.eval(&list)?);
            return Ok(arguments);
        }

        for argument in named_children(&list) {
            match argument.kind().as_ref() {
                "keyword_argument" => {
                    let (Some(name), Some(value)) = (argument.field("name"), argument.field("value"))
                    else {
                        continue;
                    };
                    let value = self.eval(&value)?;
                    arguments.keywords.push((name.text().to_string(), value));
                }
                "list_splat" => {
                    let splat = match named_children(&argument).first() {
                        Some(inner) => self.eval(inner)?,
                        None => Value::Opaque,
                    };
                    match splat.iterate() {
                        Some(items) => arguments.positional.extend(items),
                        None => arguments.unknown = true,
                    }
                }
                "dictionary_splat" => {
                    let splat = match named_children(&argument).first() {
                        Some(inner) => self.eval(inner)?,
                        None => Value::Opaque,
                    };
                    match splat.pairs() {
                        Some(pairs) => {
                            for (key, value) in pairs {
                                match key {
                                    Value::Str(key) => arguments.keywords.push((key, value)),
                                    _ => arguments.unknown = true,
                                }
                            }
                        }
                        None => arguments.unknown = true,
                    }
                }
                _ => arguments.positional.push(self.eval(&argument)?),
            }
        }
        Ok(arguments)
    }

    fn call_method(
        &mut self,
        node: &PyNode<'r>,
        function: &PyNode<'r>,
        receiver: &Value,
        method: &str,
        arguments: Arguments,
    ) -> Result<Value, EvalError> {
        match receiver {
            Value::List(_) | Value::Dict(_) if MUTATING_METHODS.contains(&method) => {
                match self.mutate(node, receiver, method, &arguments)? {
                    Some(result) => Ok(result),
                    None => {
                        trace!("Not following {}() at line {}", method, self.line(node));
                        receiver.forget();
                        arguments.values().for_each(Value::forget);
                        Ok(Value::Opaque)
                    }
                }
            }
            Value::Opaque => {
                self.opaque_call(Some(function), &arguments);
                Ok(Value::Opaque)
            }
            _ => match value_method(receiver, method, &arguments) {
                Some(result) => Ok(result),
                None => {
                    receiver.forget();
                    self.opaque_call(Some(function), &arguments);
                    Ok(Value::Opaque)
                }
            },
        }
    }

    /// Apply a mutating list or dict method; `None` when its effect is not
    /// known
    fn mutate(
        &self,
        node: &PyNode<'r>,
        receiver: &Value,
        method: &str,
        arguments: &Arguments,
    ) -> Result<Option<Value>, EvalError> {
        if arguments.unknown
            || !receiver.is_known()
            || (method != "update" && !arguments.keywords.is_empty())
        {
            return Ok(None);
        }
        let positional = arguments.positional.as_slice();

        match (receiver, method, positional) {
            (Value::List(list), "append", [item]) => {
                self.check_store(node, receiver, std::slice::from_ref(item))?;
                list.borrow_mut().items.push(item.clone());
            }
            (Value::List(list), "extend", [more]) => {
                let Some(items) = more.iterate() else {
                    return Ok(None);
                };
                self.check_store(node, receiver, &items)?;
                list.borrow_mut().items.extend(items);
            }
            (Value::List(list), "insert", [Value::Int(index), item]) => {
                self.check_store(node, receiver, std::slice::from_ref(item))?;
                let mut list = list.borrow_mut();
                let len = list.items.len();
                let at = match usize::try_from(*index) {
                    Ok(at) => at.min(len),
                    Err(_) => len.saturating_sub(usize::try_from(index.unsigned_abs()).unwrap_or(len)),
                };
                list.items.insert(at, item.clone());
            }
            (Value::List(list), "pop", []) => {
                let popped = list.borrow_mut().items.pop();
                return match popped {
                    Some(item) => Ok(Some(item)),
                    None => Err(self.type_error(node, "pop from empty list".to_string())),
                };
            }
            (Value::List(list), "remove", [item]) => {
                let mut list = list.borrow_mut();
                match list.items.iter().position(|existing| existing == item) {
                    Some(index) => {
                        list.items.remove(index);
                    }
                    None => {
                        return Err(self.type_error(node, "list.remove(x): x not in list".to_string()))
                    }
                }
            }
            (Value::List(list), "clear", []) => list.borrow_mut().items.clear(),
            (Value::List(list), "reverse", []) => list.borrow_mut().items.reverse(),
            (Value::List(list), "sort", []) => {
                let mut list = list.borrow_mut();
                let comparable = list.items.iter().all(|v| matches!(v, Value::Str(_)))
                    || list.items.iter().all(|v| matches!(v, Value::Int(_)));
                if !comparable {
                    return Ok(None);
                }
                list.items
                    .sort_by(|a, b| order(a, b).unwrap_or(Ordering::Equal));
            }
            (Value::Dict(dict), "update", _) => {
                let mut updates = match positional {
                    [] => Vec::new(),
                    [other @ Value::Dict(_)] => match other.pairs() {
                        Some(pairs) => pairs,
                        None => return Ok(None),
                    },
                    [other] => match pairs_from_sequence(other) {
                        Some(pairs) => pairs,
                        None => return Ok(None),
                    },
                    _ => return Ok(None),
                };
                updates.extend(
                    arguments
                        .keywords
                        .iter()
                        .map(|(key, value)| (Value::Str(key.clone()), value.clone())),
                );
                if !updates.iter().all(|(key, _)| key.is_hashable()) {
                    return Ok(None);
                }
                let values: Vec<Value> = updates.iter().map(|(_, value)| value.clone()).collect();
                self.check_store(node, receiver, &values)?;
                let mut dict = dict.borrow_mut();
                for (key, value) in updates {
                    Value::dict_set(&mut dict.items, key, value);
                }
            }
            (Value::Dict(dict), "setdefault", [key] | [key, _]) => {
                if !key.is_hashable() {
                    return Ok(None);
                }
                if let Some(existing) = receiver.dict_get(key) {
                    return Ok(Some(existing));
                }
                let default = positional.get(1).cloned().unwrap_or(Value::None);
                self.check_store(node, receiver, std::slice::from_ref(&default))?;
                dict.borrow_mut().items.push((key.clone(), default.clone()));
                return Ok(Some(default));
            }
            (Value::Dict(dict), "pop", [key] | [key, _]) => {
                let mut dict = dict.borrow_mut();
                return match dict.items.iter().position(|(k, _)| k == key) {
                    Some(index) => Ok(Some(dict.items.remove(index).1)),
                    None => match positional.get(1) {
                        Some(default) => Ok(Some(default.clone())),
                        None => Err(self.key_error(node, key)),
                    },
                };
            }
            (Value::Dict(dict), "clear", []) => dict.borrow_mut().items.clear(),
            _ => return Ok(None),
        }
        Ok(Some(Value::None))
    }

    fn run_routine(
        &mut self,
        node: &PyNode<'r>,
        routine: Routine,
        arguments: Arguments,
    ) -> Result<Value, EvalError> {
        if arguments.unknown {
            arguments.values().for_each(Value::forget);
            if routine == Routine::Setup {
                self.context.capture(Value::Opaque);
                return Ok(Value::None);
            }
            return Ok(Value::Opaque);
        }
        let positional = arguments.positional.as_slice();

        let value = match routine {
            Routine::Setup => {
                match arguments.keyword("entry_points") {
                    // Changes after the call do not reach setup()
                    Some(value) => self.context.capture(value.snapshot()),
                    None => trace!("setup() called without entry_points"),
                }
                Value::None
            }
            Routine::DiscoverPackages => Value::list(Vec::new()),
            Routine::Print => Value::None,
            Routine::Dict => {
                let mut pairs = match positional {
                    [] => Vec::new(),
                    [other @ Value::Dict(_)] => match other.pairs() {
                        Some(pairs) => pairs,
                        None => return Ok(Value::Opaque),
                    },
                    [other] => match pairs_from_sequence(other) {
                        Some(pairs) => pairs,
                        None => return Ok(Value::Opaque),
                    },
                    _ => return Ok(Value::Opaque),
                };
                for (key, value) in &arguments.keywords {
                    Value::dict_set(&mut pairs, Value::Str(key.clone()), value.clone());
                }
                Value::dict(pairs)
            }
            Routine::List | Routine::Tuple => {
                let items = match positional {
                    [] => Some(Vec::new()),
                    [iterable] => iterable.iterate(),
                    _ => None,
                };
                match (routine, items) {
                    (Routine::List, Some(items)) => Value::list(items),
                    (_, Some(items)) => Value::Tuple(items),
                    (_, None) => Value::Opaque,
                }
            }
            Routine::Len => {
                let len = match positional {
                    [Value::Str(text)] => Some(text.chars().count()),
                    [value] => value.iterate().map(|items| items.len()),
                    _ => None,
                };
                len.and_then(|len| i64::try_from(len).ok())
                    .map_or(Value::Opaque, Value::Int)
            }
            Routine::Str => match positional {
                [] => Value::Str(String::new()),
                [value] => value.to_str().map_or(Value::Opaque, Value::Str),
                _ => Value::Opaque,
            },
            Routine::Sorted => {
                let Some(mut items) = positional.first().and_then(Value::iterate) else {
                    return Ok(Value::Opaque);
                };
                let comparable = items.iter().all(|v| matches!(v, Value::Str(_)))
                    || items.iter().all(|v| matches!(v, Value::Int(_)));
                if positional.len() != 1 || !arguments.keywords.is_empty() || !comparable {
                    return Ok(Value::Opaque);
                }
                items.sort_by(|a, b| order(a, b).unwrap_or(Ordering::Equal));
                Value::list(items)
            }
            Routine::Range => match positional {
                [Value::Int(stop)] => int_range(0, *stop, 1),
                [Value::Int(start), Value::Int(stop)] => int_range(*start, *stop, 1),
                [Value::Int(start), Value::Int(stop), Value::Int(step)] => {
                    if *step == 0 {
                        return Err(
                            self.type_error(node, "range() arg 3 must not be zero".to_string())
                        );
                    }
                    int_range(*start, *stop, *step)
                }
                _ => Value::Opaque,
            },
            Routine::Enumerate => {
                let start = match (positional.get(1), arguments.keyword("start")) {
                    (Some(Value::Int(start)), None) | (None, Some(Value::Int(start))) => *start,
                    (None, None) => 0,
                    _ => return Ok(Value::Opaque),
                };
                let Some(items) = positional.first().and_then(Value::iterate) else {
                    return Ok(Value::Opaque);
                };
                let mut pairs = Vec::with_capacity(items.len());
                for (offset, item) in items.into_iter().enumerate() {
                    let Some(index) = i64::try_from(offset)
                        .ok()
                        .and_then(|offset| start.checked_add(offset))
                    else {
                        return Ok(Value::Opaque);
                    };
                    pairs.push(Value::Tuple(vec![Value::Int(index), item]));
                }
                Value::list(pairs)
            }
            Routine::Zip => {
                if !arguments.keywords.is_empty() {
                    return Ok(Value::Opaque);
                }
                let Some(columns) = positional
                    .iter()
                    .map(Value::iterate)
                    .collect::<Option<Vec<_>>>()
                else {
                    return Ok(Value::Opaque);
                };
                let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
                let zipped = (0..rows)
                    .map(|row| {
                        Value::Tuple(
                            columns
                                .iter()
                                .filter_map(|column| column.get(row).cloned())
                                .collect(),
                        )
                    })
                    .collect();
                Value::list(zipped)
            }
        };
        Ok(value)
    }
}

fn compare(operator: &str, left: &Value, right: &Value) -> Option<bool> {
    if let "is" | "is not" = operator {
        // Identity is only known for the `None`, `True` and `False` singletons
        let same = match (left, right) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::None | Value::Bool(_), other) | (other, Value::None | Value::Bool(_)) => {
                if *other == Value::Opaque {
                    return None;
                }
                false
            }
            _ => return None,
        };
        return Some(same == (operator == "is"));
    }

    if !left.is_static() || !right.is_static() {
        return None;
    }
    match operator {
        "==" => Some(left == right),
        "!=" => Some(left != right),
        "in" | "not in" => {
            let contained = match right {
                Value::List(_) | Value::Tuple(_) => right.sequence()?.contains(left),
                Value::Dict(_) => right.dict_get(left).is_some(),
                Value::Str(haystack) => match left {
                    Value::Str(needle) => haystack.contains(needle.as_str()),
                    _ => return None,
                },
                _ => return None,
            };
            Some(contained == (operator == "in"))
        }
        "<" => order(left, right).map(|o| o == Ordering::Less),
        "<=" => order(left, right).map(|o| o != Ordering::Greater),
        ">" => order(left, right).map(|o| o == Ordering::Greater),
        ">=" => order(left, right).map(|o| o != Ordering::Less),
        _ => None,
    }
}

/// Non-mutating methods on known values; `None` for any other call
fn value_method(receiver: &Value, method: &str, arguments: &Arguments) -> Option<Value> {
    if arguments.unknown {
        return None;
    }
    let positional = arguments.positional.as_slice();

    let value = match (receiver, method, positional) {
        (Value::Dict(_), "get", [key] | [key, _]) if receiver.is_known() => receiver
            .dict_get(key)
            .or_else(|| positional.get(1).cloned())
            .unwrap_or(Value::None),
        (Value::Dict(_), "keys", []) => receiver.pairs().map_or(Value::Opaque, |pairs| {
            Value::list(pairs.into_iter().map(|(key, _)| key).collect())
        }),
        (Value::Dict(_), "values", []) => receiver.pairs().map_or(Value::Opaque, |pairs| {
            Value::list(pairs.into_iter().map(|(_, value)| value).collect())
        }),
        (Value::Dict(_), "items", []) => receiver.pairs().map_or(Value::Opaque, |pairs| {
            Value::list(
                pairs
                    .into_iter()
                    .map(|(key, value)| Value::Tuple(vec![key, value]))
                    .collect(),
            )
        }),
        (Value::Dict(_), "copy", []) => receiver.pairs().map_or(Value::Opaque, Value::dict),
        (Value::List(_), "copy", []) => receiver.sequence().map_or(Value::Opaque, Value::list),
        (Value::Str(text), "strip", []) => Value::Str(text.trim().to_string()),
        (Value::Str(text), "lstrip", []) => Value::Str(text.trim_start().to_string()),
        (Value::Str(text), "rstrip", []) => Value::Str(text.trim_end().to_string()),
        (Value::Str(text), "lower", []) => Value::Str(text.to_lowercase()),
        (Value::Str(text), "upper", []) => Value::Str(text.to_uppercase()),
        (Value::Str(text), "split", []) => Value::list(
            text.split_whitespace()
                .map(|part| Value::Str(part.to_string()))
                .collect(),
        ),
        (Value::Str(text), "split", [Value::Str(separator)]) if !separator.is_empty() => {
            Value::list(
                text.split(separator.as_str())
                    .map(|part| Value::Str(part.to_string()))
                    .collect(),
            )
        }
        (Value::Str(text), "replace", [Value::Str(old), Value::Str(new)]) if !old.is_empty() => {
            Value::Str(text.replace(old.as_str(), new))
        }
        (Value::Str(text), "startswith", [Value::Str(prefix)]) => {
            Value::Bool(text.starts_with(prefix.as_str()))
        }
        (Value::Str(text), "endswith", [Value::Str(suffix)]) => {
            Value::Bool(text.ends_with(suffix.as_str()))
        }
        (Value::Str(template), "format", _) => {
            format_string(template, positional, &arguments.keywords)
                .map_or(Value::Opaque, Value::Str)
        }
        (Value::Str(separator), "join", [items]) => {
            let Some(items) = items.iterate() else {
                return Some(Value::Opaque);
            };
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Str(part) => parts.push(part),
                    _ => return Some(Value::Opaque),
                }
            }
            Value::Str(parts.join(separator))
        }
        _ => return None,
    };
    Some(value)
}

/// `str.format` with plain `{}`, `{0}` and `{name}` fields
fn format_string(
    template: &str,
    positional: &[Value],
    keywords: &[(String, Value)],
) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_index = 0;
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next()? {
                        '}' => break,
                        c => field.push(c),
                    }
                }
                if field.contains(['!', ':', '.', '[', '{']) {
                    return None;
                }
                let value = if field.is_empty() {
                    next_index += 1;
                    positional.get(next_index - 1)?
                } else if let Ok(index) = field.parse::<usize>() {
                    positional.get(index)?
                } else {
                    &keywords.iter().find(|(name, _)| *name == field)?.1
                };
                out.push_str(&value.to_str()?);
            }
            '}' => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

/// `template % args` with `%s`, `%r` and `%d` conversions
fn percent_format(template: &str, args: &Value) -> Option<String> {
    let values = match args {
        Value::Tuple(items) => items.clone(),
        Value::Dict(_) | Value::Opaque => return None,
        other => vec![other.clone()],
    };
    let mut values = values.into_iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next()? {
            '%' => out.push('%'),
            's' => out.push_str(&values.next()?.to_str()?),
            'r' => out.push_str(&values.next()?.repr()?),
            'd' | 'i' => match values.next()? {
                Value::Int(i) => out.push_str(&i.to_string()),
                _ => return None,
            },
            _ => return None,
        }
    }
    values.next().is_none().then_some(out)
}

fn int_range(start: i64, stop: i64, step: i64) -> Value {
    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        if items.len() >= MAX_RANGE {
            return Value::Opaque;
        }
        items.push(Value::Int(current));
        let Some(next) = current.checked_add(step) else {
            break;
        };
        current = next;
    }
    Value::list(items)
}

fn merge_dicts(left: &Value, right: &Value) -> Value {
    match (left.pairs(), right.pairs()) {
        (Some(mut pairs), Some(more)) => {
            for (key, value) in more {
                Value::dict_set(&mut pairs, key, value);
            }
            Value::dict(pairs)
        }
        _ => Value::Opaque,
    }
}

fn pairs_from_sequence(value: &Value) -> Option<Vec<(Value, Value)>> {
    let mut pairs = Vec::new();
    for item in value.iterate()? {
        match item.iterate()?.as_slice() {
            [key, value] if key.is_hashable() => {
                Value::dict_set(&mut pairs, key.clone(), value.clone());
            }
            _ => return None,
        }
    }
    Some(pairs)
}

fn list_index(len: usize, key: &Value) -> Option<usize> {
    let Value::Int(index) = key else {
        return None;
    };
    let len = i64::try_from(len).ok()?;
    let index = if *index < 0 { len + index } else { *index };
    if (0..len).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(|c| *c != '_').collect();
    let lower = digits.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(octal) = lower.strip_prefix("0o") {
        i64::from_str_radix(octal, 8).ok()
    } else if let Some(binary) = lower.strip_prefix("0b") {
        i64::from_str_radix(binary, 2).ok()
    } else {
        lower.parse().ok()
    }
}

fn block_child<'r>(clause: &PyNode<'r>) -> Option<PyNode<'r>> {
    named_children(clause)
        .into_iter()
        .find(|child| child.kind() == "block")
}

/// Body of the `else` clause of a loop
fn else_body<'r>(statement: &PyNode<'r>) -> Option<PyNode<'r>> {
    named_children(statement)
        .into_iter()
        .find(|child| child.kind() == "else_clause")
        .and_then(|clause| clause.field("body"))
}

/// Name bound by a `*args` or `**kwargs` parameter
fn splat_name(pattern: &PyNode<'_>) -> Option<String> {
    named_children(pattern)
        .into_iter()
        .find(|child| child.kind() == "identifier")
        .map(|child| child.text().to_string())
}

/// Whether a function body is a generator
fn yields(node: &PyNode<'_>) -> bool {
    named_children(node).iter().any(|child| {
        let kind = child.kind();
        match kind.as_ref() {
            "yield" => true,
            "function_definition" | "lambda" | "class_definition" => false,
            _ => yields(child),
        }
    })
}

/// Names and containers an assignment target touches
fn collect_targets(target: &PyNode<'_>, effects: &mut Effects) {
    match target.kind().as_ref() {
        "identifier" => effects.bound.push(target.text().to_string()),
        "subscript" | "attribute" => effects.mutated.extend(root_name(target)),
        _ => {
            for child in named_children(target) {
                collect_targets(&child, effects);
            }
        }
    }
}

/// Variable a subscript, attribute or call chain starts from
fn root_name(node: &PyNode<'_>) -> Option<String> {
    match node.kind().as_ref() {
        "identifier" => Some(node.text().to_string()),
        "subscript" => root_name(&node.field("value")?),
        "attribute" => root_name(&node.field("object")?),
        "call" => root_name(&node.field("function")?),
        "parenthesized_expression" | "list_splat" | "dictionary_splat" => {
            root_name(named_children(node).first()?)
        }
        _ => None,
    }
}

/// Last name of a call's callee: `f` for `f()` and `pkg.f()`
fn callee_name(function: &PyNode<'_>) -> Option<String> {
    match function.kind().as_ref() {
        "identifier" => Some(function.text().to_string()),
        "attribute" => function.field("attribute").map(|a| a.text().to_string()),
        _ => None,
    }
}

/// Names an import statement binds
fn imported_names(statement: &PyNode<'_>) -> Vec<String> {
    let names_start = statement
        .field("module_name")
        .map_or(0, |module| module.range().end);
    let mut names = Vec::new();
    for child in named_children(statement) {
        if child.range().start < names_start {
            continue;
        }
        match child.kind().as_ref() {
            "dotted_name" => {
                let text = child.text();
                names.extend(text.split('.').next().map(str::to_string));
            }
            "aliased_import" => {
                if let Some(alias) = child.field("alias") {
                    names.push(alias.text().to_string());
                }
            }
            _ => {}
        }
    }
    names
}
