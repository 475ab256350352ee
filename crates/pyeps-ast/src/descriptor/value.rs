//! Values of the descriptor evaluator

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

/// Substitute callables an [`super::ExecutionContext`] can bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routine {
    /// `setup(...)`: records `entry_points`, performs nothing
    Setup,
    /// `find_packages(...)` and friends: always an empty list
    DiscoverPackages,
    Dict,
    List,
    Tuple,
    Len,
    Str,
    Sorted,
    Range,
    Enumerate,
    Zip,
    /// `print(...)`, which changes nothing the script can observe
    Print,
}

impl Routine {
    /// The builtin bound to `name` when the script does not rebind it
    pub fn builtin(name: &str) -> Option<Self> {
        Some(match name {
            "dict" => Routine::Dict,
            "list" => Routine::List,
            "tuple" => Routine::Tuple,
            "len" => Routine::Len,
            "str" => Routine::Str,
            "sorted" => Routine::Sorted,
            "range" => Routine::Range,
            "enumerate" => Routine::Enumerate,
            "zip" => Routine::Zip,
            "print" => Routine::Print,
            _ => return None,
        })
    }
}

/// Contents of a list or dict, shared by every name bound to it
#[derive(Debug, Clone, PartialEq)]
pub struct Container<T> {
    pub items: Vec<T>,
    /// Cleared once the container changed in a way that was not followed
    pub known: bool,
}

pub type Shared<T> = Rc<RefCell<Container<T>>>;

fn shared<T>(items: Vec<T>) -> Shared<T> {
    Rc::new(RefCell::new(Container { items, known: true }))
}

/// A statically known Python value
///
/// Lists and dicts are shared between clones the way Python names share
/// objects, so `eps["g"].append(x)` is visible through every name bound to
/// `eps`. Anything the evaluator cannot know (results of unknown calls,
/// names imported from real modules) is [`Value::Opaque`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Shared<Value>),
    Tuple(Vec<Value>),
    /// Insertion-ordered mapping
    Dict(Shared<(Value, Value)>),
    Module(String),
    Routine(Routine),
    /// A function defined by the script, numbered in definition order
    Function(usize),
    Opaque,
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(shared(items))
    }

    pub fn dict(pairs: Vec<(Value, Value)>) -> Self {
        Value::Dict(shared(pairs))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Module(_) => "module",
            Value::Routine(_) => "builtin_function_or_method",
            Value::Function(_) => "function",
            Value::Opaque => "object",
        }
    }

    /// Truth value, `None` when it depends on something opaque
    pub fn truthy(&self) -> Option<bool> {
        match self {
            Value::None => Some(false),
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Str(s) => Some(!s.is_empty()),
            Value::Tuple(items) => Some(!items.is_empty()),
            Value::List(list) => {
                let list = list.borrow();
                list.known.then(|| !list.items.is_empty())
            }
            Value::Dict(dict) => {
                let dict = dict.borrow();
                dict.known.then(|| !dict.items.is_empty())
            }
            Value::Module(_) | Value::Routine(_) | Value::Function(_) => Some(true),
            Value::Opaque => None,
        }
    }

    /// Whether the value is fully known, including nested items
    pub fn is_static(&self) -> bool {
        match self {
            Value::Opaque => false,
            Value::Tuple(items) => items.iter().all(Value::is_static),
            Value::List(list) => {
                let list = list.borrow();
                list.known && list.items.iter().all(Value::is_static)
            }
            Value::Dict(dict) => {
                let dict = dict.borrow();
                dict.known && dict.items.iter().all(|(k, v)| k.is_static() && v.is_static())
            }
            _ => true,
        }
    }

    /// Whether a list or dict still has known contents
    pub fn is_known(&self) -> bool {
        match self {
            Value::List(list) => list.borrow().known,
            Value::Dict(dict) => dict.borrow().known,
            Value::Opaque => false,
            _ => true,
        }
    }

    /// Mark this list or dict, and every container inside it, as changed
    /// in a way that was not followed
    pub fn forget(&self) {
        match self {
            Value::List(list) => {
                let items = list.borrow().items.clone();
                list.borrow_mut().known = false;
                items.iter().for_each(Value::forget);
            }
            Value::Dict(dict) => {
                let pairs = dict.borrow().items.clone();
                dict.borrow_mut().known = false;
                for (_, value) in &pairs {
                    value.forget();
                }
            }
            Value::Tuple(items) => items.iter().for_each(Value::forget),
            _ => {}
        }
    }

    /// Items of a known list or of a tuple
    pub fn sequence(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(list) => {
                let list = list.borrow();
                list.known.then(|| list.items.clone())
            }
            Value::Tuple(items) => Some(items.clone()),
            _ => None,
        }
    }

    /// Pairs of a known dict, in insertion order
    pub fn pairs(&self) -> Option<Vec<(Value, Value)>> {
        match self {
            Value::Dict(dict) => {
                let dict = dict.borrow();
                dict.known.then(|| dict.items.clone())
            }
            _ => None,
        }
    }

    /// What a `for` loop over the value visits
    pub fn iterate(&self) -> Option<Vec<Value>> {
        match self {
            Value::Dict(_) => self
                .pairs()
                .map(|pairs| pairs.into_iter().map(|(key, _)| key).collect()),
            Value::Str(text) => Some(text.chars().map(|c| Value::Str(c.to_string())).collect()),
            _ => self.sequence(),
        }
    }

    /// Value stored under `key`, if the dict holds it
    pub fn dict_get(&self, key: &Value) -> Option<Value> {
        match self {
            Value::Dict(dict) => dict
                .borrow()
                .items
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    /// Insert or replace `key`, keeping the original position on replace
    pub fn dict_set(pairs: &mut Vec<(Value, Value)>, key: Value, value: Value) {
        match pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => pairs.push((key, value)),
        }
    }

    /// Whether the value can be used as a dict key
    pub fn is_hashable(&self) -> bool {
        match self {
            Value::Tuple(items) => items.iter().all(Value::is_hashable),
            Value::List(_) | Value::Dict(_) | Value::Opaque => false,
            _ => true,
        }
    }

    /// Whether `self` is `container` or holds it somewhere inside
    pub fn refers_to(&self, container: &Value) -> bool {
        match (self, container) {
            (Value::List(a), Value::List(b)) if Rc::ptr_eq(a, b) => true,
            (Value::Dict(a), Value::Dict(b)) if Rc::ptr_eq(a, b) => true,
            (Value::List(list), _) => list.borrow().items.iter().any(|v| v.refers_to(container)),
            (Value::Dict(dict), _) => dict
                .borrow()
                .items
                .iter()
                .any(|(k, v)| k.refers_to(container) || v.refers_to(container)),
            (Value::Tuple(items), _) => items.iter().any(|v| v.refers_to(container)),
            _ => false,
        }
    }

    /// Copy with no containers shared with `self`
    pub fn snapshot(&self) -> Value {
        match self {
            Value::List(list) => {
                let list = list.borrow();
                let copy = Container {
                    items: list.items.iter().map(Value::snapshot).collect(),
                    known: list.known,
                };
                Value::List(Rc::new(RefCell::new(copy)))
            }
            Value::Dict(dict) => {
                let dict = dict.borrow();
                let copy = Container {
                    items: dict
                        .items
                        .iter()
                        .map(|(k, v)| (k.snapshot(), v.snapshot()))
                        .collect(),
                    known: dict.known,
                };
                Value::Dict(Rc::new(RefCell::new(copy)))
            }
            Value::Tuple(items) => Value::Tuple(items.iter().map(Value::snapshot).collect()),
            other => other.clone(),
        }
    }

    /// `str(value)`, when known
    pub fn to_str(&self) -> Option<String> {
        match self {
            Value::Str(text) => Some(text.clone()),
            other => other.repr(),
        }
    }

    /// `repr(value)`, when known
    pub fn repr(&self) -> Option<String> {
        match self {
            Value::None => Some("None".to_string()),
            Value::Bool(true) => Some("True".to_string()),
            Value::Bool(false) => Some("False".to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Str(text) => Some(quote(text)),
            Value::List(_) => Some(format!("[{}]", join_repr(&self.sequence()?)?)),
            Value::Tuple(items) => match items.as_slice() {
                [only] => Some(format!("({},)", only.repr()?)),
                _ => Some(format!("({})", join_repr(items)?)),
            },
            Value::Dict(_) => {
                let mut parts = Vec::new();
                for (key, value) in self.pairs()? {
                    parts.push(format!("{}: {}", key.repr()?, value.repr()?));
                }
                Some(format!("{{{}}}", parts.join(", ")))
            }
            Value::Module(name) => Some(format!("<module '{}'>", name)),
            Value::Routine(_) | Value::Function(_) | Value::Opaque => None,
        }
    }
}

/// Python's ordering of two known values, where it is defined
pub fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Tuple(_), Value::Tuple(_)) | (Value::List(_), Value::List(_)) => {
            let (a, b) = (left.sequence()?, right.sequence()?);
            for (x, y) in a.iter().zip(&b) {
                if x != y {
                    return order(x, y);
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => None,
    }
}

fn join_repr(items: &[Value]) -> Option<String> {
    let parts = items.iter().map(Value::repr).collect::<Option<Vec<_>>>()?;
    Some(parts.join(", "))
}

fn quote(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
