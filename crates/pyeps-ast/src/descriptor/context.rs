//! Execution context for descriptor evaluation
//!
//! The context owns every binding the descriptor can see: the substitute
//! packaging modules, the script's globals and the `entry_points` values
//! captured from `setup()` calls. Nothing outside the context is consulted
//! or modified.

use super::value::{Routine, Value};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Substitute modules: module name -> attribute -> value
    modules: BTreeMap<String, BTreeMap<String, Value>>,
    globals: HashMap<String, Value>,
    /// `entry_points` arguments of every `setup()` call, in call order
    captured: Vec<Value>,
}

impl ExecutionContext {
    /// Context with no substitutes at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Context where the packaging entry points are inert
    ///
    /// `setuptools.setup` and `distutils.core.setup` capture their
    /// `entry_points` argument; `setuptools.find_packages` and
    /// `setuptools.find_namespace_packages` return an empty list.
    pub fn sandboxed() -> Self {
        let mut context = Self::empty();
        context.substitute("setuptools", "setup", Value::Routine(Routine::Setup));
        context.substitute(
            "setuptools",
            "find_packages",
            Value::Routine(Routine::DiscoverPackages),
        );
        context.substitute(
            "setuptools",
            "find_namespace_packages",
            Value::Routine(Routine::DiscoverPackages),
        );
        context.add_module("distutils");
        context.substitute("distutils.core", "setup", Value::Routine(Routine::Setup));
        context.set_global("__name__", Value::Str("__main__".to_string()));
        context
    }

    /// Register a module with no attributes
    pub fn add_module(&mut self, module: &str) {
        self.modules.entry(module.to_string()).or_default();
    }

    /// Bind `module.attribute` to `value`, registering the module
    pub fn substitute(&mut self, module: &str, attribute: &str, value: Value) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(attribute.to_string(), value);
    }

    /// Attribute of a module value
    ///
    /// Submodules of substituted modules resolve to module values; anything
    /// that is not substituted is opaque.
    pub fn module_attribute(&self, module: &str, attribute: &str) -> Value {
        if let Some(value) = self.modules.get(module).and_then(|m| m.get(attribute)) {
            return value.clone();
        }
        let submodule = format!("{}.{}", module, attribute);
        if self.modules.contains_key(&submodule) {
            return Value::Module(submodule);
        }
        Value::Opaque
    }

    /// Public attributes of a substituted module, for `from m import *`
    pub fn module_exports(&self, module: &str) -> Vec<(String, Value)> {
        self.modules
            .get(module)
            .map(|attrs| {
                attrs
                    .iter()
                    .filter(|(name, _)| !name.starts_with('_'))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    pub(crate) fn remove_global(&mut self, name: &str) -> Option<Value> {
        self.globals.remove(name)
    }

    /// Record one `setup()` call's `entry_points`; opaque when not known
    pub(crate) fn capture(&mut self, entry_points: Value) {
        self.captured.push(entry_points);
    }

    /// Captured `entry_points` arguments, in call order
    pub fn captured(&self) -> &[Value] {
        &self.captured
    }
}
