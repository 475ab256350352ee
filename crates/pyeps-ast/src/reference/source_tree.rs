//! Static reference resolution over a source tree
//!
//! Modules are located with [`OriginResolver`] and parsed, never imported.
//! A chain such as `Cli.run` is followed through top-level bindings, into
//! class bodies, across imports and into package submodules. When a name is
//! bound more than once the last binding in statement order wins. Inside a
//! `try` statement the body's bindings count when every import in the body
//! can be found, and the first handler's bindings count otherwise.

use super::bindings::{bindings_of, class_body, import_base, Binding, ImportBase};
use super::{CallableHandle, ReferenceResolver, ResolveError};
use crate::syntax::{first_syntax_error, line_of, named_children, parse, statements, PyNode};
use pyeps_index::{ModuleKind, ModuleSpec, OriginResolver};
use pyeps_python::HostRuntime;
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

/// Imports and aliases followed before giving up on a reference
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct SourceTreeResolver {
    origins: OriginResolver,
}

impl SourceTreeResolver {
    pub fn new(origins: OriginResolver) -> Self {
        SourceTreeResolver { origins }
    }

    pub fn from_runtime(runtime: &HostRuntime) -> Self {
        Self::new(OriginResolver::from_runtime(runtime))
    }

    fn resolve_module(
        &self,
        module: &str,
        chain: &[String],
        depth: usize,
    ) -> Result<CallableHandle, ResolveError> {
        if depth > MAX_DEPTH {
            return Err(ResolveError::TooDeep(module.to_string()));
        }
        trace!("Resolving {:?} in {}", chain, module);

        let spec = self
            .origins
            .find_spec(module)
            .ok_or_else(|| ResolveError::ModuleNotFound(module.to_string()))?;

        match (spec.kind, spec.origin.as_deref()) {
            (ModuleKind::Builtin, _) => Ok(CallableHandle::Native {
                module: spec.name,
                origin: None,
            }),
            (ModuleKind::Namespace, _) => match chain.split_first() {
                Some((first, rest)) => {
                    self.resolve_module(&format!("{}.{}", spec.name, first), rest, depth + 1)
                }
                None => Ok(CallableHandle::Synthesized {
                    description: format!("'{}' is a namespace package", spec.name),
                }),
            },
            (ModuleKind::Package | ModuleKind::Source, Some(origin)) if is_source_file(origin) => {
                let file = origin.to_path_buf();
                if chain.is_empty() {
                    return Ok(CallableHandle::Module { file });
                }
                self.resolve_in_source(&spec, &file, chain, depth)
            }
            (_, origin) => Ok(CallableHandle::Native {
                module: spec.name.clone(),
                origin: origin.map(Path::to_path_buf),
            }),
        }
    }

    fn resolve_in_source(
        &self,
        spec: &ModuleSpec,
        file: &Path,
        chain: &[String],
        depth: usize,
    ) -> Result<CallableHandle, ResolveError> {
        let source = fs::read_to_string(file).map_err(|e| ResolveError::Unreadable {
            path: file.to_path_buf(),
            reason: e.to_string(),
        })?;
        let grep = parse(&source);
        let root = grep.root();
        if let Some(offset) = first_syntax_error(&root) {
            return Err(ResolveError::Syntax {
                path: file.to_path_buf(),
                line: line_of(&source, offset),
            });
        }

        let mut scope = root;
        let mut qualname = spec.name.clone();
        for (index, part) in chain.iter().enumerate() {
            let rest = &chain[index + 1..];
            let at_module_level = index == 0;

            let Some(binding) = self.pick(spec, &scope, part, depth)? else {
                if at_module_level && spec.is_package() {
                    let submodule = format!("{}.{}", spec.name, part);
                    return self.resolve_module(&submodule, rest, depth + 1);
                }
                return Err(ResolveError::AttributeNotFound {
                    module: qualname,
                    attribute: part.clone(),
                });
            };

            match binding {
                Binding::Definition(node) => {
                    if rest.is_empty() {
                        return Ok(code_unit(file, &node));
                    }
                    let Some(body) = class_body(&node) else {
                        return Err(ResolveError::AttributeNotFound {
                            module: format!("{}.{}", qualname, part),
                            attribute: rest[0].clone(),
                        });
                    };
                    scope = body;
                    qualname = format!("{}.{}", qualname, part);
                }
                Binding::Module(target) => return self.resolve_module(&target, rest, depth + 1),
                Binding::Imported { base, name } => {
                    let target = absolute_module(spec, &base)?;
                    if target == spec.name {
                        // `from . import x` inside a package names its submodule
                        let submodule = format!("{}.{}", target, name);
                        return self.resolve_module(&submodule, rest, depth + 1);
                    }
                    let mut imported = vec![name];
                    imported.extend_from_slice(rest);
                    return self.resolve_module(&target, &imported, depth + 1);
                }
                Binding::Alias(path) => {
                    // Aliases are looked up from module level
                    let mut aliased = path;
                    aliased.extend_from_slice(rest);
                    return self.resolve_module(&spec.name, &aliased, depth + 1);
                }
                Binding::Value { kind, offset } => {
                    return Ok(CallableHandle::Synthesized {
                        description: format!(
                            "'{}.{}' is a {} value bound at line {} of {}",
                            qualname,
                            part,
                            kind.replace('_', " "),
                            line_of(&source, offset),
                            file.display()
                        ),
                    });
                }
                Binding::Wildcard(_) | Binding::Guarded { .. } => {
                    return Err(ResolveError::AttributeNotFound {
                        module: qualname,
                        attribute: part.clone(),
                    })
                }
            }
        }

        // The chain ended on a class body without a final definition
        Err(ResolveError::AttributeNotFound {
            module: spec.name.clone(),
            attribute: chain.join("."),
        })
    }

    /// The binding of `name` that wins in `scope`
    ///
    /// A wildcard import only counts when the imported module binds a
    /// public `name` itself.
    fn pick<'r>(
        &self,
        spec: &ModuleSpec,
        scope: &PyNode<'r>,
        name: &str,
        depth: usize,
    ) -> Result<Option<Binding<'r>>, ResolveError> {
        self.pick_from(spec, bindings_of(scope, name), name, depth)
    }

    fn pick_from<'r>(
        &self,
        spec: &ModuleSpec,
        bindings: Vec<Binding<'r>>,
        name: &str,
        depth: usize,
    ) -> Result<Option<Binding<'r>>, ResolveError> {
        for binding in bindings.into_iter().rev() {
            match binding {
                Binding::Wildcard(base) => {
                    if name.starts_with('_') {
                        continue;
                    }
                    let target = absolute_module(spec, &base)?;
                    if target != spec.name && self.binds(&target, name, depth + 1) {
                        debug!("{} comes from `from {} import *`", name, target);
                        return Ok(Some(Binding::Imported {
                            base: ImportBase::Absolute(target),
                            name: name.to_string(),
                        }));
                    }
                }
                Binding::Guarded {
                    body,
                    primary,
                    fallback,
                } => {
                    let chosen = if self.imports_succeed(spec, &body, depth + 1) {
                        primary
                    } else {
                        debug!(
                            "Imports of the try body at byte {} fail, using its handler",
                            body.range().start
                        );
                        fallback
                    };
                    // A path that does not bind `name` leaves the earlier binding
                    if let Some(binding) = self.pick_from(spec, chosen, name, depth)? {
                        return Ok(Some(binding));
                    }
                }
                binding => return Ok(Some(binding)),
            }
        }
        Ok(None)
    }

    /// Whether every import statement directly in `block` would load
    ///
    /// An explicit `raise` in the block counts as a failure.
    fn imports_succeed(&self, spec: &ModuleSpec, block: &PyNode<'_>, depth: usize) -> bool {
        if depth > MAX_DEPTH {
            return false;
        }
        statements(block).iter().all(|statement| match statement.kind().as_ref() {
            "import_statement" => named_children(statement).iter().all(|child| {
                let module = match child.kind().as_ref() {
                    "aliased_import" => child.field("name").map(|n| n.text().to_string()),
                    "dotted_name" => Some(child.text().to_string()),
                    _ => None,
                };
                module.map_or(true, |module| self.origins.find_spec(&module).is_some())
            }),
            "import_from_statement" => self.from_import_succeeds(spec, statement, depth),
            "raise_statement" => false,
            _ => true,
        })
    }

    fn from_import_succeeds(&self, spec: &ModuleSpec, statement: &PyNode<'_>, depth: usize) -> bool {
        let Some(module_node) = statement.field("module_name") else {
            return false;
        };
        let Ok(target) = absolute_module(spec, &import_base(&module_node)) else {
            return false;
        };
        if self.origins.find_spec(&target).is_none() {
            trace!("{} cannot be imported", target);
            return false;
        }
        let names_start = module_node.range().end;
        named_children(statement)
            .iter()
            .filter(|child| child.range().start >= names_start)
            .all(|child| {
                let imported = match child.kind().as_ref() {
                    "dotted_name" => Some(child.text().to_string()),
                    "aliased_import" => child.field("name").map(|n| n.text().to_string()),
                    _ => None,
                };
                imported.map_or(true, |name| self.provides(&target, &name, depth))
            })
    }

    /// Whether `from module import name` finds `name`
    ///
    /// Modules without Python source are assumed to provide it.
    fn provides(&self, module: &str, name: &str, depth: usize) -> bool {
        let Some(spec) = self.origins.find_spec(module) else {
            return false;
        };
        let submodule = || self.origins.find_spec(&format!("{}.{}", module, name)).is_some();
        match spec.kind {
            ModuleKind::Namespace => submodule(),
            ModuleKind::Package | ModuleKind::Source
                if spec.origin.as_deref().is_some_and(is_source_file) =>
            {
                self.binds(module, name, depth + 1) || (spec.is_package() && submodule())
            }
            _ => true,
        }
    }

    /// Whether module `target` has a top-level binding for `name`
    fn binds(&self, target: &str, name: &str, depth: usize) -> bool {
        if depth > MAX_DEPTH {
            return false;
        }
        let Some(spec) = self.origins.find_spec(target) else {
            return false;
        };
        let Some(origin) = spec.origin.as_deref().filter(|o| is_source_file(o)) else {
            return false;
        };
        let Ok(source) = fs::read_to_string(origin) else {
            return false;
        };
        let grep = parse(&source);
        let root = grep.root();
        matches!(self.pick(&spec, &root, name, depth), Ok(Some(_)))
    }
}

impl ReferenceResolver for SourceTreeResolver {
    fn resolve_reference(
        &self,
        module_path: &str,
        attribute_chain: &[String],
    ) -> Result<CallableHandle, ResolveError> {
        self.resolve_module(module_path, attribute_chain, 0)
    }
}

fn code_unit(file: &Path, node: &PyNode<'_>) -> CallableHandle {
    let text = node.text();
    let anchor = text.lines().next().unwrap_or_default().to_string();
    CallableHandle::CodeUnit {
        file: file.to_path_buf(),
        offset: node.range().start,
        anchor,
    }
}

fn is_source_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "py")
}

/// Absolute module name of an import base as seen from `spec`
fn absolute_module(spec: &ModuleSpec, base: &ImportBase) -> Result<String, ResolveError> {
    let (level, module) = match base {
        ImportBase::Absolute(module) => return Ok(module.clone()),
        ImportBase::Relative { level, module } => (*level, module.as_deref()),
    };

    let beyond_top = || ResolveError::RelativeImport(spec.name.clone());
    let mut package = if spec.is_package() {
        spec.name.as_str()
    } else {
        spec.name.rsplit_once('.').map(|(parent, _)| parent).ok_or_else(beyond_top)?
    };
    for _ in 1..level {
        package = package.rsplit_once('.').map(|(parent, _)| parent).ok_or_else(beyond_top)?;
    }

    Ok(match module {
        Some(module) => format!("{}.{}", package, module),
        None => package.to_string(),
    })
}
