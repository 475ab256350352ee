//! Static Python source analysis for pyeps
//!
//! Everything here works on parsed source text (ast-grep with the Python
//! grammar) and never runs an interpreter:
//! 1. [`descriptor`] evaluates legacy `setup.py` descriptors in a sandboxed
//!    [`descriptor::ExecutionContext`]
//! 2. [`entry_points`] reads `pyproject.toml` entry point tables
//! 3. [`reference`] follows `module:attr` references to their definitions
//! 4. [`locate`] ties the installed package index and reference resolution
//!    together into a file and line
pub mod descriptor;
pub mod entry_points;
pub mod locate;
pub mod reference;
pub mod source_text;
mod syntax;

pub use descriptor::evaluate_descriptor;
pub use entry_points::project_entry_points;
pub use locate::{resolve_entry_point, resolve_installed};
pub use reference::{CallableHandle, ReferenceResolver, SourceTreeResolver};
pub use source_text::SourceText;
