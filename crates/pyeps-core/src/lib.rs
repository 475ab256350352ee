//! Core types for pyeps
//!
//! Every pyeps operation produces the records defined here:
//! - [`EntryPoint`] for enumeration of installed metadata, legacy descriptors
//!   and project manifests
//! - [`ResolvedEntryPoint`] for the definition site of a single entry point
//!
//! The crate also owns the declaration grammar (`name = module:attr`), the
//! `entry_points.txt` reader, the boundary error taxonomy and the compact
//! JSON encoding consumed by callers.

pub mod codec;
pub mod declaration;
pub mod errors;
pub mod types;

pub use declaration::{parse_declaration, parse_entry_points_txt, DeclarationError};
pub use errors::LocateError;
pub use types::{EntryPoint, EntryPointValue, PythonVersion, Reference, ResolvedEntryPoint};
