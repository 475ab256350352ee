//! Entry point declarations read from project manifests
//!
//! Installed metadata is handled by `pyeps-index` and legacy descriptors by
//! [`crate::descriptor`]; this module covers `pyproject.toml` (PEP 621).

pub mod pyproject;

pub use pyproject::{parse_pyproject_entry_points, project_entry_points};
