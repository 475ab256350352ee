//! Installed package index
//!
//! Reads the `*.dist-info` / `*.egg-info` metadata found on a host runtime's
//! search path and answers entry point queries the way that runtime's
//! `importlib.metadata` generation would. Also resolves module names to the
//! files the runtime would load them from.

pub mod distribution;
pub mod origin;
pub mod package_index;

pub use distribution::{normalize_name, scan_distributions, Distribution, PackageLocator};
pub use origin::{ModuleKind, ModuleSpec, OriginResolver};
pub use package_index::{
    enumerate, enumerate_installed, select_index, FlatIndex, Generation, GroupedIndex,
    PackageIndex, SelectableIndex,
};
