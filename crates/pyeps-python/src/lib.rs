//! Host runtime discovery
//!
//! pyeps never imports Python code. It only needs to know which interpreter
//! generation it is answering for and where that interpreter looks for
//! packages. Both come from a one-shot interpreter probe or, for a virtual
//! environment, from the files in the environment itself.

pub mod python_discovery;

pub use python_discovery::{DiscoveryError, HostRuntime, MIN_PYTHON_VERSION};
