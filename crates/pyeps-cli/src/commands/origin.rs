use crate::runtime::RuntimeSelection;
use anyhow::Result;
use pyeps_core::LocateError;
use pyeps_index::OriginResolver;

/// `pyeps origin MODULE`
pub fn handle_origin(module: &str, selection: &RuntimeSelection) -> Result<String> {
    let runtime = selection.discover()?;
    runtime.ensure_supported().map_err(LocateError::from)?;
    let origin = OriginResolver::from_runtime(&runtime).resolve_origin(module)?;
    Ok(origin.display().to_string())
}
