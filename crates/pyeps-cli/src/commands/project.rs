use anyhow::Result;
use pyeps_ast::{project_entry_points, SourceText};
use pyeps_core::codec::encode_list;

/// `pyeps project [--inline] SOURCE [GROUP]`
pub fn handle_project(source: &str, inline: bool, group: Option<&str>) -> Result<String> {
    let source = SourceText::from_argument(source, inline);
    let entry_points = project_entry_points(&source, group)?;
    Ok(encode_list(&entry_points)?)
}
