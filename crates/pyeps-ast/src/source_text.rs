//! Script and manifest inputs given either as a path or as literal text

use pyeps_core::LocateError;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceText {
    Path(PathBuf),
    Inline(String),
}

impl SourceText {
    /// Interpret a command-line argument
    ///
    /// The argument is literal text when `inline` is set or when it spans
    /// more than one line; otherwise it names a file.
    pub fn from_argument(argument: &str, inline: bool) -> Self {
        if inline || argument.contains('\n') {
            SourceText::Inline(argument.to_string())
        } else {
            SourceText::Path(PathBuf::from(argument))
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            SourceText::Path(path) => Some(path),
            SourceText::Inline(_) => None,
        }
    }

    /// The text, read from disk for paths
    ///
    /// A missing file is [`LocateError::ScriptNotFound`]; any other read
    /// failure, including non-UTF-8 content, is
    /// [`LocateError::ScriptUnreadable`].
    pub fn read(&self) -> Result<String, LocateError> {
        match self {
            SourceText::Path(path) => {
                fs::read_to_string(path).map_err(|e| LocateError::from_read_error(path.clone(), e))
            }
            SourceText::Inline(text) => Ok(text.clone()),
        }
    }
}
