use std::path::PathBuf;

use crate::input::Semantic;

/// Errors that can occur while importing an interchange document.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("document not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error loading '{0}': {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse document: {0}")]
    Parse(String),

    #[error("missing <{element}> in {context}")]
    MissingElement {
        element: &'static str,
        context: String,
    },

    #[error("<{element}> is missing attribute '{attribute}'")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },

    #[error("{context} has no {semantic} input")]
    MissingInput { context: String, semantic: Semantic },

    #[error("reference '#{0}' does not match any declared source")]
    UnresolvedReference(String),

    #[error("no armature node named '{0}'")]
    ArmatureNotFound(String),

    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: i64,
        len: usize,
    },

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("expected 16 matrix values, found {0}")]
    MalformedMatrix(usize),

    #[error("armature '{0}' has no joint nodes")]
    NoRootBone(String),

    #[error("cannot merge '{0}' and '{1}': only one of them carries bone weights")]
    PartialSkinMerge(String, String),
}

impl ImportError {
    /// Whether a referenced id failed to resolve. These abort a whole
    /// geometry rather than a single primitive group.
    pub fn is_lookup_mismatch(&self) -> bool {
        matches!(
            self,
            ImportError::UnresolvedReference(_) | ImportError::ArmatureNotFound(_)
        )
    }
}

/// Check a raw index against a table length.
pub(crate) fn checked_index(what: &'static str, index: i64, len: usize) -> Result<usize, ImportError> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or(ImportError::IndexOutOfRange { what, index, len })
}
