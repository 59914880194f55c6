use thiserror::Error;

/// Per-document failure. No output is produced for a document that fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepairError {
    #[error("no recoverable coordinate data in '{filename}'; the file may be badly damaged")]
    NoRecoverableContent { filename: String },
    #[error("unexpected failure while processing '{filename}': {reason}")]
    Unexpected { filename: String, reason: String },
    #[error("'{filename}' is {size} bytes, over the {limit} byte limit")]
    TooLarge {
        filename: String,
        size: usize,
        limit: usize,
    },
}

impl RepairError {
    pub fn filename(&self) -> &str {
        match self {
            RepairError::NoRecoverableContent { filename }
            | RepairError::Unexpected { filename, .. }
            | RepairError::TooLarge { filename, .. } => filename,
        }
    }

    /// Short machine-readable tag, used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            RepairError::NoRecoverableContent { .. } => "no_recoverable_content",
            RepairError::Unexpected { .. } => "unexpected",
            RepairError::TooLarge { .. } => "too_large",
        }
    }
}
