use tf_core::types::{LogEntry, Progress, TaskPatch};

use crate::audit;
use crate::{EngineError, Result};

/// Validate a raw percentage.
pub fn parse_progress(value: i64) -> Result<Progress> {
    Progress::new(value).ok_or_else(|| {
        EngineError::Validation(format!("progress must be between 0 and 100, got {value}"))
    })
}

/// Patch and audit entry for a progress update. Status follows from the
/// new progress on the next read.
pub fn plan(progress: Progress) -> (TaskPatch, LogEntry) {
    (
        TaskPatch {
            progress: Some(progress),
            ..Default::default()
        },
        audit::progress_updated(progress),
    )
}
