use thiserror::Error;

/// Failure taxonomy for one pipeline run.
///
/// `Fetch`, `Ledger`, `Workspace` and `Merge` are fatal to the whole run
/// and guarantee the target database and ledger are untouched. `Retrieval`
/// and `Conversion` are per-archive: the item is skipped, stays out of the
/// ledger, and is retried naturally on the next scheduled run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("catalog fetch failed: {0}")]
    Fetch(#[source] anyhow::Error),

    #[error("merge ledger unusable: {0}")]
    Ledger(#[source] anyhow::Error),

    #[error("work directory unavailable: {0}")]
    Workspace(#[source] anyhow::Error),

    #[error("archive {id}: retrieval failed: {source}")]
    Retrieval { id: u32, source: anyhow::Error },

    #[error("archive {id}: conversion failed: {source}")]
    Conversion { id: u32, source: anyhow::Error },

    #[error("database merge failed: {0}")]
    Merge(#[source] anyhow::Error),

    #[error("nothing to process: {0}")]
    EmptySelection(String),
}

impl SyncError {
    /// Process exit code for a failed run: 1 when the selection came up
    /// empty, 2 for everything catalog- or database-fatal.
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::EmptySelection(_) => 1,
            _ => 2,
        }
    }

    /// Archive id for the per-item failure classes.
    pub fn archive_id(&self) -> Option<u32> {
        match self {
            SyncError::Retrieval { id, .. } | SyncError::Conversion { id, .. } => Some(*id),
            _ => None,
        }
    }
}
