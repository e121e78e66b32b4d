use std::path::{Path, PathBuf};

use crate::select::Selection;
use crate::util::env as env_util;

/// Page listing the downloadable weekly archives.
pub const DEFAULT_CATALOG_URL: &str = "http://www.theweekinchess.com/twic";

/// Explicit configuration for one pipeline run.
///
/// Everything the stages need travels through this struct; nothing is read
/// from process-global state after startup.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Where the archive catalog is scraped from.
    pub catalog_url: String,
    /// Target Scid database, without its storage-file extension.
    pub database: PathBuf,
    /// Spelling dictionary for the post-merge normalization pass.
    pub spelling: PathBuf,
    /// Append-only log of already-merged archive locations.
    pub ledger: PathBuf,
    /// Which catalog entries this run should consider.
    pub selection: Selection,
    /// Optional directory that receives a copy of each extracted PGN.
    pub keep_pgn_dir: Option<PathBuf>,
}

impl SyncConfig {
    /// Defaults mirroring the historical cron setup: `twic.log` ledger next
    /// to the database, everything selected. The catalog URL honors
    /// `TWIC_CATALOG_URL`.
    pub fn new(database: impl Into<PathBuf>, spelling: impl Into<PathBuf>) -> Self {
        Self {
            catalog_url: env_util::env_opt("TWIC_CATALOG_URL")
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            database: database.into(),
            spelling: spelling.into(),
            ledger: PathBuf::from("twic.log"),
            selection: Selection::All,
            keep_pgn_dir: None,
        }
    }

    /// Staging path the merge stage builds into before promotion.
    pub fn staging_database(&self) -> PathBuf {
        append_suffix(&self.database, ".new")
    }
}

/// `twic` -> `twic.new`, preserving the parent directory.
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
