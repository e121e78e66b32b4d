//! Append-only record of the archive locations already merged into the
//! target database. The system's dedup guarantee lives here: an id present
//! in this log is never fed to the merge tool again, no matter how often
//! the pipeline runs.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::catalog::ArchiveRef;

pub struct MergeLedger {
    path: PathBuf,
}

impl MergeLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reconstruct the set of already-merged ids by rescanning the log.
    ///
    /// A missing file is a first run, not an error. Lines that carry no
    /// archive id (manual edits, blank lines) are skipped with a warning.
    /// The linear rescan is fine at a weekly cadence; the format stays a
    /// human-readable audit trail.
    pub fn load(&self) -> Result<HashSet<u32>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no ledger yet, starting empty");
                return Ok(HashSet::new());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading ledger {}", self.path.display()));
            }
        };

        let id_re = Regex::new(r"twic(\d+)g\.zip")?;
        let mut ids = HashSet::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match id_re
                .captures(line)
                .and_then(|c| c[1].parse::<u32>().ok())
            {
                Some(id) => {
                    ids.insert(id);
                }
                None => warn!(line, "ledger line without an archive id, ignoring"),
            }
        }
        Ok(ids)
    }

    /// Append the just-merged locations, most recent archive first.
    ///
    /// Called only after the merge stage has promoted the new database;
    /// anything that failed earlier in the run never reaches this point and
    /// stays eligible for the next one.
    pub fn record(&self, merged: &[ArchiveRef]) -> Result<()> {
        if merged.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("opening ledger {}", self.path.display()))?;
        for r in merged.iter().rev() {
            writeln!(file, "{}", r.url)
                .with_context(|| format!("appending to ledger {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn reference(id: u32) -> ArchiveRef {
        ArchiveRef {
            id,
            url: format!("http://www.theweekinchess.com/zips/twic{id}g.zip"),
        }
    }

    #[test]
    fn missing_ledger_is_an_empty_set() {
        let dir = tempdir().unwrap();
        let ledger = MergeLedger::new(dir.path().join("twic.log"));
        assert!(ledger.load().unwrap().is_empty());
    }

    #[test]
    fn record_then_load_round_trips_the_ids() {
        let dir = tempdir().unwrap();
        let ledger = MergeLedger::new(dir.path().join("twic.log"));
        ledger
            .record(&[reference(1501), reference(1502)])
            .unwrap();
        let ids = ledger.load().unwrap();
        assert!(ids.contains(&1501));
        assert!(ids.contains(&1502));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn appends_most_recent_archive_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("twic.log");
        let ledger = MergeLedger::new(&path);
        ledger
            .record(&[reference(1501), reference(1502)])
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("twic1502g.zip"));
        assert!(lines[1].contains("twic1501g.zip"));
    }

    #[test]
    fn record_appends_rather_than_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("twic.log");
        let ledger = MergeLedger::new(&path);
        ledger.record(&[reference(1501)]).unwrap();
        ledger.record(&[reference(1502)]).unwrap();
        let ids = ledger.load().unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn junk_lines_are_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("twic.log");
        std::fs::write(
            &path,
            "# touched up by hand\nhttp://www.theweekinchess.com/zips/twic1501g.zip\n\n",
        )
        .unwrap();
        let ids = MergeLedger::new(&path).load().unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains(&1501));
    }
}
