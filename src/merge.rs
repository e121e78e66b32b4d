//! Folds the run's fragments into the target database. The target is never
//! mutated in place: the merge tool builds a staging database next to it,
//! and only a fully built staging database replaces the original. A reader
//! of the target never observes a partially merged state.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::tools::Toolkit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeOutcome {
    /// No fragments were produced; the target is untouched.
    #[default]
    NothingDone,
    /// The staging database replaced the target.
    Merged,
}

/// Merge all fragments into the target database and run the spelling pass.
///
/// A failing merge tool aborts before promotion: the target's files and the
/// ledger stay exactly as they were, and the staging artifacts are left
/// behind for inspection.
pub async fn merge_fragments(
    toolkit: &dyn Toolkit,
    cfg: &SyncConfig,
    fragments: &[PathBuf],
) -> Result<MergeOutcome, SyncError> {
    if fragments.is_empty() {
        info!("no fragments to merge, nothing done");
        return Ok(MergeOutcome::NothingDone);
    }

    let staging = cfg.staging_database();
    info!(
        staging = %staging.display(),
        fragments = fragments.len(),
        "building staging database"
    );

    let mut sources = Vec::with_capacity(fragments.len() + 1);
    sources.push(cfg.database.clone());
    sources.extend(fragments.iter().cloned());
    toolkit
        .merge(&staging, &sources)
        .await
        .map_err(SyncError::Merge)?;

    // The fragments are already folded into the staging database; their
    // storage files go before promotion.
    for fragment in fragments {
        if let Err(err) = remove_storage_files(fragment) {
            warn!(fragment = %fragment.display(), %err, "could not remove fragment files");
        }
    }

    promote(&staging, &cfg.database).map_err(SyncError::Merge)?;

    if let Err(err) = toolkit.normalize(&cfg.database, &cfg.spelling).await {
        // The merged games are already live; the run still counts as merged.
        warn!(%err, "spelling normalization failed");
    }

    Ok(MergeOutcome::Merged)
}

/// Replace the target database's storage files with the staging ones.
fn promote(staging: &Path, target: &Path) -> Result<()> {
    let staged = storage_files(staging)?;
    if staged.is_empty() {
        bail!(
            "merge tool reported success but left no staging files at {}",
            staging.display()
        );
    }

    info!(target = %target.display(), "promoting staging database");
    for old in storage_files(target)? {
        std::fs::remove_file(&old).with_context(|| format!("removing {}", old.display()))?;
    }

    let staging_name = file_name(staging)?;
    let target_name = file_name(target)?;
    for file in staged {
        let name = file_name(&file)?;
        let suffix = name
            .strip_prefix(&staging_name)
            .ok_or_else(|| anyhow!("{} is outside the staging database", file.display()))?;
        let dest = file.with_file_name(format!("{target_name}{suffix}"));
        std::fs::rename(&file, &dest)
            .with_context(|| format!("moving {} into place", file.display()))?;
    }
    Ok(())
}

/// Scid keeps a database as sibling files sharing the base name:
/// `twic.si4`, `twic.sg4`, `twic.sn4`, ... This is the `<base>.s*` set.
pub fn storage_files(base: &Path) -> Result<Vec<PathBuf>> {
    let prefix = format!("{}.s", file_name(base)?);
    let dir = match base.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("listing {}", dir.display())),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

pub fn remove_storage_files(base: &Path) -> Result<()> {
    for file in storage_files(base)? {
        std::fs::remove_file(&file).with_context(|| format!("removing {}", file.display()))?;
    }
    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("path {} has no file name", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn storage_files_matches_only_the_database_family() {
        let dir = tempdir().unwrap();
        for name in ["twic.si4", "twic.sg4", "twic.new.si4", "spelling.ssp"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let files = storage_files(&dir.path().join("twic")).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["twic.sg4", "twic.si4"]);
    }

    #[test]
    fn storage_files_of_a_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("nowhere").join("twic");
        assert!(storage_files(&base).unwrap().is_empty());
    }

    #[test]
    fn promote_renames_the_staging_family_over_the_target() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("twic.si4"), b"old").unwrap();
        std::fs::write(dir.path().join("twic.new.si4"), b"new-index").unwrap();
        std::fs::write(dir.path().join("twic.new.sg4"), b"new-games").unwrap();

        promote(&dir.path().join("twic.new"), &dir.path().join("twic")).unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("twic.si4")).unwrap(),
            b"new-index"
        );
        assert_eq!(
            std::fs::read(dir.path().join("twic.sg4")).unwrap(),
            b"new-games"
        );
        assert!(!dir.path().join("twic.new.si4").exists());
    }

    #[test]
    fn promote_refuses_when_staging_is_missing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("twic.si4"), b"old").unwrap();
        let err = promote(&dir.path().join("twic.new"), &dir.path().join("twic")).unwrap_err();
        assert!(err.to_string().contains("no staging files"));
        // The old database is untouched.
        assert_eq!(std::fs::read(dir.path().join("twic.si4")).unwrap(), b"old");
    }
}
