//! Turns a downloaded archive into a database fragment: locate the
//! embedded PGN, extract it, hand it to the converter.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::SyncError;
use crate::tools::Toolkit;

/// Build the fragment for one archive inside `work_dir` and return its
/// base path. Failures are per-item and leave the rest of the batch alone.
pub async fn convert_archive(
    toolkit: &dyn Toolkit,
    archive: &Path,
    work_dir: &Path,
    id: u32,
    keep_pgn_dir: Option<&Path>,
) -> Result<PathBuf, SyncError> {
    let pgn = extract_pgn(archive, work_dir, keep_pgn_dir)
        .map_err(|source| SyncError::Conversion { id, source })?;

    let fragment = work_dir.join(format!("twic{id}"));
    toolkit
        .convert(&pgn, &fragment)
        .await
        .map_err(|source| SyncError::Conversion { id, source })?;

    debug!(id, fragment = %fragment.display(), "fragment built");
    Ok(fragment)
}

/// Pull the PGN entry out of the zip into the work directory. Each weekly
/// archive carries exactly one game file; anything else in there is
/// ignored.
fn extract_pgn(archive: &Path, work_dir: &Path, keep_pgn_dir: Option<&Path>) -> Result<PathBuf> {
    let file = File::open(archive).with_context(|| format!("opening {}", archive.display()))?;
    let mut zip = ZipArchive::new(file).context("reading zip directory")?;

    let name = zip
        .file_names()
        .find(|n| {
            Path::new(n)
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("pgn"))
        })
        .map(String::from)
        .ok_or_else(|| anyhow!("archive contains no PGN file"))?;

    let plain = Path::new(&name)
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("PGN entry {name:?} has no file name"))?;
    let dest = work_dir.join(&plain);

    let mut entry = zip
        .by_name(&name)
        .with_context(|| format!("opening PGN entry {name:?}"))?;
    let mut out =
        File::create(&dest).with_context(|| format!("creating {}", dest.display()))?;
    io::copy(&mut entry, &mut out).context("extracting PGN")?;

    if let Some(keep_dir) = keep_pgn_dir {
        std::fs::create_dir_all(keep_dir)
            .with_context(|| format!("creating {}", keep_dir.display()))?;
        let kept = keep_dir.join(&plain);
        std::fs::copy(&dest, &kept)
            .with_context(|| format!("copying PGN to {}", kept.display()))?;
        info!(pgn = %kept.display(), "kept a copy of the extracted PGN");
    }

    Ok(dest)
}
