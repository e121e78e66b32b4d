//! The external command-line collaborators, behind a narrow capability
//! interface so the pipeline logic can be exercised against fakes instead
//! of the real scid binaries. The only contract the pipeline relies on is
//! that zero exit status means success.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::util::env as env_util;

/// The four external capabilities one run needs.
#[async_trait]
pub trait Toolkit: Send + Sync {
    /// Primary archive download. The retrieval stage falls back to a
    /// direct fetch when this fails or produces garbage.
    async fn transfer(&self, url: &str, dest: &Path) -> Result<()>;

    /// Convert an extracted PGN file into a database fragment at `database`.
    async fn convert(&self, pgn: &Path, database: &Path) -> Result<()>;

    /// Combine `sources` (existing database plus fragments, in that order)
    /// into a freshly built database at `database`.
    async fn merge(&self, database: &Path, sources: &[PathBuf]) -> Result<()>;

    /// Run the spelling normalization pass against a live database.
    async fn normalize(&self, database: &Path, dictionary: &Path) -> Result<()>;
}

/// Production toolkit shelling out to a transfer tool and the scid suite
/// (`pgnscid`, `scmerge`, `sc_spell`).
pub struct ScidToolkit {
    transfer: TransferTool,
    pgnscid: String,
    scmerge: String,
    sc_spell: String,
}

/// Transfer tool preference: lftp when installed, wget otherwise.
#[derive(Debug, Clone)]
enum TransferTool {
    Lftp(String),
    Wget(String),
}

impl ScidToolkit {
    /// Detect the transfer tool and resolve per-binary overrides from the
    /// environment (`TWIC_TRANSFER_BIN`, `TWIC_PGNSCID`, `TWIC_SCMERGE`,
    /// `TWIC_SC_SPELL`).
    pub fn detect() -> Self {
        let transfer = match env_util::env_opt("TWIC_TRANSFER_BIN") {
            Some(bin) if bin.ends_with("lftp") => TransferTool::Lftp(bin),
            Some(bin) => TransferTool::Wget(bin),
            None if Path::new("/usr/bin/lftp").exists() => {
                TransferTool::Lftp("/usr/bin/lftp".to_string())
            }
            None => TransferTool::Wget("wget".to_string()),
        };
        Self {
            transfer,
            pgnscid: env_util::env_opt("TWIC_PGNSCID").unwrap_or_else(|| "pgnscid".into()),
            scmerge: env_util::env_opt("TWIC_SCMERGE").unwrap_or_else(|| "scmerge".into()),
            sc_spell: env_util::env_opt("TWIC_SC_SPELL").unwrap_or_else(|| "sc_spell".into()),
        }
    }
}

/// Run a child to completion, relay its output into the log, fail on a
/// non-zero status.
async fn run(mut cmd: Command, what: &str) -> Result<()> {
    let output: Output = cmd
        .output()
        .await
        .with_context(|| format!("failed to spawn {what}"))?;
    relay(what, &output);
    if !output.status.success() {
        bail!("{what} exited with {}", output.status);
    }
    Ok(())
}

fn relay(what: &str, output: &Output) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!(tool = what, "{}", stdout.trim_end());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        warn!(tool = what, "{}", stderr.trim_end());
    }
}

#[async_trait]
impl Toolkit for ScidToolkit {
    async fn transfer(&self, url: &str, dest: &Path) -> Result<()> {
        match &self.transfer {
            TransferTool::Lftp(bin) => {
                let mut cmd = Command::new(bin);
                cmd.arg("-c")
                    .arg(format!("get {} -o {}; quit", url, dest.display()));
                run(cmd, "lftp").await
            }
            TransferTool::Wget(bin) => {
                let mut cmd = Command::new(bin);
                cmd.arg("-O").arg(dest).arg(url);
                run(cmd, "wget").await
            }
        }
    }

    async fn convert(&self, pgn: &Path, database: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.pgnscid);
        cmd.arg("-f").arg(pgn).arg(database);
        run(cmd, "pgnscid").await
    }

    async fn merge(&self, database: &Path, sources: &[PathBuf]) -> Result<()> {
        let mut cmd = Command::new(&self.scmerge);
        cmd.arg(database);
        cmd.args(sources);
        run(cmd, "scmerge").await
    }

    async fn normalize(&self, database: &Path, dictionary: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.sc_spell);
        cmd.arg(database).arg(dictionary);
        run(cmd, "sc_spell").await
    }
}
