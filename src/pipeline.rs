//! One full synchronization run: catalog subset, ledger dedup, per-archive
//! retrieval and conversion, merge, ledger append. Strictly sequential;
//! retrieval of one archive never overlaps another.

use std::path::PathBuf;

use anyhow::Context;
use reqwest::Client;
use tracing::{info, warn};

use crate::catalog::ArchiveRef;
use crate::config::SyncConfig;
use crate::convert;
use crate::error::SyncError;
use crate::ledger::MergeLedger;
use crate::merge::{self, MergeOutcome};
use crate::retrieve;
use crate::select;
use crate::tools::Toolkit;

/// What one run did, for the log and the optional mail report.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Ids the selection filter kept.
    pub selected: Vec<u32>,
    /// Selected ids skipped because the ledger already lists them.
    pub already_merged: Vec<u32>,
    /// Ids merged and recorded this run.
    pub merged: Vec<u32>,
    /// Per-archive failures (id, reason); retried on the next run.
    pub failed: Vec<(u32, String)>,
    pub outcome: MergeOutcome,
}

/// Run the pipeline against an already-fetched catalog.
///
/// Per-archive failures are collected into the summary and never abort the
/// batch; `Fetch`/`Ledger`/`Merge`-class failures abort with the target
/// database and ledger untouched.
pub async fn sync(
    cfg: &SyncConfig,
    toolkit: &dyn Toolkit,
    http: &Client,
    catalog: Vec<ArchiveRef>,
) -> Result<RunSummary, SyncError> {
    let selected = select::apply(&catalog, &cfg.selection);

    let ledger = MergeLedger::new(&cfg.ledger);
    let already = ledger.load().map_err(SyncError::Ledger)?;

    let mut summary = RunSummary {
        selected: selected.iter().map(|r| r.id).collect(),
        ..Default::default()
    };

    let pending: Vec<ArchiveRef> = selected
        .into_iter()
        .filter(|r| {
            if already.contains(&r.id) {
                summary.already_merged.push(r.id);
                false
            } else {
                true
            }
        })
        .collect();

    if pending.is_empty() {
        let reason = if catalog.is_empty() {
            "the catalog lists no archives".to_string()
        } else if summary.selected.is_empty() {
            "no catalog entry matches the selection".to_string()
        } else {
            format!(
                "all {} selected archives are already in the ledger",
                summary.selected.len()
            )
        };
        return Err(SyncError::EmptySelection(reason));
    }

    info!(count = pending.len(), "archives to process");

    let work = tempfile::tempdir()
        .context("creating work directory")
        .map_err(SyncError::Workspace)?;

    let mut fragments: Vec<PathBuf> = Vec::new();
    let mut merged_refs: Vec<ArchiveRef> = Vec::new();

    for reference in &pending {
        info!(id = reference.id, url = %reference.url, "processing archive");
        let dest = work.path().join(format!("twic{}g.zip", reference.id));
        let result = async {
            retrieve::fetch_archive(toolkit, http, reference, &dest).await?;
            convert::convert_archive(
                toolkit,
                &dest,
                work.path(),
                reference.id,
                cfg.keep_pgn_dir.as_deref(),
            )
            .await
        }
        .await;
        match result {
            Ok(fragment) => {
                fragments.push(fragment);
                merged_refs.push(reference.clone());
            }
            Err(err) => {
                warn!(id = reference.id, %err, "skipping archive this run");
                summary.failed.push((reference.id, err.to_string()));
            }
        }
    }

    summary.outcome = merge::merge_fragments(toolkit, cfg, &fragments).await?;

    if summary.outcome == MergeOutcome::Merged {
        ledger.record(&merged_refs).map_err(SyncError::Ledger)?;
        summary.merged = merged_refs.iter().map(|r| r.id).collect();
        info!(
            ledger = %ledger.path().display(),
            merged = summary.merged.len(),
            "recorded merged archives"
        );
    }

    // The work directory and any leftover fragments vanish when `work`
    // drops, success or failure.
    Ok(summary)
}
