use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use tracing::{error, info, warn};

use twic_sync::config::SyncConfig;
use twic_sync::select::Selection;
use twic_sync::tools::ScidToolkit;
use twic_sync::util::env as env_util;
use twic_sync::{catalog, logging, notify, pipeline, SyncError};

/// Download the current week's TWIC games, append them to an existing Scid
/// database and perform spellchecking.
#[derive(Parser, Debug)]
#[command(name = "twicsync", version, about)]
struct Cli {
    /// Get all PGN archives on the page. Overrides -n if specified.
    #[arg(short, long)]
    all: bool,

    /// Get the LATESTN highest-numbered archives. More than the page lists
    /// is equivalent to --all; zero means no restriction.
    #[arg(short = 'n', long = "latest-n", value_name = "LATESTN")]
    latest_n: Option<i64>,

    /// Comma-delimited list of archive ids, or a lo-hi range, to fetch.
    /// Takes precedence over -a and -n.
    #[arg(short, long, value_name = "IDS")]
    list: Option<String>,

    /// Scid database to merge into, without the .si4 extension.
    #[arg(short, long, default_value = "twic")]
    database: PathBuf,

    /// Spelling file for meta corrections.
    #[arg(short, long, default_value = "spelling.ssp")]
    spelling: PathBuf,

    /// Append-only log of already-merged archive locations.
    #[arg(long, default_value = "twic.log")]
    ledger: PathBuf,

    /// Keep a copy of each extracted PGN in this directory.
    #[arg(long, value_name = "DIR")]
    keep_pgn: Option<PathBuf>,

    /// Mail the run report (requires the MAILGUN_* environment variables).
    #[arg(long)]
    notify: bool,
}

#[tokio::main]
async fn main() {
    env_util::init_env();
    if let Err(err) = logging::init_tracing("info") {
        eprintln!("{err}");
        std::process::exit(2);
    }

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        let code = err
            .downcast_ref::<SyncError>()
            .map(SyncError::exit_code)
            .unwrap_or(2);
        if code == 1 {
            warn!("{err}");
        } else {
            error!("{err:#}");
        }
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut cfg = SyncConfig::new(cli.database, cli.spelling);
    cfg.selection = Selection::from_flags(cli.all, cli.latest_n, cli.list.as_deref())?;
    cfg.ledger = cli.ledger;
    cfg.keep_pgn_dir = cli.keep_pgn;

    let timeout = env_util::env_parse("TWIC_HTTP_TIMEOUT_SECS", 30u64);
    let http = Client::builder()
        .user_agent(concat!("twic-sync/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("building http client")?;

    let toolkit = ScidToolkit::detect();

    info!(url = %cfg.catalog_url, "downloading the Week in Chess main page");
    let catalog = catalog::fetch(&http, &cfg.catalog_url).await?;
    info!(count = catalog.len(), "archives listed in the catalog");

    let summary = pipeline::sync(&cfg, &toolkit, &http, catalog).await?;
    info!(
        merged = summary.merged.len(),
        skipped = summary.already_merged.len(),
        failed = summary.failed.len(),
        "run complete"
    );

    if cli.notify {
        match notify::Notifier::from_env() {
            Some(notifier) => {
                if let Err(err) = notifier.send_report(&http, &summary).await {
                    warn!(%err, "could not send the run report");
                }
            }
            None => warn!("--notify set but the MAILGUN_* environment is incomplete"),
        }
    }

    Ok(())
}
