//! Downloads one selected archive: primary transfer tool first, direct
//! fetch as the fallback. Whatever path produced the file, it has to
//! actually look like a zip archive before the conversion stage sees it.

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use tracing::{debug, warn};

use crate::catalog::ArchiveRef;
use crate::error::SyncError;
use crate::tools::Toolkit;

/// Zip local-file-header magic. A fallback source serving an HTML error
/// page instead of the archive must fail here, not at conversion time.
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Fetch one archive to `dest`. Failures are per-item: the caller skips the
/// archive for this run and the ledger never learns about it, so the next
/// scheduled run retries it naturally.
pub async fn fetch_archive(
    toolkit: &dyn Toolkit,
    http: &Client,
    reference: &ArchiveRef,
    dest: &Path,
) -> Result<(), SyncError> {
    match toolkit.transfer(&reference.url, dest).await {
        Ok(()) => match validate_zip(dest) {
            Ok(()) => return Ok(()),
            Err(err) => warn!(
                id = reference.id,
                %err,
                "transfer produced an invalid archive, retrying directly"
            ),
        },
        Err(err) => warn!(id = reference.id, %err, "transfer tool failed, retrying directly"),
    }

    direct_fetch(http, &reference.url, dest)
        .await
        .map_err(|source| SyncError::Retrieval {
            id: reference.id,
            source,
        })
}

/// Last-resort plain GET of the archive body.
async fn direct_fetch(http: &Client, url: &str, dest: &Path) -> Result<()> {
    debug!(url, "direct download");
    let resp = http
        .get(url)
        .send()
        .await
        .with_context(|| format!("request failed for {url}"))?
        .error_for_status()
        .context("archive download returned an error status")?;
    let body = resp.bytes().await.context("reading archive body")?;
    if !body.starts_with(&ZIP_MAGIC) {
        bail!("response body is not a zip archive");
    }
    tokio::fs::write(dest, &body)
        .await
        .with_context(|| format!("writing {}", dest.display()))?;
    Ok(())
}

fn validate_zip(path: &Path) -> Result<()> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut header = [0u8; 4];
    file.read_exact(&mut header)
        .context("archive shorter than a zip header")?;
    if header != ZIP_MAGIC {
        bail!("file does not start with a zip header");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct StubTransfer {
        payload: Option<Vec<u8>>,
    }

    #[async_trait]
    impl Toolkit for StubTransfer {
        async fn transfer(&self, _url: &str, dest: &Path) -> Result<()> {
            match &self.payload {
                Some(bytes) => {
                    std::fs::write(dest, bytes)?;
                    Ok(())
                }
                None => bail!("transfer tool not available"),
            }
        }
        async fn convert(&self, _pgn: &Path, _database: &Path) -> Result<()> {
            unreachable!("retrieval never converts")
        }
        async fn merge(&self, _database: &Path, _sources: &[PathBuf]) -> Result<()> {
            unreachable!("retrieval never merges")
        }
        async fn normalize(&self, _database: &Path, _dictionary: &Path) -> Result<()> {
            unreachable!("retrieval never normalizes")
        }
    }

    fn unreachable_reference() -> ArchiveRef {
        // Port 1 refuses connections immediately, so the fallback fails
        // fast without touching the network.
        ArchiveRef {
            id: 1501,
            url: "http://127.0.0.1:1/twic1501g.zip".to_string(),
        }
    }

    #[test]
    fn validate_zip_accepts_a_zip_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ok.zip");
        std::fs::write(&path, b"PK\x03\x04rest-of-archive").unwrap();
        assert!(validate_zip(&path).is_ok());
    }

    #[test]
    fn validate_zip_rejects_html_and_truncation() {
        let dir = tempdir().unwrap();
        let html = dir.path().join("error.zip");
        std::fs::write(&html, b"<html>not found</html>").unwrap();
        assert!(validate_zip(&html).is_err());

        let short = dir.path().join("short.zip");
        std::fs::write(&short, b"PK").unwrap();
        assert!(validate_zip(&short).is_err());
    }

    #[tokio::test]
    async fn transfer_success_skips_the_fallback() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("twic1501g.zip");
        let toolkit = StubTransfer {
            payload: Some(b"PK\x03\x04data".to_vec()),
        };
        let http = Client::new();
        fetch_archive(&toolkit, &http, &unreachable_reference(), &dest)
            .await
            .unwrap();
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn both_paths_failing_is_a_retrieval_error() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("twic1501g.zip");
        let toolkit = StubTransfer { payload: None };
        let http = Client::new();
        let err = fetch_archive(&toolkit, &http, &unreachable_reference(), &dest)
            .await
            .unwrap_err();
        assert_eq!(err.archive_id(), Some(1501));
    }

    #[tokio::test]
    async fn invalid_transfer_output_falls_back_and_can_still_fail() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("twic1501g.zip");
        let toolkit = StubTransfer {
            payload: Some(b"<html>503</html>".to_vec()),
        };
        let http = Client::new();
        let err = fetch_archive(&toolkit, &http, &unreachable_reference(), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Retrieval { .. }));
    }
}
