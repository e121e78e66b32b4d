//! Fetches the remote archive catalog and extracts the downloadable
//! entries. The catalog page is the only source of truth for what exists:
//! if it cannot be read, nothing is known to be new and the run aborts.

use std::collections::HashSet;

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::error::SyncError;

/// One downloadable weekly archive as listed by the catalog page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRef {
    /// Issue number embedded in the archive file name.
    pub id: u32,
    /// Absolute download location.
    pub url: String,
}

/// Download the catalog page and scan it for PGN archive links.
///
/// Transport failures and error statuses are fatal. A page that yields
/// zero links is not a fetch error; the pipeline reports it as an empty
/// selection instead.
pub async fn fetch(http: &Client, catalog_url: &str) -> Result<Vec<ArchiveRef>, SyncError> {
    debug!(url = catalog_url, "downloading catalog page");
    let base = Url::parse(catalog_url)
        .with_context(|| format!("invalid catalog url {catalog_url}"))
        .map_err(SyncError::Fetch)?;
    let resp = http
        .get(catalog_url)
        .send()
        .await
        .with_context(|| format!("request failed for {catalog_url}"))
        .map_err(SyncError::Fetch)?
        .error_for_status()
        .context("catalog page returned an error status")
        .map_err(SyncError::Fetch)?;
    let html = resp
        .text()
        .await
        .context("reading catalog page body")
        .map_err(SyncError::Fetch)?;
    parse(&html, &base).map_err(SyncError::Fetch)
}

/// Extract archive references from the page body: document order, first
/// occurrence of an id wins.
pub fn parse(html: &str, base: &Url) -> Result<Vec<ArchiveRef>> {
    // Anchored on the PGN link text; unrelated zips on the page never match.
    let link_re = Regex::new(r#"([^"']*twic(\d+)g\.zip)["']\s*>PGN<"#)?;

    let mut seen = HashSet::new();
    let mut refs = Vec::new();
    for cap in link_re.captures_iter(html) {
        let href = &cap[1];
        let id: u32 = match cap[2].parse() {
            Ok(id) => id,
            Err(_) => {
                warn!(href, "archive link with unusable id, skipping");
                continue;
            }
        };
        let url = match base.join(href) {
            Ok(u) => u.to_string(),
            Err(err) => {
                warn!(href, %err, "malformed archive link, skipping");
                continue;
            }
        };
        if seen.insert(id) {
            refs.push(ArchiveRef { id, url });
        }
    }
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://www.theweekinchess.com/twic").unwrap()
    }

    #[test]
    fn finds_pgn_links_in_document_order() {
        let html = r#"
            <tr><td><a href="http://www.theweekinchess.com/zips/twic1530g.zip">PGN</a></td></tr>
            <tr><td><a href="http://www.theweekinchess.com/zips/twic1529g.zip">PGN</a></td></tr>
        "#;
        let refs = parse(html, &base()).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].id, 1530);
        assert_eq!(refs[1].id, 1529);
        assert!(refs[0].url.ends_with("twic1530g.zip"));
    }

    #[test]
    fn resolves_relative_links_against_the_page() {
        let html = r#"<a href="/zips/twic1501g.zip">PGN</a>"#;
        let refs = parse(html, &base()).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(
            refs[0].url,
            "http://www.theweekinchess.com/zips/twic1501g.zip"
        );
    }

    #[test]
    fn ignores_other_downloads_and_duplicate_ids() {
        let html = r#"
            <a href="/zips/twic1501g.zip">PGN</a>
            <a href="/zips/twic1501.cbv">CBV</a>
            <a href="/zips/twic1501g.zip">PGN</a>
        "#;
        let refs = parse(html, &base()).unwrap();
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn empty_page_is_an_empty_catalog_not_an_error() {
        assert!(parse("<html></html>", &base()).unwrap().is_empty());
    }
}
