//! Narrows the fetched catalog to the subset a run should process.

use anyhow::{bail, Context, Result};

use crate::catalog::ArchiveRef;

/// Which catalog entries to consider, decided once at startup.
///
/// An explicit id list or range wins over `--all` and `--latest-n`, and a
/// latest-n of zero means "no restriction".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Everything the catalog lists.
    All,
    /// The `n` highest-numbered archives.
    LatestN(usize),
    /// Explicit ids and/or inclusive ranges.
    List(IdList),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdList {
    entries: Vec<IdEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdEntry {
    Single(u32),
    Range(u32, u32),
}

impl IdList {
    pub fn contains(&self, id: u32) -> bool {
        self.entries.iter().any(|e| match *e {
            IdEntry::Single(v) => v == id,
            IdEntry::Range(lo, hi) => (lo..=hi).contains(&id),
        })
    }
}

/// Parse `-l` input: comma-separated ids, each optionally a `lo-hi` range.
/// `1098,1040` and `10-12` are both valid.
pub fn parse_id_list(raw: &str) -> Result<IdList> {
    let mut entries = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo
                .trim()
                .parse()
                .with_context(|| format!("bad range start in {part:?}"))?;
            let hi: u32 = hi
                .trim()
                .parse()
                .with_context(|| format!("bad range end in {part:?}"))?;
            if hi < lo {
                bail!("range {part:?} runs backwards");
            }
            entries.push(IdEntry::Range(lo, hi));
        } else {
            let id: u32 = part
                .parse()
                .with_context(|| format!("bad archive id {part:?}"))?;
            entries.push(IdEntry::Single(id));
        }
    }
    if entries.is_empty() {
        bail!("empty id list");
    }
    Ok(IdList { entries })
}

impl Selection {
    /// Combine the CLI flags under their precedence rules: a list beats
    /// `--all`, `--all` beats `--latest-n`, and a missing, zero or negative
    /// latest-n normalizes to all / its absolute value.
    pub fn from_flags(all: bool, latest_n: Option<i64>, list: Option<&str>) -> Result<Selection> {
        if let Some(raw) = list {
            return Ok(Selection::List(parse_id_list(raw)?));
        }
        if all {
            return Ok(Selection::All);
        }
        match latest_n {
            None | Some(0) => Ok(Selection::All),
            Some(n) => Ok(Selection::LatestN(n.unsigned_abs() as usize)),
        }
    }
}

/// Apply the selection to the catalog.
///
/// List selection preserves catalog order. Latest-n re-sorts by id because
/// the catalog itself carries no ordering guarantee, and returns the kept
/// references in ascending id order; when `n` exceeds the number of
/// candidates everything is kept.
pub fn apply(catalog: &[ArchiveRef], selection: &Selection) -> Vec<ArchiveRef> {
    match selection {
        Selection::All => catalog.to_vec(),
        Selection::List(ids) => catalog
            .iter()
            .filter(|r| ids.contains(r.id))
            .cloned()
            .collect(),
        Selection::LatestN(n) => {
            let mut sorted = catalog.to_vec();
            sorted.sort_by_key(|r| r.id);
            let keep_from = sorted.len().saturating_sub(*n);
            sorted.split_off(keep_from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(ids: &[u32]) -> Vec<ArchiveRef> {
        ids.iter()
            .map(|&id| ArchiveRef {
                id,
                url: format!("http://example.com/twic{id}g.zip"),
            })
            .collect()
    }

    fn ids(refs: &[ArchiveRef]) -> Vec<u32> {
        refs.iter().map(|r| r.id).collect()
    }

    #[test]
    fn latest_n_keeps_the_highest_ids_regardless_of_catalog_order() {
        let catalog = refs(&[5, 12, 3, 20, 8]);
        let kept = apply(&catalog, &Selection::LatestN(3));
        assert_eq!(ids(&kept), vec![8, 12, 20]);
    }

    #[test]
    fn latest_n_clamps_to_the_catalog_size() {
        let catalog = refs(&[5, 12, 3, 20, 8]);
        let kept = apply(&catalog, &Selection::LatestN(100));
        assert_eq!(kept.len(), 5);
    }

    #[test]
    fn zero_and_missing_latest_n_mean_everything() {
        assert_eq!(
            Selection::from_flags(false, Some(0), None).unwrap(),
            Selection::All
        );
        assert_eq!(
            Selection::from_flags(false, None, None).unwrap(),
            Selection::All
        );
    }

    #[test]
    fn negative_latest_n_uses_the_absolute_value() {
        assert_eq!(
            Selection::from_flags(false, Some(-3), None).unwrap(),
            Selection::LatestN(3)
        );
    }

    #[test]
    fn list_takes_precedence_over_all_and_latest_n() {
        let sel = Selection::from_flags(true, Some(7), Some("1098,1040")).unwrap();
        let catalog = refs(&[1040, 1098, 1101]);
        assert_eq!(ids(&apply(&catalog, &sel)), vec![1040, 1098]);
    }

    #[test]
    fn range_selects_exactly_the_ids_present_in_the_catalog() {
        let sel = Selection::from_flags(false, None, Some("10-12")).unwrap();
        let catalog = refs(&[9, 10, 11, 12, 13]);
        assert_eq!(ids(&apply(&catalog, &sel)), vec![10, 11, 12]);
    }

    #[test]
    fn list_preserves_catalog_order() {
        let sel = Selection::List(parse_id_list("20,3,8").unwrap());
        let catalog = refs(&[5, 12, 3, 20, 8]);
        assert_eq!(ids(&apply(&catalog, &sel)), vec![3, 20, 8]);
    }

    #[test]
    fn backwards_ranges_and_junk_are_rejected() {
        assert!(parse_id_list("12-10").is_err());
        assert!(parse_id_list("abc").is_err());
        assert!(parse_id_list("").is_err());
    }
}
