//! Parsed mergeinfo records and their textual `svn:mergeinfo` form.
//!
//! A record maps a source fspath to the ordered revision ranges merged from
//! it. Ranges follow Subversion's convention: `start` is exclusive and `end`
//! inclusive, so the text `5-7` is `MergeRange { start: 4, end: 7 }` and a
//! single revision `9` is `MergeRange { start: 8, end: 9 }`. A trailing `*`
//! marks a range as non-inheritable.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use crate::SvnError;

/// A `path -> mergeinfo` mapping as returned by
/// [`crate::RepositorySession::get_mergeinfo`].
pub type MergeInfoCatalog = BTreeMap<String, Mergeinfo>;

/// A contiguous range of merged revisions.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MergeRange {
    /// Revision before the first merged revision (exclusive).
    pub start: u64,
    /// Last merged revision (inclusive).
    pub end: u64,
    /// Whether the range applies to descendants of the path too.
    pub inheritable: bool,
}

impl MergeRange {
    /// Returns the merged revision numbers up to `youngest`, ascending.
    pub fn revisions_through(&self, youngest: u64) -> std::ops::RangeInclusive<u64> {
        self.start.saturating_add(1)..=self.end.min(youngest)
    }
}

impl Display for MergeRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.end == self.start + 1 {
            write!(f, "{}", self.end)?;
        } else {
            write!(f, "{}-{}", self.start + 1, self.end)?;
        }
        if !self.inheritable {
            f.write_str("*")?;
        }
        Ok(())
    }
}

/// Mergeinfo for one path: `source fspath -> ranges`, ranges sorted and coalesced.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mergeinfo(pub BTreeMap<String, Vec<MergeRange>>);

impl Mergeinfo {
    /// Parses the text of an `svn:mergeinfo` property.
    ///
    /// An empty (or whitespace-only) value yields an empty record, which means
    /// "no merges recorded" rather than "no mergeinfo".
    pub fn parse(text: &str) -> Result<Self, SvnError> {
        let mut out = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (source, ranges) = line.rsplit_once(':').ok_or_else(|| {
                SvnError::Protocol(format!("mergeinfo line missing ':': {line}"))
            })?;
            if !source.starts_with('/') {
                return Err(SvnError::Protocol(format!(
                    "mergeinfo source is not an fspath: {source}"
                )));
            }
            let mut parsed = Vec::new();
            for range in ranges.split(',') {
                parsed.push(parse_range(range.trim())?);
            }
            let entry: &mut Vec<MergeRange> = out.entry(source.to_string()).or_default();
            entry.extend(parsed);
        }
        for ranges in out.values_mut() {
            coalesce(ranges);
        }
        Ok(Self(out))
    }

    /// Returns `true` if no source has any ranges.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|ranges| ranges.is_empty())
    }

    /// Returns the ranges recorded for `source`.
    pub fn get(&self, source: &str) -> Option<&[MergeRange]> {
        self.0.get(source).map(Vec::as_slice)
    }

    /// Returns a copy with only inheritable ranges, as seen by a descendant
    /// at `suffix` below the path that carries this record.
    pub fn inherited_by(&self, suffix: &str) -> Self {
        let mut out = BTreeMap::new();
        for (source, ranges) in &self.0 {
            let ranges: Vec<MergeRange> = ranges.iter().copied().filter(|r| r.inheritable).collect();
            if ranges.is_empty() {
                continue;
            }
            let source = if suffix.is_empty() {
                source.clone()
            } else {
                format!("{}/{suffix}", source.trim_end_matches('/'))
            };
            out.insert(source, ranges);
        }
        Self(out)
    }

    /// Returns the merged revision numbers across all sources, ignoring
    /// revisions younger than `youngest`.
    pub fn revisions_through(&self, youngest: u64) -> BTreeSet<u64> {
        self.0
            .values()
            .flat_map(|ranges| ranges.iter().flat_map(|range| range.revisions_through(youngest)))
            .collect()
    }
}

impl Display for Mergeinfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (source, ranges) in &self.0 {
            if ranges.is_empty() {
                continue;
            }
            if !first {
                f.write_str("\n")?;
            }
            first = false;
            write!(f, "{source}:")?;
            for (idx, range) in ranges.iter().enumerate() {
                if idx > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{range}")?;
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for Mergeinfo {
    type Err = SvnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_rev(text: &str, range: &str) -> Result<u64, SvnError> {
    text.parse::<u64>()
        .map_err(|_| SvnError::Protocol(format!("invalid mergeinfo range: {range}")))
}

fn parse_range(range: &str) -> Result<MergeRange, SvnError> {
    let (body, inheritable) = match range.strip_suffix('*') {
        Some(body) => (body, false),
        None => (range, true),
    };
    let (first, last) = match body.split_once('-') {
        Some((first, last)) => (parse_rev(first, range)?, parse_rev(last, range)?),
        None => {
            let rev = parse_rev(body, range)?;
            (rev, rev)
        }
    };
    if first == 0 || last < first {
        return Err(SvnError::Protocol(format!("invalid mergeinfo range: {range}")));
    }
    Ok(MergeRange {
        start: first - 1,
        end: last,
        inheritable,
    })
}

fn coalesce(ranges: &mut Vec<MergeRange>) {
    ranges.sort();
    let mut out: Vec<MergeRange> = Vec::with_capacity(ranges.len());
    for range in ranges.drain(..) {
        if let Some(last) = out.last_mut()
            && last.inheritable == range.inheritable
            && range.start <= last.end
        {
            last.end = last.end.max(range.end);
            continue;
        }
        out.push(range);
    }
    *ranges = out;
}
