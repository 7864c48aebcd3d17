//! History traversal for `log` requests.

use std::collections::BTreeSet;

use crate::path::{join, skip_ancestor, to_fspath};
use crate::{ChangedPath, LogEntry, LogOptions, PropertyList, SvnError};

use super::{Node, RepoState, not_found};

/// A target being followed back through history.
struct Track {
    path: String,
    /// The path names the node only in revisions at or below this one.
    below: u64,
}

/// Merged revisions a revision recorded on the log targets.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct MergedRevisions {
    /// Revisions added to mergeinfo, youngest first.
    pub(super) added: Vec<u64>,
    /// Revisions removed from mergeinfo, youngest first.
    pub(super) removed: Vec<u64>,
}

impl MergedRevisions {
    pub(super) fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

fn merged_set(node: Option<&Node>, youngest: u64) -> BTreeSet<u64> {
    node.and_then(|node| node.mergeinfo().ok().flatten())
        .map(|info| info.revisions_through(youngest))
        .unwrap_or_default()
}

impl RepoState {
    /// Returns the revisions in `start..=end` that touch any target, in the
    /// order the range asks for, capped at `limit` (`0` is unlimited).
    pub(super) fn log_revisions(
        &self,
        targets: &[String],
        start: u64,
        end: u64,
        strict_node: bool,
        limit: u64,
    ) -> Result<Vec<u64>, SvnError> {
        let (youngest, oldest) = if start >= end { (start, end) } else { (end, start) };
        for target in targets {
            if self.node(youngest, target).is_none() {
                return Err(not_found(youngest, target));
            }
        }

        let mut tracks: Vec<Option<Track>> = targets
            .iter()
            .map(|path| {
                Some(Track {
                    path: path.clone(),
                    below: youngest,
                })
            })
            .collect();
        let mut revs = Vec::new();
        for rev in (oldest..=youngest).rev() {
            let changes = &self.revision(rev).changes;
            let mut hit = false;
            for slot in &mut tracks {
                let Some(track) = slot else {
                    continue;
                };
                if rev > track.below {
                    continue;
                }
                if rev == 0 {
                    hit |= track.path.is_empty();
                    continue;
                }
                let mut touched = false;
                let mut origin = None;
                for (changed, change) in changes {
                    if skip_ancestor(&track.path, changed).is_some() {
                        touched = true;
                    }
                    if let Some(rest) = skip_ancestor(changed, &track.path)
                        && matches!(change.action, 'A' | 'R')
                    {
                        touched = true;
                        origin = Some(
                            change
                                .copy_from
                                .as_ref()
                                .map(|(from, from_rev)| (join(from, rest), *from_rev)),
                        );
                    }
                }
                hit |= touched;
                if let Some(origin) = origin {
                    *slot = match origin {
                        Some((path, below)) if !strict_node => Some(Track { path, below }),
                        _ => None,
                    };
                }
            }
            if hit {
                revs.push(rev);
            }
        }

        if start < end {
            revs.reverse();
        }
        if limit > 0 {
            revs.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(revs)
    }

    /// Builds the entry for `rev` with the revision properties and changed
    /// paths `options` asks for.
    pub(super) fn log_entry(&self, rev: u64, options: &LogOptions) -> LogEntry {
        let revision = self.revision(rev);
        let props: PropertyList = revision
            .props
            .iter()
            .filter(|(name, _)| options.revprops.wants(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let mut entry = LogEntry::new(rev).with_rev_props(props);
        if options.changed_paths {
            entry.changed_paths = revision
                .changes
                .iter()
                .map(|(path, change)| ChangedPath {
                    action: change.action.to_string(),
                    path: to_fspath(path),
                    copy_from_path: change.copy_from.as_ref().map(|(from, _)| to_fspath(from)),
                    copy_from_rev: change.copy_from.as_ref().map(|(_, rev)| *rev),
                    node_kind: Some(change.kind),
                    text_mods: Some(change.text_mod),
                    prop_mods: Some(change.prop_mod),
                })
                .collect();
        }
        entry
    }

    /// Returns the revisions `rev` merged into (or reverse-merged out of)
    /// the targets or their descendants.
    pub(super) fn merged_revisions(&self, rev: u64, targets: &[String]) -> MergedRevisions {
        if rev == 0 {
            return MergedRevisions::default();
        }
        let head = self.head();
        let revision = self.revision(rev);
        let previous = self.revision(rev - 1);
        let mut added = BTreeSet::new();
        let mut removed = BTreeSet::new();
        for (changed, change) in &revision.changes {
            if !change.prop_mod {
                continue;
            }
            let related = targets.iter().any(|target| {
                skip_ancestor(target, changed).is_some() || skip_ancestor(changed, target).is_some()
            });
            if !related {
                continue;
            }
            let now = merged_set(revision.tree.get(changed), head);
            let before = merged_set(previous.tree.get(changed), head);
            added.extend(now.difference(&before).copied());
            removed.extend(before.difference(&now).copied());
        }
        let keep = |r: &u64| *r != rev;
        MergedRevisions {
            added: added.into_iter().rev().filter(keep).collect(),
            removed: removed.into_iter().rev().filter(keep).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::super::MemoryRepository;
    use super::*;

    /// r1 trunk + file, r2 edit, r3 branch copy, r4 branch edit, r5 merge back.
    fn history() -> MemoryRepository {
        let repo = MemoryRepository::new("mem://host/repo").unwrap();
        repo.commit("alice", "layout", |txn| {
            txn.mkdir("trunk")?;
            txn.mkdir("branches")?;
            txn.put_file("trunk/a.txt", b"1")
        })
        .unwrap();
        repo.commit("alice", "edit", |txn| txn.put_file("trunk/a.txt", b"2"))
            .unwrap();
        repo.commit("bob", "branch", |txn| txn.copy("trunk", 2, "branches/b"))
            .unwrap();
        repo.commit("bob", "fix", |txn| txn.put_file("branches/b/a.txt", b"3"))
            .unwrap();
        repo.commit("alice", "merge", |txn| {
            txn.put_file("trunk/a.txt", b"3")?;
            txn.set_prop("trunk", "svn:mergeinfo", Some(b"/branches/b:4"))
        })
        .unwrap();
        repo
    }

    fn targets(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn descending_walk_follows_copies() {
        let repo = history();
        let state = repo.state();
        let revs = state
            .log_revisions(&targets(&["branches/b"]), 5, 0, false, 0)
            .unwrap();
        assert_eq!(revs, vec![4, 3, 2, 1]);
    }

    #[test]
    fn strict_walk_stops_at_the_copy() {
        let repo = history();
        let state = repo.state();
        let revs = state
            .log_revisions(&targets(&["branches/b"]), 5, 0, true, 0)
            .unwrap();
        assert_eq!(revs, vec![4, 3]);
    }

    #[test]
    fn ascending_walk_reverses_then_limits() {
        let repo = history();
        let state = repo.state();
        let revs = state
            .log_revisions(&targets(&["trunk"]), 0, 5, false, 2)
            .unwrap();
        assert_eq!(revs, vec![1, 2]);
        let root = state.log_revisions(&targets(&[""]), 5, 0, false, 0).unwrap();
        assert_eq!(root, vec![5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn missing_target_is_not_found() {
        let repo = history();
        let state = repo.state();
        assert!(state
            .log_revisions(&targets(&["tags"]), 5, 0, false, 0)
            .is_err());
    }

    #[test]
    fn merged_revisions_come_from_mergeinfo_changes() {
        let repo = history();
        let state = repo.state();
        let merged = state.merged_revisions(5, &targets(&["trunk"]));
        assert_eq!(merged.added, vec![4]);
        assert!(merged.removed.is_empty());
        assert!(state.merged_revisions(4, &targets(&["trunk"])).is_empty());
    }

    #[test]
    fn merged_revisions_ignore_ranges_past_head() {
        let repo = history();
        repo.commit("alice", "record a wide merge", |txn| {
            txn.set_prop("trunk", "svn:mergeinfo", Some(b"/branches/b:1-18446744073709551615"))
        })
        .unwrap();
        let state = repo.state();
        let merged = state.merged_revisions(6, &targets(&["trunk"]));
        assert_eq!(merged.added, vec![5, 3, 2, 1]);
        assert!(merged.removed.is_empty());
    }

    #[test]
    fn entries_carry_requested_revprops_and_changes() {
        let repo = history();
        let state = repo.state();
        let options = LogOptions::default()
            .with_changed_paths()
            .with_revprops(["svn:author"]);
        let entry = state.log_entry(3, &options);
        assert_eq!(entry.author.as_deref(), Some("bob"));
        assert_eq!(entry.message, None);
        assert_eq!(entry.changed_paths.len(), 1);
        let change = &entry.changed_paths[0];
        assert_eq!(change.action, "A");
        assert_eq!(change.path, "/branches/b");
        assert_eq!(change.copy_from_path.as_deref(), Some("/trunk"));
        assert_eq!(change.copy_from_rev, Some(2));
    }
}
