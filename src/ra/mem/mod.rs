//! An in-process repository served through the transport traits.
//!
//! [`MemoryRepository`] keeps every revision as a full tree snapshot behind
//! an `Arc<Mutex<..>>`, so clones share one repository. Register a
//! [`MemoryConnector`] for a URL scheme (or pass it to
//! [`crate::SessionOpener::with_connector`]) to open sessions against it.
//!
//! ```rust,no_run
//! use svn_ra::ra::mem::MemoryRepository;
//!
//! # fn main() -> svn_ra::Result<()> {
//! let repo = MemoryRepository::new("mem://example/repo")?;
//! repo.commit("alice", "initial layout", |txn| {
//!     txn.mkdir("trunk")?;
//!     txn.put_file("trunk/README", b"hello\n")?;
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

mod log;
mod transport;

pub use transport::{MemoryConnector, MemoryTransport};

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt::Formatter;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::path::{join, skip_ancestor, split, to_fspath, validate_rel_dir_path, validate_rel_path};
use crate::url::canonicalize_url;
use crate::{
    Capability, Credentials, Depth, DirentFields, InheritedProps, LockDesc, MergeInfoCatalog,
    MergeInfoInheritance, Mergeinfo, NodeKind, PropertyList, ServerError, SvnError,
};

use super::Dirent;

const SVN_ERR_BAD_PROPERTY_VALUE: u64 = 125005;
const SVN_ERR_FS_NO_SUCH_REVISION: u64 = 160006;
const SVN_ERR_FS_NOT_FOUND: u64 = 160013;
const SVN_ERR_FS_NOT_DIRECTORY: u64 = 160016;
const SVN_ERR_FS_NOT_FILE: u64 = 160017;
const SVN_ERR_FS_ALREADY_EXISTS: u64 = 160020;
const SVN_ERR_FS_PATH_ALREADY_LOCKED: u64 = 160035;
const SVN_ERR_REPOS_DISABLED_FEATURE: u64 = 165006;
const SVN_ERR_RA_ILLEGAL_URL: u64 = 170000;
const SVN_ERR_INCORRECT_PARAMS: u64 = 200004;
const SVN_ERR_UNKNOWN_CAPABILITY: u64 = 200026;

const MERGEINFO_PROP: &str = "svn:mergeinfo";

const DEFAULT_CAPABILITIES: [Capability; 5] = [
    Capability::Depth,
    Capability::MergeInfo,
    Capability::LogRevProps,
    Capability::AtomicRevProps,
    Capability::InheritedProps,
];

/// Exchanges remembered by [`MemoryRepository::operations`].
pub const OPERATION_LOG_LIMIT: usize = 1024;

fn fs_error(code: u64, message: impl Into<String>) -> SvnError {
    SvnError::Session(ServerError::new(code, message))
}

fn not_found(rev: u64, path: &str) -> SvnError {
    fs_error(
        SVN_ERR_FS_NOT_FOUND,
        format!("path '{}' not found in revision {rev}", to_fspath(path)),
    )
}

fn svn_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[derive(Clone, Debug)]
struct Node {
    kind: NodeKind,
    contents: Arc<[u8]>,
    props: PropertyList,
    created_rev: u64,
}

impl Node {
    fn dir(created_rev: u64) -> Self {
        Self {
            kind: NodeKind::Dir,
            contents: Arc::from(Vec::new()),
            props: PropertyList::new(),
            created_rev,
        }
    }

    fn mergeinfo(&self) -> Result<Option<Mergeinfo>, SvnError> {
        self.props
            .get(MERGEINFO_PROP)
            .map(|value| Mergeinfo::parse(&String::from_utf8_lossy(value)))
            .transpose()
    }
}

type Tree = BTreeMap<String, Node>;

#[derive(Clone, Debug)]
struct Change {
    action: char,
    kind: NodeKind,
    copy_from: Option<(String, u64)>,
    text_mod: bool,
    prop_mod: bool,
}

#[derive(Debug)]
struct Revision {
    tree: Tree,
    props: PropertyList,
    date: DateTime<Utc>,
    changes: BTreeMap<String, Change>,
}

struct RepoState {
    root_url: String,
    uuid: String,
    revisions: Vec<Revision>,
    locks: BTreeMap<String, LockDesc>,
    redirects: HashMap<String, String>,
    credentials: Option<Credentials>,
    capabilities: BTreeSet<String>,
    failures: HashMap<String, ServerError>,
    revprop_changes: bool,
    operations: VecDeque<String>,
}

/// A shared in-memory repository.
#[derive(Clone)]
pub struct MemoryRepository {
    inner: Arc<Mutex<RepoState>>,
}

impl std::fmt::Debug for MemoryRepository {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MemoryRepository")
            .field("root_url", &state.root_url)
            .field("uuid", &state.uuid)
            .field("youngest", &state.head())
            .finish()
    }
}

impl MemoryRepository {
    /// Creates a repository rooted at `root_url` holding only revision 0.
    pub fn new(root_url: &str) -> Result<Self, SvnError> {
        let root_url = canonicalize_url(root_url)?;
        let now = Utc::now();
        let mut tree = Tree::new();
        tree.insert(String::new(), Node::dir(0));
        let mut props = PropertyList::new();
        props.insert("svn:date".to_string(), svn_date(now).into_bytes());
        let state = RepoState {
            root_url,
            uuid: uuid::Uuid::new_v4().to_string(),
            revisions: vec![Revision {
                tree,
                props,
                date: now,
                changes: BTreeMap::new(),
            }],
            locks: BTreeMap::new(),
            redirects: HashMap::new(),
            credentials: None,
            capabilities: DEFAULT_CAPABILITIES
                .iter()
                .map(|cap| cap.as_str().to_string())
                .collect(),
            failures: HashMap::new(),
            revprop_changes: true,
            operations: VecDeque::new(),
        };
        Ok(Self {
            inner: Arc::new(Mutex::new(state)),
        })
    }

    /// Replaces the generated repository UUID.
    #[must_use]
    pub fn with_uuid(self, uuid: impl Into<String>) -> Self {
        self.state().uuid = uuid.into();
        self
    }

    fn state(&self) -> MutexGuard<'_, RepoState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one transport exchange against the state.
    ///
    /// Records `op`, consumes an injected failure for it, and attaches `op`
    /// as context to session errors that have none.
    fn exchange<R>(
        &self,
        op: &str,
        f: impl FnOnce(&mut RepoState) -> Result<R, SvnError>,
    ) -> Result<R, SvnError> {
        let mut state = self.state();
        if state.operations.len() == OPERATION_LOG_LIMIT {
            state.operations.pop_front();
        }
        state.operations.push_back(op.to_string());
        let result = match state.failures.remove(op) {
            Some(err) => {
                debug!(op, "injected failure");
                Err(SvnError::Session(err))
            }
            None => f(&mut *state),
        };
        result.map_err(|err| match err {
            SvnError::Session(err) if err.context.is_none() => {
                SvnError::Session(err.with_context(op))
            }
            other => other,
        })
    }

    /// Returns the canonical root URL.
    pub fn root_url(&self) -> String {
        self.state().root_url.clone()
    }

    /// Returns the repository UUID.
    pub fn uuid(&self) -> String {
        self.state().uuid.clone()
    }

    /// Returns the youngest revision.
    pub fn youngest(&self) -> u64 {
        self.state().head()
    }

    /// Returns a connector that opens sessions on this repository.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector::new(self.clone())
    }

    /// Commits a new revision dated now. See [`MemoryRepository::commit_at`].
    pub fn commit<F>(&self, author: &str, message: &str, build: F) -> Result<u64, SvnError>
    where
        F: FnOnce(&mut TxnBuilder<'_>) -> Result<(), SvnError>,
    {
        self.commit_at(Utc::now(), author, message, build)
    }

    /// Commits a new revision with an explicit date.
    ///
    /// `build` runs with the repository locked and must not call back into
    /// this repository. If it fails, nothing is committed.
    pub fn commit_at<F>(
        &self,
        date: DateTime<Utc>,
        author: &str,
        message: &str,
        build: F,
    ) -> Result<u64, SvnError>
    where
        F: FnOnce(&mut TxnBuilder<'_>) -> Result<(), SvnError>,
    {
        let mut state = self.state();
        let rev = state.head() + 1;
        let base = state.revisions[state.revisions.len() - 1].tree.clone();
        let mut txn = TxnBuilder {
            rev,
            tree: base,
            history: &state.revisions,
            changes: BTreeMap::new(),
        };
        build(&mut txn)?;
        let TxnBuilder {
            mut tree, changes, ..
        } = txn;

        for path in changes.keys() {
            let mut current = path.as_str();
            while !current.is_empty() {
                current = split(current).0;
                if let Some(node) = tree.get_mut(current) {
                    node.created_rev = rev;
                }
            }
        }

        let mut props = PropertyList::new();
        props.insert("svn:author".to_string(), author.as_bytes().to_vec());
        props.insert("svn:date".to_string(), svn_date(date).into_bytes());
        props.insert("svn:log".to_string(), message.as_bytes().to_vec());

        state.locks.retain(|path, _| tree.contains_key(path));
        state.revisions.push(Revision {
            tree,
            props,
            date,
            changes,
        });
        debug!(rev, author, "committed revision");
        Ok(rev)
    }

    /// Locks the file at `path` (repository-relative) in HEAD.
    pub fn lock(&self, path: &str, owner: &str, comment: Option<&str>) -> Result<LockDesc, SvnError> {
        let path = validate_rel_path(path)?;
        let mut state = self.state();
        let head = state.head();
        match state.node(head, &path).map(|node| node.kind) {
            Some(NodeKind::File) => {}
            Some(_) => {
                return Err(fs_error(
                    SVN_ERR_FS_NOT_FILE,
                    format!("'{}' is not a file", to_fspath(&path)),
                ));
            }
            None => return Err(not_found(head, &path)),
        }
        if state.locks.contains_key(&path) {
            return Err(fs_error(
                SVN_ERR_FS_PATH_ALREADY_LOCKED,
                format!("path '{}' is already locked", to_fspath(&path)),
            ));
        }
        let lock = LockDesc {
            path: path.clone(),
            token: format!("opaquelocktoken:{}", uuid::Uuid::new_v4()),
            owner: owner.to_string(),
            comment: comment.map(str::to_string),
            created: svn_date(Utc::now()),
            expires: None,
        };
        state.locks.insert(path, lock.clone());
        Ok(lock)
    }

    /// Makes opening exactly `from` answer with a redirect to `to`.
    pub fn redirect(&self, from: &str, to: &str) {
        self.state()
            .redirects
            .insert(from.to_string(), to.to_string());
    }

    /// Requires these credentials on open.
    pub fn require_credentials(&self, username: &str, password: &str) {
        self.state().credentials = Some(Credentials::new(username, password));
    }

    /// Enables or disables an announced capability.
    pub fn set_capability(&self, name: &str, enabled: bool) {
        let mut state = self.state();
        if enabled {
            state.capabilities.insert(name.to_string());
        } else {
            state.capabilities.remove(name);
        }
    }

    /// Allows or refuses revision property changes (allowed by default).
    pub fn set_revprop_changes(&self, allowed: bool) {
        self.state().revprop_changes = allowed;
    }

    /// Makes the next call of `op` fail with `err`.
    ///
    /// `op` is the exchange name recorded by [`MemoryRepository::operations`].
    pub fn fail_next(&self, op: &str, err: ServerError) {
        self.state().failures.insert(op.to_string(), err);
    }

    /// Returns the most recent exchange names served, oldest first.
    ///
    /// Only the last [`OPERATION_LOG_LIMIT`] exchanges are kept.
    pub fn operations(&self) -> Vec<String> {
        self.state().operations.iter().cloned().collect()
    }
}

impl RepoState {
    fn head(&self) -> u64 {
        self.revisions.len() as u64 - 1
    }

    fn realm(&self) -> String {
        format!("<{}> {}", self.root_url, self.uuid)
    }

    fn resolve(&self, rev: Option<u64>) -> Result<u64, SvnError> {
        match rev {
            None => Ok(self.head()),
            Some(rev) if rev <= self.head() => Ok(rev),
            Some(rev) => Err(fs_error(
                SVN_ERR_FS_NO_SUCH_REVISION,
                format!("no such revision {rev}"),
            )),
        }
    }

    fn revision(&self, rev: u64) -> &Revision {
        &self.revisions[rev as usize]
    }

    fn node(&self, rev: u64, path: &str) -> Option<&Node> {
        self.revision(rev).tree.get(path)
    }

    fn require_node(&self, rev: u64, path: &str) -> Result<&Node, SvnError> {
        self.node(rev, path).ok_or_else(|| not_found(rev, path))
    }

    fn dirent(&self, node: &Node, fields: DirentFields) -> Dirent {
        let origin = &self.revision(node.created_rev).props;
        let text = |name: &str| {
            origin
                .get(name)
                .map(|value| String::from_utf8_lossy(value).into_owned())
        };
        Dirent {
            kind: if fields.contains(DirentFields::KIND) {
                node.kind
            } else {
                NodeKind::Unknown
            },
            size: fields.contains(DirentFields::SIZE).then(|| match node.kind {
                NodeKind::File => node.contents.len() as u64,
                _ => 0,
            }),
            has_props: fields
                .contains(DirentFields::HAS_PROPS)
                .then(|| !node.props.is_empty()),
            created_rev: fields
                .contains(DirentFields::CREATED_REV)
                .then_some(node.created_rev),
            created_date: if fields.contains(DirentFields::TIME) {
                text("svn:date")
            } else {
                None
            },
            last_author: if fields.contains(DirentFields::LAST_AUTHOR) {
                text("svn:author")
            } else {
                None
            },
        }
    }

    fn dated_revision(&self, date: DateTime<Utc>) -> u64 {
        self.revisions
            .iter()
            .rposition(|revision| revision.date <= date)
            .map_or(0, |rev| rev as u64)
    }

    fn change_rev_prop(
        &mut self,
        rev: u64,
        name: &str,
        expected: &crate::ExpectedValue,
        value: Option<&[u8]>,
    ) -> Result<(), SvnError> {
        let rev = self.resolve(Some(rev))?;
        if !self.revprop_changes {
            return Err(fs_error(
                SVN_ERR_REPOS_DISABLED_FEATURE,
                "repository has not been enabled to accept revision propchanges",
            ));
        }
        let props = &mut self.revisions[rev as usize].props;
        if !expected.matches(props.get(name).map(Vec::as_slice)) {
            return Err(SvnError::PreconditionFailed(format!(
                "revision property '{name}' in r{rev} has an unexpected value"
            )));
        }
        match value {
            Some(value) => props.insert(name.to_string(), value.to_vec()),
            None => props.remove(name),
        };
        Ok(())
    }

    fn capability(&self, name: &str) -> Result<bool, SvnError> {
        if Capability::from_name(name).is_none() {
            return Err(fs_error(
                SVN_ERR_UNKNOWN_CAPABILITY,
                format!("don't know anything about capability '{name}'"),
            ));
        }
        Ok(self.capabilities.contains(name))
    }

    fn mergeinfo_catalog(
        &self,
        session: &str,
        paths: &[String],
        rev: u64,
        inherit: MergeInfoInheritance,
        include_descendants: bool,
    ) -> Result<Option<MergeInfoCatalog>, SvnError> {
        let tree = &self.revision(rev).tree;
        let mut catalog = MergeInfoCatalog::new();
        for path in paths {
            let full = join(session, path);
            let node = self.require_node(rev, &full)?;
            let found = match inherit {
                MergeInfoInheritance::Explicit => node.mergeinfo()?,
                MergeInfoInheritance::Inherited => match node.mergeinfo()? {
                    Some(own) => Some(own),
                    None => nearest_ancestor_mergeinfo(tree, &full)?,
                },
                MergeInfoInheritance::NearestAncestor => nearest_ancestor_mergeinfo(tree, &full)?,
            };
            if let Some(info) = found {
                catalog.insert(path.clone(), info);
            }
            if include_descendants {
                for (key, child) in tree {
                    let Some(rest) = skip_ancestor(&full, key) else {
                        continue;
                    };
                    if rest.is_empty() {
                        continue;
                    }
                    if let Some(info) = child.mergeinfo()? {
                        catalog.insert(join(path, rest), info);
                    }
                }
            }
        }
        Ok(if catalog.is_empty() {
            None
        } else {
            Some(catalog)
        })
    }

    fn locks_under(&self, path: &str, depth: Depth) -> Vec<LockDesc> {
        let head = self.head();
        self.locks
            .iter()
            .filter(|(lock_path, _)| {
                let Some(rest) = skip_ancestor(path, lock_path) else {
                    return false;
                };
                match depth {
                    Depth::Empty => rest.is_empty(),
                    Depth::Files => {
                        rest.is_empty()
                            || (!rest.contains('/')
                                && self.node(head, lock_path).map(|n| n.kind)
                                    == Some(NodeKind::File))
                    }
                    Depth::Immediates => !rest.contains('/'),
                    Depth::Infinity => true,
                }
            })
            .map(|(_, lock)| lock.clone())
            .collect()
    }

    fn deleted_revision(&self, path: &str, peg_rev: u64, end_rev: u64) -> Result<Option<u64>, SvnError> {
        let peg_rev = self.resolve(Some(peg_rev))?;
        let end_rev = self.resolve(Some(end_rev))?;
        if end_rev <= peg_rev {
            return Err(fs_error(
                SVN_ERR_INCORRECT_PARAMS,
                format!("end revision {end_rev} must be younger than peg revision {peg_rev}"),
            ));
        }
        self.require_node(peg_rev, path)?;
        for rev in peg_rev + 1..=end_rev {
            let replaced = self.revision(rev).changes.iter().any(|(changed, change)| {
                change.action == 'R' && skip_ancestor(changed, path).is_some()
            });
            if replaced || self.node(rev, path).is_none() {
                return Ok(Some(rev));
            }
        }
        Ok(None)
    }

    fn inherited_props(&self, path: &str, rev: u64) -> Result<Vec<InheritedProps>, SvnError> {
        self.require_node(rev, path)?;
        let mut ancestors = Vec::new();
        let mut current = path;
        while !current.is_empty() {
            current = split(current).0;
            ancestors.push(current);
        }
        let tree = &self.revision(rev).tree;
        Ok(ancestors
            .into_iter()
            .rev()
            .filter_map(|ancestor| {
                let node = tree.get(ancestor)?;
                (!node.props.is_empty()).then(|| InheritedProps {
                    path: ancestor.to_string(),
                    props: node.props.clone(),
                })
            })
            .collect())
    }
}

fn nearest_ancestor_mergeinfo(tree: &Tree, path: &str) -> Result<Option<Mergeinfo>, SvnError> {
    let mut current = path;
    while !current.is_empty() {
        current = split(current).0;
        let Some(node) = tree.get(current) else {
            continue;
        };
        if let Some(info) = node.mergeinfo()? {
            let suffix = skip_ancestor(current, path).unwrap_or_default();
            let inherited = info.inherited_by(suffix);
            return Ok((!inherited.is_empty()).then_some(inherited));
        }
    }
    Ok(None)
}

/// Collects the changes of one commit.
///
/// Paths are repository-relative. Every method checks its preconditions
/// against the transaction tree as built so far.
pub struct TxnBuilder<'a> {
    rev: u64,
    tree: Tree,
    history: &'a [Revision],
    changes: BTreeMap<String, Change>,
}

impl std::fmt::Debug for TxnBuilder<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnBuilder")
            .field("rev", &self.rev)
            .field("changes", &self.changes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TxnBuilder<'_> {
    /// Returns the revision this transaction will become.
    pub fn revision(&self) -> u64 {
        self.rev
    }

    fn require_parent_dir(&self, path: &str) -> Result<(), SvnError> {
        let parent = split(path).0;
        match self.tree.get(parent).map(|node| node.kind) {
            Some(NodeKind::Dir) => Ok(()),
            Some(_) => Err(fs_error(
                SVN_ERR_FS_NOT_DIRECTORY,
                format!("'{}' is not a directory", to_fspath(parent)),
            )),
            None => Err(not_found(self.rev, parent)),
        }
    }

    fn require_absent(&self, path: &str) -> Result<(), SvnError> {
        if self.tree.contains_key(path) {
            return Err(fs_error(
                SVN_ERR_FS_ALREADY_EXISTS,
                format!("path '{}' already exists", to_fspath(path)),
            ));
        }
        Ok(())
    }

    fn record(&mut self, path: &str, mut change: Change) {
        match self.changes.get_mut(path) {
            Some(existing) if change.action == 'A' && existing.action == 'D' => {
                change.action = 'R';
                *existing = change;
            }
            Some(existing) => {
                existing.text_mod |= change.text_mod;
                existing.prop_mod |= change.prop_mod;
            }
            None => {
                self.changes.insert(path.to_string(), change);
            }
        }
    }

    /// Adds a directory.
    pub fn mkdir(&mut self, path: &str) -> Result<(), SvnError> {
        let path = validate_rel_path(path)?;
        self.require_absent(&path)?;
        self.require_parent_dir(&path)?;
        self.tree.insert(path.clone(), Node::dir(self.rev));
        self.record(
            &path,
            Change {
                action: 'A',
                kind: NodeKind::Dir,
                copy_from: None,
                text_mod: false,
                prop_mod: false,
            },
        );
        Ok(())
    }

    /// Adds a file or replaces the contents of an existing one.
    pub fn put_file(&mut self, path: &str, contents: impl AsRef<[u8]>) -> Result<(), SvnError> {
        let path = validate_rel_path(path)?;
        let contents: Arc<[u8]> = Arc::from(contents.as_ref());
        let rev = self.rev;
        let action = match self.tree.get_mut(&path) {
            Some(node) if node.kind == NodeKind::File => {
                node.contents = contents;
                node.created_rev = rev;
                'M'
            }
            Some(_) => {
                return Err(fs_error(
                    SVN_ERR_FS_NOT_FILE,
                    format!("'{}' is not a file", to_fspath(&path)),
                ));
            }
            None => {
                self.require_parent_dir(&path)?;
                self.tree.insert(
                    path.clone(),
                    Node {
                        kind: NodeKind::File,
                        contents,
                        props: PropertyList::new(),
                        created_rev: rev,
                    },
                );
                'A'
            }
        };
        self.record(
            &path,
            Change {
                action,
                kind: NodeKind::File,
                copy_from: None,
                text_mod: true,
                prop_mod: false,
            },
        );
        Ok(())
    }

    /// Deletes a node and everything below it.
    pub fn delete(&mut self, path: &str) -> Result<(), SvnError> {
        let path = validate_rel_path(path)?;
        let kind = self
            .tree
            .get(&path)
            .map(|node| node.kind)
            .ok_or_else(|| not_found(self.rev, &path))?;
        self.tree
            .retain(|key, _| skip_ancestor(&path, key).is_none());
        self.changes
            .retain(|key, _| skip_ancestor(&path, key).is_none_or(str::is_empty));
        match self.changes.get(&path).map(|change| change.action) {
            Some('A') => {
                self.changes.remove(&path);
            }
            _ => {
                self.changes.insert(
                    path,
                    Change {
                        action: 'D',
                        kind,
                        copy_from: None,
                        text_mod: false,
                        prop_mod: false,
                    },
                );
            }
        }
        Ok(())
    }

    /// Copies `from_path` as it was in `from_rev` to `to_path`.
    pub fn copy(&mut self, from_path: &str, from_rev: u64, to_path: &str) -> Result<(), SvnError> {
        let from_path = validate_rel_dir_path(from_path)?;
        let to_path = validate_rel_path(to_path)?;
        let source = self
            .history
            .get(from_rev as usize)
            .ok_or_else(|| {
                fs_error(
                    SVN_ERR_FS_NO_SUCH_REVISION,
                    format!("no such revision {from_rev}"),
                )
            })?;
        let kind = source
            .tree
            .get(&from_path)
            .map(|node| node.kind)
            .ok_or_else(|| not_found(from_rev, &from_path))?;
        self.require_absent(&to_path)?;
        self.require_parent_dir(&to_path)?;
        if skip_ancestor(&from_path, &to_path).is_some() {
            return Err(fs_error(
                SVN_ERR_INCORRECT_PARAMS,
                format!("cannot copy '{}' into itself", to_fspath(&from_path)),
            ));
        }
        for (key, node) in &source.tree {
            let Some(rest) = skip_ancestor(&from_path, key) else {
                continue;
            };
            let mut node = node.clone();
            if rest.is_empty() {
                node.created_rev = self.rev;
            }
            self.tree.insert(join(&to_path, rest), node);
        }
        self.record(
            &to_path,
            Change {
                action: 'A',
                kind,
                copy_from: Some((from_path, from_rev)),
                text_mod: false,
                prop_mod: false,
            },
        );
        Ok(())
    }

    /// Sets (or with `None`, deletes) a node property.
    ///
    /// `svn:mergeinfo` values must parse as mergeinfo.
    pub fn set_prop(&mut self, path: &str, name: &str, value: Option<&[u8]>) -> Result<(), SvnError> {
        let path = validate_rel_dir_path(path)?;
        if name == MERGEINFO_PROP
            && let Some(value) = value
        {
            Mergeinfo::parse(&String::from_utf8_lossy(value)).map_err(|err| {
                fs_error(
                    SVN_ERR_BAD_PROPERTY_VALUE,
                    format!("invalid {MERGEINFO_PROP} on '{}': {err}", to_fspath(&path)),
                )
            })?;
        }
        let rev = self.rev;
        let node = self
            .tree
            .get_mut(&path)
            .ok_or_else(|| not_found(rev, &path))?;
        match value {
            Some(value) => node.props.insert(name.to_string(), value.to_vec()),
            None => node.props.remove(name),
        };
        node.created_rev = rev;
        let kind = node.kind;
        self.record(
            &path,
            Change {
                action: 'M',
                kind,
                copy_from: None,
                text_mod: false,
                prop_mod: true,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn sample() -> MemoryRepository {
        let repo = MemoryRepository::new("mem://host/repo").unwrap();
        repo.commit("alice", "layout", |txn| {
            txn.mkdir("trunk")?;
            txn.put_file("trunk/a.txt", b"one")?;
            Ok(())
        })
        .unwrap();
        repo
    }

    #[test]
    fn new_repository_has_an_empty_root_at_revision_zero() {
        let repo = MemoryRepository::new("MEM://Host/repo/").unwrap();
        assert_eq!(repo.youngest(), 0);
        assert_eq!(repo.root_url(), "mem://host/repo");
        let state = repo.state();
        assert_eq!(state.node(0, "").unwrap().kind, NodeKind::Dir);
        assert!(state.revision(0).props.contains_key("svn:date"));
    }

    #[test]
    fn commit_records_changes_and_bumps_ancestors() {
        let repo = sample();
        let rev = repo
            .commit("bob", "edit", |txn| txn.put_file("trunk/a.txt", b"two"))
            .unwrap();
        assert_eq!(rev, 2);
        let state = repo.state();
        let change = &state.revision(2).changes["trunk/a.txt"];
        assert_eq!(change.action, 'M');
        assert!(change.text_mod);
        assert_eq!(state.node(2, "trunk").unwrap().created_rev, 2);
        assert_eq!(state.node(2, "").unwrap().created_rev, 2);
        assert_eq!(&*state.node(1, "trunk/a.txt").unwrap().contents, b"one");
    }

    #[test]
    fn failed_build_commits_nothing() {
        let repo = sample();
        let err = repo
            .commit("bob", "bad", |txn| {
                txn.mkdir("branches")?;
                txn.mkdir("missing/child")
            })
            .unwrap_err();
        assert!(matches!(err, SvnError::Session(_)));
        assert_eq!(repo.youngest(), 1);
    }

    #[test]
    fn delete_then_copy_records_a_replacement() {
        let repo = sample();
        repo.commit("bob", "replace", |txn| {
            txn.delete("trunk")?;
            txn.copy("trunk", 1, "trunk")
        })
        .unwrap();
        let state = repo.state();
        let change = &state.revision(2).changes["trunk"];
        assert_eq!(change.action, 'R');
        assert_eq!(change.copy_from, Some(("trunk".to_string(), 1)));
        assert!(state.node(2, "trunk/a.txt").is_some());
    }

    #[test]
    fn invalid_mergeinfo_is_rejected_at_commit() {
        let repo = sample();
        let err = repo
            .commit("bob", "bad", |txn| {
                txn.set_prop("trunk", MERGEINFO_PROP, Some(b"not mergeinfo"))
            })
            .unwrap_err();
        let SvnError::Session(err) = err else {
            panic!("expected a session error");
        };
        assert_eq!(err.code(), Some(SVN_ERR_BAD_PROPERTY_VALUE));
    }

    #[test]
    fn locks_follow_files_and_vanish_on_delete() {
        let repo = sample();
        let lock = repo.lock("trunk/a.txt", "alice", Some("editing")).unwrap();
        assert_eq!(lock.path, "trunk/a.txt");
        assert!(lock.token.starts_with("opaquelocktoken:"));
        assert!(repo.lock("trunk/a.txt", "bob", None).is_err());
        assert!(repo.lock("trunk", "bob", None).is_err());
        repo.commit("bob", "rm", |txn| txn.delete("trunk/a.txt"))
            .unwrap();
        assert!(repo.state().locks.is_empty());
    }

    #[test]
    fn dated_revision_picks_latest_at_or_before() {
        let repo = MemoryRepository::new("mem://host/repo").unwrap();
        let t1 = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let t2 = DateTime::parse_from_rfc3339("2030-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        repo.commit_at(t1, "a", "one", |txn| txn.mkdir("a")).unwrap();
        repo.commit_at(t2, "a", "two", |txn| txn.mkdir("b")).unwrap();
        let state = repo.state();
        assert_eq!(state.dated_revision(t1), 1);
        assert_eq!(state.dated_revision(t2 + chrono::Duration::days(1)), 2);
        assert_eq!(state.dated_revision(t1 - chrono::Duration::days(1)), 0);
    }

    #[test]
    fn exchange_consumes_injected_failures_once() {
        let repo = sample();
        repo.fail_next("stat", ServerError::new(1, "boom"));
        let err = repo.exchange("stat", |_| Ok(())).unwrap_err();
        let SvnError::Session(err) = err else {
            panic!("expected a session error");
        };
        assert_eq!(err.context.as_deref(), Some("stat"));
        assert!(repo.exchange("stat", |_| Ok(())).is_ok());
        assert_eq!(repo.operations(), vec!["stat".to_string(), "stat".to_string()]);
    }

    #[test]
    fn operation_log_keeps_only_recent_exchanges() {
        let repo = sample();
        for _ in 0..OPERATION_LOG_LIMIT {
            repo.exchange("stat", |_| Ok(())).unwrap();
        }
        repo.exchange("get-lock", |_| Ok(())).unwrap();
        let ops = repo.operations();
        assert_eq!(ops.len(), OPERATION_LOG_LIMIT);
        assert_eq!(ops.last().map(String::as_str), Some("get-lock"));
        assert_eq!(ops.first().map(String::as_str), Some("stat"));
    }
}
