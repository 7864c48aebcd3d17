use std::collections::{BTreeMap, HashMap};
use std::fmt::Formatter;

use chrono::{DateTime, Utc};
use tokio::io::AsyncWrite;
use tracing::debug;

use crate::path::{join, split, validate_rel_dir_path, validate_rel_path};
use crate::ra::{Dirent, RaTransport};
use crate::url::{canonicalize_url, join_url, relative_to};
use crate::{
    Capability, Depth, DirEntry, DirListing, ExpectedValue, GetDirOptions, GetFileOptions,
    GetFileResult, InheritedProps, LockDesc, LogEntryReceiver, LogOptions, MergeInfoCatalog,
    MergeInfoInheritance, NodeKind, PropertyList, SessionContext, SessionOpener, SvnError,
};

/// A stateful handle to one repository.
///
/// A session owns its transport connection and its [`SessionContext`].
/// Every operation takes `&mut self`, so exchanges on one session never
/// overlap; open several sessions for parallel work. The repository root
/// URL and UUID are fixed when the session opens, while the session URL
/// moves with [`RepositorySession::reparent`].
///
/// Relative paths passed to operations are relative to the session URL.
pub struct RepositorySession {
    context: SessionContext,
    transport: Box<dyn RaTransport>,
    session_url: String,
    repos_root_url: String,
    repos_uuid: String,
    capabilities: HashMap<String, bool>,
}

impl std::fmt::Debug for RepositorySession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositorySession")
            .field("session_url", &self.session_url)
            .field("repos_root_url", &self.repos_root_url)
            .field("repos_uuid", &self.repos_uuid)
            .field("capabilities", &self.capabilities)
            .field("context", &self.context)
            .finish()
    }
}

impl Drop for RepositorySession {
    fn drop(&mut self) {
        debug!(url = %self.session_url, "repository session closed");
    }
}

fn dir_entry(name: &str, path: String, url: String, dirent: Dirent) -> DirEntry {
    DirEntry {
        name: name.to_string(),
        path,
        url,
        kind: dirent.kind,
        size: dirent.size,
        has_props: dirent.has_props,
        created_rev: dirent.created_rev,
        created_date: dirent.created_date,
        last_author: dirent.last_author,
    }
}

impl RepositorySession {
    /// Opens a session on `url`, following at most `retry_attempts`
    /// redirects, with the connector registered for the URL's scheme.
    ///
    /// Shorthand for [`SessionOpener`].
    pub async fn open(
        url: &str,
        uuid: Option<&str>,
        retry_attempts: u32,
        ctx: SessionContext,
    ) -> Result<Self, SvnError> {
        let mut opener = SessionOpener::new(url).with_retry_attempts(retry_attempts);
        if let Some(uuid) = uuid {
            opener = opener.with_uuid(uuid);
        }
        opener.open(ctx).await
    }

    pub(crate) fn from_parts(
        context: SessionContext,
        transport: Box<dyn RaTransport>,
        session_url: String,
        repos_root_url: String,
        repos_uuid: String,
        announced: Vec<String>,
    ) -> Self {
        Self {
            context,
            transport,
            session_url,
            repos_root_url,
            repos_uuid,
            capabilities: announced.into_iter().map(|name| (name, true)).collect(),
        }
    }

    /// Returns the context this session was opened with.
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Returns the current session URL.
    pub fn session_url(&self) -> &str {
        &self.session_url
    }

    /// Returns the repository root URL.
    pub fn repos_root_url(&self) -> &str {
        &self.repos_root_url
    }

    /// Returns the repository UUID.
    pub fn repos_uuid(&self) -> &str {
        &self.repos_uuid
    }

    /// Moves the session to another URL in the same repository.
    ///
    /// Fails with [`SvnError::InvalidPath`] if `url` is outside the
    /// repository root; the session URL only changes once the transport
    /// has accepted the new URL.
    pub async fn reparent(&mut self, url: &str) -> Result<(), SvnError> {
        let url = canonicalize_url(url)?;
        relative_to(&self.repos_root_url, &url)?;
        self.transport.reparent(&url).await?;
        debug!(from = %self.session_url, to = %url, "session reparented");
        self.session_url = url;
        Ok(())
    }

    /// Returns `url` relative to the session URL.
    pub fn session_relative_path(&self, url: &str) -> Result<String, SvnError> {
        relative_to(&self.session_url, url)
    }

    /// Returns `url` relative to the repository root.
    pub fn repos_relative_path(&self, url: &str) -> Result<String, SvnError> {
        relative_to(&self.repos_root_url, url)
    }

    /// Returns the youngest revision.
    pub async fn latest_revision(&mut self) -> Result<u64, SvnError> {
        self.transport.latest_revision().await
    }

    /// Returns the youngest revision committed at or before `timestamp`
    /// (`0` if the repository is younger).
    pub async fn revision_by_timestamp(&mut self, timestamp: DateTime<Utc>) -> Result<u64, SvnError> {
        self.transport.dated_revision(timestamp).await
    }

    /// Returns a revision property; an absent property is `Ok(None)`.
    pub async fn rev_prop(&mut self, rev: u64, name: &str) -> Result<Option<Vec<u8>>, SvnError> {
        self.transport.rev_prop(rev, name).await
    }

    /// Returns every property of a revision.
    pub async fn rev_proplist(&mut self, rev: u64) -> Result<PropertyList, SvnError> {
        self.transport.rev_proplist(rev).await
    }

    /// Sets (`value: Some`) or deletes (`value: None`) a revision property.
    ///
    /// With [`ExpectedValue::Absent`] or [`ExpectedValue::Value`] the change
    /// is atomic: it applies only if the current value matches, and fails
    /// with [`SvnError::PreconditionFailed`] otherwise. Atomic changes need
    /// the `atomic-revprops` capability; without it they fail with
    /// [`SvnError::Unsupported`] before anything is sent.
    pub async fn change_rev_prop(
        &mut self,
        rev: u64,
        name: &str,
        expected: ExpectedValue,
        value: Option<Vec<u8>>,
    ) -> Result<(), SvnError> {
        if expected.is_conditional() && !self.has_capability(Capability::AtomicRevProps).await? {
            return Err(SvnError::Unsupported(format!(
                "conditional change of revision property '{name}' needs the '{}' capability",
                Capability::AtomicRevProps.as_str()
            )));
        }
        self.transport
            .change_rev_prop(rev, name, &expected, value.as_deref())
            .await
    }

    /// Fetches a file, writing its contents into `out` when requested.
    ///
    /// The returned revision is the one actually read, so a HEAD request
    /// reports the concrete revision.
    pub async fn get_file<W>(
        &mut self,
        path: &str,
        options: &GetFileOptions,
        out: &mut W,
    ) -> Result<GetFileResult, SvnError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let path = validate_rel_path(path)?;
        self.transport.get_file(&path, options, out).await
    }

    /// Fetches only the properties of a file.
    pub async fn get_file_props(
        &mut self,
        path: &str,
        rev: Option<u64>,
    ) -> Result<GetFileResult, SvnError> {
        let options = GetFileOptions::at(rev).with_props().without_contents();
        let mut sink = tokio::io::sink();
        self.get_file(path, &options, &mut sink).await
    }

    /// Lists a directory.
    ///
    /// Entry URLs are built from the session URL, the directory path and the
    /// entry name.
    pub async fn get_dir(
        &mut self,
        path: &str,
        options: &GetDirOptions,
    ) -> Result<DirListing, SvnError> {
        let path = validate_rel_dir_path(path)?;
        let raw = self.transport.get_dir(&path, options).await?;
        let entries = match raw.entries {
            Some(raw_entries) => {
                let base = join_url(&self.session_url, &path)?;
                let mut entries = BTreeMap::new();
                for (name, dirent) in raw_entries {
                    let url = join_url(&base, &name)?;
                    let entry = dir_entry(&name, join(&path, &name), url, dirent);
                    entries.insert(name, entry);
                }
                Some(entries)
            }
            None => None,
        };
        Ok(DirListing {
            rev: raw.rev,
            entries,
            props: raw.props,
        })
    }

    /// Returns the entry for `path`, or `None` if nothing exists there.
    pub async fn stat(&mut self, path: &str, rev: Option<u64>) -> Result<Option<DirEntry>, SvnError> {
        let path = validate_rel_dir_path(path)?;
        let Some(dirent) = self.transport.stat(&path, rev).await? else {
            return Ok(None);
        };
        let url = join_url(&self.session_url, &path)?;
        let name = split(&path).1.to_string();
        Ok(Some(dir_entry(&name, path, url, dirent)))
    }

    /// Returns the mergeinfo of `paths`.
    ///
    /// `None` means no requested path has mergeinfo; a record that exists
    /// but is empty means no merges are recorded.
    pub async fn get_mergeinfo<S>(
        &mut self,
        paths: &[S],
        rev: Option<u64>,
        inherit: MergeInfoInheritance,
        include_descendants: bool,
    ) -> Result<Option<MergeInfoCatalog>, SvnError>
    where
        S: AsRef<str>,
    {
        let paths = paths
            .iter()
            .map(|path| validate_rel_dir_path(path.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if paths.is_empty() {
            return Ok(None);
        }
        self.transport
            .get_mergeinfo(&paths, rev, inherit, include_descendants)
            .await
    }

    /// Streams log entries into `receiver`.
    ///
    /// Entries arrive in the order of the requested range (descending when
    /// `start_rev >= end_rev`). An error returned by the receiver stops the
    /// stream and is returned from here.
    pub async fn get_log<R>(&mut self, options: &LogOptions, receiver: &mut R) -> Result<(), SvnError>
    where
        R: LogEntryReceiver + Send,
    {
        let target_paths = options
            .target_paths
            .iter()
            .map(|path| validate_rel_dir_path(path))
            .collect::<Result<Vec<_>, _>>()?;
        let options = LogOptions {
            target_paths,
            ..options.clone()
        };
        self.transport.get_log(&options, receiver).await
    }

    /// Returns the kind of node at `path`; a missing node is [`NodeKind::None`].
    pub async fn check_path(&mut self, path: &str, rev: Option<u64>) -> Result<NodeKind, SvnError> {
        let path = validate_rel_dir_path(path)?;
        self.transport.check_path(&path, rev).await
    }

    /// Returns the locks at or below `path`, keyed by repository-relative path.
    pub async fn get_locks(
        &mut self,
        path: &str,
        depth: Depth,
    ) -> Result<BTreeMap<String, LockDesc>, SvnError> {
        let path = validate_rel_dir_path(path)?;
        let locks = self.transport.get_locks(&path, depth).await?;
        Ok(locks
            .into_iter()
            .map(|lock| (lock.path.clone(), lock))
            .collect())
    }

    /// Returns the lock on `path`, if any.
    pub async fn get_lock(&mut self, path: &str) -> Result<Option<LockDesc>, SvnError> {
        let path = validate_rel_path(path)?;
        self.transport.get_lock(&path).await
    }

    /// Returns the first revision after `peg_rev`, up to `end_rev`, in which
    /// `path` was deleted.
    pub async fn get_deleted_revision(
        &mut self,
        path: &str,
        peg_rev: u64,
        end_rev: u64,
    ) -> Result<Option<u64>, SvnError> {
        let path = validate_rel_path(path)?;
        self.transport
            .get_deleted_revision(&path, peg_rev, end_rev)
            .await
    }

    /// Returns the properties `path` inherits, nearest the root first.
    pub async fn get_inherited_props(
        &mut self,
        path: &str,
        rev: Option<u64>,
    ) -> Result<Vec<InheritedProps>, SvnError> {
        let path = validate_rel_dir_path(path)?;
        self.transport.get_inherited_props(&path, rev).await
    }

    /// Returns whether the repository supports a capability.
    ///
    /// Capabilities announced at open are known up front; other names are
    /// asked once and the answer is cached for the session's lifetime.
    pub async fn has_capability(&mut self, capability: impl AsRef<str>) -> Result<bool, SvnError> {
        let name = capability.as_ref();
        if let Some(supported) = self.capabilities.get(name) {
            return Ok(*supported);
        }
        let supported = self.transport.has_capability(name).await?;
        debug!(capability = name, supported, "capability queried");
        self.capabilities.insert(name.to_string(), supported);
        Ok(supported)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;

    use super::*;
    use crate::DirentFields;
    use crate::ra::mem::MemoryRepository;

    fn run_async<T>(f: impl std::future::Future<Output = T>) -> T {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }

    fn repo() -> MemoryRepository {
        let repo = MemoryRepository::new("mem://host/repo").unwrap();
        repo.commit("alice", "layout", |txn| {
            txn.mkdir("trunk")?;
            txn.mkdir("trunk/src")?;
            txn.put_file("trunk/src/my file.rs", b"fn main() {}\n")?;
            txn.set_prop("trunk", "owner", Some(b"team"))
        })
        .unwrap();
        repo
    }

    async fn open(repo: &MemoryRepository, url: &str) -> RepositorySession {
        SessionOpener::new(url)
            .with_connector(Arc::new(repo.connector()))
            .open(SessionContext::new())
            .await
            .unwrap()
    }

    #[test]
    fn dir_entry_urls_are_built_from_the_session_url() {
        run_async(async {
            let repo = repo();
            let mut session = open(&repo, "mem://host/repo/trunk").await;
            let listing = session
                .get_dir("src", &GetDirOptions::default())
                .await
                .unwrap();
            let entries = listing.entries.unwrap();
            let entry = &entries["my file.rs"];
            assert_eq!(entry.path, "src/my file.rs");
            assert_eq!(entry.url, "mem://host/repo/trunk/src/my%20file.rs");
            assert_eq!(entry.kind, NodeKind::File);
            assert_eq!(entry.size, Some(13));
            assert_eq!(entry.last_author.as_deref(), Some("alice"));
            assert_eq!(listing.props, None);
        });
    }

    #[test]
    fn dir_fields_limit_what_is_populated() {
        run_async(async {
            let repo = repo();
            let mut session = open(&repo, "mem://host/repo").await;
            let options = GetDirOptions::default()
                .with_fields(DirentFields::KIND)
                .with_props();
            let listing = session.get_dir("trunk", &options).await.unwrap();
            let entries = listing.entries.unwrap();
            let entry = &entries["src"];
            assert_eq!(entry.kind, NodeKind::Dir);
            assert_eq!(entry.size, None);
            assert_eq!(entry.created_rev, None);
            assert_eq!(listing.props.unwrap()["owner"], b"team".to_vec());
        });
    }

    #[test]
    fn capability_answers_are_cached() {
        run_async(async {
            let repo = repo();
            repo.set_capability("partial-replay", false);
            let mut session = open(&repo, "mem://host/repo").await;
            assert!(session.has_capability(Capability::MergeInfo).await.unwrap());
            assert!(!session.has_capability("partial-replay").await.unwrap());
            assert!(!session.has_capability("partial-replay").await.unwrap());
            let asked = repo
                .operations()
                .iter()
                .filter(|op| *op == "has-capability")
                .count();
            assert_eq!(asked, 1);
        });
    }

    #[test]
    fn conditional_revprop_change_needs_atomic_revprops() {
        run_async(async {
            let repo = repo();
            repo.set_capability("atomic-revprops", false);
            let mut session = open(&repo, "mem://host/repo").await;
            let err = session
                .change_rev_prop(1, "svn:log", ExpectedValue::Absent, Some(b"x".to_vec()))
                .await
                .unwrap_err();
            assert!(matches!(err, SvnError::Unsupported(_)));
            assert!(!repo.operations().contains(&"change-rev-prop".to_string()));

            session
                .change_rev_prop(1, "svn:log", ExpectedValue::Any, Some(b"fixed".to_vec()))
                .await
                .unwrap();
            assert_eq!(
                session.rev_prop(1, "svn:log").await.unwrap(),
                Some(b"fixed".to_vec())
            );
        });
    }

    #[test]
    fn stat_names_the_entry_and_reports_absence() {
        run_async(async {
            let repo = repo();
            let mut session = open(&repo, "mem://host/repo/trunk").await;
            let entry = session.stat("src", None).await.unwrap().unwrap();
            assert_eq!(entry.name, "src");
            assert_eq!(entry.url, "mem://host/repo/trunk/src");
            assert_eq!(entry.kind, NodeKind::Dir);
            assert_eq!(session.stat("nope", None).await.unwrap(), None);
        });
    }

    #[test]
    fn paths_are_validated_before_any_exchange() {
        run_async(async {
            let repo = repo();
            let mut session = open(&repo, "mem://host/repo").await;
            let before = repo.operations().len();
            let mut out: Vec<u8> = Vec::new();
            assert!(matches!(
                session
                    .get_file("../etc/passwd", &GetFileOptions::default(), &mut out)
                    .await,
                Err(SvnError::InvalidPath(_))
            ));
            assert!(matches!(
                session.get_file("", &GetFileOptions::default(), &mut out).await,
                Err(SvnError::InvalidPath(_))
            ));
            assert_eq!(repo.operations().len(), before);
        });
    }
}
