//! Transport seam: connectors that open repository connections and the
//! process-wide registry that maps URL schemes to them.
//!
//! A [`RaConnector`] turns a URL into either an open [`RaTransport`] or a
//! redirect. [`crate::RepositorySession`] owns exactly one transport and
//! drives it through `&mut self`, so a transport never sees two exchanges at
//! once.

pub mod mem;

use std::collections::BTreeMap;
use std::fmt::Formatter;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWrite;
use tracing::debug;

use crate::url::scheme_of;
use crate::{
    Depth, ExpectedValue, GetDirOptions, GetFileOptions, GetFileResult, InheritedProps,
    LockDesc, LogEntryReceiver, LogOptions, MergeInfoCatalog, MergeInfoInheritance, NodeKind,
    PropertyList, SessionContext, SvnError,
};

/// Opens connections for one or more URL schemes.
#[async_trait]
pub trait RaConnector: Send + Sync {
    /// Attempts to open `url`.
    ///
    /// `uuid` is the repository UUID the caller expects, if any; connectors
    /// may use it as a hint but the session layer verifies it.
    async fn open(
        &self,
        url: &str,
        uuid: Option<&str>,
        ctx: &SessionContext,
    ) -> Result<OpenOutcome, SvnError>;
}

/// Result of one open attempt.
pub enum OpenOutcome {
    /// The repository accepted the connection.
    Opened(OpenedTransport),
    /// The repository asked the client to retry at another URL.
    Redirect(String),
}

impl std::fmt::Debug for OpenOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened(opened) => f.debug_tuple("Opened").field(opened).finish(),
            Self::Redirect(url) => f.debug_tuple("Redirect").field(url).finish(),
        }
    }
}

/// An accepted connection and what the repository announced about itself.
pub struct OpenedTransport {
    /// The connection.
    pub transport: Box<dyn RaTransport>,
    /// Repository root URL.
    pub repos_root_url: String,
    /// Repository UUID.
    pub repos_uuid: String,
    /// Capability names the repository announced up front.
    pub capabilities: Vec<String>,
}

impl std::fmt::Debug for OpenedTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedTransport")
            .field("repos_root_url", &self.repos_root_url)
            .field("repos_uuid", &self.repos_uuid)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// A raw directory entry as produced by a transport.
///
/// Unrequested fields are `None` (`kind` is [`NodeKind::Unknown`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dirent {
    /// Node kind.
    pub kind: NodeKind,
    /// File size.
    pub size: Option<u64>,
    /// Whether the node has properties.
    pub has_props: Option<bool>,
    /// Last-changed revision.
    pub created_rev: Option<u64>,
    /// Last-changed date.
    pub created_date: Option<String>,
    /// Last-changed author.
    pub last_author: Option<String>,
}

/// A raw directory listing as produced by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawDirListing {
    /// The revision that was actually read.
    pub rev: u64,
    /// Entries keyed by name, if requested.
    pub entries: Option<BTreeMap<String, Dirent>>,
    /// Directory properties, if requested.
    pub props: Option<PropertyList>,
}

/// An open connection to a repository.
///
/// Paths are relpaths relative to the transport's current session URL and
/// are already canonical. Revisions given as `None` mean HEAD.
#[async_trait]
pub trait RaTransport: Send {
    /// Moves the connection to another URL inside the same repository.
    async fn reparent(&mut self, url: &str) -> Result<(), SvnError>;

    /// Returns the youngest revision.
    async fn latest_revision(&mut self) -> Result<u64, SvnError>;

    /// Returns the youngest revision committed at or before `date`.
    async fn dated_revision(&mut self, date: DateTime<Utc>) -> Result<u64, SvnError>;

    /// Returns every property of revision `rev`.
    async fn rev_proplist(&mut self, rev: u64) -> Result<PropertyList, SvnError>;

    /// Returns one property of revision `rev`.
    async fn rev_prop(&mut self, rev: u64, name: &str) -> Result<Option<Vec<u8>>, SvnError>;

    /// Sets (or deletes, with `value: None`) a revision property if its
    /// current value satisfies `expected`.
    async fn change_rev_prop(
        &mut self,
        rev: u64,
        name: &str,
        expected: &ExpectedValue,
        value: Option<&[u8]>,
    ) -> Result<(), SvnError>;

    /// Fetches a file, streaming contents into `out` when requested.
    async fn get_file(
        &mut self,
        path: &str,
        options: &GetFileOptions,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<GetFileResult, SvnError>;

    /// Lists a directory.
    async fn get_dir(
        &mut self,
        path: &str,
        options: &GetDirOptions,
    ) -> Result<RawDirListing, SvnError>;

    /// Returns the mergeinfo catalog for `paths`, or `None` if none has any.
    async fn get_mergeinfo(
        &mut self,
        paths: &[String],
        rev: Option<u64>,
        inherit: MergeInfoInheritance,
        include_descendants: bool,
    ) -> Result<Option<MergeInfoCatalog>, SvnError>;

    /// Streams log entries into `receiver`.
    async fn get_log(
        &mut self,
        options: &LogOptions,
        receiver: &mut (dyn LogEntryReceiver + Send),
    ) -> Result<(), SvnError>;

    /// Returns the kind of node at `path`.
    async fn check_path(&mut self, path: &str, rev: Option<u64>) -> Result<NodeKind, SvnError>;

    /// Returns the entry for `path`, or `None` if it does not exist.
    async fn stat(&mut self, path: &str, rev: Option<u64>) -> Result<Option<Dirent>, SvnError>;

    /// Returns the locks on `path` and, depending on `depth`, below it.
    async fn get_locks(&mut self, path: &str, depth: Depth) -> Result<Vec<LockDesc>, SvnError>;

    /// Returns the lock on `path`, if any.
    async fn get_lock(&mut self, path: &str) -> Result<Option<LockDesc>, SvnError>;

    /// Asks whether the repository supports a named capability.
    async fn has_capability(&mut self, name: &str) -> Result<bool, SvnError>;

    /// Returns the first revision in `(peg_rev, end_rev]` where `path` no longer exists.
    async fn get_deleted_revision(
        &mut self,
        path: &str,
        peg_rev: u64,
        end_rev: u64,
    ) -> Result<Option<u64>, SvnError>;

    /// Returns the properties `path` inherits from its ancestors, root first.
    async fn get_inherited_props(
        &mut self,
        path: &str,
        rev: Option<u64>,
    ) -> Result<Vec<InheritedProps>, SvnError>;
}

static RA_LAYER: OnceLock<RaLayer> = OnceLock::new();

/// The process-wide scheme → connector table.
///
/// Created once by [`initialize`] and kept until the process exits.
pub struct RaLayer {
    connectors: RwLock<BTreeMap<String, Arc<dyn RaConnector>>>,
}

impl std::fmt::Debug for RaLayer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaLayer")
            .field("schemes", &self.schemes())
            .finish()
    }
}

impl RaLayer {
    /// Registers `connector` for `scheme`, replacing any previous entry.
    pub fn register(&self, scheme: &str, connector: Arc<dyn RaConnector>) {
        let scheme = scheme.to_ascii_lowercase();
        debug!(scheme = %scheme, "registering connector");
        self.connectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scheme, connector);
    }

    /// Returns the registered schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        self.connectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Returns the connector responsible for `url`.
    pub fn connector_for(&self, url: &str) -> Result<Arc<dyn RaConnector>, SvnError> {
        let scheme =
            scheme_of(url).ok_or_else(|| SvnError::InvalidUrl(format!("missing scheme: {url}")))?;
        self.connectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&scheme)
            .cloned()
            .ok_or_else(|| SvnError::InvalidUrl(format!("unsupported url scheme '{scheme}': {url}")))
    }
}

/// Initializes the remote-access layer, once per process.
///
/// Later calls return the same table. Opening a session calls this itself.
pub fn initialize() -> &'static RaLayer {
    RA_LAYER.get_or_init(|| {
        debug!("remote access layer initialized");
        RaLayer {
            connectors: RwLock::new(BTreeMap::new()),
        }
    })
}

/// Registers `connector` for `scheme` in the process-wide table.
pub fn register_connector(scheme: &str, connector: Arc<dyn RaConnector>) {
    initialize().register(scheme, connector);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    struct RefusingConnector;

    #[async_trait]
    impl RaConnector for RefusingConnector {
        async fn open(
            &self,
            url: &str,
            _uuid: Option<&str>,
            _ctx: &SessionContext,
        ) -> Result<OpenOutcome, SvnError> {
            Ok(OpenOutcome::Redirect(url.to_string()))
        }
    }

    #[test]
    fn initialize_returns_the_same_table() {
        let a = initialize() as *const RaLayer;
        let b = initialize() as *const RaLayer;
        assert_eq!(a, b);
    }

    #[test]
    fn connectors_are_found_by_lowercased_scheme() {
        register_connector("Refuse-Test", Arc::new(RefusingConnector));
        assert!(initialize().schemes().contains(&"refuse-test".to_string()));
        assert!(initialize().connector_for("REFUSE-TEST://host/repo").is_ok());
    }

    #[test]
    fn unknown_or_missing_schemes_are_invalid_urls() {
        let err = initialize()
            .connector_for("nope-never-registered://host/repo")
            .err()
            .unwrap();
        assert!(matches!(err, SvnError::InvalidUrl(_)));
        let err = initialize().connector_for("/just/a/path").err().unwrap();
        assert!(matches!(err, SvnError::InvalidUrl(_)));
    }
}
