//! Public data types returned by this crate.
//!
//! These are snapshots: nothing here is cached by the session, every value
//! comes from a fresh transport exchange.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::ops::{BitOr, BitOrAssign};

/// A Subversion property list (`name -> raw bytes`).
///
/// Property values can be binary; callers should treat the value as opaque
/// bytes unless they know it is UTF-8.
pub type PropertyList = BTreeMap<String, Vec<u8>>;

/// Inherited properties for a path.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InheritedProps {
    /// The repository-relative path these properties come from.
    pub path: String,
    /// The inherited property list.
    pub props: PropertyList,
}

/// Result metadata returned by [`crate::RepositorySession::get_file`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetFileResult {
    /// The revision that was actually read (HEAD resolved to a number).
    pub rev: u64,
    /// File properties, if requested.
    pub props: Option<PropertyList>,
    /// Number of bytes written to the output sink.
    pub bytes_written: u64,
}

/// Controls how mergeinfo may be inherited when requesting mergeinfo.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeInfoInheritance {
    /// Only explicit mergeinfo on the requested paths.
    Explicit,
    /// Explicit mergeinfo, or else mergeinfo inherited from the nearest ancestor.
    Inherited,
    /// Only mergeinfo inherited from the nearest ancestor, ignoring the path's own.
    NearestAncestor,
}

/// A lock description as returned by `get_lock(s)`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockDesc {
    /// Repository-relative path (no leading `/`) that is locked.
    pub path: String,
    /// Opaque lock token.
    pub token: String,
    /// Lock owner.
    pub owner: String,
    /// Optional lock comment.
    pub comment: Option<String>,
    /// Creation date string as reported by the repository.
    pub created: String,
    /// Expiration date string as reported by the repository, if any.
    pub expires: Option<String>,
}

/// A log entry delivered by [`crate::RepositorySession::get_log`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Revision number. Meaningless when `invalid_revnum` is set.
    pub rev: u64,
    /// Changed paths, sorted by path (empty unless requested).
    pub changed_paths: Vec<ChangedPath>,
    /// `svn:author`, if requested and present.
    pub author: Option<String>,
    /// `svn:date`, if requested and present.
    pub date: Option<String>,
    /// `svn:log`, if requested and present.
    pub message: Option<String>,
    /// All requested revision properties, including the three above.
    pub rev_props: PropertyList,
    /// Whether merged-revision child entries follow this entry.
    pub has_children: bool,
    /// Marks the end of a merged-revision subtree.
    pub invalid_revnum: bool,
    /// Whether this entry was reverse-merged (removed from mergeinfo).
    pub subtractive_merge: bool,
}

impl LogEntry {
    /// Creates an entry for `rev` with no data attached.
    pub fn new(rev: u64) -> Self {
        Self {
            rev,
            changed_paths: Vec::new(),
            author: None,
            date: None,
            message: None,
            rev_props: PropertyList::new(),
            has_children: false,
            invalid_revnum: false,
            subtractive_merge: false,
        }
    }

    /// Creates the terminator entry that closes a list of merged revisions.
    pub fn end_of_children() -> Self {
        Self {
            invalid_revnum: true,
            ..Self::new(0)
        }
    }

    /// Attaches revision properties and derives `author`/`date`/`message`.
    pub fn with_rev_props(mut self, rev_props: PropertyList) -> Self {
        let text = |name: &str| {
            rev_props
                .get(name)
                .map(|v| String::from_utf8_lossy(v).into_owned())
        };
        self.author = text("svn:author");
        self.date = text("svn:date");
        self.message = text("svn:log");
        self.rev_props = rev_props;
        self
    }
}

/// A single path change entry within a [`LogEntry`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedPath {
    /// Change action (`A`, `D`, `M`, or `R`).
    pub action: String,
    /// Changed repository path (fspath, leading `/`).
    pub path: String,
    /// Copy source path, if this change was made by a copy.
    pub copy_from_path: Option<String>,
    /// Copy source revision, if this change was made by a copy.
    pub copy_from_rev: Option<u64>,
    /// Node kind, if known.
    pub node_kind: Option<NodeKind>,
    /// Whether text was modified, if known.
    pub text_mods: Option<bool>,
    /// Whether props were modified, if known.
    pub prop_mods: Option<bool>,
}

/// The kind of a node in the repository.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind {
    /// No node exists at the requested path/revision.
    None,
    /// A file node.
    File,
    /// A directory node.
    Dir,
    /// An unknown kind (not requested, or a forward-compatibility fallback).
    Unknown,
}

impl NodeKind {
    /// Returns a stable string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::File => "file",
            Self::Dir => "dir",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Set of directory-entry fields to populate, as a bitmask.
///
/// Bit values match Subversion's `SVN_DIRENT_*` constants.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct DirentFields(u32);

impl DirentFields {
    /// No fields.
    pub const NONE: Self = Self(0);
    /// Node kind.
    pub const KIND: Self = Self(0x1);
    /// File size.
    pub const SIZE: Self = Self(0x2);
    /// Whether the node has properties.
    pub const HAS_PROPS: Self = Self(0x4);
    /// Last-changed revision.
    pub const CREATED_REV: Self = Self(0x8);
    /// Last-changed date.
    pub const TIME: Self = Self(0x10);
    /// Last-changed author.
    pub const LAST_AUTHOR: Self = Self(0x20);
    /// Every field.
    pub const ALL: Self = Self(0x3f);

    /// Builds a mask from raw bits; unknown bits are dropped.
    pub fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Returns the raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every field in `other` is selected.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DirentFields {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DirentFields {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A directory entry as returned by [`crate::RepositorySession::get_dir`]
/// and [`crate::RepositorySession::stat`].
///
/// Fields not selected by the request's [`DirentFields`] are `None`
/// (`kind` is [`NodeKind::Unknown`]).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (basename).
    pub name: String,
    /// Entry path relative to the session URL.
    pub path: String,
    /// Absolute canonical URL of the entry.
    pub url: String,
    /// Node kind.
    pub kind: NodeKind,
    /// File size, if requested (directories report `0`).
    pub size: Option<u64>,
    /// Whether the node has properties, if requested.
    pub has_props: Option<bool>,
    /// Last-changed revision, if requested.
    pub created_rev: Option<u64>,
    /// Last-changed date, if requested.
    pub created_date: Option<String>,
    /// Last-changed author, if requested and known.
    pub last_author: Option<String>,
}

/// Result of [`crate::RepositorySession::get_dir`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirListing {
    /// The revision that was actually read.
    pub rev: u64,
    /// Entries keyed by name, if requested.
    pub entries: Option<BTreeMap<String, DirEntry>>,
    /// Directory properties, if requested.
    pub props: Option<PropertyList>,
}

/// Subversion depth value (used by lock enumeration).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Depth {
    /// The target itself only.
    Empty,
    /// The target and its file children.
    Files,
    /// The target and its immediate children.
    Immediates,
    /// Fully recursive.
    Infinity,
}

/// A named optional protocol feature.
///
/// [`crate::RepositorySession::has_capability`] accepts any name; these are
/// the ones Subversion defines.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Depth-related parameters (`depth`).
    Depth,
    /// Mergeinfo queries (`mergeinfo`).
    MergeInfo,
    /// Requesting revision properties from `log` (`log-revprops`).
    LogRevProps,
    /// Partial replay (`partial-replay`).
    PartialReplay,
    /// Setting revision properties during commit (`commit-revprops`).
    CommitRevProps,
    /// Compare-and-swap revision property changes (`atomic-revprops`).
    AtomicRevProps,
    /// Inherited properties (`inherited-props`).
    InheritedProps,
    /// Ephemeral transaction properties (`ephemeral-txnprops`).
    EphemeralTxnProps,
    /// Reverse file-revs traversal (`get-file-revs-reverse`).
    GetFileRevsReverse,
    /// Recursive listing (`list`).
    List,
}

impl Capability {
    /// Returns the capability name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Depth => "depth",
            Self::MergeInfo => "mergeinfo",
            Self::LogRevProps => "log-revprops",
            Self::PartialReplay => "partial-replay",
            Self::CommitRevProps => "commit-revprops",
            Self::AtomicRevProps => "atomic-revprops",
            Self::InheritedProps => "inherited-props",
            Self::EphemeralTxnProps => "ephemeral-txnprops",
            Self::GetFileRevsReverse => "get-file-revs-reverse",
            Self::List => "list",
        }
    }

    /// Every capability this crate knows by name.
    pub const ALL: [Self; 10] = [
        Self::Depth,
        Self::MergeInfo,
        Self::LogRevProps,
        Self::PartialReplay,
        Self::CommitRevProps,
        Self::AtomicRevProps,
        Self::InheritedProps,
        Self::EphemeralTxnProps,
        Self::GetFileRevsReverse,
        Self::List,
    ];

    /// Looks up a capability by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cap| cap.as_str() == name)
    }
}

impl AsRef<str> for Capability {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
