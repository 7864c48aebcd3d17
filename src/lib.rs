//! Async remote-access sessions for Subversion-style repositories.
//!
//! A [`RepositorySession`] is a stateful handle to one repository: it
//! follows server redirects while opening, keeps the session URL, the
//! repository root URL and UUID, and exposes read operations (file and
//! directory fetches, log streaming, mergeinfo, locks) plus revision
//! property changes with compare-and-swap semantics. It does **not**
//! implement a working copy.
//!
//! The wire protocol lives behind the [`ra::RaConnector`] and
//! [`ra::RaTransport`] traits. Connectors are registered per URL scheme in
//! a process-wide table; [`ra::mem`] ships an in-process repository that is
//! handy for tests and tools.
//!
//! ## Getting started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use svn_ra::ra::{self, mem::MemoryRepository};
//! use svn_ra::{GetFileOptions, RepositorySession, SessionContext};
//!
//! fn main() -> svn_ra::Result<()> {
//!     let rt = tokio::runtime::Builder::new_current_thread()
//!         .enable_all()
//!         .build()?;
//!
//!     rt.block_on(async {
//!         let repo = MemoryRepository::new("mem://example/repo")?;
//!         repo.commit("alice", "add readme", |txn| txn.put_file("README", b"hi\n"))?;
//!         ra::register_connector("mem", Arc::new(repo.connector()));
//!
//!         // Follow up to three redirects while opening.
//!         let mut session =
//!             RepositorySession::open("mem://example/repo", None, 3, SessionContext::new())
//!                 .await?;
//!         let mut out: Vec<u8> = Vec::new();
//!         let fetched = session
//!             .get_file("README", &GetFileOptions::default(), &mut out)
//!             .await?;
//!         println!("r{}: {} bytes", fetched.rev, out.len());
//!         Ok::<(), svn_ra::SvnError>(())
//!     })
//! }
//! ```
//!
//! ## Features
//!
//! - `serde`: enables `Serialize`/`Deserialize` for public data types.
//!
//! ## Revisions
//!
//! Revision arguments typed `Option<u64>` use `None` for HEAD. Results
//! always carry the concrete revision the transport resolved.

#![deny(unsafe_code)]

mod context;
mod error;
mod mergeinfo;
mod open;
mod options;
mod path;
pub mod ra;
mod receiver;
mod session;
mod types;
mod url;

pub use context::{AuthPrompter, Credentials, ProgressListener, SessionContext};
pub use error::{ServerError, ServerErrorItem, SvnError};
/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, SvnError>;
pub use mergeinfo::{MergeInfoCatalog, MergeRange, Mergeinfo};
pub use open::SessionOpener;
pub use options::{ExpectedValue, GetDirOptions, GetFileOptions, LogOptions, LogRevProps};
pub use receiver::LogEntryReceiver;
pub use session::RepositorySession;
pub use types::{
    Capability, ChangedPath, Depth, DirEntry, DirListing, DirentFields, GetFileResult,
    InheritedProps, LockDesc, LogEntry, MergeInfoInheritance, NodeKind, PropertyList,
};
pub use url::{RepoUrl, canonicalize_url, join_url, relative_to};
