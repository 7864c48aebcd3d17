//! Session establishment: following repository redirects until a
//! connection is accepted.

use std::collections::HashSet;
use std::fmt::Formatter;
use std::sync::Arc;

use tracing::debug;

use crate::ra::{self, OpenOutcome, OpenedTransport, RaConnector};
use crate::url::{canonicalize_url, relative_to};
use crate::{RepositorySession, SessionContext, SvnError};

/// Opens [`RepositorySession`]s for one URL.
///
/// By default the connector is looked up in the process-wide registry
/// (see [`ra::register_connector`]) by each attempt's URL scheme, so a
/// redirect may move to another scheme.
#[derive(Clone)]
pub struct SessionOpener {
    url: String,
    uuid: Option<String>,
    retry_attempts: u32,
    connector: Option<Arc<dyn RaConnector>>,
}

impl std::fmt::Debug for SessionOpener {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOpener")
            .field("url", &self.url)
            .field("uuid", &self.uuid)
            .field("retry_attempts", &self.retry_attempts)
            .field("explicit_connector", &self.connector.is_some())
            .finish()
    }
}

impl SessionOpener {
    /// Redirects followed when none is configured.
    pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

    /// Creates an opener for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            uuid: None,
            retry_attempts: Self::DEFAULT_RETRY_ATTEMPTS,
            connector: None,
        }
    }

    /// Returns the URL the first attempt uses.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the redirect budget.
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Requires the repository to have this UUID.
    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Sets how many redirects may be followed; `n` allows `n + 1` attempts.
    #[must_use]
    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    /// Uses `connector` for every attempt instead of the registry.
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn RaConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Opens a session, following redirects.
    ///
    /// A corrected URL that was already attempted fails with
    /// [`SvnError::RedirectCycle`]; URLs are compared as raw strings, so
    /// `.../repo` and `.../repo/` are distinct. A redirect received after
    /// the budget is spent fails with [`SvnError::TooManyRedirects`]
    /// carrying the corrected URL.
    pub async fn open(&self, ctx: SessionContext) -> Result<RepositorySession, SvnError> {
        let layer = ra::initialize();
        let mut attempted: HashSet<String> = HashSet::new();
        attempted.insert(self.url.clone());
        let mut url = self.url.clone();
        let mut remaining = self.retry_attempts;
        loop {
            let connector = match &self.connector {
                Some(connector) => Arc::clone(connector),
                None => layer.connector_for(&url)?,
            };
            debug!(url = %url, remaining, "opening repository session");
            match connector.open(&url, self.uuid.as_deref(), &ctx).await? {
                OpenOutcome::Opened(opened) => return self.establish(&url, opened, ctx),
                OpenOutcome::Redirect(corrected) => {
                    debug!(from = %url, to = %corrected, "repository redirected");
                    if !attempted.insert(corrected.clone()) {
                        return Err(SvnError::RedirectCycle(corrected));
                    }
                    if remaining == 0 {
                        return Err(SvnError::TooManyRedirects(corrected));
                    }
                    remaining -= 1;
                    url = corrected;
                }
            }
        }
    }

    fn establish(
        &self,
        url: &str,
        opened: OpenedTransport,
        ctx: SessionContext,
    ) -> Result<RepositorySession, SvnError> {
        let OpenedTransport {
            transport,
            repos_root_url,
            repos_uuid,
            capabilities,
        } = opened;
        if let Some(expected) = self.uuid.as_deref()
            && expected != repos_uuid
        {
            return Err(SvnError::UuidMismatch {
                expected: expected.to_string(),
                actual: repos_uuid,
            });
        }
        let root = canonicalize_url(&repos_root_url)?;
        let session_url = canonicalize_url(url)?;
        relative_to(&root, &session_url).map_err(|_| {
            SvnError::Protocol(format!(
                "session url '{session_url}' is outside repository root '{root}'"
            ))
        })?;
        debug!(url = %session_url, root = %root, uuid = %repos_uuid, "repository session established");
        Ok(RepositorySession::from_parts(
            ctx,
            transport,
            session_url,
            root,
            repos_uuid,
            capabilities,
        ))
    }
}
