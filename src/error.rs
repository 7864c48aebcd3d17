use thiserror::Error;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
/// One entry of a transport-reported error chain.
pub struct ServerErrorItem {
    /// Subversion error code.
    pub code: u64,
    /// Human-readable error message.
    pub message: Option<String>,
    /// Source file on the server side, if provided.
    pub file: Option<String>,
    /// Source line on the server side, if provided.
    pub line: Option<u64>,
}

impl ServerErrorItem {
    /// Creates an item with a code and message and no source location.
    pub fn new(code: u64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            file: None,
            line: None,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
/// A structured diagnostic returned by the transport when an exchange fails.
///
/// `context` is typically the operation name and `chain` is the
/// transport-provided error stack, outermost first.
pub struct ServerError {
    /// High-level context for the failure (for example, the operation name).
    pub context: Option<String>,
    /// The transport-provided error chain.
    pub chain: Vec<ServerErrorItem>,
}

impl ServerError {
    /// Creates a diagnostic with a single chain entry.
    pub fn new(code: u64, message: impl Into<String>) -> Self {
        Self {
            context: None,
            chain: vec![ServerErrorItem::new(code, message)],
        }
    }

    /// Attaches additional context to this error.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Returns the code of the outermost chain entry, if any.
    pub fn code(&self) -> Option<u64> {
        self.chain.first().map(|item| item.code)
    }

    /// Returns a single-line, human-readable message.
    ///
    /// This is a best-effort summary of the error chain.
    pub fn message_summary(&self) -> String {
        let mut messages = Vec::new();
        for err in &self.chain {
            if let Some(message) = err.message.as_deref()
                && !message.is_empty()
            {
                messages.push(message);
            }
        }
        if messages.is_empty() {
            "unknown error".to_string()
        } else {
            messages.join("; ")
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ctx) = self.context.as_deref()
            && !ctx.is_empty()
        {
            write!(f, "{ctx}: ")?;
        }
        write!(f, "{}", self.message_summary())
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
/// Errors returned by this crate.
pub enum SvnError {
    /// The provided URL is syntactically invalid or unsupported.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// The provided path is invalid or escapes the session/repository scope.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// A corrected URL repeated while following redirects.
    #[error("redirect cycle detected for url '{0}'")]
    RedirectCycle(String),
    /// The redirect budget ran out while a correction was still pending.
    ///
    /// Retrying with a larger budget (or starting at the attached URL) may succeed.
    #[error("too many redirects; last corrected url '{0}'")]
    TooManyRedirects(String),
    /// The repository UUID differs from the one the caller expected.
    #[error("repository uuid mismatch: expected {expected}, found {actual}")]
    UuidMismatch {
        /// The UUID supplied by the caller.
        expected: String,
        /// The UUID reported by the repository.
        actual: String,
    },
    /// A compare-and-swap precondition did not hold; nothing was changed.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    /// The transport does not support the requested behavior.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The repository requested authentication but no credentials were available.
    #[error("auth required but no credentials available")]
    AuthUnavailable,
    /// Authentication failed (for example, invalid username/password).
    #[error("auth failed: {0}")]
    AuthFailed(String),
    /// An I/O error occurred while writing to an output sink.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The transport answered with something this crate cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The transport reported a failure for this exchange.
    #[error("session error: {0}")]
    Session(ServerError),
}

impl SvnError {
    /// Returns the URL attached to redirect failures.
    pub fn redirect_url(&self) -> Option<&str> {
        match self {
            Self::RedirectCycle(url) | Self::TooManyRedirects(url) => Some(url),
            _ => None,
        }
    }

    /// Returns `true` if a larger redirect budget could let the open succeed.
    pub fn is_retryable_open(&self) -> bool {
        matches!(self, Self::TooManyRedirects(_))
    }
}
