//! Per-session configuration and callbacks handed to the transport.

use std::collections::BTreeMap;
use std::fmt::Formatter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::SvnError;

/// A username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials interactively when the transport asks for them.
pub trait AuthPrompter: Send + Sync {
    /// Asks for credentials for `realm`.
    ///
    /// `username` is the last username tried, if any. Returning `Ok(None)`
    /// gives up on authentication.
    fn prompt(&self, realm: &str, username: Option<&str>) -> Result<Option<Credentials>, SvnError>;
}

/// Receives transfer progress notifications.
pub trait ProgressListener: Send + Sync {
    /// Called with the bytes transferred so far and the total, if known.
    fn on_progress(&self, transferred: u64, total: Option<u64>);
}

impl<F> ProgressListener for F
where
    F: Fn(u64, Option<u64>) + Send + Sync,
{
    fn on_progress(&self, transferred: u64, total: Option<u64>) {
        self(transferred, total)
    }
}

/// Configuration bundle and callbacks for one repository session.
///
/// A context is moved into the session it opens and never shared with
/// another session.
#[derive(Clone)]
pub struct SessionContext {
    config_dir: Option<PathBuf>,
    config_overrides: BTreeMap<String, String>,
    username: Option<String>,
    password: Option<String>,
    prompter: Option<Arc<dyn AuthPrompter>>,
    progress: Option<Arc<dyn ProgressListener>>,
    client_name: String,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("config_dir", &self.config_dir)
            .field("config_overrides", &self.config_overrides)
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .field("has_prompter", &self.prompter.is_some())
            .field("has_progress", &self.progress.is_some())
            .field("client_name", &self.client_name)
            .finish()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// Creates an empty context with no credentials and no callbacks.
    pub fn new() -> Self {
        Self {
            config_dir: None,
            config_overrides: BTreeMap::new(),
            username: None,
            password: None,
            prompter: None,
            progress: None,
            client_name: concat!("svn-ra/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Returns the configuration directory, if set.
    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    /// Returns the configuration overrides (`section:option -> value`).
    pub fn config_overrides(&self) -> &BTreeMap<String, String> {
        &self.config_overrides
    }

    /// Returns a single configuration override.
    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config_overrides.get(key).map(String::as_str)
    }

    /// Returns the configured username, if any.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns the configured credentials if both username and password are set.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            _ => None,
        }
    }

    /// Returns the interactive prompter, if any.
    pub fn prompter(&self) -> Option<&dyn AuthPrompter> {
        self.prompter.as_deref()
    }

    /// Returns a handle to the progress listener, for transports that report progress.
    pub fn progress_listener(&self) -> Option<Arc<dyn ProgressListener>> {
        self.progress.clone()
    }

    /// Returns the client name announced to the transport.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Sets the configuration directory.
    #[must_use]
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Adds (or replaces) a configuration override.
    #[must_use]
    pub fn with_config_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config_overrides.insert(key.into(), value.into());
        self
    }

    /// Sets the username.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the interactive credential prompter.
    #[must_use]
    pub fn with_prompter(mut self, prompter: impl AuthPrompter + 'static) -> Self {
        self.prompter = Some(Arc::new(prompter));
        self
    }

    /// Sets the progress listener.
    #[must_use]
    pub fn with_progress(mut self, listener: impl ProgressListener + 'static) -> Self {
        self.progress = Some(Arc::new(listener));
        self
    }

    /// Sets the client name announced to the transport.
    #[must_use]
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn credentials_require_username_and_password() {
        let ctx = SessionContext::new().with_username("alice");
        assert_eq!(ctx.username(), Some("alice"));
        assert!(ctx.credentials().is_none());

        let ctx = ctx.with_password("secret");
        assert_eq!(ctx.credentials(), Some(Credentials::new("alice", "secret")));
    }

    #[test]
    fn debug_output_redacts_password() {
        let ctx = SessionContext::new()
            .with_username("alice")
            .with_password("hunter2");
        let debug = format!("{ctx:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!format!("{:?}", Credentials::new("a", "hunter2")).contains("hunter2"));
    }

    #[test]
    fn config_overrides_and_dir_are_kept() {
        let ctx = SessionContext::new()
            .with_config_dir("/tmp/svn-config")
            .with_config_override("servers:global:http-timeout", "30")
            .with_config_override("servers:global:http-timeout", "60")
            .with_client_name("test-client");
        assert_eq!(ctx.config_dir(), Some(Path::new("/tmp/svn-config")));
        assert_eq!(ctx.config_value("servers:global:http-timeout"), Some("60"));
        assert_eq!(ctx.config_overrides().len(), 1);
        assert_eq!(ctx.client_name(), "test-client");
    }

    #[test]
    fn closures_act_as_progress_listeners() {
        let seen = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&seen);
        let ctx = SessionContext::new().with_progress(move |transferred: u64, _total: Option<u64>| {
            sink.store(transferred, Ordering::SeqCst);
        });
        let listener = ctx.progress_listener().unwrap_or_else(|| panic!("listener missing"));
        listener.on_progress(42, Some(100));
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }
}
