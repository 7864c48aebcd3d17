use std::collections::BTreeMap;
use std::fmt::Formatter;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::path::{join, split};
use crate::ra::{Dirent, OpenOutcome, OpenedTransport, RaConnector, RaTransport, RawDirListing};
use crate::url::relative_to;
use crate::{
    Credentials, Depth, DirentFields, ExpectedValue, GetDirOptions, GetFileOptions, GetFileResult,
    InheritedProps, LockDesc, LogEntry, LogEntryReceiver, LogOptions, MergeInfoCatalog,
    MergeInfoInheritance, NodeKind, PropertyList, ProgressListener, SessionContext, SvnError,
};

use super::{
    MemoryRepository, SVN_ERR_FS_NOT_DIRECTORY, SVN_ERR_FS_NOT_FILE, SVN_ERR_RA_ILLEGAL_URL,
    fs_error,
};

const MAX_AUTH_PROMPTS: usize = 3;
const CHUNK_SIZE: usize = 16 * 1024;

/// Opens [`MemoryTransport`]s on a [`MemoryRepository`].
///
/// Any URL at or below the repository root opens; other URLs fail, except
/// those registered with [`MemoryRepository::redirect`].
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    repo: MemoryRepository,
}

impl MemoryConnector {
    /// Creates a connector for `repo`.
    pub fn new(repo: MemoryRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl RaConnector for MemoryConnector {
    async fn open(
        &self,
        url: &str,
        _uuid: Option<&str>,
        ctx: &SessionContext,
    ) -> Result<OpenOutcome, SvnError> {
        self.repo.open_transport(url, ctx)
    }
}

fn authenticate(required: &Credentials, realm: &str, ctx: &SessionContext) -> Result<(), SvnError> {
    let offered = ctx.credentials();
    if offered.as_ref() == Some(required) {
        return Ok(());
    }
    let Some(prompter) = ctx.prompter() else {
        return Err(match offered {
            Some(_) => SvnError::AuthFailed("invalid username or password".into()),
            None => SvnError::AuthUnavailable,
        });
    };
    let mut username = ctx.username().map(str::to_string);
    for attempt in 1..=MAX_AUTH_PROMPTS {
        let Some(creds) = prompter.prompt(realm, username.as_deref())? else {
            return Err(SvnError::AuthFailed("authentication cancelled".into()));
        };
        if &creds == required {
            debug!(attempt, "authenticated after prompt");
            return Ok(());
        }
        username = Some(creds.username);
    }
    Err(SvnError::AuthFailed(format!(
        "no valid credentials after {MAX_AUTH_PROMPTS} attempts"
    )))
}

enum Admission {
    Redirect(String),
    Accept {
        relpath: String,
        required: Option<Credentials>,
        realm: String,
    },
}

impl MemoryRepository {
    fn open_transport(&self, url: &str, ctx: &SessionContext) -> Result<OpenOutcome, SvnError> {
        let admission = self.exchange("open", |state| {
            if let Some(target) = state.redirects.get(url) {
                return Ok(Admission::Redirect(target.clone()));
            }
            let relpath = relative_to(&state.root_url, url).map_err(|_| {
                fs_error(
                    SVN_ERR_RA_ILLEGAL_URL,
                    format!("no repository found at '{url}'"),
                )
            })?;
            Ok(Admission::Accept {
                relpath,
                required: state.credentials.clone(),
                realm: state.realm(),
            })
        })?;
        let (relpath, required, realm) = match admission {
            Admission::Redirect(target) => {
                debug!(from = url, to = %target, "memory repository redirect");
                return Ok(OpenOutcome::Redirect(target));
            }
            Admission::Accept {
                relpath,
                required,
                realm,
            } => (relpath, required, realm),
        };

        if let Some(required) = required {
            authenticate(&required, &realm, ctx)?;
        }
        if !ctx.config_overrides().is_empty() {
            debug!(
                overrides = ctx.config_overrides().len(),
                client = ctx.client_name(),
                "ignoring config overrides"
            );
        }

        let state = self.state();
        Ok(OpenOutcome::Opened(OpenedTransport {
            transport: Box::new(MemoryTransport {
                repo: self.clone(),
                session_relpath: relpath,
                progress: ctx.progress_listener(),
            }),
            repos_root_url: state.root_url.clone(),
            repos_uuid: state.uuid.clone(),
            capabilities: state.capabilities.iter().cloned().collect(),
        }))
    }
}

/// A session's connection to a [`MemoryRepository`].
pub struct MemoryTransport {
    repo: MemoryRepository,
    session_relpath: String,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("repo", &self.repo)
            .field("session_relpath", &self.session_relpath)
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

impl MemoryTransport {
    fn full_path(&self, path: &str) -> String {
        join(&self.session_relpath, path)
    }
}

#[async_trait]
impl RaTransport for MemoryTransport {
    async fn reparent(&mut self, url: &str) -> Result<(), SvnError> {
        let relpath = self
            .repo
            .exchange("reparent", |state| relative_to(&state.root_url, url))?;
        self.session_relpath = relpath;
        Ok(())
    }

    async fn latest_revision(&mut self) -> Result<u64, SvnError> {
        self.repo.exchange("get-latest-rev", |state| Ok(state.head()))
    }

    async fn dated_revision(&mut self, date: DateTime<Utc>) -> Result<u64, SvnError> {
        self.repo
            .exchange("get-dated-rev", |state| Ok(state.dated_revision(date)))
    }

    async fn rev_proplist(&mut self, rev: u64) -> Result<PropertyList, SvnError> {
        self.repo.exchange("rev-proplist", |state| {
            let rev = state.resolve(Some(rev))?;
            Ok(state.revision(rev).props.clone())
        })
    }

    async fn rev_prop(&mut self, rev: u64, name: &str) -> Result<Option<Vec<u8>>, SvnError> {
        self.repo.exchange("rev-prop", |state| {
            let rev = state.resolve(Some(rev))?;
            Ok(state.revision(rev).props.get(name).cloned())
        })
    }

    async fn change_rev_prop(
        &mut self,
        rev: u64,
        name: &str,
        expected: &ExpectedValue,
        value: Option<&[u8]>,
    ) -> Result<(), SvnError> {
        self.repo.exchange("change-rev-prop", |state| {
            state.change_rev_prop(rev, name, expected, value)
        })
    }

    async fn get_file(
        &mut self,
        path: &str,
        options: &GetFileOptions,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<GetFileResult, SvnError> {
        let full = self.full_path(path);
        let (rev, contents, props) = self.repo.exchange("get-file", |state| {
            let rev = state.resolve(options.rev)?;
            let node = state.require_node(rev, &full)?;
            if node.kind != NodeKind::File {
                return Err(fs_error(
                    SVN_ERR_FS_NOT_FILE,
                    format!("'/{full}' is not a file in revision {rev}"),
                ));
            }
            let props = options.want_props.then(|| node.props.clone());
            Ok((rev, Arc::clone(&node.contents), props))
        })?;

        let mut bytes_written = 0u64;
        if options.want_contents {
            let total = contents.len() as u64;
            for chunk in contents.chunks(CHUNK_SIZE) {
                out.write_all(chunk).await?;
                bytes_written += chunk.len() as u64;
                if let Some(progress) = &self.progress {
                    progress.on_progress(bytes_written, Some(total));
                }
            }
            out.flush().await?;
        }
        Ok(GetFileResult {
            rev,
            props,
            bytes_written,
        })
    }

    async fn get_dir(
        &mut self,
        path: &str,
        options: &GetDirOptions,
    ) -> Result<RawDirListing, SvnError> {
        let full = self.full_path(path);
        self.repo.exchange("get-dir", |state| {
            let rev = state.resolve(options.rev)?;
            let node = state.require_node(rev, &full)?;
            if node.kind != NodeKind::Dir {
                return Err(fs_error(
                    SVN_ERR_FS_NOT_DIRECTORY,
                    format!("'/{full}' is not a directory in revision {rev}"),
                ));
            }
            let props = options.want_props.then(|| node.props.clone());
            let entries = options.want_entries.then(|| {
                state
                    .revision(rev)
                    .tree
                    .iter()
                    .filter(|(key, _)| !key.is_empty() && split(key).0 == full)
                    .map(|(key, child)| {
                        let name = split(key).1.to_string();
                        (name, state.dirent(child, options.fields))
                    })
                    .collect::<BTreeMap<String, Dirent>>()
            });
            Ok(RawDirListing {
                rev,
                entries,
                props,
            })
        })
    }

    async fn get_mergeinfo(
        &mut self,
        paths: &[String],
        rev: Option<u64>,
        inherit: MergeInfoInheritance,
        include_descendants: bool,
    ) -> Result<Option<MergeInfoCatalog>, SvnError> {
        let session = self.session_relpath.clone();
        self.repo.exchange("get-mergeinfo", |state| {
            let rev = state.resolve(rev)?;
            state.mergeinfo_catalog(&session, paths, rev, inherit, include_descendants)
        })
    }

    async fn get_log(
        &mut self,
        options: &LogOptions,
        receiver: &mut (dyn LogEntryReceiver + Send),
    ) -> Result<(), SvnError> {
        let targets: Vec<String> = if options.target_paths.is_empty() {
            vec![self.session_relpath.clone()]
        } else {
            options
                .target_paths
                .iter()
                .map(|path| self.full_path(path))
                .collect()
        };
        let revs = self.repo.exchange("log", |state| {
            let start = state.resolve(options.start_rev)?;
            let end = state.resolve(options.end_rev)?;
            state.log_revisions(&targets, start, end, options.strict_node, options.limit)
        })?;

        let mut delivered = 0usize;
        for rev in revs {
            let (mut entry, merged) = {
                let state = self.repo.state();
                let merged = if options.include_merged_revisions {
                    state.merged_revisions(rev, &targets)
                } else {
                    Default::default()
                };
                (state.log_entry(rev, options), merged)
            };
            entry.has_children = !merged.is_empty();
            receiver.receive(entry)?;
            delivered += 1;
            if merged.is_empty() {
                continue;
            }
            let children = merged
                .added
                .iter()
                .map(|rev| (*rev, false))
                .chain(merged.removed.iter().map(|rev| (*rev, true)));
            for (child, subtractive) in children {
                let mut entry = self.repo.state().log_entry(child, options);
                entry.subtractive_merge = subtractive;
                receiver.receive(entry)?;
            }
            receiver.receive(LogEntry::end_of_children())?;
        }
        debug!(entries = delivered, "log stream finished");
        Ok(())
    }

    async fn check_path(&mut self, path: &str, rev: Option<u64>) -> Result<NodeKind, SvnError> {
        let full = self.full_path(path);
        self.repo.exchange("check-path", |state| {
            let rev = state.resolve(rev)?;
            Ok(state
                .node(rev, &full)
                .map_or(NodeKind::None, |node| node.kind))
        })
    }

    async fn stat(&mut self, path: &str, rev: Option<u64>) -> Result<Option<Dirent>, SvnError> {
        let full = self.full_path(path);
        self.repo.exchange("stat", |state| {
            let rev = state.resolve(rev)?;
            Ok(state
                .node(rev, &full)
                .map(|node| state.dirent(node, DirentFields::ALL)))
        })
    }

    async fn get_locks(&mut self, path: &str, depth: Depth) -> Result<Vec<LockDesc>, SvnError> {
        let full = self.full_path(path);
        self.repo
            .exchange("get-locks", |state| Ok(state.locks_under(&full, depth)))
    }

    async fn get_lock(&mut self, path: &str) -> Result<Option<LockDesc>, SvnError> {
        let full = self.full_path(path);
        self.repo
            .exchange("get-lock", |state| Ok(state.locks.get(&full).cloned()))
    }

    async fn has_capability(&mut self, name: &str) -> Result<bool, SvnError> {
        self.repo
            .exchange("has-capability", |state| state.capability(name))
    }

    async fn get_deleted_revision(
        &mut self,
        path: &str,
        peg_rev: u64,
        end_rev: u64,
    ) -> Result<Option<u64>, SvnError> {
        let full = self.full_path(path);
        self.repo.exchange("get-deleted-rev", |state| {
            state.deleted_revision(&full, peg_rev, end_rev)
        })
    }

    async fn get_inherited_props(
        &mut self,
        path: &str,
        rev: Option<u64>,
    ) -> Result<Vec<InheritedProps>, SvnError> {
        let full = self.full_path(path);
        self.repo.exchange("get-iprops", |state| {
            let rev = state.resolve(rev)?;
            state.inherited_props(&full, rev)
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Mutex;

    use super::*;
    use crate::AuthPrompter;

    fn run_async<T>(f: impl std::future::Future<Output = T>) -> T {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }

    struct ScriptedPrompter {
        answers: Mutex<Vec<Option<Credentials>>>,
        asked: Mutex<Vec<Option<String>>>,
    }

    impl AuthPrompter for ScriptedPrompter {
        fn prompt(&self, _realm: &str, username: Option<&str>) -> Result<Option<Credentials>, SvnError> {
            self.asked.lock().unwrap().push(username.map(str::to_string));
            let mut answers = self.answers.lock().unwrap();
            Ok(if answers.is_empty() { None } else { answers.remove(0) })
        }
    }

    fn opened(outcome: OpenOutcome) -> OpenedTransport {
        match outcome {
            OpenOutcome::Opened(opened) => opened,
            OpenOutcome::Redirect(url) => panic!("unexpected redirect to {url}"),
        }
    }

    #[test]
    fn open_reports_root_uuid_and_capabilities() {
        run_async(async {
            let repo = MemoryRepository::new("mem://host/repo").unwrap().with_uuid("u-1");
            let outcome = repo
                .connector()
                .open("mem://host/repo/trunk", None, &SessionContext::new())
                .await
                .unwrap();
            let opened = opened(outcome);
            assert_eq!(opened.repos_root_url, "mem://host/repo");
            assert_eq!(opened.repos_uuid, "u-1");
            assert!(opened.capabilities.contains(&"atomic-revprops".to_string()));
        });
    }

    #[test]
    fn open_outside_the_root_is_a_session_error() {
        run_async(async {
            let repo = MemoryRepository::new("mem://host/repo").unwrap();
            let err = repo
                .connector()
                .open("mem://host/other", None, &SessionContext::new())
                .await
                .unwrap_err();
            let SvnError::Session(err) = err else {
                panic!("expected a session error");
            };
            assert_eq!(err.code(), Some(SVN_ERR_RA_ILLEGAL_URL));
            assert_eq!(err.context.as_deref(), Some("open"));
        });
    }

    #[test]
    fn redirects_match_the_exact_string() {
        run_async(async {
            let repo = MemoryRepository::new("mem://host/repo").unwrap();
            repo.redirect("mem://host/old", "mem://host/repo");
            let outcome = repo
                .connector()
                .open("mem://host/old", None, &SessionContext::new())
                .await
                .unwrap();
            assert!(matches!(outcome, OpenOutcome::Redirect(ref url) if url == "mem://host/repo"));
            assert!(
                repo.connector()
                    .open("mem://host/old/", None, &SessionContext::new())
                    .await
                    .is_err()
            );
        });
    }

    #[test]
    fn credentials_are_checked_before_prompting() {
        let required = Credentials::new("alice", "secret");
        let ctx = SessionContext::new()
            .with_username("alice")
            .with_password("secret");
        authenticate(&required, "realm", &ctx).unwrap();

        let ctx = SessionContext::new();
        assert!(matches!(
            authenticate(&required, "realm", &ctx),
            Err(SvnError::AuthUnavailable)
        ));
        let ctx = SessionContext::new().with_username("alice").with_password("nope");
        assert!(matches!(
            authenticate(&required, "realm", &ctx),
            Err(SvnError::AuthFailed(_))
        ));
    }

    #[test]
    fn prompting_gives_up_after_three_wrong_answers() {
        let required = Credentials::new("alice", "secret");
        let wrong = || Some(Credentials::new("mallory", "guess"));
        let prompter = Arc::new(ScriptedPrompter {
            answers: Mutex::new(vec![wrong(), wrong(), wrong(), Some(required.clone())]),
            asked: Mutex::new(Vec::new()),
        });
        struct Shared(Arc<ScriptedPrompter>);
        impl AuthPrompter for Shared {
            fn prompt(&self, realm: &str, username: Option<&str>) -> Result<Option<Credentials>, SvnError> {
                self.0.prompt(realm, username)
            }
        }
        let ctx = SessionContext::new()
            .with_username("bob")
            .with_prompter(Shared(Arc::clone(&prompter)));
        let err = authenticate(&required, "realm", &ctx).unwrap_err();
        assert!(matches!(err, SvnError::AuthFailed(_)));
        let asked = prompter.asked.lock().unwrap().clone();
        assert_eq!(
            asked,
            vec![
                Some("bob".to_string()),
                Some("mallory".to_string()),
                Some("mallory".to_string())
            ]
        );
    }

    #[test]
    fn get_file_streams_contents_and_reports_progress() {
        run_async(async {
            let repo = MemoryRepository::new("mem://host/repo").unwrap();
            let body = vec![7u8; CHUNK_SIZE + 10];
            repo.commit("alice", "add", |txn| txn.put_file("big.bin", &body))
                .unwrap();
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let ctx = SessionContext::new().with_progress(move |done: u64, total: Option<u64>| {
                sink.lock().unwrap().push((done, total));
            });
            let mut transport = opened(
                repo.connector()
                    .open("mem://host/repo", None, &ctx)
                    .await
                    .unwrap(),
            )
            .transport;
            let mut out: Vec<u8> = Vec::new();
            let result = transport
                .get_file("big.bin", &GetFileOptions::default(), &mut out)
                .await
                .unwrap();
            assert_eq!(result.rev, 1);
            assert_eq!(result.bytes_written, body.len() as u64);
            assert_eq!(out, body);
            let total = Some(body.len() as u64);
            assert_eq!(
                *seen.lock().unwrap(),
                vec![(CHUNK_SIZE as u64, total), (body.len() as u64, total)]
            );
        });
    }
}
