//! Builder-style request types for session operations.

use crate::DirentFields;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Options for [`crate::RepositorySession::get_file`].
pub struct GetFileOptions {
    /// Revision to fetch; `None` is HEAD.
    pub rev: Option<u64>,
    /// Whether to stream the file contents into the output sink.
    pub want_contents: bool,
    /// Whether to return the file properties.
    pub want_props: bool,
}

impl Default for GetFileOptions {
    fn default() -> Self {
        Self {
            rev: None,
            want_contents: true,
            want_props: false,
        }
    }
}

impl GetFileOptions {
    /// Requests contents (but not properties) at `rev`.
    pub fn at(rev: Option<u64>) -> Self {
        Self {
            rev,
            ..Self::default()
        }
    }

    /// Also requests the file properties.
    #[must_use]
    pub fn with_props(mut self) -> Self {
        self.want_props = true;
        self
    }

    /// Skips the contents; only metadata (and properties, if requested) are fetched.
    #[must_use]
    pub fn without_contents(mut self) -> Self {
        self.want_contents = false;
        self
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Options for [`crate::RepositorySession::get_dir`].
pub struct GetDirOptions {
    /// Revision to list; `None` is HEAD.
    pub rev: Option<u64>,
    /// Which entry fields to populate.
    pub fields: DirentFields,
    /// Whether to return the entries.
    pub want_entries: bool,
    /// Whether to return the directory properties.
    pub want_props: bool,
}

impl Default for GetDirOptions {
    fn default() -> Self {
        Self {
            rev: None,
            fields: DirentFields::ALL,
            want_entries: true,
            want_props: false,
        }
    }
}

impl GetDirOptions {
    /// Requests all entry fields (but not properties) at `rev`.
    pub fn at(rev: Option<u64>) -> Self {
        Self {
            rev,
            ..Self::default()
        }
    }

    /// Restricts the populated entry fields.
    #[must_use]
    pub fn with_fields(mut self, fields: DirentFields) -> Self {
        self.fields = fields;
        self
    }

    /// Also requests the directory properties.
    #[must_use]
    pub fn with_props(mut self) -> Self {
        self.want_props = true;
        self
    }

    /// Skips the entries.
    #[must_use]
    pub fn without_entries(mut self) -> Self {
        self.want_entries = false;
        self
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Which revision properties to request for `log` operations.
pub enum LogRevProps {
    /// Request all revision properties.
    All,
    /// Request only a specific set of revision property names.
    Custom(Vec<String>),
}

impl LogRevProps {
    /// Returns `true` if `name` is requested.
    pub fn wants(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Custom(names) => names.iter().any(|n| n == name),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Options for [`crate::RepositorySession::get_log`].
pub struct LogOptions {
    /// Target paths (session-relative); empty means the session root.
    pub target_paths: Vec<String>,
    /// Start revision (inclusive); `None` is HEAD.
    pub start_rev: Option<u64>,
    /// End revision (inclusive); `None` is HEAD.
    pub end_rev: Option<u64>,
    /// Whether to include changed paths in each log entry.
    pub changed_paths: bool,
    /// Whether to stop at copies instead of following them to their source.
    pub strict_node: bool,
    /// Maximum number of entries to deliver (`0` means unlimited).
    pub limit: u64,
    /// Whether to include merged revisions as child entries.
    pub include_merged_revisions: bool,
    /// Which revision properties to request.
    pub revprops: LogRevProps,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            target_paths: Vec::new(),
            start_rev: None,
            end_rev: None,
            changed_paths: false,
            strict_node: false,
            limit: 0,
            include_merged_revisions: false,
            revprops: LogRevProps::All,
        }
    }
}

impl LogOptions {
    /// Convenience constructor for a revision range.
    pub fn between(start_rev: u64, end_rev: u64) -> Self {
        Self {
            start_rev: Some(start_rev),
            end_rev: Some(end_rev),
            ..Self::default()
        }
    }

    /// Restricts the log to these paths.
    #[must_use]
    pub fn with_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Caps the number of delivered entries.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Requests changed paths for each entry.
    #[must_use]
    pub fn with_changed_paths(mut self) -> Self {
        self.changed_paths = true;
        self
    }

    /// Stops history traversal at copies.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict_node = true;
        self
    }

    /// Requests merged revisions as child entries.
    #[must_use]
    pub fn with_merged_revisions(mut self) -> Self {
        self.include_merged_revisions = true;
        self
    }

    /// Requests only the named revision properties.
    #[must_use]
    pub fn with_revprops<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.revprops = LogRevProps::Custom(names.into_iter().map(Into::into).collect());
        self
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// The value a revision property must currently have for a change to apply.
pub enum ExpectedValue {
    /// Unconditional change.
    Any,
    /// The property must not exist.
    Absent,
    /// The property must hold exactly these bytes.
    Value(Vec<u8>),
}

impl ExpectedValue {
    /// Returns `true` if `current` satisfies this expectation.
    pub fn matches(&self, current: Option<&[u8]>) -> bool {
        match self {
            Self::Any => true,
            Self::Absent => current.is_none(),
            Self::Value(expected) => current == Some(expected.as_slice()),
        }
    }

    /// Returns `true` for the compare-and-swap forms.
    pub fn is_conditional(&self) -> bool {
        !matches!(self, Self::Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_value_matches_current_value() {
        assert!(ExpectedValue::Any.matches(None));
        assert!(ExpectedValue::Any.matches(Some(b"x")));
        assert!(ExpectedValue::Absent.matches(None));
        assert!(!ExpectedValue::Absent.matches(Some(b"")));
        assert!(ExpectedValue::Value(b"x".to_vec()).matches(Some(b"x")));
        assert!(!ExpectedValue::Value(b"x".to_vec()).matches(Some(b"y")));
        assert!(!ExpectedValue::Value(b"x".to_vec()).matches(None));
        assert!(!ExpectedValue::Any.is_conditional());
        assert!(ExpectedValue::Absent.is_conditional());
    }

    #[test]
    fn log_options_builder_sets_fields() {
        let opts = LogOptions::between(10, 1)
            .with_paths(["trunk"])
            .with_limit(3)
            .with_changed_paths()
            .strict()
            .with_revprops(["svn:author"]);
        assert_eq!(opts.start_rev, Some(10));
        assert_eq!(opts.end_rev, Some(1));
        assert_eq!(opts.target_paths, vec!["trunk".to_string()]);
        assert_eq!(opts.limit, 3);
        assert!(opts.changed_paths && opts.strict_node);
        assert!(opts.revprops.wants("svn:author"));
        assert!(!opts.revprops.wants("svn:log"));
        assert!(LogRevProps::All.wants("anything"));
    }

    #[test]
    fn file_and_dir_options_default_to_head_with_payload() {
        let file = GetFileOptions::default();
        assert_eq!(file.rev, None);
        assert!(file.want_contents && !file.want_props);
        let file = GetFileOptions::at(Some(4)).with_props().without_contents();
        assert!(!file.want_contents && file.want_props);

        let dir = GetDirOptions::at(Some(2)).with_fields(DirentFields::KIND).with_props();
        assert_eq!(dir.fields, DirentFields::KIND);
        assert!(dir.want_entries && dir.want_props);
        assert!(!GetDirOptions::default().without_entries().want_entries);
    }
}
