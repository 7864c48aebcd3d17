//! Absolute repository URLs and conversions to and from relpaths.

use crate::SvnError;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// A canonical repository URL.
///
/// Canonical form lowercases the scheme and host, drops the scheme's default
/// port, collapses repeated `/` and `.` segments, removes any trailing `/`,
/// and normalizes percent-encoding (unreserved characters decoded, unsafe
/// characters escaped, escape hex digits uppercased).
pub struct RepoUrl {
    /// Lowercased scheme (`svn`, `http`, `file`, ...).
    pub scheme: String,
    /// Lowercased host; empty for `file://` URLs.
    pub host: String,
    /// Explicit port, if it differs from the scheme default.
    pub port: Option<u16>,
    /// Full canonical URL string.
    pub url: String,
}

impl RepoUrl {
    /// Parses and canonicalizes a URL.
    ///
    /// # Examples
    ///
    /// ```
    /// # use svn_ra::RepoUrl;
    /// let url = RepoUrl::parse("SVN://Example.com:3690/repo//trunk/").unwrap();
    /// assert_eq!(url.url, "svn://example.com/repo/trunk");
    /// ```
    pub fn parse(input: &str) -> Result<Self, SvnError> {
        let input = input.trim();
        let Some((scheme, rest)) = input.split_once("://") else {
            return Err(SvnError::InvalidUrl(format!("missing scheme in url: {input}")));
        };
        if scheme.is_empty()
            || !scheme
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
        {
            return Err(SvnError::InvalidUrl(format!("invalid scheme in url: {input}")));
        }
        let scheme = scheme.to_ascii_lowercase();

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        let (userinfo, hostport) = match authority.rsplit_once('@') {
            Some((user, hostport)) => (Some(user), hostport),
            None => (None, authority),
        };

        let (host, port) = if let Some(bracketed) = hostport.strip_prefix('[') {
            let Some(end) = bracketed.find(']') else {
                return Err(SvnError::InvalidUrl(format!("invalid url: {input}")));
            };
            let host = format!("[{}]", bracketed[..end].to_ascii_lowercase());
            let after = &bracketed[end + 1..];
            let port = match after.strip_prefix(':') {
                Some(port) => parse_port(port, input)?,
                None if after.is_empty() => None,
                None => return Err(SvnError::InvalidUrl(format!("invalid url: {input}"))),
            };
            (host, port)
        } else {
            match hostport.rsplit_once(':') {
                Some((host, port)) => (host.to_ascii_lowercase(), parse_port(port, input)?),
                None => (hostport.to_ascii_lowercase(), None),
            }
        };

        if host.is_empty() && scheme != "file" {
            return Err(SvnError::InvalidUrl(format!("missing host in url: {input}")));
        }

        let port = port.filter(|p| Some(*p) != default_port(&scheme));

        let mut url = format!("{scheme}://");
        if let Some(user) = userinfo {
            url.push_str(user);
            url.push('@');
        }
        url.push_str(&host);
        if let Some(port) = port {
            url.push_str(&format!(":{port}"));
        }
        for seg in path.split('/') {
            let seg = normalize_segment(seg);
            if seg.is_empty() || seg == "." {
                continue;
            }
            url.push('/');
            url.push_str(&seg);
        }

        Ok(Self {
            scheme,
            host,
            port,
            url,
        })
    }
}

impl std::fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

impl std::str::FromStr for RepoUrl {
    type Err = SvnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Returns the canonical form of `url`.
///
/// Canonicalization is idempotent.
pub fn canonicalize_url(url: &str) -> Result<String, SvnError> {
    Ok(RepoUrl::parse(url)?.url)
}

/// Returns the (decoded) relpath of `url` below `base`.
///
/// Returns `""` when both URLs are the same and fails with
/// [`SvnError::InvalidPath`] if `url` does not lie under `base`. A `..`
/// segment, escaped or not, never lies under `base`, and neither does a
/// remainder that does not decode to UTF-8.
pub fn relative_to(base: &str, url: &str) -> Result<String, SvnError> {
    let base = canonicalize_url(base)?;
    let url = canonicalize_url(url)?;
    if url == base {
        return Ok(String::new());
    }
    let outside = || SvnError::InvalidPath(format!("url '{url}' is not a child of '{base}'"));
    let rest = url
        .strip_prefix(base.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(outside)?;
    let relpath = decode(rest).ok_or_else(outside)?;
    if relpath.split('/').any(|seg| seg == "..") {
        return Err(outside());
    }
    Ok(relpath)
}

/// Appends a relpath to `base`, escaping it as needed, and canonicalizes the result.
pub fn join_url(base: &str, relpath: &str) -> Result<String, SvnError> {
    if relpath.is_empty() {
        return canonicalize_url(base);
    }
    let mut joined = base.trim_end_matches('/').to_string();
    for seg in relpath.split('/') {
        joined.push('/');
        for b in seg.bytes() {
            push_byte(&mut joined, b);
        }
    }
    canonicalize_url(&joined)
}

/// Returns the lowercased scheme of `url`, if it has one.
pub(crate) fn scheme_of(url: &str) -> Option<String> {
    let (scheme, _) = url.trim().split_once("://")?;
    if scheme.is_empty() {
        None
    } else {
        Some(scheme.to_ascii_lowercase())
    }
}

fn parse_port(port: &str, input: &str) -> Result<Option<u16>, SvnError> {
    if port.is_empty() {
        return Ok(None);
    }
    port.parse::<u16>()
        .map(Some)
        .map_err(|_| SvnError::InvalidUrl(format!("invalid port in url: {input}")))
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        "svn" => Some(3690),
        "svn+ssh" => Some(22),
        _ => None,
    }
}

fn is_uri_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'-' | b'.'
                | b'_'
                | b'~'
                | b'!'
                | b'$'
                | b'&'
                | b'\''
                | b'('
                | b')'
                | b'*'
                | b'+'
                | b','
                | b';'
                | b'='
                | b':'
                | b'@'
        )
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn push_byte(out: &mut String, b: u8) {
    if is_uri_safe(b) {
        out.push(b as char);
    } else {
        out.push_str(&format!("%{b:02X}"));
    }
}

fn normalize_segment(seg: &str) -> String {
    let bytes = seg.as_bytes();
    let mut out = String::with_capacity(seg.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%'
            && let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).copied().and_then(hex_value),
                bytes.get(i + 2).copied().and_then(hex_value),
            )
        {
            push_byte(&mut out, (hi << 4) | lo);
            i += 3;
            continue;
        }
        push_byte(&mut out, b);
        i += 1;
    }
    out
}

fn decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).copied().and_then(hex_value),
                bytes.get(i + 2).copied().and_then(hex_value),
            )
        {
            out.push((hi << 4) | lo);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).ok()
}
