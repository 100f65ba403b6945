//! URI parsing and re-qualification

use crate::error::{UrifsError, UrifsResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Scheme given to bare paths that carry no `scheme://` prefix
pub const DEFAULT_SCHEME: &str = "file";

const SCHEME_DELIMITER: &str = "://";

/// A URI split into the three parts URIFS cares about.
///
/// Parsing is purely syntactic: there is no query/fragment handling and no
/// percent-decoding, so object keys containing `?` or `#` survive intact.
/// `Uri::parse(&uri.to_string())` always yields `uri` again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uri {
    /// Lower-cased scheme (e.g., "s3", "file", "memory")
    pub scheme: String,
    /// Host, bucket, or netloc; empty for schemes like `file:///tmp`
    pub authority: String,
    /// Everything after the authority, including the leading `/` (may be empty)
    pub path: String,
}

impl Uri {
    pub fn new(
        scheme: impl AsRef<str>,
        authority: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.as_ref().to_ascii_lowercase(),
            authority: authority.into(),
            path: path.into(),
        }
    }

    /// Parse a URI, or a bare local path which gets the `file` scheme.
    ///
    /// Bare paths starting with `~` are expanded to the home directory and
    /// relative paths are anchored at the current working directory.
    pub fn parse(uri: &str) -> UrifsResult<Self> {
        if uri.trim().is_empty() {
            return Err(UrifsError::MalformedUri("empty URI".into()));
        }

        let Some((scheme, rest)) = uri.split_once(SCHEME_DELIMITER) else {
            return Self::from_local_path(uri);
        };

        if !is_valid_scheme(scheme) {
            // `/tmp/a://b` is a local path, not a URI with a bad scheme
            if looks_local(uri) {
                return Self::from_local_path(uri);
            }
            return Err(UrifsError::MalformedUri(format!(
                "{uri}: invalid scheme '{scheme}'"
            )));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };

        Ok(Self::new(scheme, authority, path))
    }

    fn from_local_path(path: &str) -> UrifsResult<Self> {
        let expanded = if path == "~" || path.starts_with("~/") {
            let home = directories::BaseDirs::new()
                .map(|d| d.home_dir().to_path_buf())
                .ok_or_else(|| {
                    UrifsError::MalformedUri(format!("{path}: cannot determine home directory"))
                })?;
            match path[1..].trim_start_matches('/') {
                "" => home,
                rest => home.join(rest),
            }
        } else {
            PathBuf::from(path)
        };

        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            let cwd = std::env::current_dir().map_err(|e| {
                UrifsError::MalformedUri(format!("{path}: cannot resolve relative path: {e}"))
            })?;
            cwd.join(expanded)
        };

        let mut local = absolute.to_string_lossy().into_owned();
        if !local.starts_with('/') {
            local.insert(0, '/');
        }

        Ok(Self::new(DEFAULT_SCHEME, "", local))
    }

    /// The path handed to a backend; the authority root when empty.
    pub fn local_path(&self) -> &str {
        if self.path.is_empty() {
            "/"
        } else {
            &self.path
        }
    }

    /// Key used to look up credentials for this URI: `scheme://authority`.
    pub fn credential_key(&self) -> String {
        format!("{}{}{}", self.scheme, SCHEME_DELIMITER, self.authority)
    }

    /// Turn a path returned by this URI's backend into a full URI.
    ///
    /// Backends only ever return local paths, so the result is always taken
    /// as relative to the authority root, whether or not it starts with `/`.
    /// An object key that happens to look like `http://...` stays a key on
    /// this backend.
    pub fn qualify(&self, returned: &str) -> String {
        format!(
            "{}{}{}/{}",
            self.scheme,
            SCHEME_DELIMITER,
            self.authority,
            returned.trim_start_matches('/')
        )
    }

    /// Same scheme and authority, with `relative` appended to the path.
    pub fn join(&self, relative: impl AsRef<str>) -> Self {
        let relative = relative.as_ref().trim_start_matches('/');
        let base = self.path.trim_end_matches('/');
        let path = if relative.is_empty() {
            self.path.clone()
        } else {
            format!("{base}/{relative}")
        };
        Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            path,
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.trim_matches('/').is_empty()
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            self.scheme, SCHEME_DELIMITER, self.authority, self.path
        )
    }
}

impl FromStr for Uri {
    type Err = UrifsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// RFC 3986 scheme syntax: a letter followed by letters, digits, `+`, `-` or `.`
pub fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn looks_local(s: &str) -> bool {
    s.starts_with(['/', '~', '.'])
}

/// True when `s` starts with a syntactically valid `scheme://` prefix.
pub fn has_scheme(s: &str) -> bool {
    s.split_once(SCHEME_DELIMITER)
        .map(|(scheme, _)| is_valid_scheme(scheme))
        .unwrap_or(false)
}
