//! Path based exclusion rules.
//!
//! A request is kept away from compression when any of the three collections
//! matches its path:
//! - [`ExcludedExtensions`]: exact match on the extension of the last path segment
//! - [`ExcludedPaths`]: plain string prefix match
//! - [`ExcludedPathRegexes`]: regular expression match against the whole path

use crate::error::OptionsError;
use regex::Regex;
use std::collections::HashSet;

/// Extensions skipped when no other set is configured.
pub const DEFAULT_EXCLUDED_EXTENSIONS: [&str; 4] = [".png", ".gif", ".jpeg", ".jpg"];

/// A set of file extensions, each including its leading dot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludedExtensions {
    inner: HashSet<String>,
}

impl ExcludedExtensions {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { inner: extensions.into_iter().map(Into::into).collect() }
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.inner.contains(extension)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The default set, see [`DEFAULT_EXCLUDED_EXTENSIONS`].
    pub fn default_set() -> Self {
        Self::new(DEFAULT_EXCLUDED_EXTENSIONS)
    }
}

/// An ordered list of path prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludedPaths {
    inner: Vec<String>,
}

impl ExcludedPaths {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { inner: paths.into_iter().map(Into::into).collect() }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.inner.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// An ordered list of compiled path patterns.
#[derive(Debug, Clone, Default)]
pub struct ExcludedPathRegexes {
    inner: Vec<Regex>,
}

impl ExcludedPathRegexes {
    /// Compiles every pattern, the first invalid one is reported.
    pub fn new<I, S>(patterns: I) -> Result<Self, OptionsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let inner = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|e| OptionsError::invalid_regex(pattern, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { inner })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.inner.iter().any(|regex| regex.is_match(path))
    }
}

/// Returns the extension of the last path segment, including the dot.
///
/// `"/static/app.min.js"` gives `".js"`, `"/static/"` and `"/LICENSE"` give `""`.
pub(crate) fn path_extension(path: &str) -> &str {
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[segment_start..].rfind('.') {
        Some(dot) => &path[segment_start + dot..],
        None => "",
    }
}
