//! Middleware configuration.
//!
//! [`GzipOptions`] is built once with [`GzipOptionsBuilder`] while setting up the
//! middleware, then shared read-only by every request.
//!
//! # Example
//!
//! ```
//! use micro_gzip::{GzipOptions, HeaderDecompressor};
//!
//! let options = GzipOptions::builder()
//!     .excluded_extensions([".png", ".webp"])
//!     .excluded_paths(["/metrics"])
//!     .excluded_path_regexes([r"^/downloads/.*\.bin$"])
//!     .min_length(1024)
//!     .decompressor(HeaderDecompressor::default())
//!     .build()
//!     .unwrap();
//!
//! assert!(options.is_excluded("/logo.webp"));
//! assert!(!options.is_excluded("/index.html"));
//! ```

use crate::decompress::RequestDecompressor;
use crate::error::OptionsError;
use crate::exclusion::{path_extension, ExcludedExtensions, ExcludedPathRegexes, ExcludedPaths};
use std::fmt;
use std::sync::Arc;

/// Threshold used when no minimum length is configured: bodies are never long enough.
pub const UNBOUNDED_MIN_LENGTH: u64 = u64::MAX;

type MinLengthFn = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Immutable configuration of the gzip middleware.
#[derive(Clone)]
pub struct GzipOptions {
    excluded_extensions: ExcludedExtensions,
    excluded_paths: ExcludedPaths,
    excluded_path_regexes: ExcludedPathRegexes,
    min_length: MinLengthFn,
    decompressor: Option<Arc<dyn RequestDecompressor>>,
}

impl GzipOptions {
    pub fn builder() -> GzipOptionsBuilder {
        GzipOptionsBuilder::new()
    }

    pub fn excluded_extensions(&self) -> &ExcludedExtensions {
        &self.excluded_extensions
    }

    pub fn excluded_paths(&self) -> &ExcludedPaths {
        &self.excluded_paths
    }

    pub fn excluded_path_regexes(&self) -> &ExcludedPathRegexes {
        &self.excluded_path_regexes
    }

    /// Evaluates the minimum compressible length for a new request.
    pub fn min_length(&self) -> u64 {
        (self.min_length)()
    }

    pub fn decompressor(&self) -> Option<&dyn RequestDecompressor> {
        self.decompressor.as_deref()
    }

    /// Returns true if the path matches any excluded extension, prefix or pattern.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_extensions.contains(path_extension(path))
            || self.excluded_paths.contains(path)
            || self.excluded_path_regexes.contains(path)
    }
}

impl Default for GzipOptions {
    fn default() -> Self {
        Self {
            excluded_extensions: ExcludedExtensions::default_set(),
            excluded_paths: ExcludedPaths::default(),
            excluded_path_regexes: ExcludedPathRegexes::default(),
            min_length: Arc::new(|| UNBOUNDED_MIN_LENGTH),
            decompressor: None,
        }
    }
}

impl fmt::Debug for GzipOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipOptions")
            .field("excluded_extensions", &self.excluded_extensions)
            .field("excluded_paths", &self.excluded_paths)
            .field("excluded_path_regexes", &self.excluded_path_regexes)
            .field("decompressor", &self.decompressor.is_some())
            .finish_non_exhaustive()
    }
}

pub struct GzipOptionsBuilder {
    excluded_extensions: ExcludedExtensions,
    excluded_paths: ExcludedPaths,
    excluded_path_regexes: Vec<String>,
    min_length: MinLengthFn,
    decompressor: Option<Arc<dyn RequestDecompressor>>,
}

impl GzipOptionsBuilder {
    fn new() -> Self {
        let defaults = GzipOptions::default();
        Self {
            excluded_extensions: defaults.excluded_extensions,
            excluded_paths: defaults.excluded_paths,
            excluded_path_regexes: vec![],
            min_length: defaults.min_length,
            decompressor: None,
        }
    }

    /// Replaces the default excluded extensions, each one including its leading dot.
    pub fn excluded_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_extensions = ExcludedExtensions::new(extensions);
        self
    }

    pub fn excluded_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_paths = ExcludedPaths::new(paths);
        self
    }

    /// Sets the excluded path patterns, they are compiled by [`build`](Self::build).
    pub fn excluded_path_regexes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_path_regexes = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets a fixed minimum body length, in bytes, below which responses are not compressed.
    pub fn min_length(self, min_length: u64) -> Self {
        self.min_length_fn(move || min_length)
    }

    /// Sets a function evaluated at the start of every request to get the minimum length.
    pub fn min_length_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        self.min_length = Arc::new(f);
        self
    }

    pub fn decompressor<D: RequestDecompressor + 'static>(mut self, decompressor: D) -> Self {
        self.decompressor = Some(Arc::new(decompressor));
        self
    }

    pub fn build(self) -> Result<GzipOptions, OptionsError> {
        let excluded_path_regexes = ExcludedPathRegexes::new(&self.excluded_path_regexes)?;
        Ok(GzipOptions {
            excluded_extensions: self.excluded_extensions,
            excluded_paths: self.excluded_paths,
            excluded_path_regexes,
            min_length: self.min_length,
            decompressor: self.decompressor,
        })
    }
}

impl fmt::Debug for GzipOptionsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipOptionsBuilder")
            .field("excluded_extensions", &self.excluded_extensions)
            .field("excluded_paths", &self.excluded_paths)
            .field("excluded_path_regexes", &self.excluded_path_regexes)
            .field("decompressor", &self.decompressor.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{GzipOptions, UNBOUNDED_MIN_LENGTH};
    use crate::decompress::HeaderDecompressor;
    use crate::error::OptionsError;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_default_options() {
        let options = GzipOptions::default();

        assert_eq!(options.min_length(), UNBOUNDED_MIN_LENGTH);
        assert!(options.decompressor().is_none());
        assert!(options.is_excluded("/image.png"));
        assert!(options.is_excluded("/assets/photo.jpeg"));
        assert!(!options.is_excluded("/ping"));
    }

    #[test]
    fn test_builder_replaces_extensions() {
        let options = GzipOptions::builder().excluded_extensions([".zip"]).build().unwrap();

        assert!(options.is_excluded("/archive.zip"));
        assert!(!options.is_excluded("/image.png"));
    }

    #[test]
    fn test_builder_paths_and_regexes() {
        let options = GzipOptions::builder()
            .excluded_paths(["/api/stream"])
            .excluded_path_regexes([r"^/v\d+/export"])
            .build()
            .unwrap();

        assert!(options.is_excluded("/api/stream/events"));
        assert!(options.is_excluded("/v2/export/all"));
        assert!(!options.is_excluded("/api/users"));
    }

    #[test]
    fn test_builder_invalid_regex() {
        let result = GzipOptions::builder().excluded_path_regexes(["[unclosed"]).build();
        assert!(matches!(result, Err(OptionsError::InvalidRegex { .. })));
    }

    #[test]
    fn test_dynamic_min_length() {
        let threshold = Arc::new(AtomicU64::new(16));
        let threshold_in_fn = Arc::clone(&threshold);
        let options = GzipOptions::builder()
            .min_length_fn(move || threshold_in_fn.load(Ordering::Relaxed))
            .build()
            .unwrap();

        assert_eq!(options.min_length(), 16);
        threshold.store(512, Ordering::Relaxed);
        assert_eq!(options.min_length(), 512);
    }

    #[test]
    fn test_fixed_min_length_and_decompressor() {
        let options = GzipOptions::builder().min_length(0).decompressor(HeaderDecompressor::default()).build().unwrap();

        assert_eq!(options.min_length(), 0);
        assert!(options.decompressor().is_some());
    }
}
