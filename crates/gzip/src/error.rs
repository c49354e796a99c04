use std::io;
use thiserror::Error;

/// Errors raised while building [`GzipOptions`](crate::GzipOptions).
///
/// These only happen at setup time, a middleware with broken configuration is
/// never constructed.
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("invalid excluded path regex `{pattern}`: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl OptionsError {
    pub fn invalid_regex<S: ToString>(pattern: S, source: regex::Error) -> Self {
        Self::InvalidRegex { pattern: pattern.to_string(), source }
    }
}

/// Errors yielded by the bodies flowing through the middleware.
#[derive(Error, Debug)]
pub enum BodyError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl BodyError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
