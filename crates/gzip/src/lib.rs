//! gzip compression middleware for async HTTP handlers.
//!
//! The middleware decorates a [`RequestHandler`]:
//! - responses are gzip-compressed when the client accepts gzip, the request path is
//!   not excluded and the body reaches a minimum length
//! - request bodies flagged by a marker header can be decompressed before they reach
//!   the handler, see [`HeaderDecompressor`]
//!
//! # Example
//!
//! ```no_run
//! use http::{Request, Response};
//! use micro_gzip::{handler_fn, Body, CompressionLevel, Decorator, GzipDecorator, GzipOptions, RequestHandler};
//!
//! async fn ping(_req: Request<Body>) -> Response<Body> {
//!     Response::new(Body::from("pong"))
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = GzipOptions::builder().min_length(0).build()?;
//! let handler = GzipDecorator::new(CompressionLevel::DEFAULT_COMPRESSION, options).decorate(handler_fn(ping));
//!
//! let req = Request::get("/ping").header("accept-encoding", "gzip").body(Body::empty())?;
//! let resp = handler.invoke(req).await;
//! assert_eq!(resp.headers()["content-encoding"], "gzip");
//! # Ok(())
//! # }
//! ```

mod body;
mod codec;
mod decompress;
mod decorator;
mod error;
mod exclusion;
mod handler;
mod level;
mod middleware;
mod options;
mod writer;

pub use body::Body;
pub use decompress::{Decompressed, HeaderDecompressor, RequestDecompressor, DECOMPRESS_HEADER, DECOMPRESS_HEADER_VALUE};
pub use decorator::Decorator;
pub use error::{BodyError, OptionsError};
pub use exclusion::{ExcludedExtensions, ExcludedPathRegexes, ExcludedPaths, DEFAULT_EXCLUDED_EXTENSIONS};
pub use handler::{handler_fn, FnHandler, RequestHandler};
pub use level::CompressionLevel;
pub use middleware::{gzip, is_eligible, GzipDecorator, GzipRequestHandler};
pub use options::{GzipOptions, GzipOptionsBuilder, UNBOUNDED_MIN_LENGTH};
pub use writer::{GzipBody, GzipWriter};
