//! The gzip middleware.
//!
//! [`GzipDecorator`] wraps a [`RequestHandler`] into a [`GzipRequestHandler`]. For
//! every request the wrapped handler:
//! 1. runs the configured [`RequestDecompressor`](crate::RequestDecompressor), if any
//! 2. decides whether the request may get a compressed response, see [`is_eligible`]
//! 3. invokes the inner handler
//! 4. drives the response body through a [`GzipWriter`] until it has decided, then
//!    applies the compression headers and hands the response on

use crate::body::Body;
use crate::decorator::Decorator;
use crate::handler::RequestHandler;
use crate::level::CompressionLevel;
use crate::options::GzipOptions;
use crate::writer::{GzipBody, GzipWriter};
use async_trait::async_trait;
use http::header::{ACCEPT, ACCEPT_ENCODING, CONNECTION, CONTENT_ENCODING, CONTENT_TYPE, UPGRADE};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::trace;

/// Creates a [`GzipDecorator`] with the default options.
pub fn gzip(level: CompressionLevel) -> GzipDecorator {
    GzipDecorator::new(level, GzipOptions::default())
}

/// A decorator adding gzip compression to a handler.
#[derive(Debug, Clone)]
pub struct GzipDecorator {
    level: CompressionLevel,
    options: Arc<GzipOptions>,
}

impl GzipDecorator {
    pub fn new(level: CompressionLevel, options: GzipOptions) -> Self {
        Self::with_shared_options(level, Arc::new(options))
    }

    /// Creates a decorator from options shared with other decorators.
    pub fn with_shared_options(level: CompressionLevel, options: Arc<GzipOptions>) -> Self {
        Self { level, options }
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    pub fn options(&self) -> &GzipOptions {
        &self.options
    }
}

impl<H: RequestHandler> Decorator<H> for GzipDecorator {
    type Out = GzipRequestHandler<H>;

    fn decorate(&self, raw: H) -> Self::Out {
        GzipRequestHandler { handler: raw, level: self.level, options: Arc::clone(&self.options) }
    }
}

/// A request handler compressing the responses of the handler it wraps.
#[derive(Debug)]
pub struct GzipRequestHandler<H> {
    handler: H,
    level: CompressionLevel,
    options: Arc<GzipOptions>,
}

#[async_trait]
impl<H: RequestHandler> RequestHandler for GzipRequestHandler<H> {
    async fn invoke(&self, req: Request<Body>) -> Response<Body> {
        let req = match self.options.decompressor() {
            Some(decompressor) => decompressor.decompress(req).await,
            None => req,
        };

        let eligible = is_eligible(&self.options, &req);
        let head_request = req.method() == Method::HEAD;
        let min_length = self.options.min_length();

        let resp = self.handler.invoke(req).await;

        let eligible = eligible && !head_request && is_compressible(&resp);
        let writer = GzipWriter::new(self.level, min_length, eligible);
        compress(resp, writer).await
    }
}

/// Runs the response body through `writer` until it decides, then applies the headers.
async fn compress(resp: Response<Body>, writer: GzipWriter) -> Response<Body> {
    let (mut parts, body) = resp.into_parts();

    let mut body = GzipBody::new(body, writer);
    body.decide().await;
    body.writer().write_header(&mut parts.headers);

    trace!(compressing = body.writer().is_compressing(), written = body.writer().written(), "gzip decided");
    Response::from_parts(parts, Body::stream(body))
}

/// Decides whether a request may get a compressed response.
///
/// A request is not eligible when:
/// - its `Accept-Encoding` doesn't accept gzip
/// - it asks for a protocol upgrade, like websocket
/// - it is a server-sent events request
/// - its path is excluded by the options
pub fn is_eligible<B>(options: &GzipOptions, req: &Request<B>) -> bool {
    let headers = req.headers();

    if !accepts_gzip(headers) || is_upgrade(headers) || is_event_stream(headers, ACCEPT) || is_event_stream(headers, CONTENT_TYPE) {
        return false;
    }

    !options.is_excluded(req.uri().path())
}

/// Response side checks: bodiless statuses, already encoded bodies and event streams stay as they are.
fn is_compressible(resp: &Response<Body>) -> bool {
    let status = resp.status();
    if status == StatusCode::NO_CONTENT || status == StatusCode::SWITCHING_PROTOCOLS || status == StatusCode::NOT_MODIFIED {
        return false;
    }

    // response has already encoded
    if resp.headers().contains_key(CONTENT_ENCODING) {
        return false;
    }

    !is_event_stream(resp.headers(), CONTENT_TYPE)
}

/// Returns true if `Accept-Encoding` lists `gzip` (or `x-gzip`) with a non zero quality.
///
/// The `*` wildcard is not taken as accepting gzip, the coding must be named.
fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|coding| {
            let mut params = coding.split(';').map(str::trim);
            let name = params.next().unwrap_or_default();
            if !name.eq_ignore_ascii_case("gzip") && !name.eq_ignore_ascii_case("x-gzip") {
                return false;
            }

            params
                .filter_map(|param| param.strip_prefix("q=").or_else(|| param.strip_prefix("Q=")))
                .all(|q| q.trim().parse::<f32>().map_or(true, |q| q > 0.0))
        })
}

fn is_upgrade(headers: &HeaderMap) -> bool {
    if headers.contains_key(UPGRADE) {
        return true;
    }

    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

fn is_event_stream(headers: &HeaderMap, name: http::HeaderName) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains(mime::TEXT_EVENT_STREAM.essence_str()))
}
