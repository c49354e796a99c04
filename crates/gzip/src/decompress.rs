//! Request body decompression.
//!
//! Clients may send gzip-compressed request bodies, flagged by a marker header
//! ([`DECOMPRESS_HEADER`]: [`DECOMPRESS_HEADER_VALUE`] by default). The
//! [`HeaderDecompressor`] swaps such a body for a streaming gzip decoder, so the
//! downstream handler reads plain bytes.
//!
//! A body that doesn't start with a gzip header is left as it is: the request goes
//! on with the original bytes and a warning is logged.

use crate::body::Body;
use crate::codec::{is_gzip_header, Decoder, GZIP_HEADER_LEN};
use crate::error::BodyError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use http::{HeaderName, HeaderValue, Request};
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::{BodyExt, BodyStream, StreamBody};
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tracing::{trace, warn};

pub const DECOMPRESS_HEADER: &str = "x-puzzle-compress";
pub const DECOMPRESS_HEADER_VALUE: &str = "gzip";

/// Hook run on every request before it reaches the handler.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestDecompressor: Send + Sync {
    async fn decompress(&self, req: Request<Body>) -> Request<Body>;
}

/// Inserted into the request extensions when the body has been replaced by a decoder.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Decompressed;

/// Decompresses request bodies flagged by a marker header.
#[derive(Debug, Clone)]
pub struct HeaderDecompressor {
    header: HeaderName,
    value: HeaderValue,
}

impl HeaderDecompressor {
    pub fn new(header: HeaderName, value: HeaderValue) -> Self {
        Self { header, value }
    }
}

impl Default for HeaderDecompressor {
    fn default() -> Self {
        Self::new(HeaderName::from_static(DECOMPRESS_HEADER), HeaderValue::from_static(DECOMPRESS_HEADER_VALUE))
    }
}

#[async_trait]
impl RequestDecompressor for HeaderDecompressor {
    async fn decompress(&self, req: Request<Body>) -> Request<Body> {
        if req.headers().get(&self.header) != Some(&self.value) {
            return req;
        }

        if req.body().is_end_stream() {
            return req;
        }

        let (mut parts, mut body) = req.into_parts();

        let (head, trailers) = match read_head(&mut body).await {
            Ok(read) => read,
            Err(e) => {
                warn!(cause = %e, "failed to read compressed request body");
                return Request::from_parts(parts, Body::stream(ErrorBody::new(e)));
            }
        };

        // a body ending with trailers before a full gzip header can't be gzip
        if trailers.is_some() || !is_gzip_header(&head) {
            warn!(len = head.len(), "request body is not gzip encoded, keep the original body");
            return Request::from_parts(parts, replay(head, trailers, body));
        }

        trace!("decompress gzip request body");
        parts.headers.remove(CONTENT_ENCODING);
        parts.headers.remove(CONTENT_LENGTH);
        parts.extensions.insert(Decompressed);

        Request::from_parts(parts, Body::stream(GunzipBody::new(head, body)))
    }
}

/// Reads at least the gzip fixed header from the body, or all of it if shorter.
///
/// Stops early on a non data frame, which is returned alongside the bytes read so far.
async fn read_head(body: &mut Body) -> Result<(Bytes, Option<Frame<Bytes>>), BodyError> {
    let mut head = BytesMut::new();
    while head.len() < GZIP_HEADER_LEN {
        match body.frame().await {
            Some(Ok(frame)) => match frame.into_data() {
                Ok(data) => head.extend_from_slice(&data),
                Err(frame) => {
                    trace!(len = head.len(), "non data frame before the gzip header");
                    return Ok((head.freeze(), Some(frame)));
                }
            },
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }
    Ok((head.freeze(), None))
}

/// Rebuilds a body yielding `head`, then `trailers` if any, then the rest of `body`.
fn replay(head: Bytes, trailers: Option<Frame<Bytes>>, body: Body) -> Body {
    let read = std::iter::once(Frame::data(head)).chain(trailers).map(Ok);
    Body::stream(StreamBody::new(futures::stream::iter(read).chain(BodyStream::new(body))))
}

pin_project! {
    /// A request body inflating its gzip-encoded inner body.
    struct GunzipBody<B> {
        #[pin]
        inner: B,
        decoder: Option<Decoder>,
        queued: VecDeque<Result<Frame<Bytes>, BodyError>>,
        done: bool,
    }
}

impl<B> GunzipBody<B> {
    fn new(head: Bytes, inner: B) -> Self {
        let mut body = Self { inner, decoder: Some(Decoder::gzip()), queued: VecDeque::new(), done: false };
        body.decode(&head);
        body
    }

    fn decode(&mut self, data: &[u8]) {
        decode(&mut self.decoder, &mut self.queued, &mut self.done, data);
    }
}

fn decode(
    decoder: &mut Option<Decoder>,
    queued: &mut VecDeque<Result<Frame<Bytes>, BodyError>>,
    done: &mut bool,
    data: &[u8],
) {
    let Some(inner) = decoder.as_mut() else {
        return;
    };

    match inner.write(data) {
        Ok(()) => {
            let bytes = inner.take();
            if !bytes.is_empty() {
                queued.push_back(Ok(Frame::data(bytes)));
            }
        }
        Err(e) => {
            decoder.take();
            *done = true;
            queued.push_back(Err(BodyError::from(e)));
        }
    }
}

fn finish(decoder: &mut Option<Decoder>, queued: &mut VecDeque<Result<Frame<Bytes>, BodyError>>) {
    let Some(inner) = decoder.take() else {
        return;
    };

    match inner.finish() {
        Ok(bytes) if bytes.is_empty() => (),
        Ok(bytes) => queued.push_back(Ok(Frame::data(bytes))),
        Err(e) => queued.push_back(Err(BodyError::from(e))),
    }
}

impl<B> HttpBody for GunzipBody<B>
where
    B: HttpBody<Data = Bytes, Error = BodyError>,
{
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.queued.pop_front() {
                return Poll::Ready(Some(item));
            }

            if *this.done {
                return Poll::Ready(None);
            }

            match ready!(this.inner.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => decode(this.decoder, this.queued, this.done, &data),
                    Err(frame) => {
                        finish(this.decoder, this.queued);
                        this.queued.push_back(Ok(frame));
                    }
                },
                Some(Err(e)) => {
                    this.decoder.take();
                    *this.done = true;
                    this.queued.push_back(Err(e));
                }
                None => {
                    *this.done = true;
                    finish(this.decoder, this.queued);
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done && self.queued.is_empty()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

/// A body failing once with an error met before the handler got the request.
struct ErrorBody {
    error: Option<BodyError>,
}

impl ErrorBody {
    fn new(error: BodyError) -> Self {
        Self { error: Some(error) }
    }
}

impl HttpBody for ErrorBody {
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.get_mut().error.take().map(Err))
    }

    fn is_end_stream(&self) -> bool {
        self.error.is_none()
    }
}
