//! The per-request response writer.
//!
//! [`GzipWriter`] sits between a handler's response body and the client. Every data
//! frame of the body is one write; the writer decides on the cumulative length
//! whether the response gets gzip-compressed, and sticks to that decision for the
//! rest of the request:
//!
//! ```text
//! Undecided ──(ineligible / finished short)──> PassThrough
//!     │
//!     └──(written >= min_length)──> Compressing ──(finish)──> Closed
//! ```
//!
//! Writes made while undecided are held back, so the compression headers can still
//! be applied with [`GzipWriter::write_header`] before the first byte goes out.
//! [`GzipBody`] drives a writer over a whole body.

use crate::codec::Encoder;
use crate::error::BodyError;
use crate::level::CompressionLevel;
use bytes::{Buf, Bytes, BytesMut};
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, VARY};
use http::{HeaderMap, HeaderValue};
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tracing::{debug, error, trace, warn};

enum State {
    Undecided,
    PassThrough,
    Compressing(Encoder),
    Closed,
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Undecided => "Undecided",
            State::PassThrough => "PassThrough",
            State::Compressing(_) => "Compressing",
            State::Closed => "Closed",
        })
    }
}

/// Decides, write by write, whether a response body is gzip-compressed.
#[derive(Debug)]
pub struct GzipWriter {
    min_length: u64,
    eligible: bool,
    written: u64,
    level: CompressionLevel,
    pending: BytesMut,
    state: State,
}

impl GzipWriter {
    /// Creates a writer for one request.
    ///
    /// `eligible` is the request level verdict of the handler, a writer that is not
    /// eligible never compresses.
    pub fn new(level: CompressionLevel, min_length: u64, eligible: bool) -> Self {
        let state = if eligible { State::Undecided } else { State::PassThrough };
        Self { min_length, eligible, written: 0, level, pending: BytesMut::new(), state }
    }

    /// Returns true while no decision has been taken.
    pub fn is_undecided(&self) -> bool {
        matches!(self.state, State::Undecided)
    }

    /// Returns true while the gzip stream is open.
    pub fn is_compressing(&self) -> bool {
        matches!(self.state, State::Compressing(_))
    }

    /// Total number of bytes written by the handler so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Takes the pass-through decision early when the threshold can't be reached.
    ///
    /// The writer never starts compressing here: that only happens on a write.
    pub fn observe_size_hint(&mut self, size_hint: &SizeHint) {
        if !self.is_undecided() {
            return;
        }

        let too_short = match size_hint.exact() {
            Some(len) => self.written.saturating_add(len) < self.min_length,
            None => false,
        };

        if self.min_length == u64::MAX || too_short {
            trace!(min_length = self.min_length, "body can't reach the compress threshold");
            self.state = State::PassThrough;
        }
    }

    /// Writes a chunk of the response body.
    ///
    /// Returns the bytes that are ready to be sent to the client, which may be empty
    /// while the writer is undecided or while the encoder buffers.
    pub fn write(&mut self, data: Bytes) -> Bytes {
        self.written = self.written.saturating_add(data.len() as u64);

        if self.is_undecided() {
            self.try_compress();
        }

        match &mut self.state {
            State::Undecided => {
                self.pending.extend_from_slice(&data);
                Bytes::new()
            }
            State::PassThrough => {
                if self.pending.is_empty() {
                    data
                } else {
                    self.pending.extend_from_slice(&data);
                    self.pending.split().freeze()
                }
            }
            State::Compressing(encoder) => {
                let pending = self.pending.split();
                let result = encoder.write(&pending).and_then(|()| encoder.write(&data));
                match result {
                    Ok(()) => encoder.take(),
                    Err(e) => {
                        error!(cause = %e, "failed to write gzip stream, discard the rest of the body");
                        self.close();
                        Bytes::new()
                    }
                }
            }
            State::Closed => {
                trace!(len = data.len(), "write after the gzip stream closed, discard it");
                Bytes::new()
            }
        }
    }

    fn try_compress(&mut self) {
        if !self.eligible {
            self.state = State::PassThrough;
            return;
        }

        if self.written < self.min_length {
            return;
        }

        self.state = match Encoder::gzip(self.level) {
            Ok(encoder) => {
                debug!(written = self.written, min_length = self.min_length, "start gzip compressing");
                State::Compressing(encoder)
            }
            Err(e) => {
                warn!(cause = %e, level = %self.level, "failed to create gzip encoder, send response uncompressed");
                State::PassThrough
            }
        };
    }

    /// Applies the compression headers when compressing.
    ///
    /// Sets `Content-Encoding: gzip`, adds `Accept-Encoding` to `Vary` and removes
    /// `Content-Length`, which no longer matches the body. Headers are left untouched
    /// when the response is not compressed.
    pub fn write_header(&self, headers: &mut HeaderMap) {
        if !self.is_compressing() {
            return;
        }

        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.remove(CONTENT_LENGTH);

        let vary_has_accept_encoding = headers.get_all(VARY).iter().any(|value| {
            value.to_str().is_ok_and(|value| {
                value.split(',').map(str::trim).any(|name| name == "*" || name.eq_ignore_ascii_case(ACCEPT_ENCODING.as_str()))
            })
        });
        if !vary_has_accept_encoding {
            headers.append(VARY, HeaderValue::from_static("Accept-Encoding"));
        }
    }

    /// Ends the body, returning the last bytes for the client.
    ///
    /// An undecided writer turns pass-through and releases the held back bytes, a
    /// compressing writer writes the gzip trailer. Calling it again returns nothing.
    pub fn finish(&mut self) -> Bytes {
        match mem::replace(&mut self.state, State::Closed) {
            State::Undecided | State::PassThrough => {
                self.state = State::PassThrough;
                self.pending.split().freeze()
            }
            State::Compressing(encoder) => match encoder.finish() {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(cause = %e, "failed to finish gzip stream");
                    Bytes::new()
                }
            },
            State::Closed => Bytes::new(),
        }
    }

    /// Releases the gzip stream, if any, without producing output.
    fn close(&mut self) {
        if let State::Compressing(encoder) = mem::replace(&mut self.state, State::Closed) {
            if let Err(e) = encoder.finish() {
                debug!(cause = %e, "ignore error while closing gzip stream");
            }
        }
    }
}

impl Drop for GzipWriter {
    fn drop(&mut self) {
        if self.is_compressing() {
            trace!(written = self.written, "gzip stream dropped before the body ended");
            self.close();
        }
    }
}

pin_project! {
    /// A body whose data frames are written through a [`GzipWriter`].
    pub struct GzipBody<B> {
        #[pin]
        inner: B,
        writer: GzipWriter,
        queued: VecDeque<Result<Frame<Bytes>, BodyError>>,
        inner_done: bool,
    }
}

impl<B> GzipBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: ToString,
{
    pub fn new(inner: B, mut writer: GzipWriter) -> Self {
        writer.observe_size_hint(&inner.size_hint());
        Self { inner, writer, queued: VecDeque::new(), inner_done: false }
    }

    pub fn writer(&self) -> &GzipWriter {
        &self.writer
    }

    /// Pulls frames from the inner body until the writer has decided.
    ///
    /// The frames read here are kept and yielded first when the body is polled.
    pub async fn decide(&mut self)
    where
        B: Unpin,
    {
        while self.writer.is_undecided() && !self.inner_done {
            let item = self.inner.frame().await;
            on_item(&mut self.writer, &mut self.queued, &mut self.inner_done, item);
        }
    }
}

fn on_item<D, E>(
    writer: &mut GzipWriter,
    queued: &mut VecDeque<Result<Frame<Bytes>, BodyError>>,
    inner_done: &mut bool,
    item: Option<Result<Frame<D>, E>>,
) where
    D: Buf,
    E: ToString,
{
    let push_data = |queued: &mut VecDeque<_>, bytes: Bytes| {
        if !bytes.is_empty() {
            queued.push_back(Ok(Frame::data(bytes)));
        }
    };

    match item {
        Some(Ok(frame)) => match frame.into_data() {
            Ok(mut data) => {
                let bytes = data.copy_to_bytes(data.remaining());
                push_data(queued, writer.write(bytes));
            }
            Err(frame) => match frame.into_trailers() {
                Ok(trailers) => {
                    // trailers end the body, the gzip stream must be complete before them
                    push_data(queued, writer.finish());
                    queued.push_back(Ok(Frame::trailers(trailers)));
                }
                Err(_) => trace!("ignore unknown frame kind"),
            },
        },
        Some(Err(e)) => {
            *inner_done = true;
            writer.close();
            queued.push_back(Err(BodyError::invalid_body(e.to_string())));
        }
        None => {
            *inner_done = true;
            push_data(queued, writer.finish());
        }
    }
}

impl<B> Body for GzipBody<B>
where
    B: Body,
    B::Error: ToString,
{
    type Data = Bytes;
    type Error = BodyError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.queued.pop_front() {
                return Poll::Ready(Some(item));
            }

            if *this.inner_done {
                return Poll::Ready(None);
            }

            let item = ready!(this.inner.as_mut().poll_frame(cx));
            on_item(this.writer, this.queued, this.inner_done, item);
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner_done && self.queued.is_empty()
    }

    fn size_hint(&self) -> SizeHint {
        if self.writer.is_compressing() || !self.queued.is_empty() {
            return SizeHint::default();
        }
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::{GzipBody, GzipWriter};
    use crate::error::BodyError;
    use crate::level::CompressionLevel;
    use bytes::{Bytes, BytesMut};
    use flate2::read::GzDecoder;
    use futures::TryStreamExt;
    use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, VARY};
    use http::{HeaderMap, HeaderValue};
    use http_body::{Body, Frame, SizeHint};
    use http_body_util::{BodyExt, StreamBody};
    use std::io::Read;

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut decoded = vec![];
        GzDecoder::new(data).read_to_end(&mut decoded).unwrap();
        decoded
    }

    fn write_all(writer: &mut GzipWriter, chunks: &[&'static str]) -> Bytes {
        let mut out = BytesMut::new();
        for chunk in chunks {
            out.extend_from_slice(&writer.write(Bytes::from_static(chunk.as_bytes())));
        }
        out.extend_from_slice(&writer.finish());
        out.freeze()
    }

    fn stream_body(chunks: Vec<Bytes>) -> impl Body<Data = Bytes, Error = BodyError> + Unpin {
        let frames = chunks.into_iter().map(|chunk| Ok::<_, BodyError>(Frame::data(chunk)));
        StreamBody::new(futures::stream::iter(frames))
    }

    #[test]
    fn test_short_body_passes_through() {
        let mut writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 64, true);

        let out = write_all(&mut writer, &["short ", "body"]);

        assert!(!writer.is_compressing());
        assert_eq!(out, Bytes::from("short body"));
    }

    #[test]
    fn test_threshold_zero_compresses() {
        let mut writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 0, true);

        let out = write_all(&mut writer, &["pong 12345"]);

        assert_eq!(writer.written(), 10);
        assert_eq!(gunzip(&out), b"pong 12345");
    }

    #[test]
    fn test_cumulative_length_decides() {
        let mut writer = GzipWriter::new(CompressionLevel::BEST_SPEED, 8, true);

        assert!(writer.write(Bytes::from_static(b"a")).is_empty());
        assert!(writer.is_undecided());
        assert!(writer.write(Bytes::from_static(b"b")).is_empty());
        assert!(writer.is_undecided());

        let mut out = BytesMut::new();
        out.extend_from_slice(&writer.write(Bytes::from_static(b"cdefghijkl")));
        assert!(writer.is_compressing());
        out.extend_from_slice(&writer.finish());

        assert_eq!(gunzip(&out), b"abcdefghijkl");
    }

    #[test]
    fn test_threshold_met_exactly() {
        let mut writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 10, true);
        writer.observe_size_hint(&SizeHint::with_exact(10));
        assert!(writer.is_undecided());

        let mut out = BytesMut::from(writer.write(Bytes::from_static(b"pong 12345")).as_ref());
        assert!(writer.is_compressing());
        out.extend_from_slice(&writer.finish());

        assert_eq!(gunzip(&out), b"pong 12345");
    }

    #[test]
    fn test_drop_while_compressing() {
        let mut writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 0, true);
        writer.write(Bytes::from_static(b"never finished"));
        assert!(writer.is_compressing());

        drop(writer);
    }

    #[test]
    fn test_drop_after_finish() {
        let mut writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 0, true);
        writer.write(Bytes::from_static(b"finished"));
        assert!(!writer.finish().is_empty());
        assert!(!writer.is_compressing());

        drop(writer);
    }

    #[test]
    fn test_ineligible_never_compresses() {
        let mut writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 0, false);

        assert!(!writer.is_undecided());
        let out = write_all(&mut writer, &["plain"]);

        assert!(!writer.is_compressing());
        assert_eq!(out, Bytes::from("plain"));
    }

    #[test]
    fn test_invalid_level_falls_back_to_pass_through() {
        let mut writer = GzipWriter::new(CompressionLevel::new(42), 0, true);

        let out = write_all(&mut writer, &["still ", "delivered"]);

        assert!(!writer.is_compressing());
        assert_eq!(out, Bytes::from("still delivered"));
    }

    #[test]
    fn test_finish_twice() {
        let mut writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 0, true);
        writer.write(Bytes::from_static(b"data"));

        assert!(!writer.finish().is_empty());
        assert!(writer.finish().is_empty());
        assert!(writer.write(Bytes::from_static(b"late")).is_empty());
    }

    #[test]
    fn test_size_hint_decides_pass_through() {
        let mut writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 100, true);
        writer.observe_size_hint(&SizeHint::with_exact(10));
        assert!(!writer.is_undecided());

        let mut writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 100, true);
        writer.observe_size_hint(&SizeHint::with_exact(1000));
        assert!(writer.is_undecided());

        let mut writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, u64::MAX, true);
        writer.observe_size_hint(&SizeHint::default());
        assert!(!writer.is_undecided());
    }

    #[test]
    fn test_write_header_when_compressing() {
        let mut writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 0, true);
        writer.write(Bytes::from_static(b"body"));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("4"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(VARY, HeaderValue::from_static("Origin"));
        writer.write_header(&mut headers);

        assert_eq!(headers.get(CONTENT_ENCODING).unwrap(), "gzip");
        assert!(headers.get(CONTENT_LENGTH).is_none());
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain");
        let vary: Vec<_> = headers.get_all(VARY).iter().collect();
        assert_eq!(vary, vec!["Origin", "Accept-Encoding"]);

        // applying twice doesn't duplicate Vary
        writer.write_header(&mut headers);
        assert_eq!(headers.get_all(VARY).iter().count(), 2);
    }

    #[test]
    fn test_write_header_when_passing_through() {
        let mut writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 1024, true);
        writer.write(Bytes::from_static(b"body"));
        writer.finish();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("4"));
        writer.write_header(&mut headers);

        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "4");
        assert!(headers.get(CONTENT_ENCODING).is_none());
        assert!(headers.get(VARY).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_body_decides_on_cumulative_length() {
        let payload = "x".repeat(64);
        let writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 32, true);
        let chunks = vec![Bytes::from_static(b"a"), Bytes::from_static(b"b"), Bytes::from(payload.clone())];
        let mut body = GzipBody::new(stream_body(chunks), writer);

        body.decide().await;
        assert!(body.writer().is_compressing());

        let compressed = body.collect().await.unwrap().to_bytes();
        let mut expected = String::from("ab");
        expected.push_str(&payload);
        assert_eq!(gunzip(&compressed), expected.as_bytes());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_body_short_stream_passes_through() {
        let writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 1024, true);
        let chunks = vec![Bytes::from_static(b"hello"), Bytes::from_static(b" "), Bytes::from_static(b"world")];
        let mut body = GzipBody::new(stream_body(chunks), writer);

        body.decide().await;
        assert!(!body.writer().is_compressing());
        assert!(!body.writer().is_undecided());

        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(bytes, Bytes::from("hello world"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_body_dropped_mid_stream() {
        let writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 0, true);
        let chunks = vec![Bytes::from("a".repeat(128)), Bytes::from("b".repeat(128)), Bytes::from("c".repeat(128))];
        let mut body = GzipBody::new(stream_body(chunks), writer);

        body.decide().await;
        assert!(body.writer().is_compressing());
        assert!(body.frame().await.is_some());
        assert!(body.writer().is_compressing());

        drop(body);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_body_dropped_after_end() {
        let writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 0, true);
        let mut body = GzipBody::new(stream_body(vec![Bytes::from_static(b"complete body")]), writer);

        let mut compressed = BytesMut::new();
        while let Some(frame) = body.frame().await {
            if let Ok(data) = frame.unwrap().into_data() {
                compressed.extend_from_slice(&data);
            }
        }
        assert!(body.is_end_stream());
        assert!(!body.writer().is_compressing());
        drop(body);

        assert_eq!(gunzip(&compressed), b"complete body");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_body_forwards_inner_error() {
        let frames: Vec<Result<Frame<Bytes>, BodyError>> =
            vec![Ok(Frame::data(Bytes::from_static(b"partial"))), Err(BodyError::invalid_body("boom"))];
        let inner = StreamBody::new(futures::stream::iter(frames));
        let writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 0, true);
        let body = GzipBody::new(inner, writer);

        let result: Result<Vec<_>, _> = http_body_util::BodyStream::new(body).try_collect().await;
        assert!(matches!(result, Err(BodyError::InvalidBody { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_body_trailers_after_gzip_trailer() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", HeaderValue::from_static("abc"));
        let frames: Vec<Result<Frame<Bytes>, BodyError>> =
            vec![Ok(Frame::data(Bytes::from_static(b"with trailers"))), Ok(Frame::trailers(trailers))];
        let inner = StreamBody::new(futures::stream::iter(frames));
        let writer = GzipWriter::new(CompressionLevel::DEFAULT_COMPRESSION, 0, true);

        let collected = GzipBody::new(inner, writer).collect().await.unwrap();
        assert_eq!(collected.trailers().unwrap().get("x-checksum").unwrap(), "abc");
        assert_eq!(gunzip(&collected.to_bytes()), b"with trailers");
    }
}
