use crate::codec::Writer;
use bytes::Bytes;
use flate2::write::MultiGzDecoder;
use std::io;
use std::io::Write;
use tracing::trace;

/// Length of the fixed part of a gzip member header.
pub(crate) const GZIP_HEADER_LEN: usize = 10;

/// Checks the magic bytes and the compression method of a gzip header.
pub(crate) fn is_gzip_header(header: &[u8]) -> bool {
    // ID1, ID2 and CM (8 = deflate)
    header.len() >= GZIP_HEADER_LEN && header[..3] == [0x1f, 0x8b, 0x08]
}

/// A gzip decoder writing the inflated bytes into an in-memory [`Writer`].
///
/// Concatenated gzip members are decoded as one stream.
#[derive(Debug)]
pub(crate) struct Decoder {
    inner: MultiGzDecoder<Writer>,
}

impl Decoder {
    pub(crate) fn gzip() -> Self {
        Self { inner: MultiGzDecoder::new(Writer::new()) }
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data).inspect_err(|err| trace!("Error decoding gzip encoding: {}", err))
    }

    pub(crate) fn take(&mut self) -> Bytes {
        self.inner.get_mut().take()
    }

    pub(crate) fn finish(self) -> io::Result<Bytes> {
        self.inner.finish().map(Writer::into_bytes)
    }
}
