use crate::codec::Writer;
use crate::level::CompressionLevel;
use bytes::Bytes;
use flate2::write::GzEncoder;
use std::io;
use std::io::Write;
use tracing::trace;

// (almost thanks and) copy from actix-http: https://github.com/actix/actix-web/blob/master/actix-http/src/encoding/encoder.rs

/// A gzip stream writing into an in-memory [`Writer`].
#[derive(Debug)]
pub(crate) struct Encoder {
    inner: GzEncoder<Writer>,
}

impl Encoder {
    /// Creates a gzip encoder, fails when the level is not a valid gzip level.
    pub(crate) fn gzip(level: CompressionLevel) -> io::Result<Self> {
        let compression = level.to_flate2()?;
        Ok(Self { inner: GzEncoder::new(Writer::new(), compression) })
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data).inspect_err(|err| trace!("Error encoding gzip encoding: {}", err))
    }

    /// Takes the compressed bytes produced so far.
    pub(crate) fn take(&mut self) -> Bytes {
        self.inner.get_mut().take()
    }

    /// Writes the gzip trailer and returns the remaining compressed bytes.
    pub(crate) fn finish(self) -> io::Result<Bytes> {
        self.inner.finish().map(Writer::into_bytes)
    }
}
