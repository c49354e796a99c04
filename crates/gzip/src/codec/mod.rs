//! Streaming gzip codec glue.
//!
//! flate2's `write` encoders and decoders push their output into a [`Writer`], an
//! in-memory buffer that the caller drains after every write with [`Writer::take`].
//! This keeps the codec synchronous and lets the body wrappers hand the produced
//! bytes out frame by frame.

use bytes::{Bytes, BytesMut};
use std::io;

mod decoder;
mod encoder;

pub(crate) use decoder::{is_gzip_header, Decoder, GZIP_HEADER_LEN};
pub(crate) use encoder::Encoder;

// inspired by from actix-http
#[derive(Debug)]
pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
