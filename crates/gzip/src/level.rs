use std::fmt;
use std::io;

/// gzip compression level handed to the codec.
///
/// Valid levels are [`DEFAULT_COMPRESSION`](Self::DEFAULT_COMPRESSION) and the range
/// from [`NO_COMPRESSION`](Self::NO_COMPRESSION) to [`BEST_COMPRESSION`](Self::BEST_COMPRESSION).
/// Any other value is accepted here but makes the encoder construction fail, in which case
/// responses are sent uncompressed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CompressionLevel(i32);

impl CompressionLevel {
    pub const NO_COMPRESSION: CompressionLevel = CompressionLevel(0);
    pub const BEST_SPEED: CompressionLevel = CompressionLevel(1);
    pub const BEST_COMPRESSION: CompressionLevel = CompressionLevel(9);
    pub const DEFAULT_COMPRESSION: CompressionLevel = CompressionLevel(-1);

    pub const fn new(level: i32) -> Self {
        Self(level)
    }

    pub const fn get(self) -> i32 {
        self.0
    }

    pub(crate) fn to_flate2(self) -> io::Result<flate2::Compression> {
        match self.0 {
            -1 => Ok(flate2::Compression::default()),
            // the match arm guarantees the value is in 0..=9
            level @ 0..=9 => Ok(flate2::Compression::new(level.unsigned_abs())),
            level => Err(io::Error::new(io::ErrorKind::InvalidInput, format!("invalid compression level: {level}"))),
        }
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT_COMPRESSION
    }
}

impl From<i32> for CompressionLevel {
    fn from(level: i32) -> Self {
        Self(level)
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
