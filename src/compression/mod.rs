//! Response compression negotiated from `Accept-Encoding`.
//!
//! Compression is considered only when it is enabled and the body is larger
//! than the configured threshold; small payloads would grow. gzip is
//! preferred, deflate (zlib framing, best compression) is the fallback, and
//! any other client gets the body as is.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use tracing::trace;

use crate::config::CompressionConfig;

/// A content coding the server can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gzip,
    Deflate,
}

impl Encoding {
    /// Picks an encoding from an `Accept-Encoding` value, gzip first.
    pub fn select(accept_encoding: &str) -> Option<Self> {
        if accept_encoding.contains("gzip") {
            Some(Encoding::Gzip)
        } else if accept_encoding.contains("deflate") {
            Some(Encoding::Deflate)
        } else {
            None
        }
    }

    /// Value for the `Content-Encoding` header.
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
        }
    }
}

/// Result of negotiating one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    /// Disabled, or the body is within the threshold: send as is, no `Vary`.
    Skipped,
    /// Negotiation ran; `Vary: Accept-Encoding` applies whatever was chosen.
    Negotiated(Option<Encoding>),
}

impl Negotiation {
    pub fn encoding(self) -> Option<Encoding> {
        match self {
            Negotiation::Skipped => None,
            Negotiation::Negotiated(encoding) => encoding,
        }
    }

    pub fn varies(self) -> bool {
        matches!(self, Negotiation::Negotiated(_))
    }
}

/// Decides how a body of `body_len` bytes is sent.
pub fn negotiate(
    config: &CompressionConfig,
    body_len: u64,
    accept_encoding: Option<&str>,
) -> Negotiation {
    if !config.enabled || body_len <= config.threshold {
        return Negotiation::Skipped;
    }
    Negotiation::Negotiated(accept_encoding.and_then(Encoding::select))
}

/// A streaming compressor over `W`.
///
/// Must be closed with [`Encoder::finish`] once the body is written; the
/// trailing bytes of the stream are only emitted then.
pub enum Encoder<W: Write> {
    Gzip(GzEncoder<W>),
    Deflate(ZlibEncoder<W>),
}

impl<W: Write> Encoder<W> {
    pub fn new(encoding: Encoding, inner: W) -> Self {
        match encoding {
            Encoding::Gzip => Encoder::Gzip(GzEncoder::new(inner, Compression::default())),
            Encoding::Deflate => Encoder::Deflate(ZlibEncoder::new(inner, Compression::best())),
        }
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            Encoder::Gzip(_) => Encoding::Gzip,
            Encoder::Deflate(_) => Encoding::Deflate,
        }
    }

    /// Flushes the remaining compressed data and returns the inner writer.
    pub fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Gzip(encoder) => encoder.finish(),
            Encoder::Deflate(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = match self {
            Encoder::Gzip(encoder) => encoder.write(buf),
            Encoder::Deflate(encoder) => encoder.write(buf),
        };
        if let Err(err) = &written {
            trace!(encoding = self.encoding().as_str(), error = %err, "compression write failed");
        }
        written
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Gzip(encoder) => encoder.flush(),
            Encoder::Deflate(encoder) => encoder.flush(),
        }
    }
}

/// Compresses everything `write_body` produces into a buffer.
///
/// The encoder is finished on success and dropped on failure, so no
/// half-closed stream ever escapes.
pub fn encode<F>(encoding: Encoding, capacity: usize, write_body: F) -> io::Result<Vec<u8>>
where
    F: FnOnce(&mut Encoder<Vec<u8>>) -> io::Result<()>,
{
    let mut encoder = Encoder::new(encoding, Vec::with_capacity(capacity));
    write_body(&mut encoder)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::{GzDecoder, ZlibDecoder};
    use std::io::Read;

    fn enabled(threshold: u64) -> CompressionConfig {
        CompressionConfig {
            enabled: true,
            threshold,
        }
    }

    #[test]
    fn gzip_is_preferred_over_deflate() {
        assert_eq!(Encoding::select("gzip, deflate"), Some(Encoding::Gzip));
        assert_eq!(Encoding::select("deflate, gzip"), Some(Encoding::Gzip));
        assert_eq!(Encoding::select("deflate"), Some(Encoding::Deflate));
        assert_eq!(Encoding::select("br, identity"), None);
    }

    #[test]
    fn bodies_within_threshold_are_skipped() {
        let cfg = enabled(1000);
        assert_eq!(negotiate(&cfg, 500, Some("gzip")), Negotiation::Skipped);
        assert_eq!(negotiate(&cfg, 1000, Some("gzip")), Negotiation::Skipped);
        assert_eq!(
            negotiate(&cfg, 1001, Some("gzip")),
            Negotiation::Negotiated(Some(Encoding::Gzip))
        );
    }

    #[test]
    fn disabled_compression_is_skipped() {
        let cfg = CompressionConfig {
            enabled: false,
            threshold: 0,
        };
        assert_eq!(negotiate(&cfg, 5000, Some("gzip")), Negotiation::Skipped);
    }

    #[test]
    fn negotiation_without_acceptable_encoding_still_varies() {
        let n = negotiate(&enabled(10), 5000, Some("br"));
        assert!(n.varies());
        assert_eq!(n.encoding(), None);
        let n = negotiate(&enabled(10), 5000, None);
        assert!(n.varies());
    }

    #[test]
    fn gzip_round_trip() {
        let body = "abcdefghij".repeat(500);
        let packed = encode(Encoding::Gzip, 0, |w| w.write_all(body.as_bytes())).unwrap();
        assert!(packed.len() < body.len());
        let mut out = String::new();
        GzDecoder::new(&packed[..]).read_to_string(&mut out).unwrap();
        assert_eq!(out, body);
    }

    #[test]
    fn deflate_round_trip() {
        let body = "0123456789".repeat(500);
        let packed = encode(Encoding::Deflate, 0, |w| w.write_all(body.as_bytes())).unwrap();
        let mut out = String::new();
        ZlibDecoder::new(&packed[..]).read_to_string(&mut out).unwrap();
        assert_eq!(out, body);
    }

    #[test]
    fn failing_body_writer_surfaces_the_error() {
        let err = encode(Encoding::Gzip, 0, |_| {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        })
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
