//! Accept-Encoding negotiation and gzip/deflate body compression.

use std::io::{self, Write};

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

/// Negotiated content coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    None,
    Gzip,
    Deflate,
}

impl Encoding {
    /// Wire token for the `Content-Encoding` header.
    pub fn token(self) -> Option<&'static str> {
        match self {
            Encoding::None => None,
            Encoding::Gzip => Some("gzip"),
            Encoding::Deflate => Some("deflate"),
        }
    }
}

/// Compression policy.
#[derive(Debug, Clone)]
pub struct Options {
    pub enable: bool,
    pub enable_gzip: bool,
    pub enable_deflate: bool,
    /// Bodies below this size are never compressed.
    pub min_size: usize,
    /// Content-type prefix allowlist; empty allows everything except the
    /// built-in exclusions (image/video/audio and pre-compressed types).
    pub compressible_types: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enable: true,
            enable_gzip: true,
            enable_deflate: true,
            min_size: 256,
            compressible_types: vec![
                "text/".to_string(),
                "application/json".to_string(),
                "application/javascript".to_string(),
                "application/xml".to_string(),
                "application/xhtml+xml".to_string(),
                "application/rss+xml".to_string(),
                "image/svg+xml".to_string(),
            ],
        }
    }
}

/// Whether a content type is worth compressing under `opts`.
pub fn is_compressible_type(content_type: &str, opts: &Options) -> bool {
    if !opts.enable {
        return false;
    }
    if content_type.is_empty() {
        return true;
    }
    let lower = content_type.to_ascii_lowercase();
    if lower.starts_with("image/") || lower.starts_with("video/") || lower.starts_with("audio/") {
        return false;
    }
    if lower == "application/zip" || lower == "application/gzip" || lower == "application/x-gzip" {
        return false;
    }
    if opts.compressible_types.is_empty() {
        return true;
    }
    opts.compressible_types
        .iter()
        .any(|prefix| lower.starts_with(&prefix.to_ascii_lowercase()))
}

/// Pick an encoding from an `Accept-Encoding` header value. Token scan,
/// case-insensitive; q-values are ignored in this version. gzip wins over
/// deflate when both are acceptable.
pub fn negotiate_accept_encoding(accept_encoding: &str, opts: &Options) -> Encoding {
    if !opts.enable || accept_encoding.is_empty() {
        return Encoding::None;
    }
    let lower = accept_encoding.to_ascii_lowercase();
    if opts.enable_gzip && lower.contains("gzip") {
        return Encoding::Gzip;
    }
    if opts.enable_deflate && lower.contains("deflate") {
        return Encoding::Deflate;
    }
    Encoding::None
}

/// Compress into the gzip container (RFC 1952).
pub fn gzip_compress(src: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(src)?;
    encoder.finish()
}

/// Compress into the zlib container (RFC 1950).
pub fn deflate_compress(src: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(src)?;
    encoder.finish()
}
