//! Decodes one text line into decompressed UTF-8 bytes (spec §4.4):
//! strip whitespace, base64-decode, gunzip.

use std::io::Read;

use base64::Engine;
use flate2::read::GzDecoder;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("invalid base64: {source}"))]
    Base64 { source: base64::DecodeError },
    #[snafu(display("gzip decompression failed: {source}"))]
    Gzip { source: std::io::Error },
    #[snafu(display("decoded bytes are not valid UTF-8: {source}"))]
    Utf8 { source: std::string::FromUtf8Error },
}

/// Decodes one line. A line that fails any step returns `DecodeError`; the
/// caller is responsible for logging and skipping it without aborting the
/// enclosing file.
pub fn decode(line: &str) -> Result<String, DecodeError> {
    let trimmed = line.trim();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(trimmed)
        .context(Base64Snafu)?;

    let mut gz = GzDecoder::new(&decoded[..]);
    let mut out = Vec::new();
    gz.read_to_end(&mut out).context(GzipSnafu)?;

    String::from_utf8(out).context(Utf8Snafu)
}
