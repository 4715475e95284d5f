//! Transport encoding of signature fields: base64, optionally over gzip.
//!
//! Annotation producers gzip the message, certificate and bundle before
//! base64-encoding them, while the signature is usually plain base64. The
//! decoder therefore always base64-decodes and only inflates data that
//! carries the gzip magic.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{Result, VerifyError};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decode a mandatory field. Accepts padded and unpadded base64; surrounding
/// whitespace is ignored.
#[tracing::instrument(skip(encoded), fields(encoded_len = encoded.len()))]
pub fn decode_field(field: &'static str, encoded: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = encoded
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let raw = STANDARD
        .decode(&cleaned)
        .or_else(|_| STANDARD_NO_PAD.decode(&cleaned))
        .map_err(|e| VerifyError::InputDecode {
            field,
            source: anyhow::Error::new(e).context("invalid base64"),
        })?;
    gunzip_if_compressed(field, raw)
}

/// Decode an optional field. Absent or empty input means the feature is not
/// used; present input must decode.
pub fn decode_optional(field: &'static str, encoded: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
    match encoded {
        Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
            decode_field(field, bytes).map(Some)
        }
        _ => Ok(None),
    }
}

fn gunzip_if_compressed(field: &'static str, raw: Vec<u8>) -> Result<Vec<u8>> {
    if !raw.starts_with(&GZIP_MAGIC) {
        return Ok(raw);
    }
    let mut out = Vec::new();
    GzDecoder::new(raw.as_slice())
        .read_to_end(&mut out)
        .map_err(|e| VerifyError::InputDecode {
            field,
            source: anyhow::Error::new(e).context("corrupt gzip stream"),
        })?;
    tracing::debug!(field, compressed = raw.len(), inflated = out.len(), "Decompressed field");
    Ok(out)
}

/// Encode raw bytes the way annotation producers do: gzip, then base64.
pub fn encode_field(raw: &[u8]) -> String {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail.
    let _ = encoder.write_all(raw);
    let gz = encoder.finish().unwrap_or_default();
    STANDARD.encode(gz)
}
