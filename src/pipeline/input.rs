//! Input resolution: turn an archive file into the Unicode text the decoder
//! consumes.
//!
//! ## Why decode here and not in the MIME decoder?
//!
//! The decoder is a pure text state machine. Deciding how raw bytes become
//! text (BOM, declared charset, invalid UTF-8) is an I/O concern and lives at
//! the edge, so the core stays testable on plain strings.
//!
//! Order of precedence for the byte → text step:
//! 1. a byte-order mark (UTF-8, UTF-16LE/BE), which is then stripped;
//! 2. valid UTF-8;
//! 3. the `charset=` of the top-level header block;
//! 4. lossy UTF-8 (invalid sequences become U+FFFD).

use crate::error::Mhtml2MdError;
use crate::pipeline::encoding;
use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

static RE_TOP_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)charset\s*=\s*["']?([A-Za-z0-9_.:-]+)"#).unwrap());

/// Read an archive from disk and return its text.
///
/// # Errors
/// [`Mhtml2MdError::FileNotFound`], [`Mhtml2MdError::PermissionDenied`] or
/// [`Mhtml2MdError::ReadFailed`] depending on the I/O failure.
pub async fn read_input(path: &Path) -> Result<String, Mhtml2MdError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| map_read_error(path, e))?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes_to_text(&bytes))
}

fn map_read_error(path: &Path, e: std::io::Error) -> Mhtml2MdError {
    let path = path.to_path_buf();
    match e.kind() {
        ErrorKind::NotFound => Mhtml2MdError::FileNotFound { path },
        ErrorKind::PermissionDenied => Mhtml2MdError::PermissionDenied { path },
        _ => Mhtml2MdError::ReadFailed { path, source: e },
    }
}

/// Convert raw archive bytes to text. Never fails.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    if let Some((enc, bom_len)) = Encoding::for_bom(bytes) {
        debug!("Input has a {} byte-order mark", enc.name());
        let (text, _) = enc.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    if let Some(label) = top_level_charset(bytes) {
        let enc = encoding::resolve_charset(&label);
        if enc != UTF_8 {
            debug!("Decoding input as {} (declared '{}')", enc.name(), label);
            let (text, _, _) = enc.decode(bytes);
            return text.into_owned();
        }
    }

    warn!("Input is not valid UTF-8; invalid sequences replaced with U+FFFD");
    String::from_utf8_lossy(bytes).into_owned()
}

/// `charset=` declared in the header block before the first blank line.
fn top_level_charset(bytes: &[u8]) -> Option<String> {
    let head = String::from_utf8_lossy(bytes);
    let header_block = head
        .split("\r\n\r\n")
        .next()
        .and_then(|s| s.split("\n\n").next())
        .unwrap_or("");
    RE_TOP_CHARSET
        .captures(header_block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
