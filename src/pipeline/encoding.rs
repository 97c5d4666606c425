//! Transfer-encoding and charset decoding for MIME part bodies.
//!
//! Bodies arrive as already-Unicode text lines (the archive was decoded by the
//! caller), so every decoder here goes `&str → bytes → String`: the transfer
//! encoding is undone first, then the bytes are interpreted with the part's
//! declared charset.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use encoding_rs::{Encoding, BIG5, GB18030, GBK, REPLACEMENT, UTF_8, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Archives produced by browsers sometimes drop or add `=` padding.
static LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

// ── Transfer encoding ────────────────────────────────────────────────────

/// Value of a part's `Content-Transfer-Encoding` header.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferEncoding {
    Base64,
    QuotedPrintable,
    SevenBit,
    EightBit,
    /// Absent header or an unrecognised value (kept verbatim, may be empty).
    #[default]
    Unknown,
    Other(String),
}

impl TransferEncoding {
    /// Parse a header value, case-insensitively.
    pub fn parse(value: &str) -> Self {
        let v = value.trim().trim_matches('"').to_ascii_lowercase();
        match v.as_str() {
            "base64" => TransferEncoding::Base64,
            "quoted-printable" => TransferEncoding::QuotedPrintable,
            "7bit" => TransferEncoding::SevenBit,
            "8bit" => TransferEncoding::EightBit,
            "" => TransferEncoding::Unknown,
            _ => TransferEncoding::Other(v),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransferEncoding::Base64 => "base64",
            TransferEncoding::QuotedPrintable => "quoted-printable",
            TransferEncoding::SevenBit => "7bit",
            TransferEncoding::EightBit => "8bit",
            TransferEncoding::Unknown => "",
            TransferEncoding::Other(v) => v,
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Charsets ─────────────────────────────────────────────────────────────

/// Map a charset label to an encoding, falling back to UTF-8.
///
/// A few legacy names are pinned explicitly (gb2312 is read as its GBK
/// superset, latin1/us-ascii as windows-1252 per WHATWG); everything else goes
/// through the WHATWG label table. Labels that are unknown or only map to
/// the replacement decoder resolve to UTF-8.
pub fn resolve_charset(label: &str) -> &'static Encoding {
    let label = label
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_ascii_lowercase();
    match label.as_str() {
        "" | "utf-8" | "utf8" => UTF_8,
        "gb2312" | "gbk" => GBK,
        "gb18030" => GB18030,
        "big5" => BIG5,
        "iso-8859-1" | "latin1" | "us-ascii" | "ascii" | "windows-1252" => WINDOWS_1252,
        other => match Encoding::for_label(other.as_bytes()) {
            Some(enc) if enc != REPLACEMENT => enc,
            _ => {
                debug!("Unsupported charset '{}', falling back to UTF-8", other);
                UTF_8
            }
        },
    }
}

/// Decode bytes with the given charset label. Malformed sequences become U+FFFD.
pub fn decode_text(bytes: &[u8], charset: &str) -> String {
    let encoding = resolve_charset(charset);
    let (text, actual, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!(
            "Malformed {} byte sequences replaced with U+FFFD",
            actual.name()
        );
    }
    text.into_owned()
}

// ── Base64 ───────────────────────────────────────────────────────────────

/// Strip CR, LF and spaces from a base64 body.
pub fn strip_base64_whitespace(body: &str) -> String {
    body.chars()
        .filter(|c| !matches!(c, '\r' | '\n' | ' ' | '\t'))
        .collect()
}

/// Decode a base64 body to bytes. Line breaks and spaces are ignored.
pub fn decode_base64(body: &str) -> Result<Vec<u8>, base64::DecodeError> {
    LENIENT_BASE64.decode(strip_base64_whitespace(body))
}

// ── Quoted-printable ─────────────────────────────────────────────────────

/// Result of undoing quoted-printable encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QpDecoded {
    pub bytes: Vec<u8>,
    /// Number of `=` signs that did not start a valid escape and were kept.
    pub malformed: usize,
}

/// Undo quoted-printable encoding.
///
/// Soft line breaks (`=` directly before a line terminator, or a final `=`)
/// are removed and `=XX` escapes become their byte. Any other `=` is kept
/// literally. Non-ASCII characters in the body pass through as UTF-8.
pub fn decode_quoted_printable(body: &str) -> QpDecoded {
    let bytes = body.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut malformed = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b != b'=' {
            out.push(b);
            i += 1;
            continue;
        }
        match (bytes.get(i + 1), bytes.get(i + 2)) {
            (None, _) => i += 1,
            (Some(b'\r'), Some(b'\n')) => i += 3,
            (Some(b'\n'), _) | (Some(b'\r'), _) => i += 2,
            (Some(&hi), Some(&lo)) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                out.push((hex_value(hi) << 4) | hex_value(lo));
                i += 3;
            }
            _ => {
                malformed += 1;
                out.push(b'=');
                i += 1;
            }
        }
    }

    QpDecoded {
        bytes: out,
        malformed,
    }
}

fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse(" quoted-printable "),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(""), TransferEncoding::Unknown);
        assert_eq!(
            TransferEncoding::parse("x-uuencode"),
            TransferEncoding::Other("x-uuencode".into())
        );
    }

    #[test]
    fn charset_table() {
        assert_eq!(resolve_charset("UTF-8"), UTF_8);
        assert_eq!(resolve_charset("utf8"), UTF_8);
        assert_eq!(resolve_charset("gb2312"), GBK);
        assert_eq!(resolve_charset("GB18030"), GB18030);
        assert_eq!(resolve_charset("big5"), BIG5);
        assert_eq!(resolve_charset("ISO-8859-1"), WINDOWS_1252);
        assert_eq!(resolve_charset("\"us-ascii\""), WINDOWS_1252);
        assert_eq!(resolve_charset("shift_jis"), encoding_rs::SHIFT_JIS);
    }

    #[test]
    fn unknown_charset_falls_back_to_utf8() {
        assert_eq!(resolve_charset("klingon-8"), UTF_8);
        // Labels that only map to the replacement decoder are unsupported.
        assert_eq!(resolve_charset("iso-2022-kr"), UTF_8);
    }

    #[test]
    fn decode_text_latin1() {
        assert_eq!(decode_text(&[0x63, 0x61, 0x66, 0xE9], "iso-8859-1"), "café");
    }

    #[test]
    fn decode_text_gbk() {
        // "中文" in GBK
        assert_eq!(decode_text(&[0xD6, 0xD0, 0xCE, 0xC4], "gb2312"), "中文");
    }

    #[test]
    fn base64_ignores_line_breaks() {
        let bytes = decode_base64("PGgxPkhp\r\nPC9oMT4=\n").unwrap();
        assert_eq!(bytes, b"<h1>Hi</h1>");
    }

    #[test]
    fn base64_without_padding() {
        assert_eq!(decode_base64("QUI").unwrap(), b"AB");
    }

    #[test]
    fn base64_rejects_garbage() {
        assert!(decode_base64("not*base64!").is_err());
    }

    #[test]
    fn qp_soft_breaks_and_escapes() {
        let d = decode_quoted_printable("caf=C3=A9 is=\r\n open=\nnow=");
        assert_eq!(String::from_utf8(d.bytes).unwrap(), "café is opennow");
        assert_eq!(d.malformed, 0);
    }

    #[test]
    fn qp_lowercase_hex() {
        let d = decode_quoted_printable("a=3db");
        assert_eq!(d.bytes, b"a=b");
    }

    #[test]
    fn qp_malformed_escape_kept_literally() {
        let d = decode_quoted_printable("100=ZZ and =4");
        assert_eq!(String::from_utf8(d.bytes).unwrap(), "100=ZZ and =4");
        assert_eq!(d.malformed, 2);
    }

    #[test]
    fn qp_non_ascii_passes_through() {
        let d = decode_quoted_printable("naïve=20text");
        assert_eq!(String::from_utf8(d.bytes).unwrap(), "naïve text");
    }
}
