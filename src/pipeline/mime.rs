//! MIME multipart decoder: split an MHTML archive into ordered parts.
//!
//! ## Parsing model
//!
//! MHTML files in the wild are produced by several browsers and mail clients,
//! each with its own header quirks. Rather than a strict RFC 2046 parser this
//! module runs a forgiving line-oriented state machine:
//!
//! ```text
//!            boundary line            blank / non-header line
//! SeekingPart ───────────▶ ReadingHeaders ───────────────▶ ReadingBody
//!      ▲                        ▲                               │
//!      │ closing delimiter      └──────── boundary line ────────┘
//! ```
//!
//! Part bodies are decoded when the part closes (base64, quoted-printable,
//! charset). Image bodies are left encoded unless the caller asks otherwise,
//! so they can be pasted verbatim into `data:` URIs by the assembler.

use crate::error::{Mhtml2MdError, PartError};
use crate::pipeline::encoding::{self, TransferEncoding};
use crate::trace::TraceLog;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Content type given to parts without a `Content-Type` header (RFC 2045).
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Charset assumed when a part does not declare one.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// Multipart parts nested deeper than this are kept whole.
const MAX_NESTING: usize = 8;

static RE_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|[;\s])boundary\s*=\s*(?:"([^"]*)"|'([^']*)'|([^;\s"']+))"#).unwrap()
});

static RE_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)charset\s*=\s*(?:"([^"]*)"|'([^']*)'|([^;\s"']+))"#).unwrap()
});

static RE_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]*)"|'([^']*)'|([^;\s"']+))"#).unwrap()
});

static RE_HEADER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]*:(?:\s|$)").unwrap());

// ── Public types ─────────────────────────────────────────────────────────

/// How a part is used downstream. Every part has exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartKind {
    /// `text/html`: concatenated into the assembled document.
    Html,
    /// Any content type containing `image`: inlined as a data URI.
    Image,
    /// Kept for inspection, never consumed.
    Other,
}

/// One decoded part of the archive. Read-only once emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    content_type: String,
    charset: String,
    transfer_encoding: TransferEncoding,
    content_location: Option<String>,
    filename: Option<String>,
    content_id: Option<String>,
    body: String,
    decode_error: Option<PartError>,
}

impl MimePart {
    /// The media type without parameters, e.g. `text/html`.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn transfer_encoding(&self) -> &TransferEncoding {
        &self.transfer_encoding
    }

    pub fn content_location(&self) -> Option<&str> {
        self.content_location.as_deref()
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// `Content-ID` without the surrounding angle brackets.
    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    /// Content-Location, else filename, else Content-ID, else `""`.
    pub fn identifier(&self) -> &str {
        [&self.content_location, &self.filename, &self.content_id]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }

    /// Decoded text, or the raw encoded text for undecoded images and
    /// bodies that failed to decode.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn decode_error(&self) -> Option<&PartError> {
        self.decode_error.as_ref()
    }

    pub fn kind(&self) -> PartKind {
        if self.content_type.eq_ignore_ascii_case("text/html") {
            PartKind::Html
        } else if self.content_type.to_ascii_lowercase().contains("image") {
            PartKind::Image
        } else {
            PartKind::Other
        }
    }
}

/// All parts of one archive, in the order they appear in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDocument {
    boundary: String,
    parts: Vec<MimePart>,
}

impl DecodedDocument {
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[MimePart] {
        &self.parts
    }

    /// Parts of the given kind, in encounter order.
    pub fn parts_of(&self, kind: PartKind) -> impl Iterator<Item = &MimePart> {
        self.parts.iter().filter(move |p| p.kind() == kind)
    }
}

// ── Decoder ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingPart,
    ReadingHeaders,
    ReadingBody,
}

/// Headers and raw body collected for the part currently being read.
#[derive(Debug, Default)]
struct PartBuilder {
    content_type: Option<String>,
    charset: Option<String>,
    transfer_encoding: TransferEncoding,
    content_location: Option<String>,
    filename: Option<String>,
    content_id: Option<String>,
    /// Boundary of a `multipart/*` part whose body holds further parts.
    nested_boundary: Option<String>,
    body: String,
}

impl PartBuilder {
    fn is_multipart(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|t| t.to_ascii_lowercase().starts_with("multipart/"))
    }

    /// `--inner` or `--inner--` of this part's own nested boundary.
    fn is_inner_delimiter(&self, trimmed: &str) -> bool {
        self.nested_boundary.as_deref().is_some_and(|b| {
            trimmed
                .strip_prefix("--")
                .and_then(|rest| rest.strip_prefix(b))
                .is_some_and(|tail| tail.is_empty() || tail == "--")
        })
    }

    fn capture_nested_boundary(&mut self, line: &str) {
        if self.is_multipart() && self.nested_boundary.is_none() {
            self.nested_boundary = capture_param(&RE_BOUNDARY, line).filter(|b| !b.is_empty());
        }
    }
}

/// Split MHTML source text into its parts.
///
/// `text` must already be Unicode; see [`crate::pipeline::input`] for the
/// byte-level step. With `decode_image_data` false, image bodies are kept in
/// their transfer encoding.
///
/// # Errors
/// [`Mhtml2MdError::MissingBoundary`] when no non-empty `boundary=` value is
/// declared anywhere in the input.
pub fn decode(
    text: &str,
    decode_image_data: bool,
    trace: &mut TraceLog,
) -> Result<DecodedDocument, Mhtml2MdError> {
    let lines: Vec<&str> = text.lines().collect();

    let Some((decl_idx, boundary)) = find_boundary(&lines) else {
        trace.push("No boundary declaration found");
        warn!("MHTML input has no multipart boundary");
        return Err(Mhtml2MdError::MissingBoundary {
            trace: std::mem::take(trace),
        });
    };
    trace.push(format!(
        "Boundary found on line {}: {}",
        decl_idx + 1,
        boundary
    ));

    let mut parts = Vec::new();
    read_parts(
        &lines[decl_idx + 1..],
        &boundary,
        0,
        decode_image_data,
        &mut parts,
        trace,
    );

    trace.push(format!("Decoded {} parts", parts.len()));
    debug!("Decoded {} MIME parts", parts.len());

    Ok(DecodedDocument { boundary, parts })
}

/// Run the part state machine over `lines`, appending every emitted part.
///
/// A part declared as `multipart/*` with its own boundary is not emitted
/// itself: its body is read again with the inner boundary and the child parts
/// take its place, in order.
fn read_parts(
    lines: &[&str],
    boundary: &str,
    depth: usize,
    decode_image_data: bool,
    parts: &mut Vec<MimePart>,
    trace: &mut TraceLog,
) {
    let closing = format!("--{boundary}--");
    let mut state = State::SeekingPart;
    let mut current = PartBuilder::default();

    for line in lines {
        let trimmed = line.trim();

        if state == State::ReadingBody && current.is_inner_delimiter(trimmed) {
            push_body_line(&mut current.body, line);
            continue;
        }

        if line.contains(boundary) {
            if state != State::SeekingPart {
                let builder = std::mem::take(&mut current);
                close_part(builder, depth, decode_image_data, parts, trace);
            }
            if trimmed == closing {
                trace.push("Closing delimiter reached");
                state = State::SeekingPart;
            } else {
                state = State::ReadingHeaders;
            }
            continue;
        }

        match state {
            State::SeekingPart => {}
            State::ReadingHeaders => {
                if trimmed.is_empty() {
                    state = State::ReadingBody;
                } else if !read_header_line(line, &mut current, parts.len(), trace) {
                    state = State::ReadingBody;
                    push_body_line(&mut current.body, line);
                }
            }
            State::ReadingBody => {
                // Nested multipart bodies keep their blank lines: they
                // separate the inner headers from the inner bodies.
                if !trimmed.is_empty() || current.nested_boundary.is_some() {
                    push_body_line(&mut current.body, line);
                }
            }
        }
    }

    if state != State::SeekingPart && !current.body.trim().is_empty() {
        close_part(current, depth, decode_image_data, parts, trace);
    }
}

/// Emit a finished part, or the parts nested inside it.
fn close_part(
    builder: PartBuilder,
    depth: usize,
    decode_image_data: bool,
    parts: &mut Vec<MimePart>,
    trace: &mut TraceLog,
) {
    let Some(inner) = builder.nested_boundary.clone() else {
        parts.push(finish_part(builder, parts.len(), decode_image_data, trace));
        return;
    };
    if depth >= MAX_NESTING {
        trace.push(format!(
            "Part {}: nesting deeper than {} levels, kept as one part",
            parts.len(),
            MAX_NESTING
        ));
        parts.push(finish_part(builder, parts.len(), decode_image_data, trace));
        return;
    }

    trace.push(format!(
        "Part {}: nested {} with boundary {}",
        parts.len(),
        builder.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE),
        inner
    ));
    let before = parts.len();
    let lines: Vec<&str> = builder.body.lines().collect();
    read_parts(&lines, &inner, depth + 1, decode_image_data, parts, trace);

    if parts.len() == before {
        trace.push("Nested multipart held no parts, kept as one part");
        parts.push(finish_part(builder, parts.len(), decode_image_data, trace));
    }
}

/// Find the first non-empty boundary declaration. Returns its line index.
fn find_boundary(lines: &[&str]) -> Option<(usize, String)> {
    lines.iter().enumerate().find_map(|(idx, line)| {
        let value = capture_param(&RE_BOUNDARY, line.trim())?;
        (!value.is_empty()).then_some((idx, value))
    })
}

/// First non-empty alternative of a `name=value` parameter regex.
fn capture_param(re: &Regex, line: &str) -> Option<String> {
    let caps = re.captures(line)?;
    (1..caps.len())
        .find_map(|i| caps.get(i))
        .map(|m| m.as_str().trim().to_string())
}

/// Value after the first `:` of a header line.
fn header_value(line: &str) -> &str {
    line.split_once(':').map(|(_, v)| v.trim()).unwrap_or("")
}

/// Apply one header line to the builder.
///
/// Returns `false` when the line does not look like a header at all, which
/// means the body has started without a separating blank line.
fn read_header_line(line: &str, part: &mut PartBuilder, index: usize, trace: &mut TraceLog) -> bool {
    let trimmed = line.trim();
    let lower = trimmed.to_ascii_lowercase();

    if lower.starts_with("content-type") {
        let value = header_value(trimmed);
        let media = value.split(';').next().unwrap_or("").trim();
        if !media.is_empty() {
            part.content_type = Some(media.to_string());
        }
        if let Some(cs) = capture_param(&RE_CHARSET, trimmed) {
            part.charset = Some(cs);
        }
        part.capture_nested_boundary(trimmed);
        trace.push(format!("Part {index}: Content-Type {media}"));
    } else if lower.contains("charset") {
        // Loose on purpose: any header line mentioning a charset sets it,
        // including a Content-Location whose URL happens to contain one.
        if let Some(cs) = capture_param(&RE_CHARSET, trimmed) {
            trace.push(format!("Part {index}: charset {cs}"));
            part.charset = Some(cs);
        }
    } else if lower.starts_with("content-transfer-encoding") {
        part.transfer_encoding = TransferEncoding::parse(header_value(trimmed));
        trace.push(format!(
            "Part {index}: Content-Transfer-Encoding {}",
            part.transfer_encoding
        ));
    } else if lower.starts_with("content-location") {
        part.content_location = Some(header_value(trimmed).to_string());
    } else if lower.contains("filename=") || lower.contains("filename =") {
        part.filename = capture_param(&RE_FILENAME, trimmed);
    } else if lower.starts_with("content-id") {
        let id = header_value(trimmed).trim_matches(|c| c == '<' || c == '>');
        part.content_id = Some(id.to_string());
    } else if lower.starts_with("content-disposition") || lower.starts_with("name=") {
        // noise
    } else if RE_HEADER_NAME.is_match(trimmed) || line.starts_with([' ', '\t']) {
        // Unrecognised header, or a folded continuation that may carry the
        // boundary of a multipart part.
        part.capture_nested_boundary(trimmed);
    } else {
        return false;
    }
    true
}

fn push_body_line(body: &mut String, line: &str) {
    body.push_str(line.trim_end());
    body.push('\n');
}

/// Close a part: apply defaults and decode its body.
fn finish_part(
    builder: PartBuilder,
    index: usize,
    decode_image_data: bool,
    trace: &mut TraceLog,
) -> MimePart {
    let mut part = MimePart {
        content_type: builder
            .content_type
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        charset: builder
            .charset
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CHARSET.to_string()),
        transfer_encoding: builder.transfer_encoding,
        content_location: builder.content_location,
        filename: builder.filename,
        content_id: builder.content_id,
        body: String::new(),
        decode_error: None,
    };

    let raw = builder.body;
    if part.kind() == PartKind::Image && !decode_image_data {
        part.body = raw;
    } else {
        let (body, error) = decode_body(&raw, &part, trace, index);
        part.body = body;
        part.decode_error = error;
    }

    trace.push(format!(
        "Part {index} emitted: {} [{}] '{}' ({} chars)",
        part.content_type,
        part.transfer_encoding,
        part.identifier(),
        part.body.len()
    ));
    part
}

/// Undo the transfer encoding of a body and apply its charset.
fn decode_body(
    raw: &str,
    part: &MimePart,
    trace: &mut TraceLog,
    index: usize,
) -> (String, Option<PartError>) {
    let content = raw.trim();
    match part.transfer_encoding {
        TransferEncoding::Base64 => match encoding::decode_base64(content) {
            Ok(bytes) => (encoding::decode_text(&bytes, &part.charset), None),
            Err(e) => {
                trace.push(format!("Part {index}: base64 decode failed ({e}), keeping raw text"));
                warn!("Part {}: invalid base64 body: {}", index, e);
                (
                    encoding::strip_base64_whitespace(content),
                    Some(PartError::Base64 {
                        part: part_label(part, index),
                        detail: e.to_string(),
                    }),
                )
            }
        },
        TransferEncoding::QuotedPrintable => {
            let decoded = encoding::decode_quoted_printable(content);
            let error = (decoded.malformed > 0).then(|| {
                trace.push(format!(
                    "Part {index}: {} malformed quoted-printable escape(s)",
                    decoded.malformed
                ));
                PartError::QuotedPrintable {
                    part: part_label(part, index),
                    count: decoded.malformed,
                }
            });
            (encoding::decode_text(&decoded.bytes, &part.charset), error)
        }
        TransferEncoding::SevenBit | TransferEncoding::EightBit => (content.to_string(), None),
        TransferEncoding::Unknown | TransferEncoding::Other(_) => (raw.to_string(), None),
    }
}

fn part_label(part: &MimePart, index: usize) -> String {
    match part.identifier() {
        "" => format!("#{index}"),
        id => id.to_string(),
    }
}
