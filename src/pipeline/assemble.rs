//! Content assembly: join HTML parts and inline their images.
//!
//! The assembled document is plain text surgery on the decoded parts. `cid:`
//! references are rewritten by substring replacement, not by walking the DOM,
//! so a reference is found wherever it appears (attributes, inline CSS, text).

use crate::config::ConversionConfig;
use crate::error::Mhtml2MdError;
use crate::pipeline::mime::{DecodedDocument, PartKind};
use crate::trace::TraceLog;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Declaration inserted when the document does not name its charset.
pub const META_CHARSET: &str = r#"<meta charset="utf-8">"#;

static RE_HAS_CHARSET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)charset=").unwrap());

/// `<head>` or `<head attr…>`, but not `<header>`.
static RE_HEAD_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?/?>").unwrap());

/// HTML assembled from a decoded archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledHtml {
    pub html: String,
    /// Image parts whose reference was found and inlined.
    pub images_embedded: usize,
}

/// Build one self-contained HTML string from the decoded parts.
///
/// # Errors
/// [`Mhtml2MdError::UsageConflict`] when `config.decode_image_data` is set:
/// decoded image bytes cannot be written into a `data:` URI.
pub fn assemble_html(
    doc: &DecodedDocument,
    config: &ConversionConfig,
    trace: &mut TraceLog,
) -> Result<AssembledHtml, Mhtml2MdError> {
    if config.decode_image_data {
        trace.push("HTML assembly refused: image data was decoded");
        return Err(Mhtml2MdError::UsageConflict {
            trace: std::mem::take(trace),
        });
    }

    let mut html = String::new();
    let mut html_parts = 0;
    for part in doc.parts_of(PartKind::Html) {
        html.push_str(part.body());
        html_parts += 1;
    }
    trace.push(format!(
        "Concatenated {} HTML part(s), {} chars",
        html_parts,
        html.len()
    ));

    let images_embedded = if config.include_images {
        inline_images(&mut html, doc, trace)
    } else {
        trace.push("Image inlining disabled");
        0
    };

    let html = ensure_charset_declaration(html, trace);
    debug!(
        "Assembled HTML: {} chars, {} image(s) inlined",
        html.len(),
        images_embedded
    );

    Ok(AssembledHtml {
        html,
        images_embedded,
    })
}

/// Replace `cid:` references to image parts with `data:` URIs.
///
/// Parts are visited in encounter order and each replacement consumes the
/// reference, so when two parts share an identifier the first one wins.
fn inline_images(html: &mut String, doc: &DecodedDocument, trace: &mut TraceLog) -> usize {
    let mut embedded = 0;

    for part in doc.parts_of(PartKind::Image) {
        let payload: String = part
            .body()
            .chars()
            .filter(|c| !matches!(c, '\r' | '\n'))
            .collect();
        let uri = format!("data:{};base64,{}", part.content_type(), payload);

        let mut ids = vec![part.identifier()];
        if let Some(cid) = part.content_id() {
            if !ids.contains(&cid) {
                ids.push(cid);
            }
        }

        let mut hits = 0;
        for id in ids.into_iter().filter(|id| !id.is_empty()) {
            let needle = format!("cid:{id}");
            let count = html.matches(needle.as_str()).count();
            if count > 0 {
                *html = html.replace(needle.as_str(), &uri);
                hits += count;
            }
        }

        if hits > 0 {
            embedded += 1;
            trace.push(format!(
                "Inlined image '{}' ({} reference(s))",
                part.identifier(),
                hits
            ));
        } else {
            trace.push(format!("Image '{}' is not referenced", part.identifier()));
        }
    }

    embedded
}

/// Make sure the document declares UTF-8.
///
/// Inserts [`META_CHARSET`] after the first `<head>` tag, or wraps the whole
/// buffer in a minimal document when there is no head. Documents that already
/// mention `charset=` anywhere are left alone, as is an empty buffer.
pub fn ensure_charset_declaration(html: String, trace: &mut TraceLog) -> String {
    if html.is_empty() {
        trace.push("No HTML content in archive");
        warn!("Archive contains no text/html part");
        return html;
    }
    if RE_HAS_CHARSET.is_match(&html) {
        return html;
    }

    if let Some(head) = RE_HEAD_OPEN.find(&html) {
        trace.push("Inserted charset declaration into <head>");
        let mut out = String::with_capacity(html.len() + META_CHARSET.len());
        out.push_str(&html[..head.end()]);
        out.push_str(META_CHARSET);
        out.push_str(&html[head.end()..]);
        out
    } else {
        trace.push("No <head> tag; wrapped content in a minimal document");
        format!(
            "<!DOCTYPE html><html><head>{META_CHARSET}</head><body>{html}</body></html>"
        )
    }
}
