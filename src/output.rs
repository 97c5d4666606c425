//! Result types returned by the conversion entry points.
//!
//! Everything here is `Serialize` so the CLI can print a whole
//! [`ConversionOutput`] with `--json`.

use crate::config::OutputFormat;
use crate::error::PartError;
use crate::pipeline::encoding::TransferEncoding;
use crate::pipeline::markdown::MarkdownFallback;
use crate::pipeline::mime::{MimePart, PartKind};
use crate::trace::TraceLog;
use serde::{Deserialize, Serialize};

/// The result of converting one MHTML document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The converted document: HTML or Markdown, see `format`.
    pub content: String,
    pub format: OutputFormat,
    /// One summary per decoded MIME part, in archive order.
    pub parts: Vec<PartSummary>,
    pub stats: ConversionStats,
    /// Diagnostic lines recorded while converting. Informational only.
    pub trace: TraceLog,
}

/// What [`crate::inspect`] reports about an archive without converting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// The multipart boundary token.
    pub boundary: String,
    pub parts: Vec<PartSummary>,
    pub stats: ConversionStats,
    pub trace: TraceLog,
}

/// Headers and decode status of one MIME part (the body is omitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSummary {
    /// 0-based position in the archive.
    pub index: usize,
    pub content_type: String,
    /// `Content-Location`, filename, or `Content-ID`, whichever came first.
    pub identifier: String,
    pub transfer_encoding: TransferEncoding,
    pub charset: String,
    /// Length in bytes of the (decoded or raw) body.
    pub body_len: usize,
    /// Set when the body could not be decoded and holds raw text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<PartError>,
}

impl PartSummary {
    pub fn from_part(index: usize, part: &MimePart) -> Self {
        Self {
            index,
            content_type: part.content_type().to_string(),
            identifier: part.identifier().to_string(),
            transfer_encoding: part.transfer_encoding().clone(),
            charset: part.charset().to_string(),
            body_len: part.body().len(),
            decode_error: part.decode_error().cloned(),
        }
    }
}

/// Counters for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_parts: usize,
    pub html_parts: usize,
    pub image_parts: usize,
    pub other_parts: usize,
    /// Image parts whose `cid:` reference was rewritten into a data URI.
    pub images_embedded: usize,
    /// Parts whose body fell back to raw text.
    pub decode_failures: usize,
    /// Set when Markdown came from a fallback strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown_fallback: Option<MarkdownFallback>,
    /// Wall-clock time spent in the pipeline.
    pub duration_ms: u64,
}

impl ConversionStats {
    /// Part counters for a decoded archive. The remaining fields start at zero.
    pub fn from_parts<'a>(parts: impl IntoIterator<Item = &'a MimePart>) -> Self {
        let mut stats = Self::default();
        for part in parts {
            stats.total_parts += 1;
            match part.kind() {
                PartKind::Html => stats.html_parts += 1,
                PartKind::Image => stats.image_parts += 1,
                PartKind::Other => stats.other_parts += 1,
            }
            if part.decode_error().is_some() {
                stats.decode_failures += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mime::decode;

    const ARCHIVE: &str = "Content-Type: multipart/related; boundary=\"----=_Part_3\"\n\n\
------=_Part_3\n\
Content-Type: text/html\n\
Content-Location: http://site.test/\n\n\
<p>x</p>\n\
------=_Part_3\n\
Content-Type: image/png\n\
Content-Transfer-Encoding: base64\n\
Content-Location: a.png\n\n\
QUJD\n\
------=_Part_3\n\
Content-Type: text/css\n\
Content-Transfer-Encoding: base64\n\n\
***\n\
------=_Part_3--\n";

    #[test]
    fn stats_count_kinds_and_failures() {
        let doc = decode(ARCHIVE, false, &mut TraceLog::new()).unwrap();
        let stats = ConversionStats::from_parts(doc.parts());
        assert_eq!(stats.total_parts, 3);
        assert_eq!(stats.html_parts, 1);
        assert_eq!(stats.image_parts, 1);
        assert_eq!(stats.other_parts, 1);
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.images_embedded, 0);
    }

    #[test]
    fn part_summary_fields() {
        let doc = decode(ARCHIVE, false, &mut TraceLog::new()).unwrap();
        let summary = PartSummary::from_part(1, &doc.parts()[1]);
        assert_eq!(summary.index, 1);
        assert_eq!(summary.content_type, "image/png");
        assert_eq!(summary.identifier, "a.png");
        assert_eq!(summary.transfer_encoding, TransferEncoding::Base64);
        // Raw image text keeps its line terminator.
        assert_eq!(summary.body_len, 5);
        assert!(summary.decode_error.is_none());
    }

    #[test]
    fn output_serializes_to_json() {
        let output = ConversionOutput {
            content: "# Hi\n".into(),
            format: OutputFormat::Markdown,
            parts: vec![],
            stats: ConversionStats::default(),
            trace: TraceLog::new(),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["format"], "markdown");
        assert_eq!(json["content"], "# Hi\n");
        assert!(json["stats"].get("markdown_fallback").is_none());
        assert!(json["trace"].is_array());
    }
}
