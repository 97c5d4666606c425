//! Error types for the mhtml2md library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`Mhtml2MdError`] (**Fatal**): the document cannot be converted at all
//!   (no multipart boundary, conflicting options, unreadable file). Returned
//!   as `Err(Mhtml2MdError)` from the top-level `convert*` functions.
//!
//! * [`PartError`] (**Non-fatal**): a single MIME part body could not be
//!   decoded. The part keeps its raw text and the error is stored on
//!   [`crate::pipeline::mime::MimePart`] so callers can see which parts
//!   degraded without losing the whole document.
//!
//! * [`TransductionError`] (**Recovered**): one HTML → Markdown rewrite pass
//!   failed. The converter falls back to plain-text extraction and records
//!   the error in the trace; it is never returned to the caller.

use crate::trace::TraceLog;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the mhtml2md library.
///
/// Part-level decode failures use [`PartError`] and are stored on the part
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum Mhtml2MdError {
    // ── Structure errors ──────────────────────────────────────────────────
    /// No `boundary=` declaration was found before the end of the input.
    #[error("No multipart boundary declaration found\nThe input does not look like an MHTML archive.")]
    MissingBoundary { trace: TraceLog },

    /// HTML output was requested while image bodies are being decoded.
    ///
    /// Decoded image bytes cannot be spliced into a `data:` URI, so the two
    /// options are mutually exclusive.
    #[error("HTML generation is not available while image data decoding is enabled\nDisable decode_image_data (CLI: drop --decode-images).")]
    UsageConflict { trace: TraceLog },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("MHTML file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Any other I/O failure while reading the input.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Mhtml2MdError {
    /// Diagnostic trace captured up to the point of failure, if any.
    pub fn trace(&self) -> Option<&TraceLog> {
        match self {
            Mhtml2MdError::MissingBoundary { trace } | Mhtml2MdError::UsageConflict { trace } => {
                Some(trace)
            }
            _ => None,
        }
    }
}

/// A non-fatal decode error for a single MIME part.
///
/// When this is set the part body holds the undecoded text.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PartError {
    /// Body was declared base64 but is not valid base64.
    #[error("Part '{part}': invalid base64 body: {detail}")]
    Base64 { part: String, detail: String },

    /// Body was declared quoted-printable but contained malformed escapes.
    #[error("Part '{part}': {count} malformed quoted-printable escape(s) kept literally")]
    QuotedPrintable { part: String, count: usize },
}

/// A rewrite pass aborted while converting HTML to Markdown.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum TransductionError {
    #[error("Markdown pass '{pass}' failed: {detail}")]
    PassFailed { pass: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_boundary_display() {
        let e = Mhtml2MdError::MissingBoundary {
            trace: TraceLog::default(),
        };
        assert!(e.to_string().contains("boundary"), "got: {e}");
        assert!(e.trace().is_some());
    }

    #[test]
    fn usage_conflict_carries_trace() {
        let mut trace = TraceLog::default();
        trace.push("assembling html");
        let e = Mhtml2MdError::UsageConflict { trace };
        assert_eq!(e.trace().map(|t| t.len()), Some(1));
        assert!(e.to_string().contains("decode_image_data"));
    }

    #[test]
    fn file_not_found_has_no_trace() {
        let e = Mhtml2MdError::FileNotFound {
            path: PathBuf::from("/nope.mht"),
        };
        assert!(e.trace().is_none());
        assert!(e.to_string().contains("/nope.mht"));
    }

    #[test]
    fn part_error_display() {
        let e = PartError::Base64 {
            part: "logo.png".into(),
            detail: "invalid byte".into(),
        };
        assert!(e.to_string().contains("logo.png"));
        assert!(e.to_string().contains("invalid byte"));
    }

    #[test]
    fn transduction_error_display() {
        let e = TransductionError::PassFailed {
            pass: "tables".into(),
            detail: "boom".into(),
        };
        assert_eq!(e.to_string(), "Markdown pass 'tables' failed: boom");
    }
}
