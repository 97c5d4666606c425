//! Conversion entry points.
//!
//! ## Sync core, async edge
//!
//! The pipeline itself is CPU-bound text rewriting with no I/O, so the string
//! entry points ([`convert_str`], [`to_html`], [`to_markdown`],
//! [`inspect_str`]) are plain synchronous functions. The file entry points
//! read with `tokio::fs` and run the pipeline on `spawn_blocking` so a batch
//! of large archives does not stall the async runtime. Use
//! [`crate::stream::convert_batch`] to convert many files concurrently.

use crate::config::{ConversionConfig, OutputFormat};
use crate::error::Mhtml2MdError;
use crate::output::{ConversionOutput, ConversionStats, DocumentInfo, PartSummary};
use crate::pipeline::{assemble, input, markdown, mime};
use crate::trace::TraceLog;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Convert MHTML text to HTML or Markdown, per `config.output_format`.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ConversionOutput)` on success, even if some parts could not be
/// decoded (check `output.stats.decode_failures`) or the Markdown came from
/// a fallback (check `output.stats.markdown_fallback`).
///
/// # Errors
/// Returns `Err(Mhtml2MdError)` only for fatal errors:
/// - no multipart boundary ([`Mhtml2MdError::MissingBoundary`])
/// - `decode_image_data` combined with HTML assembly
///   ([`Mhtml2MdError::UsageConflict`])
///
/// # Example
/// ```rust
/// use mhtml2md::{convert_str, ConversionConfig};
///
/// let mhtml = "Content-Type: multipart/related; boundary=\"----=_Part_0\"\n\n\
///              ------=_Part_0\n\
///              Content-Type: text/html\n\n\
///              <h1>Hi</h1><p>Bold <b>text</b></p>\n\
///              ------=_Part_0--\n";
/// let output = convert_str(mhtml, &ConversionConfig::default()).unwrap();
/// assert_eq!(output.content, "# Hi\n\nBold **text**\n");
/// ```
pub fn convert_str(
    mhtml: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Mhtml2MdError> {
    let start = Instant::now();
    let mut trace = TraceLog::new();

    // ── Step 1: Decode MIME parts ────────────────────────────────────────
    let doc = mime::decode(mhtml, config.decode_image_data, &mut trace)?;
    let mut stats = ConversionStats::from_parts(doc.parts());
    let parts = summarise(doc.parts());

    // ── Step 2: Assemble HTML ────────────────────────────────────────────
    let assembled = assemble::assemble_html(&doc, config, &mut trace)?;
    stats.images_embedded = assembled.images_embedded;

    // ── Step 3: Transduce to Markdown ────────────────────────────────────
    let content = match config.output_format {
        OutputFormat::Html => assembled.html,
        OutputFormat::Markdown => {
            let result =
                markdown::html_to_markdown(&assembled.html, config.markdown_options(), &mut trace);
            stats.markdown_fallback = result.fallback;
            result.markdown
        }
    };

    stats.duration_ms = start.elapsed().as_millis() as u64;
    debug!(
        "Converted {} parts to {} ({} chars) in {}ms",
        stats.total_parts,
        config.output_format,
        content.len(),
        stats.duration_ms
    );

    Ok(ConversionOutput {
        content,
        format: config.output_format,
        parts,
        stats,
        trace,
    })
}

/// Convert MHTML text to self-contained HTML.
///
/// # Errors
/// See [`convert_str`]. With `decode_image_data` set this always fails with
/// [`Mhtml2MdError::UsageConflict`].
pub fn to_html(mhtml: &str, config: &ConversionConfig) -> Result<String, Mhtml2MdError> {
    let config = with_format(config, OutputFormat::Html);
    convert_str(mhtml, &config).map(|out| out.content)
}

/// Convert MHTML text to Markdown.
pub fn to_markdown(mhtml: &str, config: &ConversionConfig) -> Result<String, Mhtml2MdError> {
    let config = with_format(config, OutputFormat::Markdown);
    convert_str(mhtml, &config).map(|out| out.content)
}

/// Convert raw archive bytes. See [`crate::pipeline::input::bytes_to_text`]
/// for how the bytes become text.
pub fn convert_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, Mhtml2MdError> {
    convert_str(&input::bytes_to_text(bytes), config)
}

/// Decode an archive and summarise its parts without assembling anything.
///
/// Honors `config.decode_image_data`, so decoded image sizes can be
/// inspected even though they cannot be converted.
pub fn inspect_str(mhtml: &str, config: &ConversionConfig) -> Result<DocumentInfo, Mhtml2MdError> {
    let mut trace = TraceLog::new();
    let start = Instant::now();
    let doc = mime::decode(mhtml, config.decode_image_data, &mut trace)?;
    let mut stats = ConversionStats::from_parts(doc.parts());
    stats.duration_ms = start.elapsed().as_millis() as u64;
    let parts = summarise(doc.parts());
    Ok(DocumentInfo {
        boundary: doc.boundary().to_string(),
        parts,
        stats,
        trace,
    })
}

// ── File entry points ────────────────────────────────────────────────────

/// Convert an MHTML file.
///
/// # Errors
/// Everything [`convert_str`] returns, plus the read errors of
/// [`crate::pipeline::input::read_input`].
pub async fn convert(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Mhtml2MdError> {
    let path = path.as_ref();
    info!("Starting conversion: {}", path.display());

    let text = input::read_input(path).await?;
    let config = config.clone();
    let output = tokio::task::spawn_blocking(move || convert_str(&text, &config))
        .await
        .map_err(|e| Mhtml2MdError::Internal(format!("Conversion task failed: {e}")))??;

    info!(
        "Conversion complete: {} ({} parts, {} images inlined, {}ms)",
        path.display(),
        output.stats.total_parts,
        output.stats.images_embedded,
        output.stats.duration_ms
    );
    Ok(output)
}

/// Convert an MHTML file and write the result directly to a file.
///
/// Uses atomic write (temp file in the target directory + rename) to
/// prevent partial files.
pub async fn convert_to_file(
    path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Mhtml2MdError> {
    let output = convert(path, config).await?;
    write_atomic(output_path.as_ref(), output.content.into_bytes()).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Mhtml2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Mhtml2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(path, config))
}

/// Summarise the parts of an MHTML file without converting it.
pub async fn inspect(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<DocumentInfo, Mhtml2MdError> {
    let text = input::read_input(path.as_ref()).await?;
    let config = config.clone();
    tokio::task::spawn_blocking(move || inspect_str(&text, &config))
        .await
        .map_err(|e| Mhtml2MdError::Internal(format!("Inspection task failed: {e}")))?
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn with_format(config: &ConversionConfig, format: OutputFormat) -> ConversionConfig {
    ConversionConfig {
        output_format: format,
        ..config.clone()
    }
}

fn summarise(parts: &[mime::MimePart]) -> Vec<PartSummary> {
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| PartSummary::from_part(i, part))
        .collect()
}

/// Write `bytes` to `path` through a temp file in the same directory, so
/// readers never observe a partially written file. Parent directories are
/// created as needed.
pub async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<(), Mhtml2MdError> {
    let path: PathBuf = path.to_path_buf();
    let write_err = {
        let path = path.clone();
        move |source: std::io::Error| Mhtml2MdError::OutputWriteFailed { path, source }
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir).await.map_err(write_err.clone())?;

    let target = path.clone();
    tokio::task::spawn_blocking(move || {
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok::<_, std::io::Error>(())
    })
    .await
    .map_err(|e| Mhtml2MdError::Internal(format!("Write task failed: {e}")))?
    .map_err(write_err)?;

    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "Content-Type: multipart/related; boundary=\"----=_Part_0\"\n\n\
------=_Part_0\n\
Content-Type: text/html\n\n\
<h1>Hi</h1><p>Bold <b>text</b></p>\n\
------=_Part_0--\n";

    #[test]
    fn markdown_by_default() {
        let out = convert_str(SIMPLE, &ConversionConfig::default()).unwrap();
        assert_eq!(out.content, "# Hi\n\nBold **text**\n");
        assert_eq!(out.format, OutputFormat::Markdown);
        assert_eq!(out.stats.html_parts, 1);
        assert!(out.stats.markdown_fallback.is_none());
        assert!(!out.trace.is_empty());
    }

    #[test]
    fn html_output_has_charset() {
        let html = to_html(SIMPLE, &ConversionConfig::default()).unwrap();
        assert!(html.starts_with("<!DOCTYPE html><html><head><meta charset=\"utf-8\">"));
        assert!(html.contains("<h1>Hi</h1>"));
    }

    #[test]
    fn to_markdown_ignores_configured_format() {
        let config = ConversionConfig::builder()
            .output_format(OutputFormat::Html)
            .build()
            .unwrap();
        assert_eq!(to_markdown(SIMPLE, &config).unwrap(), "# Hi\n\nBold **text**\n");
    }

    #[test]
    fn missing_boundary_is_fatal_and_traced() {
        let err = convert_str("<html>not an archive</html>", &ConversionConfig::default())
            .unwrap_err();
        assert!(matches!(err, Mhtml2MdError::MissingBoundary { .. }));
        assert!(err.trace().is_some_and(|t| !t.is_empty()));
    }

    #[test]
    fn bytes_with_bom() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(SIMPLE.as_bytes());
        let out = convert_bytes(&bytes, &ConversionConfig::default()).unwrap();
        assert_eq!(out.content, "# Hi\n\nBold **text**\n");
    }

    #[test]
    fn inspect_lists_parts() {
        let info = inspect_str(SIMPLE, &ConversionConfig::default()).unwrap();
        assert_eq!(info.boundary, "----=_Part_0");
        assert_eq!(info.parts.len(), 1);
        assert_eq!(info.parts[0].content_type, "text/html");
    }

    #[tokio::test]
    async fn convert_to_file_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.mht");
        std::fs::write(&input, SIMPLE).unwrap();
        let out = dir.path().join("nested/page.md");

        let stats = convert_to_file(&input, &out, &ConversionConfig::default())
            .await
            .unwrap();
        assert_eq!(stats.html_parts, 1);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "# Hi\n\nBold **text**\n");

        let leftovers: Vec<_> = std::fs::read_dir(out.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path() != out)
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[tokio::test]
    async fn convert_missing_file() {
        let err = convert("/no/such/file.mht", &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Mhtml2MdError::FileNotFound { .. }));
    }

    #[test]
    fn convert_sync_reads_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(SIMPLE.as_bytes()).unwrap();
        let out = convert_sync(tmp.path(), &ConversionConfig::default()).unwrap();
        assert_eq!(out.stats.total_parts, 1);
    }
}
