//! Configuration types for MHTML conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct carries every knob so a
//! config can be cloned into batch workers and logged as a whole.

use crate::error::Mhtml2MdError;
use crate::pipeline::markdown::MarkdownOptions;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for an MHTML conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use mhtml2md::{ConversionConfig, OutputFormat};
///
/// let config = ConversionConfig::builder()
///     .output_format(OutputFormat::Markdown)
///     .include_images(false)
///     .concurrency(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// What the conversion produces. Default: [`OutputFormat::Markdown`].
    pub output_format: OutputFormat,

    /// Decode base64/quoted-printable image bodies instead of keeping the
    /// raw encoded text. Default: false.
    ///
    /// Decoded image bytes can no longer be inlined as `data:` URIs, so HTML
    /// assembly refuses to run while this is on
    /// ([`Mhtml2MdError::UsageConflict`]). Useful only with
    /// [`crate::inspect_str`] to look at decoded parts.
    pub decode_image_data: bool,

    /// Rewrite `cid:` references into inline `data:` URIs. Default: true.
    pub include_images: bool,

    /// Use the structure-aware rewrite pipeline for Markdown output instead
    /// of the generic converter. Default: true.
    pub enhanced_markdown: bool,

    /// Record one trace entry per Markdown rewrite pass. Default: false.
    pub debug_mode: bool,

    /// Number of documents converted at once by [`crate::convert_batch`]. Default: 4.
    pub concurrency: usize,

    /// Per-document progress events for batch conversion.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            decode_image_data: false,
            include_images: true,
            enhanced_markdown: true,
            debug_mode: false,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("output_format", &self.output_format)
            .field("decode_image_data", &self.decode_image_data)
            .field("include_images", &self.include_images)
            .field("enhanced_markdown", &self.enhanced_markdown)
            .field("debug_mode", &self.debug_mode)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Options consumed by the HTML → Markdown rewrite pipeline.
    pub fn markdown_options(&self) -> MarkdownOptions {
        MarkdownOptions {
            enhanced_markdown: self.enhanced_markdown,
            debug_mode: self.debug_mode,
        }
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn decode_image_data(mut self, v: bool) -> Self {
        self.config.decode_image_data = v;
        self
    }

    pub fn include_images(mut self, v: bool) -> Self {
        self.config.include_images = v;
        self
    }

    pub fn enhanced_markdown(mut self, v: bool) -> Self {
        self.config.enhanced_markdown = v;
        self
    }

    pub fn debug_mode(mut self, v: bool) -> Self {
        self.config.debug_mode = v;
        self
    }

    /// Set batch concurrency. Zero is rejected by [`Self::build`].
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Mhtml2MdError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(Mhtml2MdError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Target document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Self-contained HTML with images inlined as data URIs.
    Html,
    /// Markdown produced from the assembled HTML. (default)
    #[default]
    Markdown,
}

impl OutputFormat {
    /// Conventional file extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "md",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Html => f.write_str("html"),
            OutputFormat::Markdown => f.write_str("markdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ConversionConfig::default();
        assert_eq!(c.output_format, OutputFormat::Markdown);
        assert!(!c.decode_image_data);
        assert!(c.include_images);
        assert!(c.enhanced_markdown);
        assert!(!c.debug_mode);
        assert_eq!(c.concurrency, 4);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = ConversionConfig::builder().concurrency(0).build().unwrap_err();
        assert!(matches!(err, Mhtml2MdError::InvalidConfig(_)));
    }

    #[test]
    fn decode_image_data_builds() {
        // The conflict with HTML assembly is reported at conversion time.
        let c = ConversionConfig::builder()
            .output_format(OutputFormat::Html)
            .decode_image_data(true)
            .build()
            .unwrap();
        assert!(c.decode_image_data);
    }

    #[test]
    fn markdown_options_follow_config() {
        let c = ConversionConfig::builder()
            .enhanced_markdown(false)
            .debug_mode(true)
            .build()
            .unwrap();
        let opts = c.markdown_options();
        assert!(!opts.enhanced_markdown);
        assert!(opts.debug_mode);
    }

    #[test]
    fn output_format_serde_lowercase() {
        let json = serde_json::to_string(&OutputFormat::Html).unwrap();
        assert_eq!(json, "\"html\"");
        assert_eq!(OutputFormat::Markdown.extension(), "md");
    }
}
