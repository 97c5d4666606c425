//! # mhtml2md
//!
//! Convert MHTML web archives (`.mht` / `.mhtml`) to self-contained HTML or
//! to Markdown.
//!
//! ## Why this crate?
//!
//! Browsers save complete pages as MIME multipart archives: the HTML, its
//! images and stylesheets each travel as a separate part, encoded in base64
//! or quoted-printable and referenced by `cid:` URLs. This crate decodes the
//! parts, stitches the HTML back together with its images inlined as `data:`
//! URIs, and can rewrite the result as clean GitHub-flavoured Markdown.
//!
//! ## Pipeline Overview
//!
//! ```text
//! MHTML
//!  │
//!  ├─ 1. Input     read bytes, strip BOM, decode to text
//!  ├─ 2. Decode    split MIME parts, undo base64 / quoted-printable
//!  ├─ 3. Assemble  join HTML parts, inline cid: images, declare UTF-8
//!  ├─ 4. Markdown  ordered rewrite passes (headings, lists, tables, …)
//!  ├─ 5. Polish    idempotent whitespace normalisation
//!  └─ 6. Output    content + per-part summaries + stats + trace
//! ```
//!
//! Steps 4–5 run only for Markdown output.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mhtml2md::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let output = convert("page.mht", &config).await?;
//!     println!("{}", output.content);
//!     eprintln!("{} parts, {} images inlined",
//!         output.stats.total_parts,
//!         output.stats.images_embedded);
//!     Ok(())
//! }
//! ```
//!
//! For text already in memory, [`convert_str`], [`to_html`] and
//! [`to_markdown`] are synchronous.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mhtml2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! mhtml2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod trace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, OutputFormat};
pub use convert::{
    convert, convert_bytes, convert_str, convert_sync, convert_to_file, inspect, inspect_str,
    to_html, to_markdown,
};
pub use error::{Mhtml2MdError, PartError, TransductionError};
pub use output::{ConversionOutput, ConversionStats, DocumentInfo, PartSummary};
pub use pipeline::markdown::{html_to_markdown, MarkdownFallback, MarkdownOptions, MarkdownResult};
pub use pipeline::postprocess::normalize;
pub use pipeline::table::reconstruct_table;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_batch, DocumentResult, DocumentStream};
pub use trace::TraceLog;
