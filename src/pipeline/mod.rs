//! Pipeline stages for MHTML conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable; every stage
//! after `input` is a pure function of its input text and options.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ mime ──▶ assemble ──▶ markdown ──▶ postprocess
//! (bytes)  (parts)   (HTML)       (passes)     (normalize)
//!                                    │
//!                                    └──▶ table
//! ```
//!
//! 1. [`input`]   : read the archive and turn its bytes into text
//! 2. [`mime`]    : split the text into parts; [`encoding`] undoes
//!    base64 / quoted-printable and applies part charsets
//! 3. [`assemble`]: join HTML parts and inline `cid:` images as data URIs
//! 4. [`markdown`]: ordered HTML → Markdown rewrite passes, with
//!    [`table`] handling `<table>` elements
//! 5. [`postprocess`]: idempotent whitespace and line normalisation

pub mod assemble;
pub mod encoding;
pub mod input;
pub mod markdown;
pub mod mime;
pub mod postprocess;
pub mod table;
