//! Progress-callback trait for batch conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events while [`crate::convert_batch`] works through a list of archives.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a channel, a log, or a terminal progress bar
//! without the library knowing how the host application communicates. The
//! trait is `Send + Sync` because documents are converted concurrently.
//!
//! # Example
//!
//! ```rust
//! use mhtml2md::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, index: usize, total: usize, output_len: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{}/{} done (#{} produced {} bytes)", done, total, index, output_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: AtomicUsize::new(0),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by [`crate::convert_batch`] as it processes each document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// With `concurrency > 1`, the per-document methods may be called
/// concurrently from different tasks. Implementations must protect shared
/// mutable state (e.g. `Mutex`, `AtomicUsize`).
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before any document is read.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a document starts converting.
    ///
    /// # Arguments
    /// * `index`: 0-based position of the document in the input list
    /// * `total`: number of documents in the batch
    /// * `path` : the input path
    fn on_document_start(&self, index: usize, total: usize, path: &Path) {
        let _ = (index, total, path);
    }

    /// Called when a document converted successfully.
    ///
    /// `output_len` is the byte length of the produced HTML or Markdown.
    fn on_document_complete(&self, index: usize, total: usize, output_len: usize) {
        let _ = (index, total, output_len);
    }

    /// Called when a document failed with a fatal error.
    fn on_document_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every document has been attempted.
    ///
    /// # Arguments
    /// * `total`        : number of documents in the batch
    /// * `success_count`: documents that converted without a fatal error
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_document_start(0, 2, Path::new("a.mht"));
        cb.on_document_complete(0, 2, 42);
        cb.on_document_error(1, 2, "missing boundary");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_document_complete(0, 10, 512);
    }
}
