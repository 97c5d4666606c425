//! Batch conversion API: emit documents as they complete.
//!
//! ## Why stream?
//!
//! Converting a folder of saved pages takes a while. A stream lets callers
//! write each result as soon as it is ready, wire up progress bars, and stop
//! scheduling new work simply by dropping the stream.
//!
//! Documents run concurrently (up to `config.concurrency`) and are yielded in
//! completion order, not input order. Use [`DocumentResult::index`] to restore
//! the input order if it matters. Directory walking is the caller's job: pass
//! the exact list of files to convert.

use crate::config::ConversionConfig;
use crate::convert;
use crate::error::Mhtml2MdError;
use crate::output::ConversionOutput;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{info, warn};

/// The outcome for one document of a batch.
#[derive(Debug)]
pub struct DocumentResult {
    /// 0-based position in the input list.
    pub index: usize,
    pub path: PathBuf,
    pub result: Result<ConversionOutput, Mhtml2MdError>,
}

/// A boxed stream of per-document results.
pub type DocumentStream = Pin<Box<dyn Stream<Item = DocumentResult> + Send>>;

/// Convert a list of MHTML files, streaming results as they are ready.
///
/// A failing document never stops the batch; its error is reported in its
/// [`DocumentResult`] and through `on_document_error`.
///
/// # Example
/// ```rust,no_run
/// use mhtml2md::{convert_batch, ConversionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = ConversionConfig::default();
/// let mut results = convert_batch(vec!["a.mht".into(), "b.mhtml".into()], &config);
/// while let Some(doc) = results.next().await {
///     match doc.result {
///         Ok(out) => println!("{}: {} chars", doc.path.display(), out.content.len()),
///         Err(e) => eprintln!("{}: {e}", doc.path.display()),
///     }
/// }
/// # }
/// ```
pub fn convert_batch(paths: Vec<PathBuf>, config: &ConversionConfig) -> DocumentStream {
    let total = paths.len();
    info!(
        "Starting batch conversion: {} document(s), concurrency {}",
        total, config.concurrency
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let succeeded = Arc::new(AtomicUsize::new(0));
    let concurrency = config.concurrency.max(1);
    let config_clone = config.clone();
    let counter = Arc::clone(&succeeded);

    let documents = stream::iter(paths.into_iter().enumerate().map(move |(index, path)| {
        let cfg = config_clone.clone();
        let counter = Arc::clone(&counter);
        async move {
            if let Some(ref cb) = cfg.progress_callback {
                cb.on_document_start(index, total, &path);
            }
            let result = convert::convert(&path, &cfg).await;
            match &result {
                Ok(out) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if let Some(ref cb) = cfg.progress_callback {
                        cb.on_document_complete(index, total, out.content.len());
                    }
                }
                Err(e) => {
                    warn!("Failed to convert {}: {}", path.display(), e);
                    if let Some(ref cb) = cfg.progress_callback {
                        cb.on_document_error(index, total, &e.to_string());
                    }
                }
            }
            DocumentResult {
                index,
                path,
                result,
            }
        }
    }))
    .buffer_unordered(concurrency);

    // Fires once the last document has been yielded; emits no item.
    let callback = config.progress_callback.clone();
    let finish = stream::once(async move {
        let success = succeeded.load(Ordering::SeqCst);
        info!("Batch complete: {}/{} document(s) converted", success, total);
        if let Some(cb) = callback {
            cb.on_batch_complete(total, success);
        }
    })
    .filter_map(|()| async { None::<DocumentResult> });

    Box::pin(documents.chain(finish))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ConversionProgressCallback;
    use std::path::Path;

    #[derive(Default)]
    struct Counts {
        started: AtomicUsize,
        done: AtomicUsize,
        failed: AtomicUsize,
        batch_success: AtomicUsize,
    }

    impl ConversionProgressCallback for Counts {
        fn on_document_start(&self, _index: usize, _total: usize, _path: &Path) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_document_complete(&self, _index: usize, _total: usize, _len: usize) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
        fn on_document_error(&self, _index: usize, _total: usize, _error: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_batch_complete(&self, _total: usize, success: usize) {
            self.batch_success.store(success, Ordering::SeqCst);
        }
    }

    const ARCHIVE: &str = "Content-Type: multipart/related; boundary=\"b0undary\"\n\n\
--b0undary\n\
Content-Type: text/html\n\n\
<p>hello</p>\n\
--b0undary--\n";

    #[tokio::test]
    async fn batch_reports_each_document() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.mht");
        std::fs::write(&good, ARCHIVE).unwrap();
        let bad = dir.path().join("bad.mht");
        std::fs::write(&bad, "no boundary here").unwrap();
        let missing = dir.path().join("missing.mht");

        let counts = Arc::new(Counts::default());
        let config = ConversionConfig::builder()
            .concurrency(2)
            .progress_callback(counts.clone())
            .build()
            .unwrap();

        let mut results: Vec<DocumentResult> =
            convert_batch(vec![good, bad, missing], &config).collect().await;
        results.sort_by_key(|r| r.index);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].result.as_ref().unwrap().content, "hello\n");
        assert!(matches!(
            results[1].result,
            Err(Mhtml2MdError::MissingBoundary { .. })
        ));
        assert!(matches!(
            results[2].result,
            Err(Mhtml2MdError::FileNotFound { .. })
        ));

        assert_eq!(counts.started.load(Ordering::SeqCst), 3);
        assert_eq!(counts.done.load(Ordering::SeqCst), 1);
        assert_eq!(counts.failed.load(Ordering::SeqCst), 2);
        assert_eq!(counts.batch_success.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_batch_yields_nothing() {
        let results: Vec<_> = convert_batch(vec![], &ConversionConfig::default())
            .collect()
            .await;
        assert!(results.is_empty());
    }
}
