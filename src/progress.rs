//! Progress-callback trait for rasterisation events.
//!
//! Inject an [`Arc<dyn RasterProgressCallback>`] via
//! [`crate::config::RasterConfigBuilder::progress_callback`] to receive
//! events as the orchestrator walks the tree and the fetcher downloads
//! formula images.
//!
//! # Example
//!
//! ```rust
//! use tex_raster::{FetchOutcome, RasterConfig, RasterProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     downloaded: AtomicUsize,
//! }
//!
//! impl RasterProgressCallback for CountingCallback {
//!     fn on_fetch_complete(&self, _target: &Path, outcome: FetchOutcome) {
//!         if !outcome.is_cached() {
//!             self.downloaded.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { downloaded: AtomicUsize::new(0) });
//! let config = RasterConfig::builder("paper", "paper/formulas")
//!     .progress_callback(cb as Arc<dyn RasterProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{DocumentReport, RunStats};
use crate::pipeline::fetch::FetchOutcome;
use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it processes documents and formulas.
///
/// Fetch events (`on_fetch_complete`, `on_fetch_retry`) fire concurrently
/// from up to `concurrency` in-flight downloads; implementations must guard
/// shared mutable state (`Mutex`, atomics). All methods default to no-ops.
pub trait RasterProgressCallback: Send + Sync {
    /// Called once after document discovery.
    fn on_run_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before a document is read. `index` is 1-based.
    fn on_document_start(&self, path: &Path, index: usize, total_documents: usize) {
        let _ = (path, index, total_documents);
    }

    /// Called once per formula image, after it was downloaded or found cached.
    fn on_fetch_complete(&self, target: &Path, outcome: FetchOutcome) {
        let _ = (target, outcome);
    }

    /// Called after a failed attempt that will be retried.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    fn on_fetch_retry(&self, target: &Path, attempt: u32, error: &str) {
        let _ = (target, attempt, error);
    }

    /// Called after a document has been rewritten (or left unchanged).
    fn on_document_complete(&self, report: &DocumentReport) {
        let _ = report;
    }

    /// Called once after the preamble fixup, at the very end of a run.
    fn on_run_complete(&self, stats: &RunStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RasterProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RasterConfig`].
pub type ProgressCallback = Arc<dyn RasterProgressCallback>;
