//! Error types for the tex-raster library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`RasterError`] — **Fatal**: the run cannot proceed (unreadable source
//!   tree, a formula that matches no rewrite template, a fetch that exhausted
//!   its attempts). Returned as `Err(RasterError)` from the top-level
//!   `rasterize*` and `scan` functions.
//!
//! * [`FetchError`] — **Transient**: a single download attempt failed. It is
//!   retried locally by the fetcher and only escalates to
//!   [`RasterError::FetchExhausted`] once every attempt has failed.
//!
//! There is no partial-success mode. Documents that were fully rewritten
//! before a fatal error stay rewritten on disk; the failing document is left
//! as it was before the failing phase.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the tex-raster library.
#[derive(Debug, Error)]
pub enum RasterError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The source directory does not exist.
    #[error("Source directory not found: '{path}'\nCheck the --source path exists and is a directory.")]
    SourceNotFound { path: PathBuf },

    /// Walking the source tree failed (permission denied, broken symlink loop…).
    #[error("Failed to scan source tree under '{path}': {detail}")]
    WalkFailed { path: PathBuf, detail: String },

    /// A document could not be read as UTF-8 text.
    #[error("Failed to read document '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// A matched fragment corresponds to no rewrite template.
    ///
    /// Matching and classification share one delimiter table, so this
    /// signals an internal inconsistency. The document is not rewritten.
    #[error("Fragment in '{document}' matches no known formula kind:\n{fragment}")]
    UnclassifiedFragment { document: PathBuf, fragment: String },

    /// A formula image could not be fetched after all attempts.
    #[error(
        "Error on downloading '{target}' after {attempts} attempts for formula {fragment}\n\
         Last error: {last_error}"
    )]
    FetchExhausted {
        fragment: String,
        target: PathBuf,
        attempts: u32,
        last_error: String,
    },

    /// The download directory could not be made absolute.
    #[error("Failed to resolve download directory '{path}': {source}")]
    ResolvePathFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create the image download directory.
    #[error("Failed to create download directory '{path}': {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write a rewritten document back to disk.
    #[error("Failed to write document '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to initialise HTTP client: {0}")]
    HttpClient(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A transient failure of a single fetch attempt.
///
/// Every variant counts as one failed attempt against
/// [`crate::config::RasterConfig::max_attempts`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request never produced a response (DNS, TLS, connection reset…).
    #[error("network error: {0}")]
    Network(String),

    /// The rendering service answered with a non-success status.
    #[error("HTTP {status}")]
    Status { status: u16 },

    /// The response body is not a PNG image.
    #[error("response is not a PNG image (first bytes: {magic:?})")]
    NotAnImage { magic: Vec<u8> },

    /// The image could not be stored at its target path.
    #[error("failed to write image: {0}")]
    Write(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_exhausted_display_names_target_and_formula() {
        let e = RasterError::FetchExhausted {
            fragment: r"\frac{a}{b}".into(),
            target: PathBuf::from("formulas/0badc0de.png"),
            attempts: 3,
            last_error: FetchError::Status { status: 502 }.to_string(),
        };
        let msg = e.to_string();
        assert!(msg.contains("formulas/0badc0de.png"), "got: {msg}");
        assert!(msg.contains(r"\frac{a}{b}"), "got: {msg}");
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert!(msg.contains("HTTP 502"), "got: {msg}");
    }

    #[test]
    fn unclassified_fragment_display() {
        let e = RasterError::UnclassifiedFragment {
            document: PathBuf::from("chapter1.tex"),
            fragment: r"\[ x \]".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("chapter1.tex"));
        assert!(msg.contains(r"\[ x \]"));
    }

    #[test]
    fn not_an_image_display() {
        let e = FetchError::NotAnImage {
            magic: b"<htm".to_vec(),
        };
        assert!(e.to_string().contains("not a PNG"));
    }

    #[test]
    fn write_failed_keeps_source() {
        use std::error::Error as _;
        let e = RasterError::WriteFailed {
            path: PathBuf::from("main.tex"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        };
        assert!(e.source().is_some());
        assert!(e.to_string().contains("main.tex"));
    }
}
