//! # tex-raster
//!
//! Rasterise LaTeX formulas that do not survive conversion to word-processor
//! formats.
//!
//! ## Why this crate?
//!
//! Converting a LaTeX project to `.docx` (pandoc and friends) handles plain
//! math well but mangles numbered equations with labels and inline matrices.
//! This crate replaces those fragments in the `.tex` sources with
//! `\includegraphics` references to PNG renderings fetched from an external
//! rendering service, so the converter only has to carry an image across.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source tree
//!  │
//!  ├─ 1. Discover  every *.tex under the source directory
//!  ├─ 2. Match     equation / equation* environments, keyword-bearing $…$
//!  ├─ 3. Identify  md5-prefix content address → <download_path>/<id>.png
//!  ├─ 4. Fetch     concurrent downloads (16 in flight), 3 attempts each
//!  ├─ 5. Rewrite   fragments → \includegraphics templates, labels kept
//!  └─ 6. Preamble  declare \usepackage[export]{adjustbox} once per tree
//! ```
//!
//! Rewritten output is never matched again, so running the tool twice over
//! the same tree is a no-op.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tex_raster::{rasterize, RasterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RasterConfig::builder("thesis/", "thesis/formulas").build()?;
//!     let output = rasterize(&config).await?;
//!     eprintln!(
//!         "{} documents rewritten, {} images downloaded",
//!         output.stats.documents_rewritten, output.stats.images_downloaded
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `texraster` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod rasterize;
pub mod templates;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{RasterConfig, RasterConfigBuilder, DEFAULT_ENDPOINT, DEFAULT_INLINE_KEYWORD};
pub use error::{FetchError, RasterError};
pub use output::{
    DocumentReport, DocumentScan, FragmentRecord, PreambleOutcome, RunOutput, RunStats,
};
pub use pipeline::fetch::{FetchOutcome, FormulaRenderer, HttpRenderer};
pub use pipeline::identify::fragment_id;
pub use pipeline::matcher::{Fragment, FragmentKind};
pub use progress::{NoopProgressCallback, ProgressCallback, RasterProgressCallback};
pub use rasterize::{rasterize, rasterize_document, rasterize_sync, scan};
