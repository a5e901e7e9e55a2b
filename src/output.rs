//! Result types returned by [`crate::rasterize`] and [`crate::scan`].
//!
//! Everything here is plain data with `serde` derives so the CLI can print a
//! run as JSON (`--json`) and callers can persist reports between runs.

use crate::pipeline::matcher::FragmentKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of a complete rasterisation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    /// One report per processed document, in processing order.
    pub documents: Vec<DocumentReport>,
    /// What the tree-wide preamble fixup did.
    pub preamble: PreambleOutcome,
    /// Aggregated counters.
    pub stats: RunStats,
}

/// Per-document result of the match → fetch → rewrite phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub path: PathBuf,
    /// Distinct fragments selected for rasterisation.
    pub fragments: Vec<FragmentRecord>,
    /// Whether the rewritten text differed from the original and was written.
    pub rewritten: bool,
    /// Whether the text as read declared the `adjustbox` package.
    pub declares_alignment_package: bool,
    /// Wall-clock time spent on this document.
    pub duration_ms: u64,
}

impl DocumentReport {
    /// Images that had to be downloaded for this document.
    pub fn downloaded(&self) -> usize {
        self.fragments.iter().filter(|f| !f.cached).count()
    }

    /// Images that already existed before this document was processed.
    pub fn cached(&self) -> usize {
        self.fragments.iter().filter(|f| f.cached).count()
    }
}

/// One distinct formula fragment and its image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRecord {
    /// 8-hex-char content address.
    pub id: String,
    pub kind: FragmentKind,
    /// Absolute or download-dir-relative image path.
    pub target: PathBuf,
    /// The image already existed (no request was made).
    pub cached: bool,
    /// Download attempts used; 0 when cached or scanned only.
    pub attempts: u32,
}

/// Result of a network-free [`crate::scan`] over one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentScan {
    pub path: PathBuf,
    /// Fragments that a real run would rasterise; `cached` tells which
    /// images are already present.
    pub fragments: Vec<FragmentRecord>,
    pub declares_alignment_package: bool,
    pub has_document_start: bool,
}

/// What the preamble fixup decided for the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PreambleOutcome {
    /// At least one document already declares the package; nothing injected.
    AlreadyDeclared { path: PathBuf },
    /// The declaration was inserted before `\begin{document}` in these files.
    Injected { documents: Vec<PathBuf> },
    /// No document declares the package and none has a `\begin{document}`.
    NoDocumentStart,
}

/// Aggregate counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub documents_scanned: usize,
    pub documents_rewritten: usize,
    /// Sum over documents of distinct fragments (a formula shared by two
    /// documents counts twice).
    pub fragments_total: usize,
    pub images_downloaded: usize,
    pub images_cached: usize,
    pub preamble_injections: usize,
    pub total_duration_ms: u64,
}

impl RunStats {
    /// Fold one document report into the counters.
    pub fn record(&mut self, report: &DocumentReport) {
        self.documents_scanned += 1;
        if report.rewritten {
            self.documents_rewritten += 1;
        }
        self.fragments_total += report.fragments.len();
        self.images_downloaded += report.downloaded();
        self.images_cached += report.cached();
    }
}
