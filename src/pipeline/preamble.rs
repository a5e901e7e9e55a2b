//! Preamble fixup: declare `adjustbox` once for the whole tree.
//!
//! The block templates use `\includegraphics[valign=c]`, a key provided by
//! `\usepackage[export]{adjustbox}`. In a multi-file project only the root
//! document has a preamble, so the decision is tree-wide: if any document
//! already declares the package nothing is touched, otherwise the
//! declaration goes in front of `\begin{document}` in every document that
//! has one.

use crate::error::RasterError;
use crate::output::{DocumentReport, PreambleOutcome};
use crate::pipeline::document::{read_document, write_document};
use crate::templates::{ALIGNMENT_PACKAGE, DOCUMENT_START};
use tracing::{debug, info};

pub fn declares_alignment_package(text: &str) -> bool {
    text.contains(ALIGNMENT_PACKAGE)
}

pub fn has_document_start(text: &str) -> bool {
    text.contains(DOCUMENT_START)
}

/// Insert the declaration immediately before the first `\begin{document}`.
///
/// Returns `None` when the text has no document start.
pub fn inject_alignment_package(text: &str) -> Option<String> {
    if !has_document_start(text) {
        return None;
    }
    Some(text.replacen(
        DOCUMENT_START,
        &format!("{ALIGNMENT_PACKAGE}\n{DOCUMENT_START}"),
        1,
    ))
}

/// Run the tree-wide decision over the processed documents.
///
/// `reports` carry whether each document declared the package when it was
/// read; documents needing the injection are re-read and re-written.
pub async fn fix_preamble(reports: &[DocumentReport]) -> Result<PreambleOutcome, RasterError> {
    if let Some(report) = reports.iter().find(|r| r.declares_alignment_package) {
        debug!("{} already declares adjustbox", report.path.display());
        return Ok(PreambleOutcome::AlreadyDeclared {
            path: report.path.clone(),
        });
    }

    let mut injected = Vec::new();
    for report in reports {
        let text = read_document(&report.path).await?;
        if let Some(fixed) = inject_alignment_package(&text) {
            write_document(&report.path, &fixed).await?;
            info!("Declared adjustbox in {}", report.path.display());
            injected.push(report.path.clone());
        }
    }

    if injected.is_empty() {
        Ok(PreambleOutcome::NoDocumentStart)
    } else {
        Ok(PreambleOutcome::Injected { documents: injected })
    }
}
