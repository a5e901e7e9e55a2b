//! Run entry points: rasterise a whole tree, or scan it without side effects.
//!
//! A run processes documents one at a time. For each document the fetch
//! phase completes (or aborts the run) before the rewrite phase starts, and
//! the preamble fixup runs once after every document has been rewritten.

use crate::config::RasterConfig;
use crate::error::RasterError;
use crate::output::{
    DocumentReport, DocumentScan, FragmentRecord, PreambleOutcome, RunOutput, RunStats,
};
use crate::pipeline::fetch::{self, FetchOutcome, FormulaRenderer, HttpRenderer};
use crate::pipeline::identify::{resolve_download_dir, RasterTarget};
use crate::pipeline::{document, matcher, preamble, rewrite};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Rasterise every matching formula under `config.source`.
///
/// # Returns
/// `Ok(RunOutput)` once every document has been rewritten and the preamble
/// fixup has run.
///
/// # Errors
/// The first fatal error aborts the run:
/// - source directory missing, document unreadable or unwritable
/// - a fragment that matches no template kind
/// - a formula image that failed every fetch attempt
///
/// Documents processed before the failure keep their rewritten text.
pub async fn rasterize(config: &RasterConfig) -> Result<RunOutput, RasterError> {
    let total_start = Instant::now();
    info!("Starting rasterisation under {}", config.source.display());

    // ── Step 1: Prepare output directory and renderer ────────────────────
    tokio::fs::create_dir_all(&config.download_path)
        .await
        .map_err(|e| RasterError::CreateDirFailed {
            path: config.download_path.clone(),
            source: e,
        })?;
    let renderer = resolve_renderer(config)?;

    // ── Step 2: Discover documents ───────────────────────────────────────
    let documents = document::discover_documents(&config.source, &config.extension)?;
    info!("Found {} documents", documents.len());
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(documents.len());
    }

    // ── Step 3: Per-document match → fetch → rewrite ─────────────────────
    let mut reports = Vec::with_capacity(documents.len());
    let mut stats = RunStats::default();
    for (idx, path) in documents.iter().enumerate() {
        if let Some(ref cb) = config.progress_callback {
            cb.on_document_start(path, idx + 1, documents.len());
        }
        let report = rasterize_document(path, &renderer, config).await?;
        if let Some(ref cb) = config.progress_callback {
            cb.on_document_complete(&report);
        }
        stats.record(&report);
        reports.push(report);
    }

    // ── Step 4: Tree-wide preamble fixup ─────────────────────────────────
    let preamble = preamble::fix_preamble(&reports).await?;
    if let PreambleOutcome::Injected { ref documents } = preamble {
        stats.preamble_injections = documents.len();
    }
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Rasterisation complete: {}/{} documents rewritten, {} images downloaded, {} cached, {}ms",
        stats.documents_rewritten,
        stats.documents_scanned,
        stats.images_downloaded,
        stats.images_cached,
        stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(&stats);
    }

    Ok(RunOutput {
        documents: reports,
        preamble,
        stats,
    })
}

/// Synchronous wrapper around [`rasterize`].
///
/// Creates a temporary tokio runtime internally.
pub fn rasterize_sync(config: &RasterConfig) -> Result<RunOutput, RasterError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RasterError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(rasterize(config))
}

/// Process one document: read, match, fetch, rewrite, write back.
///
/// The document is written only when its text actually changed.
pub async fn rasterize_document(
    path: &Path,
    renderer: &Arc<dyn FormulaRenderer>,
    config: &RasterConfig,
) -> Result<DocumentReport, RasterError> {
    let start = Instant::now();
    let text = document::read_document(path).await?;
    let declares_alignment_package = preamble::declares_alignment_package(&text);

    let targets = collect_targets(&text, path, config)?;
    debug!("{}: {} distinct fragments", path.display(), targets.len());

    let outcomes = fetch::fetch_all(&targets, renderer, config).await?;

    let rewritten_text = rewrite::rewrite_document(&text, &targets);
    let rewritten = rewritten_text != text;
    if rewritten {
        document::write_document(path, &rewritten_text).await?;
    }

    let fragments = targets
        .iter()
        .zip(outcomes)
        .map(|(target, outcome)| record(target, outcome))
        .collect();

    Ok(DocumentReport {
        path: path.to_path_buf(),
        fragments,
        rewritten,
        declares_alignment_package,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Report what a run would do, without network access or writes.
///
/// Does not require the download directory to exist.
pub async fn scan(config: &RasterConfig) -> Result<Vec<DocumentScan>, RasterError> {
    let documents = document::discover_documents(&config.source, &config.extension)?;
    let mut scans = Vec::with_capacity(documents.len());

    for path in documents {
        let text = document::read_document(&path).await?;
        let targets = collect_targets(&text, &path, config)?;

        let mut fragments = Vec::with_capacity(targets.len());
        for target in &targets {
            let cached = tokio::fs::metadata(&target.path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            fragments.push(FragmentRecord {
                id: target.id.clone(),
                kind: target.fragment.kind(),
                target: target.path.clone(),
                cached,
                attempts: 0,
            });
        }

        scans.push(DocumentScan {
            declares_alignment_package: preamble::declares_alignment_package(&text),
            has_document_start: preamble::has_document_start(&text),
            path,
            fragments,
        });
    }

    Ok(scans)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Match, classify and address the fragments of one document.
fn collect_targets(
    text: &str,
    path: &Path,
    config: &RasterConfig,
) -> Result<Vec<RasterTarget>, RasterError> {
    let texts = matcher::find_fragments(text, &config.inline_keywords);
    let fragments = matcher::classify_all(texts, path)?;
    let download_dir = resolve_download_dir(&config.download_path)?;
    Ok(fragments
        .into_iter()
        .map(|f| RasterTarget::new(f, &download_dir))
        .collect())
}

fn record(target: &RasterTarget, outcome: FetchOutcome) -> FragmentRecord {
    FragmentRecord {
        id: target.id.clone(),
        kind: target.fragment.kind(),
        target: target.path.clone(),
        cached: outcome.is_cached(),
        attempts: outcome.attempts(),
    }
}

/// Use the injected renderer if any, otherwise the CodeCogs HTTP renderer.
fn resolve_renderer(config: &RasterConfig) -> Result<Arc<dyn FormulaRenderer>, RasterError> {
    if let Some(ref renderer) = config.renderer {
        return Ok(Arc::clone(renderer));
    }
    Ok(Arc::new(HttpRenderer::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::pipeline::fetch::PNG_MAGIC;
    use async_trait::async_trait;

    struct StaticRenderer;

    #[async_trait]
    impl FormulaRenderer for StaticRenderer {
        async fn render(&self, _formula: &str) -> Result<Vec<u8>, FetchError> {
            Ok(PNG_MAGIC.to_vec())
        }
    }

    fn config(root: &Path) -> RasterConfig {
        RasterConfig::builder(root.join("src"), root.join("img"))
            .renderer(Arc::new(StaticRenderer))
            .retry_backoff_ms(0)
            .build()
            .unwrap()
    }

    #[test]
    fn scan_reports_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let doc = "\\begin{document}\n\\begin{equation}a\\end{equation}\n\\end{document}\n";
        std::fs::write(src.join("main.tex"), doc).unwrap();

        let scans = tokio_test::block_on(scan(&config(dir.path()))).unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].fragments.len(), 1);
        assert!(!scans[0].fragments[0].cached);
        assert!(scans[0].has_document_start);
        assert!(!scans[0].declares_alignment_package);
        assert!(!dir.path().join("img").exists());
        assert_eq!(std::fs::read_to_string(src.join("main.tex")).unwrap(), doc);
    }

    #[tokio::test]
    async fn unchanged_document_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("plain.tex"), "no math here $x$\n").unwrap();

        let out = rasterize(&config(dir.path())).await.unwrap();
        assert_eq!(out.stats.documents_scanned, 1);
        assert_eq!(out.stats.documents_rewritten, 0);
        assert!(out.documents[0].fragments.is_empty());
    }

    #[test]
    fn sync_wrapper_runs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        let out = rasterize_sync(&config(dir.path())).unwrap();
        assert_eq!(out.stats.documents_scanned, 0);
        assert_eq!(out.preamble, PreambleOutcome::NoDocumentStart);
        assert!(dir.path().join("img").is_dir());
    }
}
