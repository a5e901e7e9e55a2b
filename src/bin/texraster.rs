//! CLI binary for tex-raster.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `RasterConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tex_raster::{
    rasterize, scan, DocumentReport, FetchOutcome, PreambleOutcome, ProgressCallback,
    RasterConfig, RasterProgressCallback, RunStats,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over documents, one log line per
/// document, and a running count of images fetched for the current one.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Images settled (downloaded or cached) in the current document.
    fetched: AtomicUsize,
    retries: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Rasterising");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            fetched: AtomicUsize::new(0),
            retries: AtomicUsize::new(0),
        })
    }
}

impl RasterProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Scanning {total_documents} documents…"))
        ));
    }

    fn on_document_start(&self, path: &Path, _index: usize, _total: usize) {
        self.fetched.store(0, Ordering::SeqCst);
        self.bar.set_message(short_name(path));
    }

    fn on_fetch_complete(&self, _target: &Path, _outcome: FetchOutcome) {
        let n = self.fetched.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.set_message(format!("{n} images"));
    }

    fn on_fetch_retry(&self, target: &Path, attempt: u32, error: &str) {
        self.retries.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {}  attempt {} failed: {}",
            yellow("↻"),
            short_name(target),
            attempt,
            dim(error)
        ));
    }

    fn on_document_complete(&self, report: &DocumentReport) {
        let mark = if report.rewritten { green("✓") } else { dim("·") };
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            mark,
            report.path.display(),
            dim(&format!(
                "{:>3} formulas ({} new, {} cached)",
                report.fragments.len(),
                report.downloaded(),
                report.cached()
            )),
            dim(&format!("{:.1}s", report.duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _stats: &RunStats) {
        self.bar.finish_and_clear();
    }
}

fn short_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Rasterise equations and inline matrices of a thesis
  texraster --source thesis/ --download-path thesis/formulas

  # Also rasterise inline formulas containing pmatrix or cases
  texraster --source paper/ --download-path img \
      --inline-formula-rasterisation-keywords bmatrix pmatrix cases

  # See what would be rasterised, without network access or writes
  texraster --source paper/ --download-path img --scan-only

  # Machine-readable run report
  texraster --source paper/ --download-path img --json > report.json

BEHAVIOUR:
  Each distinct formula becomes <download-path>/<id>.png, where <id> is the
  first 8 hex digits of the formula's MD5. Existing images are reused, so a
  second run downloads nothing and leaves the documents unchanged.

  If no document declares \usepackage[export]{adjustbox}, it is inserted
  before \begin{document} in every document that has one.

ENVIRONMENT VARIABLES:
  TEXRASTER_SOURCE, TEXRASTER_DOWNLOAD_PATH, TEXRASTER_KEYWORDS,
  TEXRASTER_CONCURRENCY, TEXRASTER_MAX_ATTEMPTS, TEXRASTER_ENDPOINT, …
  RUST_LOG overrides the log filter (e.g. RUST_LOG=tex_raster=debug).
"#;

/// Replace LaTeX formulas with rendered PNG images before .docx conversion.
#[derive(Parser, Debug)]
#[command(
    name = "texraster",
    version,
    about = "Replace LaTeX formulas with rendered PNG images before .docx conversion",
    long_about = "Scan a tree of .tex files, download a PNG rendering of every equation \
environment and of inline formulas containing a trigger keyword, and rewrite the sources \
to include the images instead.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Source directory whose .tex files will be rewritten.
    #[arg(long, env = "TEXRASTER_SOURCE")]
    source: PathBuf,

    /// Directory where rasterised formulas are saved.
    #[arg(long, env = "TEXRASTER_DOWNLOAD_PATH")]
    download_path: PathBuf,

    /// Inline formulas containing any of these keywords are rasterised.
    #[arg(
        long,
        env = "TEXRASTER_KEYWORDS",
        num_args = 1..,
        value_delimiter = ',',
        default_values_t = [String::from("bmatrix")]
    )]
    inline_formula_rasterisation_keywords: Vec<String>,

    /// Concurrent downloads per document.
    #[arg(short, long, env = "TEXRASTER_CONCURRENCY", default_value_t = 16)]
    concurrency: usize,

    /// Download attempts per formula before giving up.
    #[arg(long, env = "TEXRASTER_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Initial delay between attempts in milliseconds (doubles each retry).
    #[arg(long, env = "TEXRASTER_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Per-request timeout in seconds (default: none).
    #[arg(long, env = "TEXRASTER_FETCH_TIMEOUT")]
    fetch_timeout: Option<u64>,

    /// Rendering service base URL.
    #[arg(long, env = "TEXRASTER_ENDPOINT", default_value = tex_raster::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Rendering resolution.
    #[arg(long, env = "TEXRASTER_DPI", default_value_t = 600,
          value_parser = clap::value_parser!(u32).range(50..=2400))]
    dpi: u32,

    /// Background colour passed to the renderer.
    #[arg(long, env = "TEXRASTER_BACKGROUND", default_value = "white")]
    background: String,

    /// Document file extension.
    #[arg(long, env = "TEXRASTER_EXTENSION", default_value = "tex")]
    extension: String,

    /// Report what would be rasterised; no downloads, no writes.
    #[arg(long)]
    scan_only: bool,

    /// Output a JSON report instead of the human summary.
    #[arg(long, env = "TEXRASTER_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "TEXRASTER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TEXRASTER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TEXRASTER_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.scan_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn RasterProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Scan-only mode ───────────────────────────────────────────────────
    if cli.scan_only {
        let scans = scan(&config).await.context("Scan failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&scans).context("Failed to serialise scan")?
            );
        } else {
            for doc in &scans {
                let pending = doc.fragments.iter().filter(|f| !f.cached).count();
                println!(
                    "{}  {} formulas, {} to download{}",
                    doc.path.display(),
                    doc.fragments.len(),
                    pending,
                    if doc.declares_alignment_package {
                        ", declares adjustbox"
                    } else {
                        ""
                    }
                );
                for f in &doc.fragments {
                    println!(
                        "    {} {:<13} {}",
                        f.id,
                        format!("{:?}", f.kind),
                        if f.cached { "cached" } else { "missing" }
                    );
                }
            }
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let output = rasterize(&config).await.context("Rasterisation failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise report")?
        );
        return Ok(());
    }

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} documents rewritten  {} images downloaded, {} cached  {}ms",
            green("✔"),
            bold(&stats.documents_rewritten.to_string()),
            stats.documents_scanned,
            stats.images_downloaded,
            stats.images_cached,
            stats.total_duration_ms,
        );
        match &output.preamble {
            PreambleOutcome::AlreadyDeclared { path } => eprintln!(
                "   {}",
                dim(&format!("adjustbox already declared in {}", path.display()))
            ),
            PreambleOutcome::Injected { documents } => eprintln!(
                "   {} adjustbox declared in {} document(s)",
                cyan("+"),
                documents.len()
            ),
            PreambleOutcome::NoDocumentStart => eprintln!(
                "   {} no document declares adjustbox and none has \\begin{{document}}; \
                 add \\usepackage[export]{{adjustbox}} to your preamble",
                yellow("⚠")
            ),
        }
    }

    Ok(())
}

/// Map CLI args to `RasterConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<RasterConfig> {
    let mut builder = RasterConfig::builder(&cli.source, &cli.download_path)
        .inline_keywords(cli.inline_formula_rasterisation_keywords.iter().cloned())
        .concurrency(cli.concurrency)
        .max_attempts(cli.max_attempts)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .endpoint(cli.endpoint.clone())
        .dpi(cli.dpi)
        .background(cli.background.clone())
        .extension(cli.extension.clone());

    if let Some(secs) = cli.fetch_timeout {
        builder = builder.fetch_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn keywords_accept_several_values() {
        let cli = Cli::try_parse_from([
            "texraster",
            "--source",
            "src",
            "--download-path",
            "img",
            "--inline-formula-rasterisation-keywords",
            "bmatrix",
            "pmatrix",
        ])
        .unwrap();
        assert_eq!(
            cli.inline_formula_rasterisation_keywords,
            vec!["bmatrix".to_string(), "pmatrix".to_string()]
        );
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.inline_keywords.len(), 2);
        assert_eq!(config.concurrency, 16);
    }

    #[test]
    fn keywords_default_to_bmatrix() {
        let cli =
            Cli::try_parse_from(["texraster", "--source", "s", "--download-path", "d"]).unwrap();
        assert_eq!(cli.inline_formula_rasterisation_keywords, vec!["bmatrix"]);
    }
}
