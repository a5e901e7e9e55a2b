//! Formula fetching: obtain one PNG per distinct fragment.
//!
//! Rendering is delegated to a [`FormulaRenderer`]. The default
//! [`HttpRenderer`] asks the CodeCogs service for a PNG; tests and callers
//! with their own rendering backend inject a different implementation via
//! [`crate::config::RasterConfigBuilder::renderer`].
//!
//! ## Retry Strategy
//!
//! Any failure of an attempt (network error, non-2xx status, a body that is
//! not a PNG, or a failed write) counts against `max_attempts` (default 3).
//! Attempt `n` (from 2 on) waits `retry_backoff_ms * 2^(n-2)` first, so the
//! delays run 500 ms, 1 s, 2 s… with the default backoff.
//! Once every attempt has failed the whole run is aborted with
//! [`RasterError::FetchExhausted`]: a document must never be rewritten to
//! point at an image that does not exist.
//!
//! ## Concurrency
//!
//! [`fetch_all`] drives up to `concurrency` fetches at once through
//! `buffer_unordered` and returns only after every fetch has finished, so
//! the rewriter always sees a complete image set.

use crate::config::RasterConfig;
use crate::error::{FetchError, RasterError};
use crate::pipeline::identify::RasterTarget;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// The 8-byte signature every PNG file starts with.
pub const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Turns formula source into PNG bytes.
///
/// `formula` is the math content only: the environment or `$` delimiters
/// have already been stripped.
#[async_trait]
pub trait FormulaRenderer: Send + Sync {
    async fn render(&self, formula: &str) -> Result<Vec<u8>, FetchError>;
}

/// Renderer backed by the CodeCogs HTTP service.
pub struct HttpRenderer {
    client: reqwest::Client,
    endpoint: String,
    dpi: u32,
    background: String,
}

impl HttpRenderer {
    pub fn new(config: &RasterConfig) -> Result<Self, RasterError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("tex-raster/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = config.fetch_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| RasterError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            dpi: config.dpi,
            background: config.background.clone(),
        })
    }

    /// The exact URL requested for `formula`.
    pub fn request_url(&self, formula: &str) -> String {
        build_request_url(&self.endpoint, self.dpi, &self.background, formula)
    }
}

#[async_trait]
impl FormulaRenderer for HttpRenderer {
    async fn render(&self, formula: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.request_url(formula);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !bytes.starts_with(&PNG_MAGIC) {
            return Err(FetchError::NotAnImage {
                magic: bytes.iter().take(PNG_MAGIC.len()).copied().collect(),
            });
        }

        Ok(bytes.to_vec())
    }
}

/// Build the rendering request: fixed resolution and background parameters
/// first, then the escaped formula.
pub fn build_request_url(endpoint: &str, dpi: u32, background: &str, formula: &str) -> String {
    format!(
        "{endpoint}\\dpi{{{dpi}}}&space;\\bg_{background}&space;{}",
        escape_formula(formula)
    )
}

/// Spaces become the service's `&space;` token; line breaks are dropped.
pub fn escape_formula(formula: &str) -> String {
    formula.replace(['\n', '\r'], "").replace(' ', "&space;")
}

/// How a single target was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The file already existed; no request was made.
    Cached,
    /// The file was downloaded, using this many attempts.
    Downloaded { attempts: u32 },
}

impl FetchOutcome {
    pub fn is_cached(self) -> bool {
        matches!(self, FetchOutcome::Cached)
    }

    pub fn attempts(self) -> u32 {
        match self {
            FetchOutcome::Cached => 0,
            FetchOutcome::Downloaded { attempts } => attempts,
        }
    }
}

/// Fetch every target concurrently; outcomes are returned in input order.
///
/// The first exhausted target aborts the batch: its error is returned and
/// the remaining in-flight fetches are dropped.
pub async fn fetch_all(
    targets: &[RasterTarget],
    renderer: &Arc<dyn FormulaRenderer>,
    config: &RasterConfig,
) -> Result<Vec<FetchOutcome>, RasterError> {
    let completed: Vec<(usize, FetchOutcome)> =
        stream::iter(targets.iter().enumerate().map(|(idx, target)| async move {
            let outcome = fetch_one(target, renderer, config).await?;
            if let Some(ref cb) = config.progress_callback {
                cb.on_fetch_complete(&target.path, outcome);
            }
            Ok::<_, RasterError>((idx, outcome))
        }))
        .buffer_unordered(config.concurrency)
        .try_collect()
        .await?;

    let mut outcomes = vec![FetchOutcome::Cached; targets.len()];
    for (idx, outcome) in completed {
        outcomes[idx] = outcome;
    }
    Ok(outcomes)
}

/// Ensure `target.path` holds an image, downloading it if necessary.
pub async fn fetch_one(
    target: &RasterTarget,
    renderer: &Arc<dyn FormulaRenderer>,
    config: &RasterConfig,
) -> Result<FetchOutcome, RasterError> {
    if is_file(&target.path).await {
        info!("Skip downloading {}", target.path.display());
        return Ok(FetchOutcome::Cached);
    }

    let formula = target.fragment.body();
    let mut last_err: Option<FetchError> = None;

    for attempt in 1..=config.max_attempts {
        if attempt > 1 {
            let backoff = config
                .retry_backoff_ms
                .saturating_mul(1u64 << (attempt - 2).min(16));
            if backoff > 0 {
                sleep(Duration::from_millis(backoff)).await;
            }
        }

        let result = match renderer.render(formula).await {
            Ok(bytes) => write_image(&target.path, bytes).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!("Finish downloading {}", target.path.display());
                return Ok(FetchOutcome::Downloaded { attempts: attempt });
            }
            Err(e) => {
                warn!(
                    "{}: attempt {}/{} failed: {}",
                    target.path.display(),
                    attempt,
                    config.max_attempts,
                    e
                );
                if attempt < config.max_attempts {
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_fetch_retry(&target.path, attempt, &e.to_string());
                    }
                }
                last_err = Some(e);
            }
        }
    }

    Err(RasterError::FetchExhausted {
        fragment: target.fragment.text().to_string(),
        target: target.path.clone(),
        attempts: config.max_attempts,
        last_error: last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string()),
    })
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Write through a temp file in the target directory, then rename.
///
/// Two documents sharing a formula may download it at the same time; the
/// rename means readers only ever see a complete file.
async fn write_image(path: &Path, bytes: Vec<u8>) -> Result<(), FetchError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok::<(), std::io::Error>(())
    })
    .await
    .map_err(|e| FetchError::Write(format!("write task panicked: {e}")))?
    .map_err(|e| FetchError::Write(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::matcher::Fragment;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails the first `failures` calls, then returns a tiny PNG.
    struct FlakyRenderer {
        failures: usize,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl FlakyRenderer {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl FormulaRenderer for FlakyRenderer {
        async fn render(&self, formula: &str) -> Result<Vec<u8>, FetchError> {
            self.seen.lock().unwrap().push(formula.to_string());
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(FetchError::Status { status: 503 })
            } else {
                Ok(PNG_MAGIC.to_vec())
            }
        }
    }

    /// Records the peak number of concurrent renders.
    struct SlowRenderer {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl FormulaRenderer for SlowRenderer {
        async fn render(&self, _formula: &str) -> Result<Vec<u8>, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(PNG_MAGIC.to_vec())
        }
    }

    fn config(dir: &Path) -> RasterConfig {
        RasterConfig::builder(dir, dir)
            .retry_backoff_ms(0)
            .build()
            .unwrap()
    }

    fn target(text: &str, dir: &Path) -> RasterTarget {
        RasterTarget::new(Fragment::classify(text, Path::new("t.tex")).unwrap(), dir)
    }

    #[test]
    fn request_url_prefixes_parameters_and_escapes() {
        let url = build_request_url(
            "https://latex.codecogs.com/png.latex?",
            600,
            "white",
            "a + b\n= c",
        );
        assert_eq!(
            url,
            "https://latex.codecogs.com/png.latex?\\dpi{600}&space;\\bg_white&space;a&space;+&space;b=&space;c"
        );
    }

    #[test]
    fn escape_strips_crlf() {
        assert_eq!(escape_formula("x\r\ny"), "xy");
    }

    #[test]
    fn http_renderer_builds_from_config() {
        let cfg = RasterConfig::builder("s", "d").dpi(300).build().unwrap();
        let r = HttpRenderer::new(&cfg).unwrap();
        assert!(r.request_url("x").contains("\\dpi{300}"));
    }

    #[tokio::test]
    async fn sends_body_without_delimiters() {
        let dir = tempfile::tempdir().unwrap();
        let flaky = FlakyRenderer::new(0);
        let renderer: Arc<dyn FormulaRenderer> = flaky.clone();
        let t = target("\\begin{equation}E=mc^2\\end{equation}", dir.path());

        fetch_one(&t, &renderer, &config(dir.path())).await.unwrap();
        assert_eq!(*flaky.seen.lock().unwrap(), vec!["E=mc^2".to_string()]);
    }

    #[tokio::test]
    async fn two_failures_then_success() {
        let dir = tempfile::tempdir().unwrap();
        let flaky = FlakyRenderer::new(2);
        let renderer: Arc<dyn FormulaRenderer> = flaky.clone();
        let t = target("$\\bmatrix$", dir.path());

        let outcome = fetch_one(&t, &renderer, &config(dir.path())).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Downloaded { attempts: 3 });
        assert_eq!(std::fs::read(&t.path).unwrap(), PNG_MAGIC.to_vec());
    }

    #[tokio::test]
    async fn three_failures_exhaust() {
        let dir = tempfile::tempdir().unwrap();
        let flaky = FlakyRenderer::new(3);
        let renderer: Arc<dyn FormulaRenderer> = flaky.clone();
        let t = target("$\\bmatrix$", dir.path());

        let err = fetch_one(&t, &renderer, &config(dir.path())).await.unwrap_err();
        match err {
            RasterError::FetchExhausted { target, attempts, .. } => {
                assert_eq!(target, t.path);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert!(!t.path.exists());
    }

    #[tokio::test]
    async fn existing_file_is_not_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let flaky = FlakyRenderer::new(0);
        let renderer: Arc<dyn FormulaRenderer> = flaky.clone();
        let t = target("$\\bmatrix$", dir.path());
        std::fs::write(&t.path, b"not even a png").unwrap();

        let outcome = fetch_one(&t, &renderer, &config(dir.path())).await.unwrap();
        assert!(outcome.is_cached());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fetch_all_respects_concurrency_bound() {
        let dir = tempfile::tempdir().unwrap();
        let slow = Arc::new(SlowRenderer {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let renderer: Arc<dyn FormulaRenderer> = slow.clone();
        let cfg = RasterConfig::builder(dir.path(), dir.path())
            .concurrency(2)
            .build()
            .unwrap();
        let targets: Vec<_> = (0..6)
            .map(|i| target(&format!("\\begin{{equation}}{i}\\end{{equation}}"), dir.path()))
            .collect();

        let outcomes = fetch_all(&targets, &renderer, &cfg).await.unwrap();
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(|o| !o.is_cached()));
        assert!(slow.peak.load(Ordering::SeqCst) <= 2);
        assert!(targets.iter().all(|t| t.path.is_file()));
    }
}
