//! Configuration types for formula rasterisation.
//!
//! All run behaviour is controlled through [`RasterConfig`], built via its
//! [`RasterConfigBuilder`]. The value is constructed once and passed
//! explicitly to every phase that needs it (matcher keywords, download
//! directory, fetch policy), so no phase reads ambient global state.

use crate::error::RasterError;
use crate::pipeline::fetch::FormulaRenderer;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default CodeCogs rendering endpoint. The formula is appended to the query.
pub const DEFAULT_ENDPOINT: &str = "https://latex.codecogs.com/png.latex?";

/// Inline-formula keyword selected when none is configured.
pub const DEFAULT_INLINE_KEYWORD: &str = "bmatrix";

/// Configuration for a rasterisation run.
///
/// # Example
/// ```rust
/// use tex_raster::RasterConfig;
///
/// let config = RasterConfig::builder("paper/", "paper/formulas")
///     .inline_keywords(["bmatrix", "pmatrix"])
///     .concurrency(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 3);
/// ```
#[derive(Clone)]
pub struct RasterConfig {
    /// Root directory scanned recursively for documents.
    pub source: PathBuf,

    /// Directory that receives one `<id>.png` per distinct formula.
    ///
    /// Shared by every document of the tree: identical formulas in different
    /// documents resolve to the same file.
    pub download_path: PathBuf,

    /// Keywords that make an inline `$…$` formula eligible for rasterisation.
    /// Default: `["bmatrix"]`.
    ///
    /// Inline math converts fine to .docx in most cases; matrices are the
    /// usual exception. An empty list disables inline rasterisation.
    pub inline_keywords: Vec<String>,

    /// Number of concurrent fetches per document. Default: 16.
    pub concurrency: usize,

    /// Attempts per formula before the run is aborted. Default: 3.
    pub max_attempts: u32,

    /// Initial delay between attempts in milliseconds (doubles after each
    /// failure). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-request timeout in seconds. Default: none (network layer decides).
    pub fetch_timeout_secs: Option<u64>,

    /// Rendering service base URL. Default: [`DEFAULT_ENDPOINT`].
    pub endpoint: String,

    /// Resolution requested from the rendering service. Default: 600.
    ///
    /// Rewritten documents scale images by 0.18, so 600 DPI keeps the
    /// printed formula sharp at roughly body-text size.
    pub dpi: u32,

    /// Background colour requested from the rendering service. Default: "white".
    pub background: String,

    /// File extension (without dot) of documents to process. Default: "tex".
    pub extension: String,

    /// Pre-constructed renderer. Takes precedence over the HTTP renderer
    /// built from `endpoint`/`dpi`/`background`.
    pub renderer: Option<Arc<dyn FormulaRenderer>>,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for RasterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterConfig")
            .field("source", &self.source)
            .field("download_path", &self.download_path)
            .field("inline_keywords", &self.inline_keywords)
            .field("concurrency", &self.concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("endpoint", &self.endpoint)
            .field("dpi", &self.dpi)
            .field("background", &self.background)
            .field("extension", &self.extension)
            .field("renderer", &self.renderer.as_ref().map(|_| "<dyn FormulaRenderer>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn RasterProgressCallback>"),
            )
            .finish()
    }
}

impl RasterConfig {
    /// Create a new builder. `source` and `download_path` are required.
    pub fn builder(source: impl AsRef<Path>, download_path: impl AsRef<Path>) -> RasterConfigBuilder {
        RasterConfigBuilder {
            config: RasterConfig {
                source: source.as_ref().to_path_buf(),
                download_path: download_path.as_ref().to_path_buf(),
                inline_keywords: vec![DEFAULT_INLINE_KEYWORD.to_string()],
                concurrency: 16,
                max_attempts: 3,
                retry_backoff_ms: 500,
                fetch_timeout_secs: None,
                endpoint: DEFAULT_ENDPOINT.to_string(),
                dpi: 600,
                background: "white".to_string(),
                extension: "tex".to_string(),
                renderer: None,
                progress_callback: None,
            },
        }
    }
}

/// Builder for [`RasterConfig`].
#[derive(Debug)]
pub struct RasterConfigBuilder {
    config: RasterConfig,
}

impl RasterConfigBuilder {
    pub fn inline_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.inline_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = Some(secs);
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(50, 2400);
        self
    }

    pub fn background(mut self, colour: impl Into<String>) -> Self {
        self.config.background = colour.into();
        self
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.config.extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn FormulaRenderer>) -> Self {
        self.config.renderer = Some(renderer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RasterConfig, RasterError> {
        let c = &self.config;
        if c.source.as_os_str().is_empty() {
            return Err(RasterError::InvalidConfig("source directory is required".into()));
        }
        if c.download_path.as_os_str().is_empty() {
            return Err(RasterError::InvalidConfig("download path is required".into()));
        }
        if c.concurrency == 0 {
            return Err(RasterError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.max_attempts == 0 {
            return Err(RasterError::InvalidConfig("Attempts must be ≥ 1".into()));
        }
        if c.extension.is_empty() {
            return Err(RasterError::InvalidConfig("Document extension must not be empty".into()));
        }
        if c.inline_keywords.iter().any(|k| k.is_empty()) {
            return Err(RasterError::InvalidConfig(
                "Inline rasterisation keywords must not be empty strings".into(),
            ));
        }
        if !c.endpoint.starts_with("http://") && !c.endpoint.starts_with("https://") {
            return Err(RasterError::InvalidConfig(format!(
                "Endpoint must be an HTTP/HTTPS URL, got '{}'",
                c.endpoint
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = RasterConfig::builder("src", "img").build().unwrap();
        assert_eq!(c.inline_keywords, vec!["bmatrix".to_string()]);
        assert_eq!(c.concurrency, 16);
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.dpi, 600);
        assert_eq!(c.background, "white");
        assert_eq!(c.extension, "tex");
        assert_eq!(c.endpoint, DEFAULT_ENDPOINT);
        assert!(c.fetch_timeout_secs.is_none());
    }

    #[test]
    fn setters_clamp() {
        let c = RasterConfig::builder("src", "img")
            .concurrency(0)
            .max_attempts(0)
            .dpi(10_000)
            .extension(".ltx")
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_attempts, 1);
        assert_eq!(c.dpi, 2400);
        assert_eq!(c.extension, "ltx");
    }

    #[test]
    fn empty_source_rejected() {
        let err = RasterConfig::builder("", "img").build().unwrap_err();
        assert!(matches!(err, RasterError::InvalidConfig(_)));
    }

    #[test]
    fn empty_keyword_rejected() {
        let err = RasterConfig::builder("src", "img")
            .inline_keywords([""])
            .build()
            .unwrap_err();
        assert!(matches!(err, RasterError::InvalidConfig(_)));
    }

    #[test]
    fn non_http_endpoint_rejected() {
        let err = RasterConfig::builder("src", "img")
            .endpoint("ftp://example.com/")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ftp://"));
    }

    #[test]
    fn debug_hides_trait_objects() {
        let c = RasterConfig::builder("src", "img").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("download_path"));
        assert!(dbg.contains("renderer: None"));
    }
}
