//! Content addressing: fragment text → stable 8-hex-char identifier.
//!
//! The identifier is the first 8 hex digits of the MD5 digest of the
//! fragment's exact UTF-8 text. It doubles as the image file stem, so an
//! unchanged formula maps to the same file on every run (and in every
//! document), which is what lets the fetcher skip it the second time.
//! MD5 is used for addressing only, not for integrity or security.

use crate::error::RasterError;
use crate::pipeline::matcher::Fragment;
use md5::{Digest, Md5};
use std::path::{Component, Path, PathBuf};

/// Number of hex digits kept from the digest.
pub const ID_LEN: usize = 8;

/// File extension of every rasterised formula.
pub const IMAGE_EXTENSION: &str = "png";

/// Derive the identifier of a fragment text.
pub fn fragment_id(text: &str) -> String {
    hex::encode(Md5::digest(text.as_bytes()))[..ID_LEN].to_string()
}

/// Absolute form of the download directory with `.` and `..` folded away.
///
/// Resolution is lexical, so the directory need not exist yet. Every image
/// path embedded in a rewritten document is built on this directory.
pub fn resolve_download_dir(dir: &Path) -> Result<PathBuf, RasterError> {
    let absolute = std::path::absolute(dir).map_err(|e| RasterError::ResolvePathFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other.as_os_str()),
        }
    }
    Ok(clean)
}

/// A fragment paired with the file its image must be stored in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterTarget {
    pub fragment: Fragment,
    pub id: String,
    /// `download_dir/<id>.png`
    pub path: PathBuf,
}

impl RasterTarget {
    /// `download_dir` is expected to come from [`resolve_download_dir`].
    pub fn new(fragment: Fragment, download_dir: &Path) -> Self {
        let id = fragment_id(fragment.text());
        let path = download_dir.join(format!("{id}.{IMAGE_EXTENSION}"));
        Self { fragment, id, path }
    }
}
