//! Document I/O: discover, read, and write back source files.
//!
//! Documents are read fully into memory and written back through a sibling
//! temp file plus rename, so an interrupted run never leaves a truncated
//! `.tex` behind. Symlinked documents are discovered like regular ones and
//! written through to the file they point at.

use crate::error::RasterError;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Every file under `source` whose extension equals `extension`, sorted.
///
/// Sorting makes the processing order (and therefore logs and reports)
/// independent of directory iteration order.
pub fn discover_documents(source: &Path, extension: &str) -> Result<Vec<PathBuf>, RasterError> {
    if !source.is_dir() {
        return Err(RasterError::SourceNotFound {
            path: source.to_path_buf(),
        });
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| RasterError::WalkFailed {
            path: source.to_path_buf(),
            detail: e.to_string(),
        })?;
        // `path().is_file()` follows symlinks; `file_type()` would not.
        if entry.path().is_file() && entry.path().extension() == Some(OsStr::new(extension)) {
            documents.push(entry.into_path());
        }
    }
    documents.sort();

    debug!("Discovered {} .{} documents", documents.len(), extension);
    Ok(documents)
}

pub async fn read_document(path: &Path) -> Result<String, RasterError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RasterError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Atomic write: temp file next to the real document, then rename over it.
///
/// A symlinked `path` is resolved first so the link survives and its target
/// receives the new text. The existing file's permissions are carried over.
/// On failure the temp file is removed and the document is left as it was.
pub async fn write_document(path: &Path, text: &str) -> Result<(), RasterError> {
    let display_path = path.to_path_buf();
    let path = path.to_path_buf();
    let text = text.to_string();

    tokio::task::spawn_blocking(move || {
        let target = std::fs::canonicalize(&path).unwrap_or(path);
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(text.as_bytes())?;
        if let Ok(meta) = std::fs::metadata(&target) {
            tmp.as_file().set_permissions(meta.permissions())?;
        }
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok::<(), std::io::Error>(())
    })
    .await
    .map_err(|e| RasterError::Internal(format!("write task panicked: {e}")))?
    .map_err(|e| RasterError::WriteFailed {
        path: display_path,
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_nested_documents_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("chapters/part1")).unwrap();
        std::fs::write(root.join("main.tex"), "").unwrap();
        std::fs::write(root.join("chapters/part1/b.tex"), "").unwrap();
        std::fs::write(root.join("chapters/a.tex"), "").unwrap();
        std::fs::write(root.join("notes.txt"), "").unwrap();
        std::fs::write(root.join("main.tex.bak"), "").unwrap();

        let docs = discover_documents(root, "tex").unwrap();
        let rel: Vec<_> = docs
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("chapters/a.tex"),
                PathBuf::from("chapters/part1/b.tex"),
                PathBuf::from("main.tex"),
            ]
        );
    }

    #[test]
    fn missing_source_is_reported() {
        let err = discover_documents(Path::new("/definitely/not/here"), "tex").unwrap_err();
        assert!(matches!(err, RasterError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn write_then_read_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.tex");
        write_document(&path, "\\section{A}").await.unwrap();
        assert_eq!(read_document(&path).await.unwrap(), "\\section{A}");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing/doc.tex");
        let err = write_document(&path, "x").await.unwrap_err();
        assert!(matches!(err, RasterError::WriteFailed { .. }), "got {err:?}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn rewrite_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.tex");
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        write_document(&path, "new").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_document_is_discovered_and_written_through() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("shared");
        let src = dir.path().join("src");
        std::fs::create_dir_all(&shared).unwrap();
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(shared.join("chapter.tex"), "old").unwrap();
        let link = src.join("chapter.tex");
        std::os::unix::fs::symlink(shared.join("chapter.tex"), &link).unwrap();

        assert_eq!(discover_documents(&src, "tex").unwrap(), vec![link.clone()]);

        write_document(&link, "new").await.unwrap();
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(shared.join("chapter.tex")).unwrap(), "new");
    }

    #[test]
    fn unreadable_document_is_fatal() {
        let err = tokio_test::block_on(read_document(Path::new("/no/such/doc.tex"))).unwrap_err();
        assert!(matches!(err, RasterError::ReadFailed { .. }));
    }
}
