//! Artifact writers: single files and the viewer zip archive.
//!
//! Both write to `<path>.partial` first and rename into place only after the
//! content is complete. On failure the partial file is removed, so a finished
//! artifact path never points at truncated output.

use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, warn};
use zip::CompressionMethod;
use zip::write::FileOptions;

use super::render::RenderedPart;
use super::viewer::ViewerManifest;
use crate::error::{Error, ExportError, Result};

/// Archive entry of the manifest
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Archive entry of the index page
pub const INDEX_ENTRY: &str = "index.html";

/// Path of the in-progress file for `path`
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Write `bytes` to `path` through a partial file; returns the size written
pub async fn write_file(path: &Path, bytes: &[u8]) -> Result<u64> {
    let partial = partial_path(path);

    let result = async {
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, path).await?;
        Ok::<(), Error>(())
    }
    .await;

    if let Err(e) = result {
        remove_partial(&partial).await;
        return Err(e);
    }

    debug!(path = %path.display(), size = bytes.len(), "artifact written");
    Ok(bytes.len() as u64)
}

/// Write the viewer archive; returns its size in bytes
///
/// Entries: one deflated page per part under its manifest file name, then
/// `manifest.json` and `index.html`.
pub async fn assemble_archive(
    path: &Path,
    parts: Vec<RenderedPart>,
    manifest: &ViewerManifest,
    index_html: String,
) -> Result<u64> {
    let partial = partial_path(path);
    let manifest_json = serde_json::to_vec_pretty(manifest)?;

    let target = path.to_path_buf();
    let partial_owned = partial.clone();
    let joined = spawn_blocking(move || {
        write_zip(&partial_owned, &parts, &manifest_json, index_html.as_bytes())?;
        std::fs::rename(&partial_owned, &target)?;
        Ok::<u64, Error>(std::fs::metadata(&target)?.len())
    })
    .await;

    let result = match joined {
        Ok(inner) => inner,
        Err(e) => Err(Error::Other(format!("archive task failed: {e}"))),
    };

    match result {
        Ok(size) => {
            debug!(path = %path.display(), size, "viewer archive written");
            Ok(size)
        }
        Err(e) => {
            remove_partial(&partial).await;
            Err(ExportError::ArchiveFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
            .into())
        }
    }
}

fn write_zip(path: &Path, parts: &[RenderedPart], manifest_json: &[u8], index_html: &[u8]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for part in parts {
        writer.start_file(part.manifest.file_name.as_str(), options)?;
        writer.write_all(&part.html)?;
    }

    writer.start_file(MANIFEST_ENTRY, options)?;
    writer.write_all(manifest_json)?;

    writer.start_file(INDEX_ENTRY, options)?;
    writer.write_all(index_html)?;

    let mut file = writer.finish()?;
    file.flush()?;
    Ok(())
}

async fn remove_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %partial.display(), error = %e, "failed to remove partial artifact"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::render::sha256_hex;
    use crate::export::viewer::{MANIFEST_VERSION, ManifestPart, part_file_name};
    use chrono::Utc;
    use std::io::Read;

    fn part(index: usize, body: &str) -> RenderedPart {
        let html = body.as_bytes().to_vec();
        RenderedPart {
            manifest: ManifestPart {
                file_name: part_file_name(index),
                index,
                part_count: 2,
                message_count: 1,
                slice_start: None,
                slice_end: None,
                sha256: sha256_hex(&html),
            },
            html,
        }
    }

    fn manifest(parts: &[RenderedPart]) -> ViewerManifest {
        ViewerManifest {
            version: MANIFEST_VERSION,
            channel_id: "c1".to_string(),
            channel_name: "Tavern".to_string(),
            generated_at: Utc::now(),
            display_settings: serde_json::json!({}),
            slice_size: 1,
            max_concurrency: 1,
            part_count: parts.len(),
            total_messages: parts.len(),
            parts: parts.iter().map(|p| p.manifest.clone()).collect(),
        }
    }

    #[tokio::test]
    async fn test_archive_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.zip");
        let parts = vec![part(1, "<p>one</p>"), part(2, "<p>two</p>")];
        let manifest = manifest(&parts);

        let size = assemble_archive(&path, parts, &manifest, "<html>index</html>".to_string())
            .await
            .unwrap();
        assert_eq!(size, std::fs::metadata(&path).unwrap().len());
        assert!(!partial_path(&path).exists());

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
        let names: Vec<String> = archive.file_names().map(String::from).collect();
        for expected in ["parts/part-0001.html", "parts/part-0002.html", MANIFEST_ENTRY, INDEX_ENTRY] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }

        let mut second = String::new();
        archive
            .by_name("parts/part-0002.html")
            .unwrap()
            .read_to_string(&mut second)
            .unwrap();
        assert_eq!(second, "<p>two</p>");

        let entry = archive.by_name(MANIFEST_ENTRY).unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        let stored: ViewerManifest = serde_json::from_reader(entry).unwrap();
        assert_eq!(stored, manifest);
    }

    #[tokio::test]
    async fn test_failed_archive_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("out.zip");
        let parts = vec![part(1, "x")];
        let manifest = manifest(&parts);

        let err = assemble_archive(&path, parts, &manifest, String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Export(ExportError::ArchiveFailed { .. })));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[tokio::test]
    async fn test_write_file_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");

        assert_eq!(write_file(&path, b"hello").await.unwrap(), 5);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert!(!partial_path(&path).exists());

        let bad = dir.path().join("nope").join("log.txt");
        assert!(write_file(&bad, b"x").await.is_err());
    }
}
