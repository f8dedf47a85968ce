//! Reading evidence files from disk.
//!
//! Files are read concurrently, hashed in core and run through a
//! [`FieldExtractor`]. Order of the returned items follows the input paths.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use verba_core::{EvidenceItem, FieldExtractor};

use crate::RuntimeError;

/// MIME type guessed from the file extension.
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "text" | "log" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Read one file into an evidence item.
pub async fn load_file(
    path: &Path,
    extractor: &dyn FieldExtractor,
    uploaded_at: DateTime<Utc>,
) -> Result<EvidenceItem, RuntimeError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| RuntimeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime = mime_for(path);

    let item = EvidenceItem::from_upload(filename.as_str(), mime, &bytes, uploaded_at);
    let item = match extractor.extract(&filename, mime, &bytes) {
        Some(extracted) => item.with_extracted(extracted),
        None => {
            tracing::debug!(file = %filename, mime, "No field extraction for document type");
            item
        }
    };
    Ok(item)
}

/// Read several files. Fails on the first unreadable path.
pub async fn load_files(
    paths: &[PathBuf],
    extractor: &dyn FieldExtractor,
    uploaded_at: DateTime<Utc>,
) -> Result<Vec<EvidenceItem>, RuntimeError> {
    try_join_all(paths.iter().map(|p| load_file(p, extractor, uploaded_at))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use verba_core::PlainTextExtractor;

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for(Path::new("a/Invoice.TXT")), "text/plain");
        assert_eq!(mime_for(Path::new("scan.pdf")), "application/pdf");
        assert_eq!(mime_for(Path::new("photo.JPEG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_load_files_keeps_order_and_extracts_text() {
        let tmp = TempDir::new().unwrap();
        let invoice = tmp.path().join("invoice.txt");
        let photo = tmp.path().join("photo.png");
        std::fs::write(
            &invoice,
            "Invoice No: INV-2024-001\nTotal: ₹4,500\nDate: 12/03/2024",
        )
        .unwrap();
        std::fs::write(&photo, [0x89, b'P', b'N', b'G']).unwrap();

        let items = load_files(&[invoice.clone(), photo.clone()], &PlainTextExtractor, Utc::now())
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].filename, "invoice.txt");
        assert_eq!(items[0].mime_type, "text/plain");
        assert!(items[0].fields().is_some_and(|f| f.invoice_number.is_some()));
        assert_eq!(items[1].filename, "photo.png");
        assert!(items[1].extracted.is_none());
        assert_ne!(items[0].digest, items[1].digest);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.txt");
        let err = load_files(&[missing], &PlainTextExtractor, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Io { .. }));
    }
}
