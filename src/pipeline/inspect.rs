//! Physical page count of a PDF.
//!
//! Parsing runs in `spawn_blocking`; a 20 MB standard takes long enough to
//! stall the runtime otherwise. A file `lopdf` cannot parse yields `None`
//! and the builder skips its page-count check.

use lopdf::Document;
use std::path::Path;
use tracing::debug;

/// Number of pages in the PDF at `path`, or `None` if it cannot be parsed.
pub async fn page_count(path: &Path) -> Option<usize> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || page_count_blocking(&path))
        .await
        .ok()
        .flatten()
}

fn page_count_blocking(path: &Path) -> Option<usize> {
    match Document::load(path) {
        Ok(doc) => {
            let n = doc.get_pages().len();
            debug!("{}: {} physical pages", path.display(), n);
            Some(n)
        }
        Err(e) => {
            debug!("{}: page count unavailable ({})", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn unparseable_pdf_has_no_page_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\nnot really a pdf").unwrap();
        assert_eq!(page_count(&path).await, None);
    }

    #[tokio::test]
    async fn missing_file_has_no_page_count() {
        assert_eq!(page_count(Path::new("/no/such/file.pdf")).await, None);
    }
}
