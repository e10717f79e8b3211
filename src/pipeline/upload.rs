//! Upload strategy: inline bytes or a hosted file reference.
//!
//! The split exists only because the service caps request-body size.
//! [`select_upload_mode`] is a pure function of size and threshold; the
//! boundary is inclusive, so a file exactly at the threshold goes inline.

use crate::service::{DocumentPart, PDF_MIME};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use tracing::debug;

/// How a document reaches the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Bytes embedded in the request body.
    Inline,
    /// Uploaded first, then referenced by handle.
    HostedReference,
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadMode::Inline => f.write_str("inline"),
            UploadMode::HostedReference => f.write_str("hosted reference"),
        }
    }
}

/// `Inline` when `file_size_bytes <= threshold_bytes`, else `HostedReference`.
pub fn select_upload_mode(file_size_bytes: u64, threshold_bytes: u64) -> UploadMode {
    if file_size_bytes <= threshold_bytes {
        UploadMode::Inline
    } else {
        UploadMode::HostedReference
    }
}

/// Wrap PDF bytes as a base64 inline request part.
pub fn inline_part(bytes: &[u8]) -> DocumentPart {
    let data = STANDARD.encode(bytes);
    debug!("Encoded PDF → {} bytes base64", data.len());
    DocumentPart::Inline {
        mime_type: PDF_MIME.to_string(),
        data,
    }
}

/// Human-readable size for log lines.
pub fn format_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes as f64 >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB)
    } else {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: u64 = 10 * 1024 * 1024;

    #[test]
    fn below_threshold_is_inline() {
        assert_eq!(select_upload_mode(THRESHOLD - 1, THRESHOLD), UploadMode::Inline);
        assert_eq!(select_upload_mode(0, THRESHOLD), UploadMode::Inline);
    }

    #[test]
    fn at_threshold_is_inline() {
        assert_eq!(select_upload_mode(THRESHOLD, THRESHOLD), UploadMode::Inline);
    }

    #[test]
    fn above_threshold_is_hosted() {
        assert_eq!(
            select_upload_mode(THRESHOLD + 1, THRESHOLD),
            UploadMode::HostedReference
        );
    }

    #[test]
    fn inline_part_is_base64_pdf() {
        match inline_part(b"%PDF-1.7") {
            DocumentPart::Inline { mime_type, data } => {
                assert_eq!(mime_type, "application/pdf");
                assert_eq!(STANDARD.decode(data).unwrap(), b"%PDF-1.7");
            }
            other => panic!("expected inline part, got {other:?}"),
        }
    }

    #[test]
    fn sizes_are_readable() {
        assert_eq!(format_size(512), "0.5 KiB");
        assert_eq!(format_size(3 * 1024 * 1024 / 2), "1.5 MiB");
    }
}
