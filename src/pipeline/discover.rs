//! Input discovery: find the standards PDFs, read the standard number
//! embedded in each filename, and put them in processing order.
//!
//! Filenames look like `معيار (12) الاستصناع والاستصناع الموازي.pdf`, with
//! variations: Eastern Arabic-Indic digits, `معيار-12`, `المعيار-الشرعي-رقم-12`,
//! `رقم-12`, or just a bare number. Directory listing order is not stable, so
//! the embedded number alone decides both order and ID.

use crate::config::ProcessorConfig;
use crate::error::{ConfigError, InputDiscoveryError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A PDF with an assigned standard number and ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPdf {
    /// Standard number embedded in the filename (1-based).
    pub index: u32,
    /// Output ID, e.g. `SS07`.
    pub id: String,
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
}

/// Result of scanning the input directory.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Accepted documents in ascending standard number.
    pub documents: Vec<DiscoveredPdf>,
    /// Files that could not be given an ID.
    pub rejected: Vec<InputDiscoveryError>,
}

impl Discovery {
    /// Standard numbers in `1..=expected` with no file.
    pub fn missing_indices(&self, expected: u32) -> Vec<u32> {
        let present: BTreeSet<u32> = self.documents.iter().map(|d| d.index).collect();
        (1..=expected).filter(|i| !present.contains(i)).collect()
    }
}

// ── Filename parsing ─────────────────────────────────────────────────────

/// Replace Eastern Arabic-Indic (and Persian) digits with ASCII digits.
pub fn normalize_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            _ => c,
        })
        .collect()
}

/// Patterns tried in order; the first match wins.
static INDEX_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"معيار\s*\((\d+)\)",
        r"معيار[–\-](\d+)",
        r"المعيار[–\-]الشرعي[–\-]رقم[–\-](\d+)",
        r"\((\d+)\)",
        r"رقم[–\-](\d+)",
        r"(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// Standard number embedded in `file_name`, if any. Zero is not a standard.
pub fn parse_standard_index(file_name: &str) -> Option<u32> {
    let normalized = normalize_digits(file_name);
    INDEX_PATTERNS
        .iter()
        .find_map(|re| {
            re.captures(&normalized)
                .and_then(|caps| caps[1].parse::<u32>().ok())
        })
        .filter(|&n| n > 0)
}

fn is_pdf(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

// ── Directory scan ───────────────────────────────────────────────────────

/// Scan `config.input_dir` for PDFs and assign IDs.
///
/// Fatal only when the directory itself is missing or unreadable. Files with
/// no readable number, or whose number is already taken, are returned in
/// [`Discovery::rejected`] and logged. Count and naming mismatches are
/// logged as warnings.
pub fn discover(config: &ProcessorConfig) -> Result<Discovery, ConfigError> {
    let dir = &config.input_dir;
    if !dir.is_dir() {
        return Err(ConfigError::InputDirMissing { path: dir.clone() });
    }
    let unreadable = |source: std::io::Error| ConfigError::InputDirUnreadable {
        path: dir.clone(),
        source,
    };

    let mut candidates: Vec<(String, PathBuf, u64)> = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let path = entry.path();
        if !path.is_file() || !is_pdf(&path) {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        candidates.push((file_name, path, size_bytes));
    }
    // Deterministic winner when two files share a number.
    candidates.sort_by(|a, b| a.0.cmp(&b.0));

    let mut by_index: BTreeMap<u32, DiscoveredPdf> = BTreeMap::new();
    let mut rejected = Vec::new();

    for (file_name, path, size_bytes) in candidates {
        let Some(index) = parse_standard_index(&file_name) else {
            let err = InputDiscoveryError::NoIndex { file_name };
            warn!("Skipping: {}", err);
            rejected.push(err);
            continue;
        };
        if let Some(first) = by_index.get(&index) {
            let err = InputDiscoveryError::DuplicateIndex {
                file_name,
                index,
                first: first.file_name.clone(),
            };
            warn!("Skipping: {}", err);
            rejected.push(err);
            continue;
        }
        debug!("{} → standard {}", file_name, index);
        by_index.insert(
            index,
            DiscoveredPdf {
                index,
                id: config.format_id(index),
                path,
                file_name,
                size_bytes,
            },
        );
    }

    let discovery = Discovery {
        documents: by_index.into_values().collect(),
        rejected,
    };
    report(&discovery, config.expected_count);
    Ok(discovery)
}

fn report(discovery: &Discovery, expected: u32) {
    let found = discovery.documents.len();
    info!("Found {} numbered PDF files", found);

    if found != expected as usize {
        warn!("Expected {} standards, found {}", expected, found);
    }
    let missing = discovery.missing_indices(expected);
    if !missing.is_empty() && missing.len() < expected as usize {
        warn!("No file for standard number(s): {:?}", missing);
    }
    for doc in discovery.documents.iter().filter(|d| d.index > expected) {
        warn!(
            "{} has standard number {} beyond the expected {}",
            doc.file_name, doc.index, expected
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parses_common_naming_variants() {
        assert_eq!(parse_standard_index("معيار (1) المتاجرة في العملات.pdf"), Some(1));
        assert_eq!(parse_standard_index("معيار(12) الاستصناع.pdf"), Some(12));
        assert_eq!(parse_standard_index("معيار-7-الحوالة.pdf"), Some(7));
        assert_eq!(parse_standard_index("معيار–9.pdf"), Some(9));
        assert_eq!(parse_standard_index("المعيار-الشرعي-رقم-35-الزكاة.pdf"), Some(35));
        assert_eq!(parse_standard_index("الزكاة (35).pdf"), Some(35));
        assert_eq!(parse_standard_index("رقم-40.pdf"), Some(40));
        assert_eq!(parse_standard_index("standard 61.pdf"), Some(61));
    }

    #[test]
    fn parses_eastern_arabic_digits() {
        assert_eq!(parse_standard_index("معيار (٢٣) الوعد.pdf"), Some(23));
        assert_eq!(normalize_digits("١٢٣"), "123");
        assert_eq!(normalize_digits("۴۵"), "45");
    }

    #[test]
    fn prefers_parenthesised_number_over_earlier_digits() {
        // "2019" appears first but the (5) pattern is more specific.
        assert_eq!(parse_standard_index("2019 معيار (5) الضمانات.pdf"), Some(5));
    }

    #[test]
    fn no_digits_or_zero_is_none() {
        assert_eq!(parse_standard_index("المقدمة.pdf"), None);
        assert_eq!(parse_standard_index("معيار (0).pdf"), None);
    }

    #[test]
    fn overflowing_number_falls_through_to_later_patterns() {
        assert_eq!(parse_standard_index("معيار-99999999999 رقم-12.pdf"), Some(12));
        assert_eq!(parse_standard_index("معيار (99999999999).pdf"), None);
    }

    fn touch(dir: &TempDir, name: &str) {
        fs::write(dir.path().join(name), b"%PDF-1.4\n%%EOF\n").unwrap();
    }

    fn config_for(dir: &TempDir) -> ProcessorConfig {
        ProcessorConfig::builder()
            .input_dir(dir.path())
            .expected_count(3)
            .build()
            .unwrap()
    }

    #[test]
    fn discover_orders_by_embedded_number() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "معيار (10) الضمانات.pdf");
        touch(&dir, "معيار (2) بطاقات الائتمان.PDF");
        touch(&dir, "معيار (1) المتاجرة في العملات.pdf");
        touch(&dir, "notes.txt");

        let d = discover(&config_for(&dir)).unwrap();
        let ids: Vec<&str> = d.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["SS01", "SS02", "SS10"]);
        assert!(d.rejected.is_empty());
        assert_eq!(d.missing_indices(3), vec![3]);
    }

    #[test]
    fn discover_skips_unnumbered_and_duplicate_files() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "معيار (1) أ.pdf");
        touch(&dir, "معيار (1) ب.pdf");
        touch(&dir, "فهرس.pdf");
        touch(&dir, "معيار (3) ج.pdf");

        let d = discover(&config_for(&dir)).unwrap();
        let ids: Vec<&str> = d.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["SS01", "SS03"]);
        assert_eq!(d.documents[0].file_name, "معيار (1) أ.pdf");
        assert_eq!(d.rejected.len(), 2);
        assert!(d
            .rejected
            .iter()
            .any(|e| matches!(e, InputDiscoveryError::NoIndex { file_name } if file_name == "فهرس.pdf")));
        assert!(d
            .rejected
            .iter()
            .any(|e| matches!(e, InputDiscoveryError::DuplicateIndex { index: 1, .. })));
    }

    #[test]
    fn discover_missing_dir_is_fatal() {
        let config = ProcessorConfig::builder()
            .input_dir("/definitely/not/here")
            .build()
            .unwrap();
        assert!(matches!(
            discover(&config),
            Err(ConfigError::InputDirMissing { .. })
        ));
    }
}
