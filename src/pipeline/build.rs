//! Builder: turn an untrusted [`ExtractionResult`] into a [`StandardRecord`].
//!
//! Normalisation happens first, then validation, and every violated
//! constraint is collected so one log line tells the whole story.
//!
//! Normalisation:
//! 1. Trim every text field and strip invisible characters
//!    (zero-width space, BOM, word joiner, soft hyphen)
//! 2. Convert Eastern Arabic-Indic digits in page labels to ASCII
//! 3. De-duplicate keywords and aliases by a case- and
//!    whitespace-insensitive key, keeping the first-seen form
//!
//! Validation:
//! - `id` is the configured prefix followed by at least two digits
//! - `title` and `text` are non-empty
//! - every section has a non-empty, unique `sec_id` (order is kept as given)
//! - `pages` is non-empty, numeric labels strictly increase, and the count
//!   matches the physical page count when known (per [`PageCountPolicy`])

use crate::config::{PageCountPolicy, DEFAULT_ID_PREFIX};
use crate::error::{BuildError, Violation};
use crate::output::{ExtractionResult, RawSection, Section, StandardRecord};
use crate::pipeline::discover::normalize_digits;
use std::collections::HashSet;
use tracing::warn;

/// Inputs to the builder besides the raw result.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Prefix every valid ID starts with (`ProcessorConfig::id_prefix`).
    pub id_prefix: &'a str,
    /// Page count of the source PDF, if it could be determined.
    pub physical_pages: Option<usize>,
    pub page_count_policy: PageCountPolicy,
}

impl Default for BuildContext<'_> {
    fn default() -> Self {
        Self {
            id_prefix: DEFAULT_ID_PREFIX,
            physical_pages: None,
            page_count_policy: PageCountPolicy::default(),
        }
    }
}

/// Validate and normalise `result` into the record for `id`.
pub fn build(
    result: ExtractionResult,
    id: &str,
    ctx: &BuildContext<'_>,
) -> Result<StandardRecord, BuildError> {
    let record = StandardRecord {
        id: id.trim().to_string(),
        title: clean_text(&result.title),
        text: clean_text(&result.text),
        sections: result.sections.into_iter().map(clean_section).collect(),
        keywords: dedupe(result.keywords),
        aliases: dedupe(result.aliases),
        pages: result
            .pages
            .iter()
            .map(|p| normalize_digits(&clean_text(p)))
            .filter(|p| !p.is_empty())
            .collect(),
    };

    let violations = validate(&record, ctx);
    if violations.is_empty() {
        Ok(record)
    } else {
        Err(BuildError {
            id: record.id,
            violations,
        })
    }
}

fn validate(record: &StandardRecord, ctx: &BuildContext<'_>) -> Vec<Violation> {
    let mut violations = Vec::new();

    if !is_valid_id(&record.id, ctx.id_prefix) {
        violations.push(Violation::InvalidId(record.id.clone()));
    }
    if record.title.is_empty() {
        violations.push(Violation::EmptyTitle);
    }
    if record.text.is_empty() {
        violations.push(Violation::EmptyText);
    }

    let mut seen = HashSet::new();
    for (position, section) in record.sections.iter().enumerate() {
        if section.sec_id.is_empty() {
            violations.push(Violation::EmptySectionId { position });
        } else if !seen.insert(section.sec_id.as_str()) {
            violations.push(Violation::DuplicateSectionId {
                sec_id: section.sec_id.clone(),
            });
        }
    }

    if record.pages.is_empty() {
        violations.push(Violation::NoPages);
    } else {
        violations.extend(check_page_order(&record.pages));
        if let Some(physical) = ctx.physical_pages {
            let extracted = record.pages.len();
            if extracted != physical {
                let v = Violation::PageCountMismatch {
                    extracted,
                    physical,
                };
                match ctx.page_count_policy {
                    PageCountPolicy::Reject => violations.push(v),
                    PageCountPolicy::Warn => warn!("{}: {}", record.id, v),
                }
            }
        }
    }

    violations
}

/// Numeric labels must strictly increase; non-numeric labels are skipped.
fn check_page_order(pages: &[String]) -> Option<Violation> {
    let mut previous: Option<(u64, &str)> = None;
    for label in pages {
        let Ok(n) = label.parse::<u64>() else {
            continue;
        };
        if let Some((p, p_label)) = previous {
            if n <= p {
                return Some(Violation::PagesOutOfOrder {
                    previous: p_label.to_string(),
                    next: label.clone(),
                });
            }
        }
        previous = Some((n, label));
    }
    None
}

/// `prefix` followed by two or more ASCII digits.
fn is_valid_id(id: &str, prefix: &str) -> bool {
    match id.strip_prefix(prefix) {
        Some(digits) => digits.len() >= 2 && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

// ── Normalisation ────────────────────────────────────────────────────────

const INVISIBLE: [char; 4] = ['\u{200B}', '\u{FEFF}', '\u{2060}', '\u{00AD}'];

/// Strip invisible characters, normalise line endings, and trim.
pub fn clean_text(s: &str) -> String {
    let cleaned: String = s
        .replace("\r\n", "\n")
        .chars()
        .filter(|c| !INVISIBLE.contains(c))
        .collect();
    cleaned.trim().to_string()
}

fn clean_section(raw: RawSection) -> Section {
    Section {
        sec_id: clean_text(&raw.sec_id),
        heading: clean_text(&raw.heading),
        text: clean_text(&raw.text),
    }
}

/// Comparison key: lower-cased, internal whitespace collapsed.
fn dedupe_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Drop empties and case/whitespace duplicates, keeping first-seen form.
pub fn dedupe(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|v| clean_text(&v))
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(dedupe_key(v)))
        .collect()
}
