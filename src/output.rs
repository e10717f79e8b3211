//! Data model: what the service returns and what we write to disk.
//!
//! [`ExtractionResult`] is the raw, untrusted shape parsed from the service
//! response. [`StandardRecord`] is the validated, normalised record that
//! [`crate::pipeline::build`] produces from it and that is serialised to
//! `<id>.json`. [`RunSummary`] collects per-document outcomes for the final
//! report.

use crate::error::{ErrorKind, ServiceError};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Output record ────────────────────────────────────────────────────────

/// One standard, as written to `<id>.json`.
///
/// Field order here is the field order in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardRecord {
    /// `SS` + two-digit standard number.
    pub id: String,
    pub title: String,
    /// Full document text.
    pub text: String,
    /// Sections in document order.
    pub sections: Vec<Section>,
    pub keywords: Vec<String>,
    pub aliases: Vec<String>,
    /// Page labels in document order.
    pub pages: Vec<String>,
}

/// A numbered block of a standard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Hierarchical number such as `"1"` or `"2.3"`.
    pub sec_id: String,
    /// May be empty for an unheaded block.
    pub heading: String,
    /// May be empty for a heading-only node.
    pub text: String,
}

// ── Raw service result ───────────────────────────────────────────────────

/// The structured response of the extraction service before validation.
///
/// All top-level fields are required: a response missing one fails to parse
/// and counts as a failed attempt. Section fields default to empty and
/// numeric labels are accepted as strings, since models emit both.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractionResult {
    pub title: String,
    pub text: String,
    pub sections: Vec<RawSection>,
    pub keywords: Vec<String>,
    pub aliases: Vec<String>,
    #[serde(deserialize_with = "labels")]
    pub pages: Vec<String>,
    /// Token usage reported alongside the result (not part of the response body).
    #[serde(skip)]
    pub usage: TokenUsage,
}

/// A section as returned by the service.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RawSection {
    #[serde(default, deserialize_with = "label")]
    pub sec_id: String,
    #[serde(default, deserialize_with = "label")]
    pub heading: String,
    #[serde(default, deserialize_with = "label")]
    pub text: String,
}

impl ExtractionResult {
    /// Parse a response body, unwrapping a ```json fence if present.
    pub fn parse(body: &str) -> Result<Self, ServiceError> {
        let json = strip_json_fence(body);
        if json.is_empty() {
            return Err(ServiceError::MalformedResponse("empty response body".into()));
        }
        serde_json::from_str(json).map_err(|e| ServiceError::MalformedResponse(e.to_string()))
    }

    /// The service's side of the contract: every declared field present
    /// (enforced by parsing) and a non-empty page list.
    pub fn check_contract(&self) -> Result<(), ServiceError> {
        if self.pages.is_empty() {
            return Err(ServiceError::SchemaViolation("pages is empty".into()));
        }
        Ok(())
    }
}

fn strip_json_fence(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn value_to_label(value: Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(format!("expected string or number, got {other}")),
    }
}

fn label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    value_to_label(Value::deserialize(deserializer)?).map_err(de::Error::custom)
}

fn labels<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<Value>::deserialize(deserializer)?
        .into_iter()
        .map(value_to_label)
        .collect::<Result<_, _>>()
        .map_err(de::Error::custom)
}

/// Token counts reported by the service for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

// ── Run summary ──────────────────────────────────────────────────────────

/// A document that reached `Done`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedDocument {
    pub id: String,
    pub file_name: String,
    pub attempts: u32,
    pub usage: TokenUsage,
}

/// A document that reached `Failed`.
#[derive(Debug, Clone, Serialize)]
pub struct FailedDocument {
    /// `None` when no ID could be assigned.
    pub id: Option<String>,
    pub file_name: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// A file that was not attempted.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub id: Option<String>,
    pub file_name: String,
    pub reason: String,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Documents discovered with a valid index.
    pub discovered: usize,
    pub succeeded: Vec<CompletedDocument>,
    pub failed: Vec<FailedDocument>,
    pub skipped: Vec<SkippedDocument>,
    /// Standards already complete from an earlier run (resume mode).
    pub resumed: Vec<String>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

impl RunSummary {
    /// Documents completed in this run or carried over by resume.
    pub fn done(&self) -> usize {
        self.succeeded.len() + self.resumed.len()
    }

    /// Failures of a given kind.
    pub fn failures_of(&self, kind: ErrorKind) -> impl Iterator<Item = &FailedDocument> {
        self.failed.iter().filter(move |f| f.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "title": "المتاجرة في العملات",
        "text": "نص المعيار",
        "sections": [
            {"sec_id": "1", "heading": "نطاق المعيار", "text": "..."},
            {"sec_id": 2, "heading": "الحكم الشرعي"},
            {"sec_id": "2.1", "heading": null, "text": "فقرة"}
        ],
        "keywords": ["صرف", "عملات"],
        "aliases": ["Trading in Currencies"],
        "pages": [1, "2", 3]
    }"#;

    #[test]
    fn parse_accepts_numeric_labels_and_missing_section_fields() {
        let r = ExtractionResult::parse(SAMPLE).unwrap();
        assert_eq!(r.sections.len(), 3);
        assert_eq!(r.sections[1].sec_id, "2");
        assert_eq!(r.sections[1].text, "");
        assert_eq!(r.sections[2].heading, "");
        assert_eq!(r.pages, vec!["1", "2", "3"]);
    }

    #[test]
    fn parse_unwraps_json_fence() {
        let fenced = format!("```json\n{SAMPLE}\n```");
        let r = ExtractionResult::parse(&fenced).unwrap();
        assert_eq!(r.title, "المتاجرة في العملات");
    }

    #[test]
    fn parse_rejects_missing_top_level_field() {
        let body = r#"{"title": "t", "text": "x", "sections": [], "keywords": [], "aliases": []}"#;
        let err = ExtractionResult::parse(body).unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse(ref m) if m.contains("pages")));
    }

    #[test]
    fn parse_rejects_empty_and_non_json_bodies() {
        assert!(matches!(
            ExtractionResult::parse("  "),
            Err(ServiceError::MalformedResponse(_))
        ));
        assert!(matches!(
            ExtractionResult::parse("Sorry, I cannot help with that."),
            Err(ServiceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn contract_requires_pages() {
        let body = r#"{"title": "t", "text": "x", "sections": [], "keywords": [], "aliases": [], "pages": []}"#;
        let r = ExtractionResult::parse(body).unwrap();
        assert!(matches!(
            r.check_contract(),
            Err(ServiceError::SchemaViolation(_))
        ));
    }

    #[test]
    fn record_serialises_in_schema_order() {
        let record = StandardRecord {
            id: "SS01".into(),
            title: "t".into(),
            text: "x".into(),
            sections: vec![],
            keywords: vec![],
            aliases: vec![],
            pages: vec!["1".into()],
        };
        let json = serde_json::to_string(&record).unwrap();
        let keys: Vec<usize> = ["\"id\"", "\"title\"", "\"text\"", "\"sections\"", "\"keywords\"", "\"aliases\"", "\"pages\""]
            .iter()
            .map(|k| json.find(k).unwrap())
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "got: {json}");
    }
}
