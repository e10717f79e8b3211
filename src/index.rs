//! Standards index: one file listing the id, title, keywords and aliases of
//! every record in the output directory.

use crate::config::ProcessorConfig;
use crate::error::WriteError;
use crate::pipeline::write::write_json;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Summary fields of one record. Other record fields are ignored on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Contents of `standards_index.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardsIndex {
    pub total_standards: usize,
    pub standards: Vec<IndexEntry>,
}

/// Read every `<prefix>*.json` in `output_dir`, sorted by filename.
///
/// Files that cannot be read or parsed are logged and left out.
pub fn collect(output_dir: &Path, id_prefix: &str) -> StandardsIndex {
    let entries = match std::fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read output directory {}: {}", output_dir.display(), e);
            return StandardsIndex::default();
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            name.starts_with(id_prefix) && name.ends_with(".json")
        })
        .collect();
    paths.sort();

    let standards: Vec<IndexEntry> = paths
        .iter()
        .filter_map(|path| {
            let parsed = std::fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str::<IndexEntry>(&s).map_err(|e| e.to_string()));
            match parsed {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Leaving {} out of the index: {}", path.display(), e);
                    None
                }
            }
        })
        .collect();

    StandardsIndex {
        total_standards: standards.len(),
        standards,
    }
}

/// Rebuild the index from the output directory and write it.
pub async fn write_index(config: &ProcessorConfig) -> Result<StandardsIndex, WriteError> {
    let index = collect(&config.output_dir, &config.id_prefix);
    write_json(&index, &config.index_file).await?;
    info!(
        "Index of {} standard(s) written to {}",
        index.total_standards,
        config.index_file.display()
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, value: serde_json::Value) {
        std::fs::write(dir.join(name), value.to_string()).unwrap();
    }

    #[test]
    fn collects_sorted_entries_and_skips_bad_files() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "SS02.json",
            json!({"id": "SS02", "title": "بطاقات الحسم", "text": "...", "sections": [], "keywords": ["بطاقة"], "aliases": [], "pages": ["1"]}),
        );
        write(
            dir.path(),
            "SS01.json",
            json!({"id": "SS01", "title": "المتاجرة في العملات", "keywords": [], "aliases": ["Currencies"]}),
        );
        std::fs::write(dir.path().join("SS03.json"), "{ truncated").unwrap();
        write(dir.path(), "notes.json", json!({"id": "x", "title": "y"}));

        let index = collect(dir.path(), "SS");
        assert_eq!(index.total_standards, 2);
        let ids: Vec<&str> = index.standards.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["SS01", "SS02"]);
        assert_eq!(index.standards[1].keywords, vec!["بطاقة"]);
    }

    #[test]
    fn missing_directory_gives_empty_index() {
        let dir = TempDir::new().unwrap();
        let index = collect(&dir.path().join("absent"), "SS");
        assert_eq!(index, StandardsIndex::default());
    }

    #[tokio::test]
    async fn write_index_uses_configured_path() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("json_standards");
        std::fs::create_dir_all(&out).unwrap();
        write(&out, "SS05.json", json!({"id": "SS05", "title": "الضمانات"}));

        let config = ProcessorConfig::builder()
            .output_dir(&out)
            .index_file(dir.path().join("standards_index.json"))
            .build()
            .unwrap();
        write_index(&config).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("standards_index.json")).unwrap();
        let back: StandardsIndex = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.total_standards, 1);
        assert_eq!(back.standards[0].title, "الضمانات");
    }
}
