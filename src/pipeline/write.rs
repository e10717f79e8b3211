//! Whole-file JSON output.
//!
//! Each record is serialised to a temp file in the destination directory
//! and renamed over `<id>.json`, so a failed write never leaves a partial
//! file behind and a re-run simply replaces the previous output.

use crate::error::WriteError;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Serialise `value` as pretty UTF-8 JSON and atomically write it to `path`.
///
/// Arabic text is written as-is, not `\u` escaped.
pub async fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<PathBuf, WriteError> {
    let path = path.to_path_buf();
    let fail = |source: std::io::Error| WriteError {
        path: path.clone(),
        source,
    };

    let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| fail(e.into()))?;
    bytes.push(b'\n');

    let target = path.clone();
    tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
        .await
        .map_err(|e| fail(std::io::Error::other(format!("write task panicked: {e}"))))?
        .map_err(fail)?;

    info!("Saved JSON: {}", path.display());
    Ok(path)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Section, StandardRecord};
    use tempfile::TempDir;

    fn record() -> StandardRecord {
        StandardRecord {
            id: "SS12".into(),
            title: "الشركة (المشاركة) والشركات الحديثة".into(),
            text: "نص".into(),
            sections: vec![Section {
                sec_id: "1".into(),
                heading: "نطاق المعيار".into(),
                text: "".into(),
            }],
            keywords: vec!["شركة".into()],
            aliases: vec!["Sharikah (Musharakah)".into()],
            pages: vec!["1".into()],
        }
    }

    #[tokio::test]
    async fn writes_unescaped_utf8_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("SS12.json");
        write_json(&record(), &path).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("الشركة (المشاركة)"));
        let back: StandardRecord = serde_json::from_str(&content).unwrap();
        assert_eq!(back, record());
    }

    #[tokio::test]
    async fn overwrites_existing_file_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("SS12.json");
        std::fs::write(&path, "stale").unwrap();

        write_json(&record(), &path).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_ne!(std::fs::read_to_string(&path).unwrap(), "stale");
    }

    #[tokio::test]
    async fn unwritable_destination_is_write_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // Parent is a regular file, so the directory cannot be created.
        let err = write_json(&record(), &blocker.join("SS12.json"))
            .await
            .unwrap_err();
        assert!(err.path.ends_with("SS12.json"));
    }
}
