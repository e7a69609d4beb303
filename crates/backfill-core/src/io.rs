use crate::batch::BatchReport;
use crate::error::Result;
use crate::record::{Entry, Record};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Load a list of records. `.yaml`/`.yml` files are read as YAML, anything
/// else as JSON.
///
/// The file must be a list; each element is converted on its own, so one
/// malformed element becomes an `Err` entry at its index and the rest still
/// load.
pub fn load_entries(path: &Path) -> Result<Vec<Entry>> {
    let data = std::fs::read_to_string(path)?;
    let entries = if is_yaml(path) {
        let items: Vec<serde_yaml::Value> = serde_yaml::from_str(&data)?;
        items
            .into_iter()
            .map(|item| serde_yaml::from_value::<Record>(item).map_err(|e| e.to_string()))
            .collect()
    } else {
        let items: Vec<serde_json::Value> = serde_json::from_str(&data)?;
        items
            .into_iter()
            .map(|item| serde_json::from_value::<Record>(item).map_err(|e| e.to_string()))
            .collect()
    };
    Ok(entries)
}

/// Write records as a pretty-printed JSON array.
pub fn write_records(path: &Path, records: &[Record]) -> Result<()> {
    let mut data = serde_json::to_string_pretty(records)?;
    data.push('\n');
    atomic_write(path, data.as_bytes())
}

pub fn write_report(path: &Path, report: &BatchReport) -> Result<()> {
    let mut data = serde_json::to_string_pretty(report)?;
    data.push('\n');
    atomic_write(path, data.as_bytes())
}
