use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::kv::{KeyValue, KvList};

/// Reads a text file as one record per line: key is the 1-based line
/// number, value is the line.
pub fn read_lines_as_records(path: impl AsRef<Path>) -> Result<KvList> {
    let reader = BufReader::new(File::open(path)?);
    let mut result = KvList::new();
    for (line_no, line) in reader.lines().enumerate() {
        result.emit((line_no + 1).to_string(), line?);
    }
    Ok(result)
}

/// Writes records as a JSON array, creating parent directories as needed.
pub fn save_result(result: &KvList, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let serialized = serde_json::to_string(result)?;
    Ok(fs::write(path, serialized)?)
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

/// Reads a JSON array of `{"key": .., "value": ..}` objects.
///
/// A record without a key, or with a null key, is rejected with
/// [`Error::InvalidRecord`]. A missing value reads as the empty string.
pub fn load_records(path: impl AsRef<Path>) -> Result<KvList> {
    let contents = fs::read_to_string(path)?;
    let raw: Vec<RawRecord> = serde_json::from_str(&contents)?;
    raw.into_iter()
        .enumerate()
        .map(|(index, record)| match record.key {
            Some(key) => Ok(KeyValue::new(key, record.value.unwrap_or_default())),
            None => Err(Error::InvalidRecord {
                index,
                reason: "missing or null key".into(),
            }),
        })
        .collect()
}
