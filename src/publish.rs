use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::parser::record::Record;

pub const DEFAULT_DATASET_DIR: &str = "dataset";
pub const DATASET_NAME: &str = "europarl-dutch-minutes";
const RECORDS_FILE: &str = "train.jsonl";
const INFO_FILE: &str = "dataset_info.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    pub version: u32,
    pub num_records: usize,
    pub updated_at: DateTime<Utc>,
}

pub struct PublishStats {
    pub existing: usize,
    pub added: usize,
    /// `None` when nothing new was published.
    pub version: Option<u32>,
}

/// Merge `records` into the dataset at `dir`, appending only unseen URLs.
pub fn publish_dataset(dir: &Path, records: Vec<Record>) -> Result<PublishStats> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create dataset dir {}", dir.display()))?;

    let existing = load_records(&dir.join(RECORDS_FILE))?;
    let info = load_info(&dir.join(INFO_FILE))?;
    let fresh = new_records(&existing, records);

    if fresh.is_empty() {
        info!("No new records; dataset is up to date");
        return Ok(PublishStats {
            existing: existing.len(),
            added: 0,
            version: None,
        });
    }

    let mut combined = existing;
    let existing_count = combined.len();
    combined.extend(fresh);

    write_records(&dir.join(RECORDS_FILE), &combined)?;

    let version = info.map(|i| i.version + 1).unwrap_or(1);
    let info = DatasetInfo {
        name: DATASET_NAME.to_string(),
        version,
        num_records: combined.len(),
        updated_at: Utc::now(),
    };
    write_atomic(&dir.join(INFO_FILE), &serde_json::to_vec_pretty(&info)?)?;

    info!(
        "Published {} v{}: {} existing + {} new records",
        DATASET_NAME,
        version,
        existing_count,
        combined.len() - existing_count
    );
    Ok(PublishStats {
        existing: existing_count,
        added: combined.len() - existing_count,
        version: Some(version),
    })
}

/// Records whose URL is in neither `existing` nor earlier in `incoming`.
pub fn new_records(existing: &[Record], incoming: Vec<Record>) -> Vec<Record> {
    let mut seen: HashSet<String> = existing.iter().map(|r| r.url.clone()).collect();
    incoming
        .into_iter()
        .filter(|r| seen.insert(r.url.clone()))
        .collect()
}

/// Read a JSONL record file. A missing file is an empty dataset.
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to open {}", path.display())),
    };
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), i + 1))?;
        records.push(record);
    }
    Ok(records)
}

fn load_info(path: &Path) -> Result<Option<DatasetInfo>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(
            serde_json::from_slice(&bytes)
                .with_context(|| format!("Invalid dataset info {}", path.display()))?,
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

fn write_records(path: &Path, records: &[Record]) -> Result<()> {
    let mut buf = Vec::new();
    for r in records {
        serde_json::to_writer(&mut buf, r)?;
        buf.write_all(b"\n")?;
    }
    write_atomic(path, &buf)
}

/// Write to a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}
