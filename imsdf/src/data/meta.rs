extern crate rusqlite;

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use rusqlite::{params, Connection};

use crate::error::{ImsDfError, Result};

pub const LABELS_DB: &str = "labels.db";

/// Acquisition parameters from the ASCII header of a `.mea` file.
#[derive(Debug, Clone, PartialEq)]
pub struct MeaMetaData {
    pub chunks_count: usize,
    pub chunk_sample_count: usize,
    pub chunk_averages: f64,
    /// Milliseconds between two triggers.
    pub chunk_trigger_repetition: f64,
    /// Kilohertz.
    pub chunk_sample_rate: f64,
    /// Every header entry, keyed as `name [unit]` when a unit is given.
    pub entries: BTreeMap<String, String>,
}

const HEADER_LINE: &str = r#"^\s*(?P<key>[^=]+?)\s*=\s*"?(?P<value>[^"\[]*?)"?\s*(\[(?P<unit>[^\]]*)\])?\s*$"#;

/// Parses `key = value [unit]` lines, lines without `=` are skipped.
pub fn parse_header_entries(header: &str) -> Result<BTreeMap<String, String>> {
    let line_pattern = Regex::new(HEADER_LINE)?;
    let mut entries = BTreeMap::new();
    for line in header.lines() {
        if let Some(caps) = line_pattern.captures(line) {
            let key = match caps.name("unit") {
                Some(unit) => format!("{} [{}]", &caps["key"], unit.as_str()),
                None => caps["key"].to_string(),
            };
            entries.insert(key, caps["value"].to_string());
        }
    }
    Ok(entries)
}

impl MeaMetaData {
    pub fn from_header(path: &Path, header: &str) -> Result<Self> {
        let entries = parse_header_entries(header)?;

        let get = |key: &str| -> Result<f64> {
            let raw = entries
                .get(key)
                .ok_or_else(|| ImsDfError::format(path, format!("missing header entry '{}'", key)))?;
            raw.trim()
                .parse::<f64>()
                .map_err(|_| ImsDfError::format(path, format!("header entry '{}' is not numeric: '{}'", key, raw)))
        };

        let chunks_count = get("Chunks count")?;
        let chunk_sample_count = get("Chunk sample count")?;
        let chunk_averages = get("Chunk averages")?;
        let chunk_trigger_repetition = get("Chunk trigger repetition [ms]")?;
        let chunk_sample_rate = get("Chunk sample rate [kHz]")?;

        if chunks_count < 0.0 || chunk_sample_count < 0.0 {
            return Err(ImsDfError::format(path, "negative grid dimensions"));
        }
        if !(chunk_sample_rate > 0.0) {
            return Err(ImsDfError::format(path, "sample rate must be positive"));
        }

        Ok(MeaMetaData {
            chunks_count: chunks_count as usize,
            chunk_sample_count: chunk_sample_count as usize,
            chunk_averages,
            chunk_trigger_repetition,
            chunk_sample_rate,
            entries,
        })
    }

    /// Retention time axis in seconds.
    pub fn retention_times(&self) -> Vec<f64> {
        let step = (self.chunk_averages + 1.0) * self.chunk_trigger_repetition / 1000.0;
        (0..self.chunks_count).map(|i| i as f64 * step).collect()
    }

    /// Drift time axis in milliseconds.
    pub fn drift_times(&self) -> Vec<f64> {
        (0..self.chunk_sample_count)
            .map(|j| j as f64 / self.chunk_sample_rate)
            .collect()
    }
}

/// One row of the metadata store written next to the binary spectra.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRecord {
    pub idx: i64,
    pub file: String,
    pub sample: String,
    pub label: String,
}

pub fn write_labels_sql(folder: &Path, records: &[LabelRecord]) -> Result<()> {
    let db_path = folder.join(LABELS_DB);
    let mut conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE Labels (idx INTEGER PRIMARY KEY, file TEXT NOT NULL, sample TEXT NOT NULL, label TEXT NOT NULL)",
        [],
    )?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare("INSERT INTO Labels (idx, file, sample, label) VALUES (?1, ?2, ?3, ?4)")?;
        for record in records {
            stmt.execute(params![record.idx, record.file, record.sample, record.label])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn read_labels_sql(folder: &Path) -> Result<Vec<LabelRecord>> {
    // Connect to the database
    let db_path = folder.join(LABELS_DB);
    let conn = Connection::open(db_path)?;

    let rows: std::result::Result<Vec<LabelRecord>, _> = conn
        .prepare("SELECT idx, file, sample, label FROM Labels ORDER BY idx")?
        .query_map([], |row| {
            Ok(LabelRecord {
                idx: row.get(0)?,
                file: row.get(1)?,
                sample: row.get(2)?,
                label: row.get(3)?,
            })
        })?
        .collect();

    Ok(rows?)
}

/// Stores the preprocessing descriptors of a dataset in order.
pub fn write_preprocessing_sql(folder: &Path, steps: &[String]) -> Result<()> {
    let conn = Connection::open(folder.join(LABELS_DB))?;
    conn.execute("CREATE TABLE Preprocessing (position INTEGER PRIMARY KEY, step TEXT NOT NULL)", [])?;
    for (position, step) in steps.iter().enumerate() {
        conn.execute(
            "INSERT INTO Preprocessing (position, step) VALUES (?1, ?2)",
            params![position as i64, step],
        )?;
    }
    Ok(())
}

/// Preprocessing descriptors, empty for stores written without them.
pub fn read_preprocessing_sql(folder: &Path) -> Result<Vec<String>> {
    let conn = Connection::open(folder.join(LABELS_DB))?;
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'Preprocessing'",
        [],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Ok(Vec::new());
    }

    let rows: std::result::Result<Vec<String>, _> = conn
        .prepare("SELECT step FROM Preprocessing ORDER BY position")?
        .query_map([], |row| row.get(0))?
        .collect();
    Ok(rows?)
}
