//! Sentence dataset file (`result.csv`)
//!
//! Metadata columns followed by a fixed number of ordered `company_N` slot
//! columns. Files are written as UTF-8 with a byte-order mark so spreadsheet
//! tools pick the right encoding; the mark is optional on input.

use crate::error::{CorplinkError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use tracing::debug;

pub const META_COLUMNS: [&str; 9] = [
    "Tier_1",
    "Tier_2",
    "Filename",
    "Date",
    "Title",
    "Publisher",
    "Sentence",
    "Hit_Count",
    "Matched_Keywords",
];

pub const SLOT_PREFIX: &str = "company_";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Open a CSV file for reading, skipping a leading byte-order mark.
pub(crate) fn open_csv_reader(path: &Path) -> Result<csv::Reader<Cursor<Vec<u8>>>> {
    if !path.exists() {
        return Err(CorplinkError::MissingInput(path.to_path_buf()));
    }
    let mut bytes = std::fs::read(path)?;
    if bytes.starts_with(UTF8_BOM) {
        bytes.drain(..UTF8_BOM.len());
    }
    Ok(csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(Cursor::new(bytes)))
}

/// Create a CSV file for writing, prefixed with a byte-order mark.
pub(crate) fn create_csv_writer(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(path)?;
    file.write_all(UTF8_BOM)?;
    Ok(csv::Writer::from_writer(file))
}

/// One extracted sentence and the organization names found in it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentenceRecord {
    pub tier_1: String,
    pub tier_2: String,
    pub filename: String,
    pub date: String,
    pub title: String,
    pub publisher: String,
    pub sentence: String,
    pub hit_count: u32,
    pub matched_keywords: String,
    /// Fixed-size, left-aligned, empty-padded.
    pub company_slots: Vec<String>,
}

impl SentenceRecord {
    /// Non-empty slot values, trimmed, in slot order.
    pub fn companies(&self) -> Vec<String> {
        self.company_slots
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Replace the slots with `names`, left-aligned and padded to `slot_count`.
    ///
    /// Names beyond `slot_count` are dropped. Returns how many cells changed.
    pub fn repack(&mut self, names: &[String], slot_count: usize) -> usize {
        let mut changed = 0;
        let mut slots = Vec::with_capacity(slot_count);
        for i in 0..slot_count {
            let value = names.get(i).cloned().unwrap_or_default();
            let previous = self.company_slots.get(i).map(String::as_str).unwrap_or("");
            if previous != value {
                changed += 1;
            }
            slots.push(value);
        }
        self.company_slots = slots;
        changed
    }

    fn meta_values(&self) -> [String; 9] {
        [
            self.tier_1.clone(),
            self.tier_2.clone(),
            self.filename.clone(),
            self.date.clone(),
            self.title.clone(),
            self.publisher.clone(),
            self.sentence.clone(),
            self.hit_count.to_string(),
            self.matched_keywords.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub slot_count: usize,
    pub records: Vec<SentenceRecord>,
}

impl Dataset {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slot_count,
            records: Vec::new(),
        }
    }

    /// Load a dataset. Every column whose header starts with `company_` is a
    /// slot, in header order; missing metadata columns read as empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = open_csv_reader(path)?;
        let headers = reader.headers()?.clone();

        let column_index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim(), idx))
            .collect();
        let slot_columns: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, name)| name.trim().starts_with(SLOT_PREFIX))
            .map(|(idx, _)| idx)
            .collect();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let field = |name: &str| -> String {
                column_index
                    .get(name)
                    .and_then(|&idx| row.get(idx))
                    .unwrap_or("")
                    .to_string()
            };
            records.push(SentenceRecord {
                tier_1: field("Tier_1"),
                tier_2: field("Tier_2"),
                filename: field("Filename"),
                date: field("Date"),
                title: field("Title"),
                publisher: field("Publisher"),
                sentence: field("Sentence"),
                hit_count: field("Hit_Count").trim().parse().unwrap_or(0),
                matched_keywords: field("Matched_Keywords"),
                company_slots: slot_columns
                    .iter()
                    .map(|&idx| row.get(idx).unwrap_or("").trim().to_string())
                    .collect(),
            });
        }

        debug!(
            "Loaded {} records with {} company slots from {}",
            records.len(),
            slot_columns.len(),
            path.display()
        );
        Ok(Self {
            slot_count: slot_columns.len(),
            records,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = create_csv_writer(path.as_ref())?;

        let mut header: Vec<String> = META_COLUMNS.iter().map(|c| c.to_string()).collect();
        header.extend((1..=self.slot_count).map(|i| format!("{}{}", SLOT_PREFIX, i)));
        writer.write_record(&header)?;

        for record in &self.records {
            let mut row: Vec<String> = record.meta_values().to_vec();
            row.extend(
                (0..self.slot_count).map(|i| record.company_slots.get(i).cloned().unwrap_or_default()),
            );
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}
