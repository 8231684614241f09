//! CSV output and the table model used by the enrich command.

use crate::constants::URL_INDEX_COLUMNS;
use crate::error::{Result, ScraperError};
use crate::types::ListingRecord;
use csv::{ReaderBuilder, Writer, WriterBuilder};
use std::fs::{self, File};
use std::path::Path;
use tracing::info;

/// An existing CSV: ordered header and rows padded to the header width.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of `name`, appending an empty column when it is absent.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.headers.push(name.to_string());
        for row in self.rows.iter_mut() {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    /// Values of one column, empty strings where the column is missing.
    pub fn column<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .map(move |row| idx.and_then(|i| row.get(i)).map(String::as_str).unwrap_or(""))
    }

    pub fn truncate(&mut self, limit: Option<usize>) {
        if let Some(limit) = limit {
            self.rows.truncate(limit);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn writer(path: &Path) -> Result<Writer<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(WriterBuilder::new().has_headers(false).from_path(path)?)
}

/// `ID, NAME, URL` for every record.
pub fn write_url_index<R: ListingRecord>(path: &Path, records: &[R]) -> Result<()> {
    let mut wtr = writer(path)?;
    wtr.write_record(URL_INDEX_COLUMNS)?;
    for record in records {
        wtr.write_record(record.url_row())?;
    }
    wtr.flush()?;
    info!(rows = records.len(), "Wrote URL index {}", path.display());
    Ok(())
}

/// Full data export with the kind's fixed header row.
pub fn write_records<R: ListingRecord>(path: &Path, records: &[R]) -> Result<()> {
    let mut wtr = writer(path)?;
    wtr.write_record(R::KIND.data_columns())?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    info!(rows = records.len(), "Wrote data file {}", path.display());
    Ok(())
}

pub fn read_table(path: &Path) -> Result<Table> {
    if !path.exists() {
        return Err(ScraperError::Config(format!("Input file not found: {}", path.display())));
    }
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let mut row: Vec<String> = record?.iter().map(str::to_string).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }
    Ok(Table { headers, rows })
}

pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    let mut wtr = writer(path)?;
    wtr.write_record(&table.headers)?;
    for row in &table.rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    info!(rows = table.rows.len(), "Wrote {}", path.display());
    Ok(())
}
