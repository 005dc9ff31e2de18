use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;

use crate::cell::CellValue;
use crate::error::ExportError;
use crate::metadata::MetadataRecord;
use crate::parser::normalize::NormalizedTable;
use crate::project::{Conflict, FlatProjection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub field_separator: u8,
    pub decimal: char,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            field_separator: b';',
            decimal: ',',
        }
    }
}

/// Write one table as delimited text. The header row (if any) starts with the
/// index name, and each data row with its index label, when the table has an index.
pub fn write_table<W: Write>(table: &NormalizedTable, writer: W, opts: &ExportOptions) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(opts.field_separator)
        .from_writer(writer);

    if !table.headers.is_empty() {
        let mut header: Vec<&str> = Vec::with_capacity(table.width());
        if table.has_index() {
            header.push(table.index_name.as_deref().unwrap_or(""));
        }
        header.extend(table.headers.iter().map(String::as_str));
        wtr.write_record(&header)?;
    }

    for (i, row) in table.rows.iter().enumerate() {
        let mut record: Vec<String> = Vec::with_capacity(table.width());
        if let Some(label) = table.index.get(i) {
            record.push(label.clone());
        }
        record.extend(row.iter().map(|c| c.render(opts.decimal)));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_table_file(table: &NormalizedTable, path: &Path, opts: &ExportOptions) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_table(table, BufWriter::new(file), opts)
}

/// One file per table: `<dir>/<stem>-1.csv`, `<stem>-2.csv`, …
pub fn export_tables(
    tables: &[NormalizedTable],
    dir: &Path,
    stem: &str,
    opts: &ExportOptions,
) -> Result<Vec<PathBuf>, ExportError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(tables.len());
    for (i, table) in tables.iter().enumerate() {
        let path = dir.join(format!("{}-{}.csv", stem, i + 1));
        write_table_file(table, &path, opts)?;
        written.push(path);
    }
    info!(tables = written.len(), dir = %dir.display(), "exported tables");
    Ok(written)
}

pub fn export_selected(
    tables: &[NormalizedTable],
    index: usize,
    path: &Path,
    opts: &ExportOptions,
) -> Result<(), ExportError> {
    let table = tables.get(index).ok_or(ExportError::IndexOutOfRange {
        index,
        len: tables.len(),
    })?;
    write_table_file(table, path, opts)?;
    info!(index, path = %path.display(), "exported table");
    Ok(())
}

#[derive(Serialize)]
struct ProjectionReport<'a> {
    exported_at: DateTime<Utc>,
    values: &'a IndexMap<String, CellValue>,
    conflicts: &'a [Conflict],
}

pub fn write_projection_json<W: Write>(projection: &FlatProjection, writer: W) -> Result<(), ExportError> {
    let report = ProjectionReport {
        exported_at: Utc::now(),
        values: &projection.values,
        conflicts: &projection.conflicts,
    };
    serde_json::to_writer_pretty(writer, &report)?;
    Ok(())
}

pub fn write_metadata_json<W: Write>(record: &MetadataRecord, writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, record)?;
    Ok(())
}
