//! CSV ingestion boundary
//!
//! Everything messy about real CSV exports is absorbed here, before rows
//! reach the core: delimiter guessing, case-insensitive header matching
//! with a small Spanish alias table, and `DD/MM/YYYY` dates normalized to
//! ISO-8601. The core only ever sees typed records with ISO dates.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use tracing::{debug, info};

use crate::error::{Error, ErrorCode, Result};
use crate::record::{Record, Schema};
use crate::types::{FieldType, Value};

lazy_static! {
    /// Spanish export headers mapped to their schema column names
    static ref HEADER_ALIASES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("id venta", "id");
        m.insert("nombre producto", "nombre");
        m.insert("cantidad vendida", "cantidad");
        m.insert("precio unitario", "precio");
        m.insert("fecha venta", "fecha");
        m
    };
}

/// `;` when it appears at least as often as `,` in the header line
pub fn guess_delimiter(header_line: &str) -> u8 {
    let semicolons = header_line.matches(';').count();
    let commas = header_line.matches(',').count();
    if semicolons >= commas {
        b';'
    } else {
        b','
    }
}

/// Lower-cased, trimmed, alias-resolved header name
pub fn canonical_header(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    match HEADER_ALIASES.get(lowered.as_str()) {
        Some(alias) => alias.to_string(),
        None => lowered,
    }
}

/// Accept `YYYY-MM-DD` as-is and rewrite `DD/MM/YYYY` (leading zeroes
/// optional) into it
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok() {
        return Some(raw.to_string());
    }
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .ok()
        .map(|date| date.format("%Y-%m-%d").to_string())
}

/// Parse a CSV file into records under `schema`.
///
/// Rows with unparseable values are counted and skipped, never aborting
/// the load; a header that lacks one of the schema's columns is a schema
/// error for the whole file.
pub fn read_rows(path: &Path, schema: &Schema) -> Result<(Vec<Record>, usize)> {
    let header_line = {
        let file = File::open(path)?;
        let mut line = String::new();
        BufReader::new(file).read_line(&mut line)?;
        line
    };
    let delimiter = guess_delimiter(&header_line);
    let delimiter_char = delimiter as char;
    debug!(delimiter = %delimiter_char, path = %path.display(), "csv delimiter guessed");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::with_message(ErrorCode::Io, e.to_string()))?;

    // map each schema field to its CSV column position
    let headers = reader
        .headers()
        .map_err(|e| Error::with_message(ErrorCode::Io, e.to_string()))?
        .clone();
    let canonical: Vec<String> = headers.iter().map(canonical_header).collect();
    let mut positions = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let wanted = field.name.to_lowercase();
        let pos = canonical.iter().position(|h| *h == wanted).ok_or_else(|| {
            Error::with_message(
                ErrorCode::Schema,
                format!("csv is missing column {:?}", field.name),
            )
        })?;
        positions.push(pos);
    }

    let mut records = Vec::new();
    let mut cast_errors = 0usize;
    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(_) => {
                cast_errors += 1;
                continue;
            }
        };
        match parse_row(&row, schema, &positions) {
            Ok(record) => records.push(record),
            Err(_) => cast_errors += 1,
        }
    }
    info!(
        rows = records.len(),
        cast_errors,
        path = %path.display(),
        "csv parsed"
    );
    Ok((records, cast_errors))
}

fn parse_row(row: &csv::StringRecord, schema: &Schema, positions: &[usize]) -> Result<Record> {
    let mut values = Vec::with_capacity(schema.fields().len());
    for (field, &pos) in schema.fields().iter().zip(positions) {
        let raw = row.get(pos).ok_or_else(|| {
            Error::with_message(ErrorCode::Encoding, format!("row too short for {:?}", field.name))
        })?;
        let value = match field.ty {
            FieldType::Date => {
                let iso = normalize_date(raw).ok_or_else(|| {
                    Error::with_message(ErrorCode::Encoding, format!("bad date: {:?}", raw))
                })?;
                Value::Str(iso)
            }
            ref ty => Value::parse(raw, ty)?,
        };
        values.push(value);
    }
    Ok(Record::new(values))
}

// ============================================================================
// Tests
// ============================================================================
