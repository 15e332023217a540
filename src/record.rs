//! Record schema and fixed-width codec
//!
//! A record's on-disk layout is fully determined by its schema: an ordered
//! list of `(name, type)` fields plus an optional trailing `active` flag.
//! Fields are packed at natively aligned offsets, so the packed size of
//! every record in a table is constant and pages can be sliced into fixed
//! record slots.

use std::fmt::Write as _;

use chrono::NaiveDate;

use crate::error::{Error, ErrorCode, Result};
use crate::types::{FieldType, Value};

// ============================================================================
// Value codec
// ============================================================================

/// Pack a single value into a buffer of exactly `ty.packed_size()` bytes
pub fn pack_value(ty: &FieldType, value: &Value, out: &mut [u8]) -> Result<()> {
    debug_assert_eq!(out.len(), ty.packed_size());
    match (ty, value) {
        (FieldType::Int, Value::Int(i)) => {
            let narrow = i32::try_from(*i).map_err(|_| {
                Error::with_message(ErrorCode::Encoding, format!("INT out of range: {}", i))
            })?;
            out.copy_from_slice(&narrow.to_le_bytes());
        }
        (FieldType::Float, Value::Float(f)) => {
            out.copy_from_slice(&(*f as f32).to_le_bytes());
        }
        (FieldType::Char(n), Value::Str(s)) => {
            pack_str(s, *n, out);
        }
        (FieldType::Date, Value::Str(s)) => {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                Error::with_message(ErrorCode::Encoding, format!("not an ISO date: {:?}", s))
            })?;
            pack_str(s, 10, out);
        }
        (FieldType::Bool, Value::Bool(b)) => {
            out[0] = *b as u8;
        }
        (FieldType::ArrayFloat(k), Value::ArrayFloat(a)) => {
            if a.len() != *k {
                return Err(Error::with_message(
                    ErrorCode::Encoding,
                    format!("array must have {} elements, got {}", k, a.len()),
                ));
            }
            for (slot, f) in out.chunks_exact_mut(4).zip(a.iter()) {
                slot.copy_from_slice(&(*f as f32).to_le_bytes());
            }
        }
        _ => {
            return Err(Error::with_message(
                ErrorCode::Encoding,
                format!("value {} does not fit field type {}", value, ty),
            ));
        }
    }
    Ok(())
}

/// Unpack a single value from exactly `ty.packed_size()` bytes
pub fn unpack_value(ty: &FieldType, data: &[u8]) -> Result<Value> {
    debug_assert_eq!(data.len(), ty.packed_size());
    let value = match ty {
        FieldType::Int => {
            Value::Int(i32::from_le_bytes([data[0], data[1], data[2], data[3]]) as i64)
        }
        FieldType::Float => {
            Value::Float(f32::from_le_bytes([data[0], data[1], data[2], data[3]]) as f64)
        }
        FieldType::Char(_) | FieldType::Date => Value::Str(unpack_str(data)),
        FieldType::Bool => Value::Bool(data[0] != 0),
        FieldType::ArrayFloat(_) => Value::ArrayFloat(
            data.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
                .collect(),
        ),
    };
    Ok(value)
}

fn pack_str(s: &str, width: usize, out: &mut [u8]) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    out[..n].copy_from_slice(&bytes[..n]);
    out[n..width].fill(0);
}

fn unpack_str(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_matches('\0')
        .trim()
        .to_string()
}

// ============================================================================
// Schema
// ============================================================================

/// A named, typed field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
}

/// Ordered field list plus key designation; owns the packed layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<FieldDef>,
    offsets: Vec<usize>,
    key_index: usize,
    with_active: bool,
    record_size: usize,
}

impl Schema {
    /// Build a schema from `(name, type)` pairs and the key field name.
    ///
    /// The key must name one of the fields and have an orderable type.
    pub fn new(fields: Vec<(&str, FieldType)>, key_field: &str) -> Result<Self> {
        let fields: Vec<FieldDef> = fields
            .into_iter()
            .map(|(name, ty)| FieldDef {
                name: name.to_string(),
                ty,
            })
            .collect();
        Self::from_defs(fields, key_field)
    }

    /// Build a schema from owned field definitions
    pub fn from_defs(fields: Vec<FieldDef>, key_field: &str) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::with_message(ErrorCode::Schema, "no fields"));
        }
        let key_index = fields
            .iter()
            .position(|f| f.name == key_field)
            .ok_or_else(|| {
                Error::with_message(ErrorCode::Schema, format!("unknown key field: {}", key_field))
            })?;
        if !fields[key_index].ty.is_orderable() {
            return Err(Error::with_message(
                ErrorCode::Schema,
                format!("{} cannot be a key type", fields[key_index].ty),
            ));
        }
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0usize;
        for field in &fields {
            let align = field.ty.alignment();
            offset = (offset + align - 1) / align * align;
            offsets.push(offset);
            offset += field.ty.packed_size();
        }
        Ok(Schema {
            fields,
            offsets,
            key_index,
            with_active: false,
            record_size: offset,
        })
    }

    /// Append the trailing `active` byte to the layout (Sequential File)
    pub fn with_active_flag(mut self) -> Self {
        if !self.with_active {
            self.with_active = true;
            self.record_size += 1;
        }
        self
    }

    /// Whether records carry the trailing `active` byte
    pub fn has_active_flag(&self) -> bool {
        self.with_active
    }

    /// All fields in declared order
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Index of the field with the given name, case-sensitively
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Type of the named field
    pub fn field_type(&self, name: &str) -> Option<&FieldType> {
        self.field_index(name).map(|i| &self.fields[i].ty)
    }

    /// Position of the key field
    pub fn key_index(&self) -> usize {
        self.key_index
    }

    /// Name of the key field
    pub fn key_name(&self) -> &str {
        &self.fields[self.key_index].name
    }

    /// Type of the key field
    pub fn key_type(&self) -> &FieldType {
        &self.fields[self.key_index].ty
    }

    /// Constant packed size of one record under this schema
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Pack a record into its fixed-width byte form
    pub fn pack(&self, record: &Record) -> Result<Vec<u8>> {
        if record.values.len() != self.fields.len() {
            return Err(Error::with_message(
                ErrorCode::Encoding,
                format!(
                    "record has {} values, schema has {} fields",
                    record.values.len(),
                    self.fields.len()
                ),
            ));
        }
        let mut buf = vec![0u8; self.record_size];
        for (i, field) in self.fields.iter().enumerate() {
            let start = self.offsets[i];
            let end = start + field.ty.packed_size();
            pack_value(&field.ty, &record.values[i], &mut buf[start..end])?;
        }
        if self.with_active {
            buf[self.record_size - 1] = record.active as u8;
        }
        Ok(buf)
    }

    /// Unpack a fixed-width byte form back into a record
    pub fn unpack(&self, data: &[u8]) -> Result<Record> {
        if data.len() < self.record_size {
            return Err(Error::with_message(
                ErrorCode::Corrupt,
                format!(
                    "record slot holds {} bytes, schema needs {}",
                    data.len(),
                    self.record_size
                ),
            ));
        }
        let mut values = Vec::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            let start = self.offsets[i];
            let end = start + field.ty.packed_size();
            values.push(unpack_value(&field.ty, &data[start..end])?);
        }
        let active = if self.with_active {
            data[self.record_size - 1] != 0
        } else {
            true
        };
        Ok(Record { values, active })
    }
}

// ============================================================================
// Record
// ============================================================================

/// One row: values in schema order plus the live flag
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub values: Vec<Value>,
    pub active: bool,
}

impl Record {
    /// A live record with the given values
    pub fn new(values: Vec<Value>) -> Self {
        Record {
            values,
            active: true,
        }
    }

    /// Value at a field position
    pub fn value(&self, idx: usize) -> &Value {
        &self.values[idx]
    }

    /// The record's key value under a schema
    pub fn key<'a>(&'a self, schema: &Schema) -> &'a Value {
        &self.values[schema.key_index()]
    }

    /// Value of a named field under a schema
    pub fn field<'a>(&'a self, schema: &Schema, name: &str) -> Option<&'a Value> {
        schema.field_index(name).map(|i| &self.values[i])
    }

    /// Human-readable rendering with field names and live status
    pub fn describe(&self, schema: &Schema) -> String {
        let mut out = String::from("Record(");
        for (i, field) in schema.fields().iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}: {}", field.name, self.values[i]);
        }
        let status = if self.active { "Active" } else { "Deleted" };
        let _ = write!(out, ", Status: {})", status);
        out
    }
}

// ============================================================================
// Tests
// ============================================================================
