//! Core type aliases, field types and dynamic values.
//!
//! This module defines the primitive column types the record codec supports
//! and the dynamic `Value` that flows between plans, the catalog and the
//! index structures.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, ErrorCode, Result};

// ============================================================================
// Numeric Type Aliases
// ============================================================================

/// Page number type (0-indexed within an index file)
pub type PageId = u32;

// ============================================================================
// Field Types
// ============================================================================

/// Column type of a table field.
///
/// `Date` is stored exactly like `Char(10)` holding an ISO-8601 string;
/// `ArrayFloat(k)` is k consecutive 32-bit floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// 32-bit signed integer
    Int,
    /// 32-bit IEEE float
    Float,
    /// Fixed-width string, NUL-padded to the declared byte length
    Char(usize),
    /// Single byte, 0 or 1
    Bool,
    /// `YYYY-MM-DD`, stored as Char(10)
    Date,
    /// Fixed-size array of 32-bit floats
    ArrayFloat(usize),
}

impl FieldType {
    /// Packed width of a value of this type, in bytes
    pub fn packed_size(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Float => 4,
            FieldType::Char(n) => *n,
            FieldType::Bool => 1,
            FieldType::Date => 10,
            FieldType::ArrayFloat(k) => 4 * k,
        }
    }

    /// Native alignment of the first byte of a value of this type
    pub fn alignment(&self) -> usize {
        match self {
            FieldType::Int | FieldType::Float | FieldType::ArrayFloat(_) => 4,
            FieldType::Char(_) | FieldType::Bool | FieldType::Date => 1,
        }
    }

    /// Whether values of this type form a totally ordered key domain
    pub fn is_orderable(&self) -> bool {
        !matches!(self, FieldType::ArrayFloat(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "INT"),
            FieldType::Float => write!(f, "FLOAT"),
            FieldType::Char(n) => write!(f, "CHAR[{}]", n),
            FieldType::Bool => write!(f, "BOOL"),
            FieldType::Date => write!(f, "DATE"),
            FieldType::ArrayFloat(k) => write!(f, "ARRAY[FLOAT, {}]", k),
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// Dynamic value held by one record field.
///
/// Integers and floats are widened in memory; the codec narrows them to
/// their declared 32-bit on-disk forms and reports `Encoding` errors when a
/// value does not fit.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    ArrayFloat(Vec<f64>),
}

impl Value {
    /// Check whether this value can inhabit the given field type
    pub fn matches(&self, ty: &FieldType) -> bool {
        matches!(
            (self, ty),
            (Value::Int(_), FieldType::Int)
                | (Value::Float(_), FieldType::Float)
                | (Value::Str(_), FieldType::Char(_))
                | (Value::Str(_), FieldType::Date)
                | (Value::Bool(_), FieldType::Bool)
                | (Value::ArrayFloat(_), FieldType::ArrayFloat(_))
        )
    }

    /// Total order over key values of the same variant.
    ///
    /// Floats order by `total_cmp`; strings by byte order. Mismatched
    /// variants order by an arbitrary but stable variant rank so that a
    /// damaged index degrades deterministically instead of panicking.
    pub fn cmp_key(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.total_cmp(&(*b as f64)),
            (Value::Str(a), Value::Str(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Float(_) => 1,
            Value::Str(_) => 2,
            Value::Bool(_) => 3,
            Value::ArrayFloat(_) => 4,
        }
    }

    /// Canonical text form, used for hashing and display
    pub fn canonical_text(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::ArrayFloat(a) => {
                let parts: Vec<String> = a.iter().map(|f| f.to_string()).collect();
                format!("[{}]", parts.join(","))
            }
        }
    }

    /// Get as i64 if this is an Int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if numeric
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as &str if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as a 2-D point if this is ARRAY[FLOAT, 2]
    pub fn as_point(&self) -> Option<(f64, f64)> {
        match self {
            Value::ArrayFloat(a) if a.len() == 2 => Some((a[0], a[1])),
            _ => None,
        }
    }

    /// Parse a text form into a value of the given type.
    ///
    /// Used at the CSV boundary and by clients building plan values from
    /// text. Fails with an `Encoding` error on malformed input.
    pub fn parse(text: &str, ty: &FieldType) -> Result<Value> {
        let text = text.trim();
        match ty {
            FieldType::Int => text
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| Error::with_message(ErrorCode::Encoding, format!("not an INT: {:?}", text))),
            FieldType::Float => text
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| Error::with_message(ErrorCode::Encoding, format!("not a FLOAT: {:?}", text))),
            FieldType::Char(_) | FieldType::Date => Ok(Value::Str(text.to_string())),
            FieldType::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(Error::with_message(
                    ErrorCode::Encoding,
                    format!("not a BOOL: {:?}", text),
                )),
            },
            FieldType::ArrayFloat(k) => {
                let inner = text.trim_start_matches(['[', '(']).trim_end_matches([']', ')']);
                let parts: Result<Vec<f64>> = inner
                    .split(',')
                    .map(|p| {
                        p.trim().parse::<f64>().map_err(|_| {
                            Error::with_message(
                                ErrorCode::Encoding,
                                format!("not a FLOAT array element: {:?}", p),
                            )
                        })
                    })
                    .collect();
                let parts = parts?;
                if parts.len() != *k {
                    return Err(Error::with_message(
                        ErrorCode::Encoding,
                        format!("array must have {} elements, got {}", k, parts.len()),
                    ));
                }
                Ok(Value::ArrayFloat(parts))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_text())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<(f64, f64)> for Value {
    fn from((x, y): (f64, f64)) -> Self {
        Value::ArrayFloat(vec![x, y])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_sizes() {
        assert_eq!(FieldType::Int.packed_size(), 4);
        assert_eq!(FieldType::Char(50).packed_size(), 50);
        assert_eq!(FieldType::Date.packed_size(), 10);
        assert_eq!(FieldType::ArrayFloat(2).packed_size(), 8);
    }

    #[test]
    fn test_key_ordering() {
        assert_eq!(Value::Int(1).cmp_key(&Value::Int(2)), Ordering::Less);
        assert_eq!(
            Value::Str("Lima".into()).cmp_key(&Value::Str("Lima".into())),
            Ordering::Equal
        );
        // byte order, not collation
        assert_eq!(
            Value::Str("Z".into()).cmp_key(&Value::Str("a".into())),
            Ordering::Less
        );
        assert_eq!(Value::Float(1.5).cmp_key(&Value::Int(2)), Ordering::Less);
    }

    #[test]
    fn test_parse() {
        assert_eq!(Value::parse("42", &FieldType::Int).unwrap(), Value::Int(42));
        assert_eq!(
            Value::parse("3.5", &FieldType::Float).unwrap(),
            Value::Float(3.5)
        );
        assert_eq!(
            Value::parse(" lima ", &FieldType::Char(10)).unwrap(),
            Value::Str("lima".into())
        );
        assert_eq!(
            Value::parse("[1.0, 2.0]", &FieldType::ArrayFloat(2)).unwrap(),
            Value::ArrayFloat(vec![1.0, 2.0])
        );
        assert!(Value::parse("abc", &FieldType::Int).is_err());
        assert!(Value::parse("[1.0]", &FieldType::ArrayFloat(2)).is_err());
    }

    #[test]
    fn test_matches() {
        assert!(Value::Int(1).matches(&FieldType::Int));
        assert!(Value::Str("2024-01-01".into()).matches(&FieldType::Date));
        assert!(!Value::Int(1).matches(&FieldType::Char(4)));
    }
}
