//! Typed plan vocabulary
//!
//! Plans are the boundary between clients (a SQL front end, a GUI, a
//! loader) and the catalog: a small set of typed statements the
//! coordinator executes. Clients build these directly; no text parsing
//! happens here.

use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, ErrorCode, Result};
use crate::record::Record;
use crate::types::{FieldType, Value};

// ============================================================================
// Index kinds
// ============================================================================

/// The index structures a table can be backed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Sequential,
    Isam,
    BTree,
    Hash,
    RTree,
}

impl IndexKind {
    /// Parse the client-facing spelling
    pub fn parse(text: &str) -> Result<IndexKind> {
        match text.to_ascii_uppercase().as_str() {
            "SEQUENTIAL" | "SEQ" => Ok(IndexKind::Sequential),
            "ISAM" => Ok(IndexKind::Isam),
            "BTREE" => Ok(IndexKind::BTree),
            "HASH" | "EXTENDIBLE" => Ok(IndexKind::Hash),
            "RTREE" => Ok(IndexKind::RTree),
            other => Err(Error::with_message(
                ErrorCode::Schema,
                format!("unknown index kind: {}", other),
            )),
        }
    }

    /// Whether this kind can serve as a table's primary index
    pub fn can_be_primary(&self) -> bool {
        matches!(self, IndexKind::Sequential | IndexKind::Isam | IndexKind::BTree)
    }

    /// Whether this kind can serve as a secondary index
    pub fn can_be_secondary(&self) -> bool {
        !matches!(self, IndexKind::Sequential)
    }

    /// Lower-case tag used in index file names
    pub fn tag(&self) -> &'static str {
        match self {
            IndexKind::Sequential => "sequential",
            IndexKind::Isam => "isam",
            IndexKind::BTree => "btree",
            IndexKind::Hash => "hash",
            IndexKind::RTree => "rtree",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexKind::Sequential => "SEQUENTIAL",
            IndexKind::Isam => "ISAM",
            IndexKind::BTree => "BTREE",
            IndexKind::Hash => "HASH",
            IndexKind::RTree => "RTREE",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// Column definitions and predicates
// ============================================================================

/// One column in a CreateTable plan
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub ty: FieldType,
    pub is_key: bool,
    /// On the key column: the primary index kind; on other columns: a
    /// secondary index to create with the table
    pub index_kind: Option<IndexKind>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        ColumnDef {
            name: name.into(),
            ty,
            is_key: false,
            index_kind: None,
        }
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn indexed(mut self, kind: IndexKind) -> Self {
        self.index_kind = Some(kind);
        self
    }
}

/// WHERE clause forms the coordinator can route
#[derive(Debug, Clone, PartialEq)]
pub enum WherePredicate {
    /// `column = value`
    Eq { column: String, value: Value },
    /// `column BETWEEN low AND high` (inclusive)
    Between {
        column: String,
        low: Value,
        high: Value,
    },
    /// points within `radius` of `(x, y)`
    InRadius {
        column: String,
        x: f64,
        y: f64,
        radius: f64,
    },
    /// the `k` points nearest to `(x, y)`
    Knn {
        column: String,
        x: f64,
        y: f64,
        k: usize,
    },
}

impl WherePredicate {
    /// The column the predicate constrains
    pub fn column(&self) -> &str {
        match self {
            WherePredicate::Eq { column, .. }
            | WherePredicate::Between { column, .. }
            | WherePredicate::InRadius { column, .. }
            | WherePredicate::Knn { column, .. } => column,
        }
    }
}

// ============================================================================
// Plans
// ============================================================================

#[derive(Debug, Clone)]
pub struct CreateTablePlan {
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone)]
pub struct LoadFromCsvPlan {
    pub table: String,
    pub path: PathBuf,
    /// Kind of the secondary indexes named by `index_cols`
    pub index_kind: Option<IndexKind>,
    /// Columns to ensure secondary indexes on before loading
    pub index_cols: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CreateIndexPlan {
    pub table: String,
    pub column: String,
    pub index_type: IndexKind,
}

#[derive(Debug, Clone)]
pub struct DropIndexPlan {
    /// `<table>.<column>` or the file-name form `<table>_<column>_<kind>`
    pub index_name: String,
}

#[derive(Debug, Clone)]
pub struct DropTablePlan {
    pub table: String,
}

#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub table: String,
    /// Column order of `values`; schema order when absent
    pub columns: Option<Vec<String>>,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct DeletePlan {
    pub table: String,
    pub where_clause: WherePredicate,
}

#[derive(Debug, Clone)]
pub struct SelectPlan {
    pub table: String,
    /// Projection; all columns when absent
    pub columns: Option<Vec<String>>,
    pub where_clause: Option<WherePredicate>,
}

/// A statement the coordinator can execute
#[derive(Debug, Clone)]
pub enum Plan {
    CreateTable(CreateTablePlan),
    LoadFromCsv(LoadFromCsvPlan),
    CreateIndex(CreateIndexPlan),
    DropIndex(DropIndexPlan),
    DropTable(DropTablePlan),
    Insert(InsertPlan),
    Delete(DeletePlan),
    Select(SelectPlan),
}

// ============================================================================
// Outputs
// ============================================================================

/// Bulk-load summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub cast_errors: usize,
}

/// Projected query result
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What a plan produced
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutput {
    /// SELECT results
    Rows(RowSet),
    /// Records affected by DELETE
    Affected(usize),
    /// INSERT outcome: false is the duplicate-key soft failure
    Inserted(bool),
    /// CSV load summary
    Load(LoadReport),
    /// DDL completed
    Done,
}

impl PlanOutput {
    /// The rows, when this output carries them
    pub fn rows(&self) -> Option<&RowSet> {
        match self {
            PlanOutput::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

/// Strip a record to the requested columns, in request order
pub fn project(record: &Record, indices: &[usize]) -> Vec<Value> {
    indices.iter().map(|&i| record.values[i].clone()).collect()
}

// ============================================================================
// Tests
// ============================================================================
