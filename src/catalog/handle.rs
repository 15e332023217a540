//! Tagged index handles
//!
//! The coordinator never downcasts: primary and secondary indexes are
//! tagged variants with a capability set, and routing matches on the
//! capability an operation needs. Every method returns an
//! `OperationResult` so metric aggregation is uniform across structures.

use std::path::PathBuf;

use bitflags::bitflags;

use crate::error::{Error, ErrorCode, Result};
use crate::metrics::{IoStats, OperationResult};
use crate::record::Record;
use crate::storage::btree::BPlusTree;
use crate::storage::btree_secondary::BPlusSecondary;
use crate::storage::hash::ExtendibleHash;
use crate::storage::isam::{IsamIndex, IsamSecondary};
use crate::storage::rtree::RTreeIndex;
use crate::storage::sequential::SequentialFile;
use crate::storage::InsertOutcome;
use crate::types::Value;

bitflags! {
    /// What an index structure can do
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capability: u8 {
        const INSERT  = 0x01;
        const SEARCH  = 0x02;
        const DELETE  = 0x04;
        const RANGE   = 0x08;
        const SCAN    = 0x10;
        const SPATIAL = 0x20;
    }
}

// ============================================================================
// Primary handles
// ============================================================================

/// A table's primary index: owns the records and the key's uniqueness
#[derive(Debug)]
pub enum PrimaryHandle {
    Sequential(SequentialFile),
    Isam(IsamIndex),
    BTree(BPlusTree),
}

impl PrimaryHandle {
    pub fn capabilities(&self) -> Capability {
        // every primary structure supports the full ordered set
        Capability::INSERT
            | Capability::SEARCH
            | Capability::DELETE
            | Capability::RANGE
            | Capability::SCAN
    }

    pub fn insert(&mut self, record: &Record) -> Result<OperationResult<InsertOutcome>> {
        match self {
            PrimaryHandle::Sequential(index) => index.insert(record),
            PrimaryHandle::Isam(index) => index.insert(record),
            PrimaryHandle::BTree(index) => index.insert(record),
        }
    }

    pub fn search(&mut self, key: &Value) -> Result<OperationResult<Option<Record>>> {
        match self {
            PrimaryHandle::Sequential(index) => index.search(key),
            PrimaryHandle::Isam(index) => index.search(key),
            PrimaryHandle::BTree(index) => index.search(key),
        }
    }

    pub fn range_search(&mut self, lo: &Value, hi: &Value) -> Result<OperationResult<Vec<Record>>> {
        match self {
            PrimaryHandle::Sequential(index) => index.range_search(lo, hi),
            PrimaryHandle::Isam(index) => index.range_search(lo, hi),
            PrimaryHandle::BTree(index) => index.range_search(lo, hi),
        }
    }

    pub fn remove(&mut self, key: &Value) -> Result<OperationResult<bool>> {
        match self {
            PrimaryHandle::Sequential(index) => index.remove(key),
            PrimaryHandle::Isam(index) => index.remove(key),
            PrimaryHandle::BTree(index) => index.remove(key),
        }
    }

    pub fn scan_all(&mut self) -> Result<OperationResult<Vec<Record>>> {
        match self {
            PrimaryHandle::Sequential(index) => index.scan_all(),
            PrimaryHandle::Isam(index) => index.scan_all(),
            PrimaryHandle::BTree(index) => index.scan_all(),
        }
    }

    pub fn files(&self) -> Vec<PathBuf> {
        match self {
            PrimaryHandle::Sequential(index) => index.files(),
            PrimaryHandle::Isam(index) => index.files(),
            PrimaryHandle::BTree(index) => index.files(),
        }
    }

    pub fn io_stats(&self) -> IoStats {
        match self {
            PrimaryHandle::Sequential(index) => index.io_stats(),
            PrimaryHandle::Isam(index) => index.io_stats(),
            PrimaryHandle::BTree(index) => index.io_stats(),
        }
    }
}

// ============================================================================
// Secondary handles
// ============================================================================

/// A secondary index: maps an indexed column back to primary keys (or, for
/// the spatial index, holds point-tagged record copies)
#[derive(Debug)]
pub enum SecondaryHandle {
    Isam(IsamSecondary),
    BTree(BPlusSecondary),
    Hash(ExtendibleHash),
    RTree(RTreeIndex),
}

impl SecondaryHandle {
    pub fn capabilities(&self) -> Capability {
        match self {
            SecondaryHandle::Isam(_) | SecondaryHandle::BTree(_) => {
                Capability::INSERT | Capability::SEARCH | Capability::DELETE | Capability::RANGE
            }
            SecondaryHandle::Hash(_) => {
                Capability::INSERT | Capability::SEARCH | Capability::DELETE
            }
            SecondaryHandle::RTree(_) => {
                Capability::INSERT | Capability::DELETE | Capability::SPATIAL
            }
        }
    }

    /// Register a record's indexed value; the spatial index keeps the whole
    /// record, the others keep `(value, primary_key)`
    pub fn insert(
        &mut self,
        value: &Value,
        primary_key: &Value,
        record: &Record,
    ) -> Result<OperationResult<bool>> {
        match self {
            SecondaryHandle::Isam(index) => index.insert(value, primary_key),
            SecondaryHandle::BTree(index) => index.insert(value, primary_key),
            SecondaryHandle::Hash(index) => index.insert(value, primary_key),
            SecondaryHandle::RTree(index) => {
                let point = value.as_point().ok_or_else(|| {
                    Error::with_message(ErrorCode::Encoding, "spatial index needs ARRAY[FLOAT, 2]")
                })?;
                index.insert(point, record)
            }
        }
    }

    /// Primary keys whose records carry `value`
    pub fn search(&mut self, value: &Value) -> Result<OperationResult<Vec<Value>>> {
        match self {
            SecondaryHandle::Isam(index) => index.search(value),
            SecondaryHandle::BTree(index) => index.search(value),
            SecondaryHandle::Hash(index) => index.search(value),
            SecondaryHandle::RTree(_) => Err(Error::with_message(
                ErrorCode::Unsupported,
                "RTREE answers spatial queries only",
            )),
        }
    }

    /// Primary keys for values in `[lo, hi]`; ordered kinds only
    pub fn range_search(&mut self, lo: &Value, hi: &Value) -> Result<OperationResult<Vec<Value>>> {
        match self {
            SecondaryHandle::Isam(index) => index.range_search(lo, hi),
            SecondaryHandle::BTree(index) => index.range_search(lo, hi),
            SecondaryHandle::Hash(_) => Err(Error::with_message(
                ErrorCode::Unsupported,
                "HASH does not support range search",
            )),
            SecondaryHandle::RTree(_) => Err(Error::with_message(
                ErrorCode::Unsupported,
                "RTREE does not support range search",
            )),
        }
    }

    pub fn remove(&mut self, value: &Value, primary_key: &Value) -> Result<OperationResult<bool>> {
        match self {
            SecondaryHandle::Isam(index) => index.remove(value, primary_key),
            SecondaryHandle::BTree(index) => index.remove(value, primary_key),
            SecondaryHandle::Hash(index) => index.remove(value, primary_key),
            SecondaryHandle::RTree(index) => index.remove(primary_key),
        }
    }

    /// Records within a radius; spatial kinds only
    pub fn radius_search(
        &mut self,
        center: (f64, f64),
        radius: f64,
    ) -> Result<OperationResult<Vec<(Record, f64)>>> {
        match self {
            SecondaryHandle::RTree(index) => index.radius_search(center, radius),
            _ => Err(Error::with_message(
                ErrorCode::Unsupported,
                "spatial search needs an RTREE index",
            )),
        }
    }

    /// k nearest records; spatial kinds only
    pub fn nearest(
        &mut self,
        center: (f64, f64),
        k: usize,
    ) -> Result<OperationResult<Vec<(Record, f64)>>> {
        match self {
            SecondaryHandle::RTree(index) => index.nearest(center, k),
            _ => Err(Error::with_message(
                ErrorCode::Unsupported,
                "spatial search needs an RTREE index",
            )),
        }
    }

    pub fn files(&self) -> Vec<PathBuf> {
        match self {
            SecondaryHandle::Isam(index) => index.files(),
            SecondaryHandle::BTree(index) => index.files(),
            SecondaryHandle::Hash(index) => index.files(),
            SecondaryHandle::RTree(index) => index.files(),
        }
    }

    pub fn io_stats(&self) -> IoStats {
        match self {
            SecondaryHandle::Isam(index) => index.io_stats(),
            SecondaryHandle::BTree(index) => index.io_stats(),
            SecondaryHandle::Hash(index) => index.io_stats(),
            SecondaryHandle::RTree(index) => index.io_stats(),
        }
    }
}
