//! ISAM: two-level static index
//!
//! Three files: a one-page root index mapping key ranges to leaf index
//! pages, a leaf index mapping key ranges to data pages, and the data file
//! itself. Data pages hold sorted records up to a block factor and chain
//! overflow pages through a `next_page` pointer. Both index levels are laid
//! out once, at build time; inserts never reorganize them — a full data
//! page grows an overflow chain instead. Overflow pages emptied by deletes
//! go to a capped free stack persisted in the data file's header page and
//! are reused before the file grows.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, ErrorCode, Result};
use crate::metrics::{IoStats, OperationResult, Timer};
use crate::record::{pack_value, unpack_value, Record, Schema};
use crate::storage::pager::PageFile;
use crate::storage::InsertOutcome;
use crate::types::{FieldType, PageId, Value};

/// Records per data page
pub const DEFAULT_BLOCK_FACTOR: usize = 4;
/// Entries per leaf index page
pub const DEFAULT_LEAF_FAN_OUT: usize = 64;
/// Entries in the single root index page
pub const DEFAULT_ROOT_FAN_OUT: usize = 64;
/// Free stack capacity; excess freed pages are dropped
pub const MAX_FREE_PAGES: usize = 5;

/// n_records + next_page
const DATA_HEADER: usize = 6;
/// entry count
const INDEX_HEADER: usize = 2;

/// Page 0 of the data file holds the free stack, so 0 doubles as "no page"
const NONE: PageId = 0;

/// Build-time sizing of the two index levels and the data pages
#[derive(Debug, Clone, Copy)]
pub struct IsamConfig {
    pub block_factor: usize,
    pub leaf_fan_out: usize,
    pub root_fan_out: usize,
}

impl Default for IsamConfig {
    fn default() -> Self {
        IsamConfig {
            block_factor: DEFAULT_BLOCK_FACTOR,
            leaf_fan_out: DEFAULT_LEAF_FAN_OUT,
            root_fan_out: DEFAULT_ROOT_FAN_OUT,
        }
    }
}

// ============================================================================
// In-memory page forms
// ============================================================================

#[derive(Debug, Clone)]
struct DataPage {
    records: Vec<Record>,
    next_page: PageId,
}

#[derive(Debug, Clone)]
struct IndexPage {
    entries: Vec<(Value, PageId)>,
}

impl IndexPage {
    /// Page whose key range covers `key`: the last entry with key <= probe,
    /// falling back to the leftmost
    fn page_for_key(&self, key: &Value) -> Option<PageId> {
        if self.entries.is_empty() {
            return None;
        }
        let pos = self
            .entries
            .partition_point(|(k, _)| k.cmp_key(key) != Ordering::Greater);
        if pos == 0 {
            Some(self.entries[0].1)
        } else {
            Some(self.entries[pos - 1].1)
        }
    }
}

// ============================================================================
// ISAM index
// ============================================================================

/// Two-level static index over sorted data pages with overflow chains.
///
/// Instantiated either over a table schema (primary, unique keys) or over a
/// two-field entry schema (secondary, duplicate keys allowed).
#[derive(Debug)]
pub struct IsamIndex {
    schema: Schema,
    config: IsamConfig,
    allow_duplicates: bool,
    root: PageFile,
    leaf: PageFile,
    data: PageFile,
    paths: [PathBuf; 3],
}

impl IsamIndex {
    /// Build the index over an initial record set (sorted here), laying out
    /// both index levels. An empty build produces one empty data page.
    pub fn build(
        base: impl AsRef<Path>,
        schema: Schema,
        config: IsamConfig,
        allow_duplicates: bool,
        records: &[Record],
    ) -> Result<Self> {
        let mut index = Self::open_files(base, schema, config, allow_duplicates, true)?;

        let mut sorted: Vec<Record> = records.to_vec();
        sorted.sort_by(|a, b| {
            a.key(&index.schema).cmp_key(b.key(&index.schema))
        });

        // data pages, filled to the block factor
        let n_data_pages = if sorted.is_empty() {
            index.write_data_page(
                1,
                &DataPage {
                    records: Vec::new(),
                    next_page: NONE,
                },
            )?;
            1
        } else {
            let chunks: Vec<&[Record]> = sorted.chunks(config.block_factor).collect();
            for (i, chunk) in chunks.iter().enumerate() {
                index.write_data_page(
                    (i + 1) as PageId,
                    &DataPage {
                        records: chunk.to_vec(),
                        next_page: NONE,
                    },
                )?;
            }
            chunks.len()
        };

        // free stack header
        index.data.zero_page(0)?;

        // leaf level: one entry per data page
        let leaf_entries: Vec<(Value, PageId)> = (0..n_data_pages)
            .map(|i| {
                let key = if sorted.is_empty() {
                    default_key(index.schema.key_type())
                } else {
                    sorted[i * config.block_factor].key(&index.schema).clone()
                };
                (key, (i + 1) as PageId)
            })
            .collect();
        let leaf_pages: Vec<&[(Value, PageId)]> = leaf_entries.chunks(config.leaf_fan_out).collect();
        if leaf_pages.len() > config.root_fan_out {
            return Err(Error::with_message(
                ErrorCode::Schema,
                format!(
                    "{} data pages exceed the fixed index capacity",
                    n_data_pages
                ),
            ));
        }
        for (i, chunk) in leaf_pages.iter().enumerate() {
            index.write_index_page(false, i as PageId, &IndexPage { entries: chunk.to_vec() })?;
        }

        // root level: one entry per leaf page
        let root_entries: Vec<(Value, PageId)> = leaf_pages
            .iter()
            .enumerate()
            .map(|(i, chunk)| (chunk[0].0.clone(), i as PageId))
            .collect();
        index.write_index_page(true, 0, &IndexPage { entries: root_entries })?;

        Ok(index)
    }

    /// Reopen an index previously built with the same schema and config
    pub fn open(
        base: impl AsRef<Path>,
        schema: Schema,
        config: IsamConfig,
        allow_duplicates: bool,
    ) -> Result<Self> {
        Self::open_files(base, schema, config, allow_duplicates, false)
    }

    fn open_files(
        base: impl AsRef<Path>,
        schema: Schema,
        config: IsamConfig,
        allow_duplicates: bool,
        create: bool,
    ) -> Result<Self> {
        let base = base.as_ref();
        let key_size = schema.key_type().packed_size();
        let entry_size = key_size + 4;
        let root_size = INDEX_HEADER + config.root_fan_out * entry_size;
        let leaf_size = INDEX_HEADER + config.leaf_fan_out * entry_size;
        let data_size = DATA_HEADER + config.block_factor * schema.record_size();
        // the free stack must fit the data file's header page
        if data_size < 4 + MAX_FREE_PAGES * 4 {
            return Err(Error::with_message(
                ErrorCode::Schema,
                "data page too small for the free stack header",
            ));
        }
        let paths = [
            base.with_extension("root"),
            base.with_extension("leaf"),
            base.with_extension("dat"),
        ];
        let (root, leaf, data) = if create {
            (
                PageFile::create(&paths[0], root_size)?,
                PageFile::create(&paths[1], leaf_size)?,
                PageFile::create(&paths[2], data_size)?,
            )
        } else {
            (
                PageFile::open(&paths[0], root_size)?,
                PageFile::open(&paths[1], leaf_size)?,
                PageFile::open(&paths[2], data_size)?,
            )
        };
        Ok(IsamIndex {
            root,
            leaf,
            data,
            schema,
            config,
            allow_duplicates,
            paths,
        })
    }

    /// The files backing this index
    pub fn files(&self) -> Vec<PathBuf> {
        self.paths.to_vec()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Monotonic I/O counter snapshot across this index's files
    pub fn io_stats(&self) -> IoStats {
        self.io_totals()
    }

    fn io_totals(&self) -> IoStats {
        self.root
            .io_stats()
            .plus(self.leaf.io_stats())
            .plus(self.data.io_stats())
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Insert a record into its target page or the first chain page with
    /// room, allocating a new overflow page if the whole chain is full
    pub fn insert(&mut self, record: &Record) -> Result<OperationResult<InsertOutcome>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        let key = record.key(&self.schema).clone();
        if !self.allow_duplicates && !self.find_matches(&key, true)?.is_empty() {
            let outcome = InsertOutcome::duplicate(&key);
            return Ok(timer.finish(outcome, self.io_totals().delta(io0)));
        }

        let target = self.target_data_page(&key)?;
        let mut page_id = target;
        loop {
            let mut page = self.read_data_page(page_id)?;
            if page.records.len() < self.config.block_factor {
                let pos = page
                    .records
                    .partition_point(|r| r.key(&self.schema).cmp_key(&key) == Ordering::Less);
                page.records.insert(pos, record.clone());
                self.write_data_page(page_id, &page)?;
                break;
            }
            if page.next_page != NONE {
                page_id = page.next_page;
                continue;
            }
            // end of chain: link a fresh overflow page
            let new_id = self.allocate_data_page()?;
            self.write_data_page(
                new_id,
                &DataPage {
                    records: vec![record.clone()],
                    next_page: NONE,
                },
            )?;
            page.next_page = new_id;
            self.write_data_page(page_id, &page)?;
            debug!(page = new_id, chain_head = target, "overflow page linked");
            break;
        }

        let outcome = InsertOutcome::inserted(&key);
        Ok(timer.finish(outcome, self.io_totals().delta(io0)))
    }

    /// First record with the given key
    pub fn search(&mut self, key: &Value) -> Result<OperationResult<Option<Record>>> {
        let timer = Timer::start();
        let io0 = self.io_totals();
        let found = self.find_matches(key, true)?.into_iter().next();
        Ok(timer.finish(found, self.io_totals().delta(io0)))
    }

    /// Every record with the given key (secondary indexes are non-unique)
    pub fn search_all(&mut self, key: &Value) -> Result<OperationResult<Vec<Record>>> {
        let timer = Timer::start();
        let io0 = self.io_totals();
        let found = self.find_matches(key, false)?;
        Ok(timer.finish(found, self.io_totals().delta(io0)))
    }

    /// All records with key in `[lo, hi]`, ascending
    pub fn range_search(&mut self, lo: &Value, hi: &Value) -> Result<OperationResult<Vec<Record>>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        let mut results = Vec::new();
        if lo.cmp_key(hi) != Ordering::Greater {
            let leaf_entries = self.all_leaf_entries()?;
            let start = match leaf_entries
                .iter()
                .rposition(|(k, _)| k.cmp_key(lo) != Ordering::Greater)
            {
                Some(pos) => pos,
                None => 0,
            };
            for (entry_key, data_page) in leaf_entries.into_iter().skip(start) {
                if entry_key.cmp_key(hi) == Ordering::Greater {
                    break;
                }
                let mut page_id = data_page;
                while page_id != NONE {
                    let page = self.read_data_page(page_id)?;
                    for rec in &page.records {
                        let k = rec.key(&self.schema);
                        if k.cmp_key(lo) != Ordering::Less && k.cmp_key(hi) != Ordering::Greater {
                            results.push(rec.clone());
                        }
                    }
                    page_id = page.next_page;
                }
            }
            results.sort_by(|a, b| a.key(&self.schema).cmp_key(b.key(&self.schema)));
        }
        Ok(timer.finish(results, self.io_totals().delta(io0)))
    }

    /// Remove record(s) with the given key; with `allow_duplicates` a
    /// specific entry can be addressed through [`IsamIndex::remove_entry`]
    pub fn remove(&mut self, key: &Value) -> Result<OperationResult<bool>> {
        let timer = Timer::start();
        let io0 = self.io_totals();
        let removed = self.remove_where(key, |_| true)?;
        Ok(timer.finish(removed, self.io_totals().delta(io0)))
    }

    /// Remove the entry matching both the key and a predicate on the record
    /// (used by secondary indexes to address one `(value, pk)` pair)
    pub fn remove_entry(
        &mut self,
        key: &Value,
        matches: impl Fn(&Record) -> bool,
    ) -> Result<OperationResult<bool>> {
        let timer = Timer::start();
        let io0 = self.io_totals();
        let removed = self.remove_where(key, matches)?;
        Ok(timer.finish(removed, self.io_totals().delta(io0)))
    }

    /// Every record, ascending by key
    pub fn scan_all(&mut self) -> Result<OperationResult<Vec<Record>>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        let mut results = Vec::new();
        for (_, data_page) in self.all_leaf_entries()? {
            let mut page_id = data_page;
            while page_id != NONE {
                let page = self.read_data_page(page_id)?;
                results.extend(page.records.iter().cloned());
                page_id = page.next_page;
            }
        }
        results.sort_by(|a, b| a.key(&self.schema).cmp_key(b.key(&self.schema)));
        Ok(timer.finish(results, self.io_totals().delta(io0)))
    }

    // ========================================================================
    // Descent
    // ========================================================================

    fn target_data_page(&mut self, key: &Value) -> Result<PageId> {
        let root = self.read_index_page(true, 0)?;
        let leaf_page = root.page_for_key(key).unwrap_or(0);
        let leaf = self.read_index_page(false, leaf_page)?;
        Ok(leaf.page_for_key(key).unwrap_or(1))
    }

    fn find_matches(&mut self, key: &Value, first_only: bool) -> Result<Vec<Record>> {
        let target = self.target_data_page(key)?;
        let mut results = Vec::new();
        let mut page_id = target;
        while page_id != NONE {
            let page = self.read_data_page(page_id)?;
            // binary search within the sorted page, then widen over equals
            let n = page.records.len();
            let pos = page
                .records
                .partition_point(|r| r.key(&self.schema).cmp_key(key) == Ordering::Less);
            let mut i = pos;
            while i < n
                && page.records[i].key(&self.schema).cmp_key(key) == Ordering::Equal
            {
                results.push(page.records[i].clone());
                if first_only {
                    return Ok(results);
                }
                i += 1;
            }
            page_id = page.next_page;
        }
        Ok(results)
    }

    /// Leaf entries across all leaf pages, in key order
    fn all_leaf_entries(&mut self) -> Result<Vec<(Value, PageId)>> {
        let root = self.read_index_page(true, 0)?;
        let mut entries = Vec::new();
        if root.entries.is_empty() {
            entries.extend(self.read_index_page(false, 0)?.entries);
        } else {
            for (_, leaf_page) in &root.entries {
                entries.extend(self.read_index_page(false, *leaf_page)?.entries);
            }
        }
        Ok(entries)
    }

    // ========================================================================
    // Delete internals
    // ========================================================================

    fn remove_where(&mut self, key: &Value, matches: impl Fn(&Record) -> bool) -> Result<bool> {
        let target = self.target_data_page(key)?;
        let mut page_id = target;
        let mut prev_id = NONE;
        while page_id != NONE {
            let mut page = self.read_data_page(page_id)?;
            let before = page.records.len();
            let mut removed_here = false;
            page.records.retain(|r| {
                if !removed_here
                    && r.key(&self.schema).cmp_key(key) == Ordering::Equal
                    && matches(r)
                {
                    removed_here = true;
                    false
                } else {
                    true
                }
            });
            if page.records.len() < before {
                if page.records.is_empty() && page_id != target {
                    // emptied overflow page: unlink and recycle it
                    let mut prev = self.read_data_page(prev_id)?;
                    prev.next_page = page.next_page;
                    self.write_data_page(prev_id, &prev)?;
                    self.free_data_page(page_id)?;
                } else {
                    self.write_data_page(page_id, &page)?;
                }
                return Ok(true);
            }
            prev_id = page_id;
            page_id = page.next_page;
        }
        Ok(false)
    }

    // ========================================================================
    // Free stack (data file header page)
    // ========================================================================

    fn allocate_data_page(&mut self) -> Result<PageId> {
        let mut header = self.data.read_page(0)?;
        let count = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if count > 0 {
            let offset = 4 + (count - 1) * 4;
            let id = u32::from_le_bytes([
                header[offset],
                header[offset + 1],
                header[offset + 2],
                header[offset + 3],
            ]);
            header[offset..offset + 4].fill(0);
            header[0..4].copy_from_slice(&((count - 1) as u32).to_le_bytes());
            self.data.write_page(0, &header)?;
            debug!(page = id, "overflow page reused from free stack");
            return Ok(id);
        }
        self.data.page_count()
    }

    fn free_data_page(&mut self, page_id: PageId) -> Result<()> {
        self.data.zero_page(page_id)?;
        let mut header = self.data.read_page(0)?;
        let count = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if count >= MAX_FREE_PAGES {
            // stack full: the page stays zeroed but unreachable
            return Ok(());
        }
        let offset = 4 + count * 4;
        header[offset..offset + 4].copy_from_slice(&page_id.to_le_bytes());
        header[0..4].copy_from_slice(&((count + 1) as u32).to_le_bytes());
        self.data.write_page(0, &header)?;
        debug!(page = page_id, "overflow page pushed on free stack");
        Ok(())
    }

    // ========================================================================
    // Page codecs
    // ========================================================================

    fn read_data_page(&mut self, page_id: PageId) -> Result<DataPage> {
        let page = self.data.read_page(page_id)?;
        let n = u16::from_le_bytes([page[0], page[1]]) as usize;
        let next_page = u32::from_le_bytes([page[2], page[3], page[4], page[5]]);
        let record_size = self.schema.record_size();
        let mut records = Vec::with_capacity(n);
        let mut offset = DATA_HEADER;
        for _ in 0..n {
            records.push(self.schema.unpack(&page[offset..offset + record_size])?);
            offset += record_size;
        }
        Ok(DataPage { records, next_page })
    }

    fn write_data_page(&mut self, page_id: PageId, page: &DataPage) -> Result<()> {
        let mut buf = vec![0u8; self.data.page_size()];
        buf[0..2].copy_from_slice(&(page.records.len() as u16).to_le_bytes());
        buf[2..6].copy_from_slice(&page.next_page.to_le_bytes());
        let record_size = self.schema.record_size();
        let mut offset = DATA_HEADER;
        for rec in &page.records {
            buf[offset..offset + record_size].copy_from_slice(&self.schema.pack(rec)?);
            offset += record_size;
        }
        self.data.write_page(page_id, &buf)
    }

    fn read_index_page(&mut self, is_root: bool, page_id: PageId) -> Result<IndexPage> {
        let file = if is_root { &mut self.root } else { &mut self.leaf };
        let page = file.read_page(page_id)?;
        let n = u16::from_le_bytes([page[0], page[1]]) as usize;
        let key_ty = *self.schema.key_type();
        let key_size = key_ty.packed_size();
        let mut entries = Vec::with_capacity(n);
        let mut offset = INDEX_HEADER;
        for _ in 0..n {
            let key = unpack_value(&key_ty, &page[offset..offset + key_size])?;
            offset += key_size;
            let page_no = u32::from_le_bytes([
                page[offset],
                page[offset + 1],
                page[offset + 2],
                page[offset + 3],
            ]);
            offset += 4;
            entries.push((key, page_no));
        }
        Ok(IndexPage { entries })
    }

    fn write_index_page(&mut self, is_root: bool, page_id: PageId, page: &IndexPage) -> Result<()> {
        let key_ty = *self.schema.key_type();
        let key_size = key_ty.packed_size();
        let size = if is_root {
            self.root.page_size()
        } else {
            self.leaf.page_size()
        };
        let mut buf = vec![0u8; size];
        buf[0..2].copy_from_slice(&(page.entries.len() as u16).to_le_bytes());
        let mut offset = INDEX_HEADER;
        for (key, page_no) in &page.entries {
            pack_value(&key_ty, key, &mut buf[offset..offset + key_size])?;
            offset += key_size;
            buf[offset..offset + 4].copy_from_slice(&page_no.to_le_bytes());
            offset += 4;
        }
        let file = if is_root { &mut self.root } else { &mut self.leaf };
        file.write_page(page_id, &buf)
    }
}

/// Smallest representable key, used as the entry key of an empty build
fn default_key(ty: &FieldType) -> Value {
    match ty {
        FieldType::Int => Value::Int(i32::MIN as i64),
        FieldType::Float => Value::Float(f32::MIN as f64),
        FieldType::Char(_) | FieldType::Date => Value::Str(String::new()),
        FieldType::Bool => Value::Bool(false),
        FieldType::ArrayFloat(k) => Value::ArrayFloat(vec![0.0; *k]),
    }
}

// ============================================================================
// Secondary instantiation
// ============================================================================

/// ISAM over `(index_value, primary_key)` entries, duplicates allowed
#[derive(Debug)]
pub struct IsamSecondary {
    inner: IsamIndex,
}

impl IsamSecondary {
    /// Entry schema: the indexed value (key) and the primary key it maps to
    fn entry_schema(value_ty: FieldType, pk_ty: FieldType) -> Result<Schema> {
        Schema::new(vec![("value", value_ty), ("pk", pk_ty)], "value")
    }

    pub fn build(
        base: impl AsRef<Path>,
        value_ty: FieldType,
        pk_ty: FieldType,
        entries: &[(Value, Value)],
    ) -> Result<Self> {
        let schema = Self::entry_schema(value_ty, pk_ty)?;
        let records: Vec<Record> = entries
            .iter()
            .map(|(v, pk)| Record::new(vec![v.clone(), pk.clone()]))
            .collect();
        Ok(IsamSecondary {
            inner: IsamIndex::build(base, schema, IsamConfig::default(), true, &records)?,
        })
    }

    pub fn open(base: impl AsRef<Path>, value_ty: FieldType, pk_ty: FieldType) -> Result<Self> {
        let schema = Self::entry_schema(value_ty, pk_ty)?;
        Ok(IsamSecondary {
            inner: IsamIndex::open(base, schema, IsamConfig::default(), true)?,
        })
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.inner.files()
    }

    /// Monotonic I/O counter snapshot across this index's files
    pub fn io_stats(&self) -> IoStats {
        self.inner.io_stats()
    }

    pub fn insert(&mut self, value: &Value, primary_key: &Value) -> Result<OperationResult<bool>> {
        let record = Record::new(vec![value.clone(), primary_key.clone()]);
        Ok(self.inner.insert(&record)?.map(|o| o.inserted))
    }

    /// Primary keys registered under `value`
    pub fn search(&mut self, value: &Value) -> Result<OperationResult<Vec<Value>>> {
        Ok(self
            .inner
            .search_all(value)?
            .map(|records| records.into_iter().map(|r| r.values[1].clone()).collect()))
    }

    /// Primary keys for values in `[lo, hi]`, ascending by value
    pub fn range_search(&mut self, lo: &Value, hi: &Value) -> Result<OperationResult<Vec<Value>>> {
        Ok(self
            .inner
            .range_search(lo, hi)?
            .map(|records| records.into_iter().map(|r| r.values[1].clone()).collect()))
    }

    pub fn remove(&mut self, value: &Value, primary_key: &Value) -> Result<OperationResult<bool>> {
        let pk = primary_key.clone();
        self.inner
            .remove_entry(value, move |r| r.values[1].cmp_key(&pk) == Ordering::Equal)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn schema() -> Schema {
        Schema::new(
            vec![("id", FieldType::Int), ("nombre", FieldType::Char(12))],
            "id",
        )
        .unwrap()
    }

    fn rec(id: i64) -> Record {
        Record::new(vec![Value::Int(id), Value::Str(format!("r{}", id))])
    }

    fn build(dir: &TempDir, records: &[Record]) -> IsamIndex {
        IsamIndex::build(
            dir.path().join("t"),
            schema(),
            IsamConfig::default(),
            false,
            records,
        )
        .unwrap()
    }

    #[test]
    fn test_bulk_build_and_search() {
        let dir = TempDir::new().unwrap();
        let records: Vec<Record> = (1..=40).map(rec).collect();
        let mut isam = build(&dir, &records);

        for id in 1..=40 {
            let found = isam.search(&Value::Int(id)).unwrap().data;
            assert_eq!(found.unwrap().values[0], Value::Int(id), "id {}", id);
        }
        assert!(isam.search(&Value::Int(99)).unwrap().data.is_none());
    }

    #[test]
    fn test_insert_into_static_structure() {
        let dir = TempDir::new().unwrap();
        let records: Vec<Record> = (1..=20).map(|i| rec(i * 10)).collect();
        let mut isam = build(&dir, &records);

        // lands inside an existing page's key range
        assert!(isam.insert(&rec(15)).unwrap().data.inserted);
        // beyond the last page: chains off the final data page
        for id in 300..=320 {
            assert!(isam.insert(&rec(id)).unwrap().data.inserted);
        }
        assert!(isam.search(&Value::Int(15)).unwrap().data.is_some());
        assert!(isam.search(&Value::Int(311)).unwrap().data.is_some());
        assert_eq!(isam.scan_all().unwrap().data.len(), 42);
    }

    #[test]
    fn test_duplicate_primary_is_soft_failure() {
        let dir = TempDir::new().unwrap();
        let mut isam = build(&dir, &[rec(1)]);
        let result = isam.insert(&rec(1)).unwrap();
        assert!(!result.data.inserted);
        assert_eq!(isam.scan_all().unwrap().data.len(), 1);
    }

    #[test]
    fn test_range_search_with_chains() {
        let dir = TempDir::new().unwrap();
        let records: Vec<Record> = (1..=30).map(rec).collect();
        let mut isam = build(&dir, &records);
        // grow an overflow chain in the middle
        isam.remove(&Value::Int(12)).unwrap();
        isam.insert(&rec(12)).unwrap();

        let range = isam.range_search(&Value::Int(10), &Value::Int(20)).unwrap().data;
        let ids: Vec<i64> = range.iter().map(|r| r.values[0].as_int().unwrap()).collect();
        assert_eq!(ids, (10..=20).collect::<Vec<i64>>());

        assert!(isam.range_search(&Value::Int(9), &Value::Int(3)).unwrap().data.is_empty());
    }

    #[test]
    fn test_emptied_overflow_page_is_recycled() {
        let dir = TempDir::new().unwrap();
        let records: Vec<Record> = (1..=8).map(rec).collect();
        let mut isam = build(&dir, &records);

        // overfill the last page's chain
        for id in 100..=104 {
            isam.insert(&rec(id)).unwrap();
        }
        let pages_before = isam.data.page_count().unwrap();
        // empty out an overflow page
        for id in 100..=104 {
            assert!(isam.remove(&Value::Int(id)).unwrap().data);
        }
        // the next overflow allocation reuses the freed page
        for id in 200..=204 {
            isam.insert(&rec(id)).unwrap();
        }
        assert_eq!(isam.data.page_count().unwrap(), pages_before);
        for id in 200..=204 {
            assert!(isam.search(&Value::Int(id)).unwrap().data.is_some());
        }
    }

    #[test]
    fn test_empty_build_accepts_inserts() {
        let dir = TempDir::new().unwrap();
        let mut isam = build(&dir, &[]);
        for id in [5, 1, 9, 3, 7] {
            assert!(isam.insert(&rec(id)).unwrap().data.inserted);
        }
        let all = isam.scan_all().unwrap().data;
        let ids: Vec<i64> = all.iter().map(|r| r.values[0].as_int().unwrap()).collect();
        assert_eq!(ids, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let records: Vec<Record> = (1..=10).map(rec).collect();
            build(&dir, &records);
        }
        let mut isam =
            IsamIndex::open(dir.path().join("t"), schema(), IsamConfig::default(), false).unwrap();
        assert!(isam.search(&Value::Int(10)).unwrap().data.is_some());
    }

    #[test]
    fn test_secondary_duplicates() {
        let dir = TempDir::new().unwrap();
        let entries = vec![
            (Value::Str("Lima".into()), Value::Int(1)),
            (Value::Str("Lima".into()), Value::Int(2)),
            (Value::Str("Cusco".into()), Value::Int(3)),
        ];
        let mut idx = IsamSecondary::build(
            dir.path().join("city"),
            FieldType::Char(8),
            FieldType::Int,
            &entries,
        )
        .unwrap();

        let pks = idx.search(&Value::Str("Lima".into())).unwrap().data;
        assert_eq!(pks, vec![Value::Int(1), Value::Int(2)]);

        assert!(idx.remove(&Value::Str("Lima".into()), &Value::Int(1)).unwrap().data);
        assert_eq!(
            idx.search(&Value::Str("Lima".into())).unwrap().data,
            vec![Value::Int(2)]
        );

        let ranged = idx
            .range_search(&Value::Str("A".into()), &Value::Str("Z".into()))
            .unwrap()
            .data;
        assert_eq!(ranged.len(), 2);
    }
}
