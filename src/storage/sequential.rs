//! Sequential File primary index
//!
//! Two-file layout: `main` holds records sorted by key, `aux` holds recent
//! inserts unsorted. Both files are paged at one record per page. Deletes
//! tombstone the record in place (`active = false`); tombstones and the
//! auxiliary area are reclaimed by a rebuild that merges the live records
//! of both files, sorted, into a fresh `main` written through a temporary
//! file and renamed over the original.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::metrics::{IoStats, OperationResult, Timer};
use crate::record::{Record, Schema};
use crate::storage::pager::PageFile;
use crate::storage::InsertOutcome;
use crate::types::Value;

/// Floor for the auxiliary-area threshold; below this size the log-scale
/// policy would thrash on small tables
pub const MIN_AUX_RECORDS: u32 = 8;

/// Sequential File over a `main`/`aux` pair of record-paged files
#[derive(Debug)]
pub struct SequentialFile {
    schema: Schema,
    main: PageFile,
    aux: PageFile,
    main_path: PathBuf,
    aux_path: PathBuf,
}

impl SequentialFile {
    /// Open (creating if missing) the index at `<base>.main` / `<base>.aux`.
    ///
    /// The schema is given without the `active` flag; the flag is appended
    /// here since tombstoning is this structure's delete mechanism.
    pub fn open(base: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        let schema = schema.with_active_flag();
        let base = base.as_ref();
        let main_path = base.with_extension("main");
        let aux_path = base.with_extension("aux");
        let record_size = schema.record_size();
        Ok(SequentialFile {
            main: PageFile::open(&main_path, record_size)?,
            aux: PageFile::open(&aux_path, record_size)?,
            schema,
            main_path,
            aux_path,
        })
    }

    /// The files backing this index
    pub fn files(&self) -> Vec<PathBuf> {
        vec![self.main_path.clone(), self.aux_path.clone()]
    }

    /// Schema including the trailing `active` flag
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Monotonic I/O counter snapshot across this index's files
    pub fn io_stats(&self) -> IoStats {
        self.io_totals()
    }

    fn io_totals(&self) -> IoStats {
        self.main.io_stats().plus(self.aux.io_stats())
    }

    /// Auxiliary-area threshold: log-scale in the main-area size with a
    /// constant floor
    fn aux_threshold(&self) -> Result<u32> {
        let main_len = self.main.page_count()?;
        let log = 32 - (main_len + 1).leading_zeros();
        Ok(MIN_AUX_RECORDS.max(log.saturating_sub(1)))
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Insert a record; duplicate keys are a soft failure
    pub fn insert(&mut self, record: &Record) -> Result<OperationResult<InsertOutcome>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        let key = record.key(&self.schema).clone();
        if self.find_in_main(&key)?.is_some() || self.find_in_aux(&key)?.is_some() {
            let outcome = InsertOutcome::duplicate(&key);
            return Ok(timer.finish(outcome, self.io_totals().delta(io0)));
        }

        let mut live = record.clone();
        live.active = true;
        let packed = self.schema.pack(&live)?;
        let aux_len = self.aux.page_count()?;
        self.aux.write_page(aux_len, &packed)?;

        let rebuilt = if aux_len + 1 > self.aux_threshold()? {
            self.rebuild()?;
            true
        } else {
            false
        };

        let outcome = InsertOutcome::inserted(&key);
        Ok(timer.finish_rebuilt(outcome, self.io_totals().delta(io0), rebuilt))
    }

    /// Point lookup: binary search on `main`, linear scan of `aux`
    pub fn search(&mut self, key: &Value) -> Result<OperationResult<Option<Record>>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        let mut found = self.find_in_main(key)?.map(|(_, rec)| rec);
        if found.is_none() {
            found = self.find_in_aux(key)?.map(|(_, rec)| rec);
        }
        Ok(timer.finish(found, self.io_totals().delta(io0)))
    }

    /// All live records with key in `[lo, hi]`, ascending
    pub fn range_search(&mut self, lo: &Value, hi: &Value) -> Result<OperationResult<Vec<Record>>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        let mut results = Vec::new();
        if lo.cmp_key(hi) != std::cmp::Ordering::Greater {
            let start = self.lower_bound_main(lo)?;
            let main_len = self.main.page_count()?;
            for idx in start..main_len {
                let rec = self.read_main(idx)?;
                if rec.key(&self.schema).cmp_key(hi) == std::cmp::Ordering::Greater {
                    break;
                }
                if rec.active {
                    results.push(rec);
                }
            }
            for idx in 0..self.aux.page_count()? {
                let rec = self.read_aux(idx)?;
                let k = rec.key(&self.schema);
                if rec.active
                    && k.cmp_key(lo) != std::cmp::Ordering::Less
                    && k.cmp_key(hi) != std::cmp::Ordering::Greater
                {
                    results.push(rec);
                }
            }
            results.sort_by(|a, b| a.key(&self.schema).cmp_key(b.key(&self.schema)));
        }
        Ok(timer.finish(results, self.io_totals().delta(io0)))
    }

    /// Tombstone the record with the given key
    pub fn remove(&mut self, key: &Value) -> Result<OperationResult<bool>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        let removed = if let Some((idx, mut rec)) = self.find_in_main(key)? {
            rec.active = false;
            self.main.write_page(idx, &self.schema.pack(&rec)?)?;
            true
        } else if let Some((idx, mut rec)) = self.find_in_aux(key)? {
            rec.active = false;
            self.aux.write_page(idx, &self.schema.pack(&rec)?)?;
            true
        } else {
            false
        };
        Ok(timer.finish(removed, self.io_totals().delta(io0)))
    }

    /// Every live record from both areas, `main` first in key order
    pub fn scan_all(&mut self) -> Result<OperationResult<Vec<Record>>> {
        let timer = Timer::start();
        let io0 = self.io_totals();
        let records = self.collect_live()?;
        Ok(timer.finish(records, self.io_totals().delta(io0)))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn read_main(&mut self, idx: u32) -> Result<Record> {
        let page = self.main.read_page(idx)?;
        self.schema.unpack(&page)
    }

    fn read_aux(&mut self, idx: u32) -> Result<Record> {
        let page = self.aux.read_page(idx)?;
        self.schema.unpack(&page)
    }

    /// Binary search `main` for a live record with the key
    fn find_in_main(&mut self, key: &Value) -> Result<Option<(u32, Record)>> {
        let len = self.main.page_count()?;
        let mut left = 0i64;
        let mut right = len as i64 - 1;
        while left <= right {
            let mid = ((left + right) / 2) as u32;
            let rec = self.read_main(mid)?;
            match rec.key(&self.schema).cmp_key(key) {
                std::cmp::Ordering::Equal => {
                    return Ok(if rec.active { Some((mid, rec)) } else { None });
                }
                std::cmp::Ordering::Less => left = mid as i64 + 1,
                std::cmp::Ordering::Greater => right = mid as i64 - 1,
            }
        }
        Ok(None)
    }

    fn find_in_aux(&mut self, key: &Value) -> Result<Option<(u32, Record)>> {
        for idx in 0..self.aux.page_count()? {
            let rec = self.read_aux(idx)?;
            if rec.active && rec.key(&self.schema).cmp_key(key) == std::cmp::Ordering::Equal {
                return Ok(Some((idx, rec)));
            }
        }
        Ok(None)
    }

    /// First index in `main` whose key is >= `key`
    fn lower_bound_main(&mut self, key: &Value) -> Result<u32> {
        let len = self.main.page_count()?;
        let mut left = 0u32;
        let mut right = len;
        while left < right {
            let mid = (left + right) / 2;
            let rec = self.read_main(mid)?;
            if rec.key(&self.schema).cmp_key(key) == std::cmp::Ordering::Less {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        Ok(left)
    }

    fn collect_live(&mut self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for idx in 0..self.main.page_count()? {
            let rec = self.read_main(idx)?;
            if rec.active {
                records.push(rec);
            }
        }
        for idx in 0..self.aux.page_count()? {
            let rec = self.read_aux(idx)?;
            if rec.active {
                records.push(rec);
            }
        }
        Ok(records)
    }

    /// Merge both areas sorted into a fresh `main`, truncate `aux`.
    ///
    /// The new main is written to a temporary file and renamed over the
    /// original so an interrupted rebuild leaves the old main intact.
    fn rebuild(&mut self) -> Result<()> {
        let mut records = self.collect_live()?;
        records.sort_by(|a, b| a.key(&self.schema).cmp_key(b.key(&self.schema)));

        let tmp_path = self.main_path.with_extension("main.tmp");
        let mut tmp = PageFile::create(&tmp_path, self.schema.record_size())?;
        for (idx, rec) in records.iter().enumerate() {
            tmp.write_page(idx as u32, &self.schema.pack(rec)?)?;
        }
        tmp.flush()?;
        std::fs::rename(&tmp_path, &self.main_path)?;
        self.main.absorb_renamed(tmp)?;
        self.aux.truncate(0)?;

        debug!(records = records.len(), "sequential file rebuilt");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;
    use tempfile::TempDir;

    fn schema() -> Schema {
        Schema::new(
            vec![("id", FieldType::Int), ("nombre", FieldType::Char(12))],
            "id",
        )
        .unwrap()
    }

    fn rec(id: i64, name: &str) -> Record {
        Record::new(vec![Value::Int(id), Value::Str(name.into())])
    }

    fn open(dir: &TempDir) -> SequentialFile {
        SequentialFile::open(dir.path().join("ventas"), schema()).unwrap()
    }

    #[test]
    fn test_insert_search() {
        let dir = TempDir::new().unwrap();
        let mut sf = open(&dir);

        let result = sf.insert(&rec(5, "cinco")).unwrap();
        assert!(result.data.inserted);
        assert!(result.writes >= 1);

        let found = sf.search(&Value::Int(5)).unwrap();
        assert_eq!(
            found.data.unwrap().values[1],
            Value::Str("cinco".into())
        );
        assert!(sf.search(&Value::Int(6)).unwrap().data.is_none());
    }

    #[test]
    fn test_duplicate_is_soft_failure() {
        let dir = TempDir::new().unwrap();
        let mut sf = open(&dir);
        sf.insert(&rec(1, "a")).unwrap();
        let result = sf.insert(&rec(1, "b")).unwrap();
        assert!(!result.data.inserted);
        assert!(result.data.message.contains("already exists"));
    }

    #[test]
    fn test_rebuild_triggered_and_sorted() {
        let dir = TempDir::new().unwrap();
        let mut sf = open(&dir);

        let mut saw_rebuild = false;
        for id in (1..=30).rev() {
            let result = sf.insert(&rec(id, "x")).unwrap();
            saw_rebuild |= result.rebuild_triggered;
        }
        assert!(saw_rebuild);

        let all = sf.scan_all().unwrap().data;
        assert_eq!(all.len(), 30);
        // records migrated to main are sorted
        let range = sf.range_search(&Value::Int(1), &Value::Int(30)).unwrap().data;
        let ids: Vec<i64> = range.iter().map(|r| r.values[0].as_int().unwrap()).collect();
        assert_eq!(ids, (1..=30).collect::<Vec<i64>>());
    }

    #[test]
    fn test_remove_tombstones_then_rebuild_reclaims() {
        let dir = TempDir::new().unwrap();
        let mut sf = open(&dir);
        for id in 1..=20 {
            sf.insert(&rec(id, "x")).unwrap();
        }
        assert!(sf.remove(&Value::Int(7)).unwrap().data);
        assert!(sf.search(&Value::Int(7)).unwrap().data.is_none());
        // removing twice fails
        assert!(!sf.remove(&Value::Int(7)).unwrap().data);
        // reinsert over the tombstone works
        assert!(sf.insert(&rec(7, "y")).unwrap().data.inserted);
        assert_eq!(sf.scan_all().unwrap().data.len(), 20);
    }

    #[test]
    fn test_empty_range() {
        let dir = TempDir::new().unwrap();
        let mut sf = open(&dir);
        for id in 1..=5 {
            sf.insert(&rec(id, "x")).unwrap();
        }
        assert!(sf.range_search(&Value::Int(4), &Value::Int(2)).unwrap().data.is_empty());
        let single = sf.range_search(&Value::Int(3), &Value::Int(3)).unwrap().data;
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].values[0], Value::Int(3));
    }

    #[test]
    fn test_metrics_reported() {
        let dir = TempDir::new().unwrap();
        let mut sf = open(&dir);
        sf.insert(&rec(1, "a")).unwrap();
        let result = sf.search(&Value::Int(1)).unwrap();
        assert!(result.reads >= 1);
        assert_eq!(result.writes, 0);
        assert!(result.time_ms >= 0.0);
    }
}
