//! Catalog and query coordinator
//!
//! The `DatabaseManager` owns every table: its schema, its primary index
//! and any secondary indexes. It translates plans into index calls,
//! enforces index-kind constraints, routes reads to the cheapest capable
//! access path, and folds per-index metrics into a single
//! `OperationResult` whose breakdown preserves the per-index slices (the
//! slice sums always equal the top-level totals).

pub mod handle;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, ErrorCode, Result};
use crate::ingest;
use crate::metrics::{Breakdown, MetricSlice, OperationResult, Timer};
use crate::plan::{
    ColumnDef, IndexKind, InsertPlan, LoadFromCsvPlan, LoadReport, Plan, PlanOutput, RowSet,
    SelectPlan, WherePredicate,
};
use crate::record::{Record, Schema};
use crate::storage::btree::BPlusTree;
use crate::storage::btree_secondary::BPlusSecondary;
use crate::storage::hash::{ExtendibleHash, HashConfig};
use crate::storage::isam::{IsamConfig, IsamIndex, IsamSecondary};
use crate::storage::rtree::RTreeIndex;
use crate::storage::sequential::SequentialFile;
use crate::types::{FieldType, Value};

use handle::{Capability, PrimaryHandle, SecondaryHandle};

/// Breakdown label of the primary index's slice
pub const PRIMARY_LABEL: &str = "primary";

fn secondary_label(column: &str) -> String {
    format!("secondary_{}", column)
}

// ============================================================================
// Metric aggregation
// ============================================================================

/// Folds per-index results into one breakdown; the final totals are the
/// column-wise sums of the slices, so the aggregation invariant holds by
/// construction
struct Agg {
    breakdown: Breakdown,
    rebuild: bool,
}

impl Agg {
    fn new() -> Self {
        Agg {
            breakdown: Breakdown::new(),
            rebuild: false,
        }
    }

    /// Record a result's metrics under one label, yielding its payload
    fn absorb<T>(&mut self, label: &str, result: OperationResult<T>) -> T {
        self.breakdown.push(label, result.slice());
        self.rebuild |= result.rebuild_triggered;
        result.data
    }

    /// Record a raw slice under a label
    fn absorb_slice(&mut self, label: &str, slice: MetricSlice) {
        self.breakdown.push(label, slice);
    }

    /// Fold a nested result, keeping its per-index labels when it has a
    /// breakdown of its own
    fn merge<T>(&mut self, fallback: &str, result: OperationResult<T>) -> T {
        self.rebuild |= result.rebuild_triggered;
        match &result.breakdown {
            Some(inner) => {
                for (label, slice) in inner.slices() {
                    self.breakdown.push(label.clone(), *slice);
                }
            }
            None => self.breakdown.push(fallback, result.slice()),
        }
        result.data
    }

    fn finish<T>(self, data: T) -> OperationResult<T> {
        let totals = self.breakdown.totals();
        OperationResult {
            data,
            time_ms: totals.time_ms,
            reads: totals.reads,
            writes: totals.writes,
            rebuild_triggered: self.rebuild,
            breakdown: Some(self.breakdown),
        }
    }
}

// ============================================================================
// Catalog entries
// ============================================================================

struct SecondaryEntry {
    kind: IndexKind,
    handle: SecondaryHandle,
}

struct TableEntry {
    schema: Schema,
    primary_kind: IndexKind,
    primary: PrimaryHandle,
    secondaries: BTreeMap<String, SecondaryEntry>,
}

/// The catalog: owns all tables and their index handles
pub struct DatabaseManager {
    db_dir: PathBuf,
    tables: BTreeMap<String, TableEntry>,
}

impl DatabaseManager {
    /// Open a database directory at `<root>/<db_name>`
    pub fn new(root: impl AsRef<Path>, db_name: &str) -> Result<Self> {
        let db_dir = root.as_ref().join(db_name);
        std::fs::create_dir_all(&db_dir)?;
        Ok(DatabaseManager {
            db_dir,
            tables: BTreeMap::new(),
        })
    }

    /// Names of the known tables
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// A table's schema
    pub fn schema(&self, table: &str) -> Result<&Schema> {
        Ok(&self.entry(table)?.schema)
    }

    fn entry(&self, table: &str) -> Result<&TableEntry> {
        self.tables
            .get(table)
            .ok_or_else(|| Error::with_message(ErrorCode::Schema, format!("no such table: {}", table)))
    }

    fn entry_mut(&mut self, table: &str) -> Result<&mut TableEntry> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| Error::with_message(ErrorCode::Schema, format!("no such table: {}", table)))
    }

    fn primary_base(&self, table: &str, key: &str, kind: IndexKind) -> Result<PathBuf> {
        let dir = self.db_dir.join(table);
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{}_{}_{}", table, key, kind.tag())))
    }

    fn secondary_base(&self, table: &str, column: &str, kind: IndexKind) -> Result<PathBuf> {
        let dir = self.db_dir.join(format!("{}_idx", table));
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{}_{}_{}", table, column, kind.tag())))
    }

    // ========================================================================
    // DDL
    // ========================================================================

    /// Create a table with one primary index; key selection and any
    /// column-level secondaries follow the CreateTable plan rules
    pub fn create_table(&mut self, table: &str, columns: Vec<ColumnDef>) -> Result<()> {
        if self.tables.contains_key(table) {
            return Err(Error::with_message(
                ErrorCode::Schema,
                format!("table {} already exists", table),
            ));
        }
        if columns.is_empty() {
            return Err(Error::with_message(ErrorCode::Schema, "table needs columns"));
        }

        // key: first flagged column, else first INT, else first
        let key_pos = columns
            .iter()
            .position(|c| c.is_key)
            .or_else(|| columns.iter().position(|c| c.ty == FieldType::Int))
            .unwrap_or(0);
        let key_name = columns[key_pos].name.clone();
        let primary_kind = columns[key_pos].index_kind.unwrap_or(IndexKind::Isam);
        if !primary_kind.can_be_primary() {
            return Err(Error::with_message(
                ErrorCode::Schema,
                format!("{} cannot be used as primary index", primary_kind),
            ));
        }

        // validate declared secondaries up front so a bad column kind
        // cannot leave a half-created table behind
        for col in columns.iter().filter(|c| !c.is_key && c.name != key_name) {
            if let Some(kind) = col.index_kind {
                if !kind.can_be_secondary() {
                    return Err(Error::with_message(
                        ErrorCode::Schema,
                        format!("{} cannot be used as secondary index", kind),
                    ));
                }
                if kind == IndexKind::RTree && col.ty != FieldType::ArrayFloat(2) {
                    return Err(Error::with_message(
                        ErrorCode::Schema,
                        "RTREE requires an ARRAY[FLOAT, 2] column",
                    ));
                }
                if matches!(kind, IndexKind::BTree | IndexKind::Isam) && !col.ty.is_orderable() {
                    return Err(Error::with_message(
                        ErrorCode::Schema,
                        format!("{} cannot key an ordered index", col.ty),
                    ));
                }
            }
        }

        let defs: Vec<(&str, FieldType)> =
            columns.iter().map(|c| (c.name.as_str(), c.ty)).collect();
        let schema = Schema::new(defs, &key_name)?;

        let base = self.primary_base(table, &key_name, primary_kind)?;
        let primary = match primary_kind {
            IndexKind::Sequential => {
                PrimaryHandle::Sequential(SequentialFile::open(&base, schema.clone())?)
            }
            IndexKind::Isam => PrimaryHandle::Isam(IsamIndex::build(
                &base,
                schema.clone(),
                IsamConfig::default(),
                false,
                &[],
            )?),
            IndexKind::BTree => PrimaryHandle::BTree(BPlusTree::open(&base, schema.clone(), None)?),
            _ => unreachable!("checked can_be_primary"),
        };

        self.tables.insert(
            table.to_string(),
            TableEntry {
                schema,
                primary_kind,
                primary,
                secondaries: BTreeMap::new(),
            },
        );
        info!(table, key = %key_name, kind = %primary_kind, "table created");

        // declared column-level secondaries on non-key columns
        for col in columns.iter().filter(|c| !c.is_key && c.name != key_name) {
            if let Some(kind) = col.index_kind {
                self.create_index(table, &col.name, kind)?;
            }
        }
        Ok(())
    }

    /// Add a secondary index and populate it from the primary
    pub fn create_index(
        &mut self,
        table: &str,
        column: &str,
        kind: IndexKind,
    ) -> Result<OperationResult<()>> {
        let mut agg = Agg::new();

        let (value_ty, key_ty, schema) = {
            let entry = self.entry(table)?;
            if !kind.can_be_secondary() {
                return Err(Error::with_message(
                    ErrorCode::Schema,
                    format!("{} cannot be used as secondary index", kind),
                ));
            }
            if column == entry.schema.key_name() {
                return Err(Error::with_message(
                    ErrorCode::Schema,
                    format!("cannot create secondary index on primary key field {:?}", column),
                ));
            }
            let value_ty = *entry.schema.field_type(column).ok_or_else(|| {
                Error::with_message(
                    ErrorCode::Schema,
                    format!("no such column: {}.{}", table, column),
                )
            })?;
            if entry.secondaries.contains_key(column) {
                return Err(Error::with_message(
                    ErrorCode::Schema,
                    format!("index on {}.{} already exists", table, column),
                ));
            }
            match kind {
                IndexKind::RTree if value_ty != FieldType::ArrayFloat(2) => {
                    return Err(Error::with_message(
                        ErrorCode::Schema,
                        "RTREE requires an ARRAY[FLOAT, 2] column",
                    ));
                }
                IndexKind::BTree | IndexKind::Isam if !value_ty.is_orderable() => {
                    return Err(Error::with_message(
                        ErrorCode::Schema,
                        format!("{} cannot key an ordered index", value_ty),
                    ));
                }
                _ => {}
            }
            (value_ty, *entry.schema.key_type(), entry.schema.clone())
        };

        let records = {
            let entry = self.entry_mut(table)?;
            agg.absorb(PRIMARY_LABEL, entry.primary.scan_all()?)
        };

        let base = self.secondary_base(table, column, kind)?;
        let key_index = schema.key_index();
        let col_index = schema.field_index(column).expect("validated above");

        let populate_timer = Timer::start();
        let built = self.build_secondary(
            kind, &base, value_ty, key_ty, &schema, &records, col_index, key_index,
        );
        let handle = match built {
            Ok(handle) => handle,
            Err(err) => {
                // a failed population must not leave files behind
                remove_index_files(&base);
                return Err(err);
            }
        };
        let io = handle.io_stats();
        agg.absorb_slice(
            &secondary_label(column),
            MetricSlice {
                reads: io.reads,
                writes: io.writes,
                time_ms: populate_timer.elapsed_ms(),
            },
        );

        let entry = self.entry_mut(table)?;
        entry
            .secondaries
            .insert(column.to_string(), SecondaryEntry { kind, handle });
        info!(table, column, kind = %kind, rows = records.len(), "secondary index created");
        Ok(agg.finish(()))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_secondary(
        &self,
        kind: IndexKind,
        base: &Path,
        value_ty: FieldType,
        key_ty: FieldType,
        schema: &Schema,
        records: &[Record],
        col_index: usize,
        key_index: usize,
    ) -> Result<SecondaryHandle> {
        Ok(match kind {
            IndexKind::Isam => {
                let entries: Vec<(Value, Value)> = records
                    .iter()
                    .map(|r| (r.values[col_index].clone(), r.values[key_index].clone()))
                    .collect();
                SecondaryHandle::Isam(IsamSecondary::build(base, value_ty, key_ty, &entries)?)
            }
            IndexKind::BTree => {
                let mut index = BPlusSecondary::open(base, value_ty, key_ty, None)?;
                for r in records {
                    index.insert(&r.values[col_index], &r.values[key_index])?;
                }
                SecondaryHandle::BTree(index)
            }
            IndexKind::Hash => {
                let mut index = ExtendibleHash::open(base, value_ty, key_ty, HashConfig::default())?;
                for r in records {
                    index.insert(&r.values[col_index], &r.values[key_index])?;
                }
                SecondaryHandle::Hash(index)
            }
            IndexKind::RTree => {
                let mut index = RTreeIndex::open(base, schema.clone())?;
                for r in records {
                    let point = r.values[col_index].as_point().ok_or_else(|| {
                        Error::with_message(ErrorCode::Encoding, "spatial column is not a point")
                    })?;
                    index.insert(point, r)?;
                }
                SecondaryHandle::RTree(index)
            }
            IndexKind::Sequential => unreachable!("checked can_be_secondary"),
        })
    }

    /// Drop a secondary index and delete its files; the primary cannot be
    /// dropped this way
    pub fn drop_index(&mut self, table: &str, column: &str) -> Result<()> {
        let entry = self.entry_mut(table)?;
        if column == entry.schema.key_name() {
            return Err(Error::with_message(
                ErrorCode::Schema,
                "cannot drop the primary key index",
            ));
        }
        let removed = entry.secondaries.remove(column).ok_or_else(|| {
            Error::with_message(
                ErrorCode::Schema,
                format!("no index on {}.{}", table, column),
            )
        })?;
        let files = removed.handle.files();
        drop(removed);
        for file in files {
            remove_file_quiet(&file);
        }
        debug!(table, column, "secondary index dropped");
        Ok(())
    }

    /// Resolve `<table>.<column>` or `<table>_<column>_<kind>` and drop it
    pub fn drop_index_by_name(&mut self, index_name: &str) -> Result<()> {
        if let Some((table, column)) = index_name.split_once('.') {
            let (table, column) = (table.to_string(), column.to_string());
            return self.drop_index(&table, &column);
        }
        let mut target: Option<(String, String)> = None;
        for (table, entry) in &self.tables {
            if format!(
                "{}_{}_{}",
                table,
                entry.schema.key_name(),
                entry.primary_kind.tag()
            ) == index_name
            {
                return Err(Error::with_message(
                    ErrorCode::Schema,
                    "cannot drop the primary key index",
                ));
            }
            for (column, sec) in &entry.secondaries {
                if format!("{}_{}_{}", table, column, sec.kind.tag()) == index_name {
                    target = Some((table.clone(), column.clone()));
                }
            }
        }
        match target {
            Some((table, column)) => self.drop_index(&table, &column),
            None => Err(Error::with_message(
                ErrorCode::Schema,
                format!("no such index: {}", index_name),
            )),
        }
    }

    /// Drop a table: the primary, every secondary, and all their files
    pub fn drop_table(&mut self, table: &str) -> Result<()> {
        let entry = self.tables.remove(table).ok_or_else(|| {
            Error::with_message(ErrorCode::Schema, format!("no such table: {}", table))
        })?;
        let mut files = entry.primary.files();
        for sec in entry.secondaries.values() {
            files.extend(sec.handle.files());
        }
        drop(entry);
        for file in files {
            remove_file_quiet(&file);
        }
        remove_dir_quiet(&self.db_dir.join(table));
        remove_dir_quiet(&self.db_dir.join(format!("{}_idx", table)));
        info!(table, "table dropped");
        Ok(())
    }

    // ========================================================================
    // DML
    // ========================================================================

    /// Insert one record: primary first; secondaries only when the primary
    /// accepted it (a duplicate key aborts propagation)
    pub fn insert(&mut self, table: &str, record: &Record) -> Result<OperationResult<bool>> {
        let mut agg = Agg::new();
        let entry = self.entry_mut(table)?;

        let outcome = agg.absorb(PRIMARY_LABEL, entry.primary.insert(record)?);
        if !outcome.inserted {
            debug!(table, "duplicate key rejected: {}", outcome.message);
            return Ok(agg.finish(false));
        }

        let pk = record.key(&entry.schema).clone();
        for (column, sec) in entry.secondaries.iter_mut() {
            let col_index = entry
                .schema
                .field_index(column)
                .ok_or_else(|| Error::new(ErrorCode::Internal))?;
            let value = record.values[col_index].clone();
            let result = sec.handle.insert(&value, &pk, record)?;
            agg.absorb(&secondary_label(column), result);
        }
        Ok(agg.finish(true))
    }

    /// Equality lookup, routed per the capability of the available paths
    pub fn search(
        &mut self,
        table: &str,
        field: Option<&str>,
        value: &Value,
    ) -> Result<OperationResult<Vec<Record>>> {
        let mut agg = Agg::new();
        let entry = self.entry_mut(table)?;
        let field = field.unwrap_or_else(|| entry.schema.key_name());
        let field = field.to_string();

        if field == entry.schema.key_name() {
            let found = agg.absorb(PRIMARY_LABEL, entry.primary.search(value)?);
            return Ok(agg.finish(found.into_iter().collect()));
        }

        if entry.schema.field_index(&field).is_none() {
            return Err(Error::with_message(
                ErrorCode::Schema,
                format!("no such column: {}.{}", table, field),
            ));
        }

        if let Some(sec) = entry.secondaries.get_mut(&field) {
            if sec.handle.capabilities().contains(Capability::SEARCH) {
                let pks = agg.absorb(&secondary_label(&field), sec.handle.search(value)?);
                let mut records = Vec::with_capacity(pks.len());
                for pk in pks {
                    if let Some(rec) = agg.absorb(PRIMARY_LABEL, entry.primary.search(&pk)?) {
                        records.push(rec);
                    }
                }
                return Ok(agg.finish(records));
            }
        }

        // no usable index: full scan with an in-memory filter
        let col = entry.schema.field_index(&field).expect("checked above");
        let all = agg.absorb(PRIMARY_LABEL, entry.primary.scan_all()?);
        let records = all
            .into_iter()
            .filter(|r| values_equal(&r.values[col], value))
            .collect();
        Ok(agg.finish(records))
    }

    /// Range lookup `[lo, hi]`; HASH paths reject it, unindexed columns
    /// fall back to a filtered scan
    pub fn range_search(
        &mut self,
        table: &str,
        field: Option<&str>,
        lo: &Value,
        hi: &Value,
    ) -> Result<OperationResult<Vec<Record>>> {
        let mut agg = Agg::new();
        let entry = self.entry_mut(table)?;
        let field = field.unwrap_or_else(|| entry.schema.key_name()).to_string();

        if field == entry.schema.key_name() {
            let records = agg.absorb(PRIMARY_LABEL, entry.primary.range_search(lo, hi)?);
            return Ok(agg.finish(records));
        }

        if entry.schema.field_index(&field).is_none() {
            return Err(Error::with_message(
                ErrorCode::Schema,
                format!("no such column: {}.{}", table, field),
            ));
        }

        if let Some(sec) = entry.secondaries.get_mut(&field) {
            if sec.handle.capabilities().contains(Capability::RANGE) {
                let pks = agg.absorb(&secondary_label(&field), sec.handle.range_search(lo, hi)?);
                let mut records = Vec::with_capacity(pks.len());
                for pk in pks {
                    if let Some(rec) = agg.absorb(PRIMARY_LABEL, entry.primary.search(&pk)?) {
                        records.push(rec);
                    }
                }
                return Ok(agg.finish(records));
            }
            if matches!(sec.kind, IndexKind::Hash) {
                return Err(Error::with_message(
                    ErrorCode::Unsupported,
                    "HASH does not support range search",
                ));
            }
        }

        let col = entry.schema.field_index(&field).expect("checked above");
        let all = agg.absorb(PRIMARY_LABEL, entry.primary.scan_all()?);
        let records = all
            .into_iter()
            .filter(|r| {
                let v = &r.values[col];
                v.cmp_key(lo) != std::cmp::Ordering::Less
                    && v.cmp_key(hi) != std::cmp::Ordering::Greater
            })
            .collect();
        Ok(agg.finish(records))
    }

    /// Records within `radius` of a point; requires an RTREE on the column
    pub fn radius_search(
        &mut self,
        table: &str,
        field: &str,
        center: (f64, f64),
        radius: f64,
    ) -> Result<OperationResult<Vec<Record>>> {
        let mut agg = Agg::new();
        let entry = self.entry_mut(table)?;
        let sec = spatial_secondary(entry, field)?;
        let hits = agg.absorb(&secondary_label(field), sec.radius_search(center, radius)?);
        Ok(agg.finish(hits.into_iter().map(|(r, _)| r).collect()))
    }

    /// The k records nearest a point; requires an RTREE on the column
    pub fn knn_search(
        &mut self,
        table: &str,
        field: &str,
        center: (f64, f64),
        k: usize,
    ) -> Result<OperationResult<Vec<Record>>> {
        let mut agg = Agg::new();
        let entry = self.entry_mut(table)?;
        let sec = spatial_secondary(entry, field)?;
        let hits = agg.absorb(&secondary_label(field), sec.nearest(center, k)?);
        Ok(agg.finish(hits.into_iter().map(|(r, _)| r).collect()))
    }

    /// Every live record of the table
    pub fn scan_all(&mut self, table: &str) -> Result<OperationResult<Vec<Record>>> {
        let mut agg = Agg::new();
        let entry = self.entry_mut(table)?;
        let records = agg.absorb(PRIMARY_LABEL, entry.primary.scan_all()?);
        Ok(agg.finish(records))
    }

    /// Delete the records matched by an equality or range predicate. Every
    /// secondary entry of a victim is removed before its primary entry.
    pub fn delete(
        &mut self,
        table: &str,
        predicate: &WherePredicate,
    ) -> Result<OperationResult<usize>> {
        let mut agg = Agg::new();

        // resolve victims through the same routing as reads
        let victims = match predicate {
            WherePredicate::Eq { column, value } => {
                let result = self.search(table, Some(column.as_str()), value)?;
                agg.merge(PRIMARY_LABEL, result)
            }
            WherePredicate::Between { column, low, high } => {
                let result = self.range_search(table, Some(column.as_str()), low, high)?;
                agg.merge(PRIMARY_LABEL, result)
            }
            WherePredicate::InRadius { .. } | WherePredicate::Knn { .. } => {
                return Err(Error::with_message(
                    ErrorCode::Unsupported,
                    "DELETE supports equality and range predicates only",
                ));
            }
        };

        let entry = self.entry_mut(table)?;
        for victim in &victims {
            let pk = victim.key(&entry.schema).clone();
            for (column, sec) in entry.secondaries.iter_mut() {
                let col_index = entry
                    .schema
                    .field_index(column)
                    .ok_or_else(|| Error::new(ErrorCode::Internal))?;
                let value = victim.values[col_index].clone();
                let result = sec.handle.remove(&value, &pk)?;
                agg.absorb(&secondary_label(column), result);
            }
            agg.absorb(PRIMARY_LABEL, entry.primary.remove(&pk)?);
        }
        Ok(agg.finish(victims.len()))
    }

    // ========================================================================
    // Plan execution
    // ========================================================================

    /// Execute a plan against the catalog
    pub fn execute(&mut self, plan: Plan) -> Result<OperationResult<PlanOutput>> {
        match plan {
            Plan::CreateTable(plan) => {
                self.create_table(&plan.table, plan.columns)?;
                Ok(Agg::new().finish(PlanOutput::Done))
            }
            Plan::CreateIndex(plan) => {
                let result = self.create_index(&plan.table, &plan.column, plan.index_type)?;
                Ok(result.map(|_| PlanOutput::Done))
            }
            Plan::DropIndex(plan) => {
                self.drop_index_by_name(&plan.index_name)?;
                Ok(Agg::new().finish(PlanOutput::Done))
            }
            Plan::DropTable(plan) => {
                self.drop_table(&plan.table)?;
                Ok(Agg::new().finish(PlanOutput::Done))
            }
            Plan::Insert(plan) => self.execute_insert(plan),
            Plan::Delete(plan) => {
                let result = self.delete(&plan.table, &plan.where_clause)?;
                Ok(result.map(PlanOutput::Affected))
            }
            Plan::Select(plan) => self.execute_select(plan),
            Plan::LoadFromCsv(plan) => self.execute_load(plan),
        }
    }

    fn execute_insert(&mut self, plan: InsertPlan) -> Result<OperationResult<PlanOutput>> {
        let record = {
            let schema = self.schema(&plan.table)?;
            build_record(schema, plan.columns.as_deref(), plan.values)?
        };
        let result = self.insert(&plan.table, &record)?;
        Ok(result.map(PlanOutput::Inserted))
    }

    fn execute_select(&mut self, plan: SelectPlan) -> Result<OperationResult<PlanOutput>> {
        let (projection, names) = {
            let schema = self.schema(&plan.table)?;
            resolve_projection(schema, plan.columns.as_deref())?
        };

        let result = match &plan.where_clause {
            None => self.scan_all(&plan.table)?,
            Some(WherePredicate::Eq { column, value }) => {
                self.search(&plan.table, Some(column.as_str()), value)?
            }
            Some(WherePredicate::Between { column, low, high }) => {
                self.range_search(&plan.table, Some(column.as_str()), low, high)?
            }
            Some(WherePredicate::InRadius { column, x, y, radius }) => {
                self.radius_search(&plan.table, column, (*x, *y), *radius)?
            }
            Some(WherePredicate::Knn { column, x, y, k }) => {
                self.knn_search(&plan.table, column, (*x, *y), *k)?
            }
        };

        Ok(result.map(|records| {
            let rows = records
                .iter()
                .map(|r| crate::plan::project(r, &projection))
                .collect();
            PlanOutput::Rows(RowSet {
                columns: names,
                rows,
            })
        }))
    }

    fn execute_load(&mut self, plan: LoadFromCsvPlan) -> Result<OperationResult<PlanOutput>> {
        let schema = self.schema(&plan.table)?.clone();
        let mut agg = Agg::new();

        // the plan may name columns to index before loading
        if let Some(kind) = plan.index_kind {
            for column in &plan.index_cols {
                let exists = self.entry(&plan.table)?.secondaries.contains_key(column);
                if !exists && *column != schema.key_name() {
                    let result = self.create_index(&plan.table, column, kind)?;
                    agg.merge(&secondary_label(column), result);
                }
            }
        }

        let (records, cast_errors) = ingest::read_rows(&plan.path, &schema)?;
        let mut report = LoadReport {
            cast_errors,
            ..LoadReport::default()
        };
        for record in &records {
            let result = self.insert(&plan.table, record)?;
            if agg.merge(PRIMARY_LABEL, result) {
                report.inserted += 1;
            } else {
                report.duplicates += 1;
            }
        }
        info!(
            table = %plan.table,
            inserted = report.inserted,
            duplicates = report.duplicates,
            cast_errors = report.cast_errors,
            "csv load finished"
        );
        Ok(agg.finish(PlanOutput::Load(report)))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn spatial_secondary<'a>(
    entry: &'a mut TableEntry,
    field: &str,
) -> Result<&'a mut SecondaryHandle> {
    match entry.secondaries.get_mut(field) {
        Some(sec) if sec.handle.capabilities().contains(Capability::SPATIAL) => {
            Ok(&mut sec.handle)
        }
        Some(_) => Err(Error::with_message(
            ErrorCode::Unsupported,
            format!("index on {:?} does not answer spatial queries", field),
        )),
        None => Err(Error::with_message(
            ErrorCode::Unsupported,
            format!("spatial queries need an RTREE index on {:?}", field),
        )),
    }
}

/// Equality that works for every value kind (arrays compare element-wise)
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::ArrayFloat(x), Value::ArrayFloat(y)) => x == y,
        _ => a.cmp_key(b) == std::cmp::Ordering::Equal,
    }
}

/// Assemble a record from plan values, reordering named columns into
/// schema order and widening INT literals into FLOAT fields
fn build_record(schema: &Schema, columns: Option<&[String]>, values: Vec<Value>) -> Result<Record> {
    let n_fields = schema.fields().len();
    let ordered = match columns {
        None => {
            if values.len() != n_fields {
                return Err(Error::with_message(
                    ErrorCode::Schema,
                    format!("expected {} values, got {}", n_fields, values.len()),
                ));
            }
            values
        }
        Some(names) => {
            if names.len() != values.len() || names.len() != n_fields {
                return Err(Error::with_message(
                    ErrorCode::Schema,
                    format!(
                        "INSERT must name all {} columns of the table",
                        n_fields
                    ),
                ));
            }
            let mut slots: Vec<Option<Value>> = vec![None; n_fields];
            for (name, value) in names.iter().zip(values) {
                let idx = schema.field_index(name).ok_or_else(|| {
                    Error::with_message(ErrorCode::Schema, format!("no such column: {}", name))
                })?;
                slots[idx] = Some(value);
            }
            slots
                .into_iter()
                .collect::<Option<Vec<Value>>>()
                .ok_or_else(|| {
                    Error::with_message(ErrorCode::Schema, "a column was named twice")
                })?
        }
    };

    let coerced: Result<Vec<Value>> = ordered
        .into_iter()
        .zip(schema.fields())
        .map(|(value, field)| coerce_value(value, &field.ty))
        .collect();
    Ok(Record::new(coerced?))
}

fn coerce_value(value: Value, ty: &FieldType) -> Result<Value> {
    if value.matches(ty) {
        return Ok(value);
    }
    match (&value, ty) {
        (Value::Int(i), FieldType::Float) => Ok(Value::Float(*i as f64)),
        _ => Err(Error::with_message(
            ErrorCode::Encoding,
            format!("value {} does not fit field type {}", value, ty),
        )),
    }
}

/// Projection indices plus output column names
fn resolve_projection(
    schema: &Schema,
    columns: Option<&[String]>,
) -> Result<(Vec<usize>, Vec<String>)> {
    match columns {
        None => Ok((
            (0..schema.fields().len()).collect(),
            schema.fields().iter().map(|f| f.name.clone()).collect(),
        )),
        Some(names) => {
            let mut indices = Vec::with_capacity(names.len());
            for name in names {
                let idx = schema.field_index(name).ok_or_else(|| {
                    Error::with_message(ErrorCode::Schema, format!("no such column: {}", name))
                })?;
                indices.push(idx);
            }
            Ok((indices, names.to_vec()))
        }
    }
}

fn remove_file_quiet(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), %err, "could not remove index file");
        }
    }
}

fn remove_dir_quiet(path: &Path) {
    let _ = std::fs::remove_dir(path);
}

/// Best-effort cleanup of a half-built secondary's files
fn remove_index_files(base: &Path) {
    for ext in ["root", "leaf", "dat", "bpt", "bkt", "dir", "pts"] {
        remove_file_quiet(&base.with_extension(ext));
    }
}
