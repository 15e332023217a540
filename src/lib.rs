//! pagedb - a paged relational storage engine
//!
//! Tables live on disk in fixed-size pages behind a family of
//! interchangeable index structures: a sequential heap file with an
//! auxiliary area, a two-level static ISAM, clustered and unclustered
//! B+-trees, an extendible hash and a 2-D R-tree. A catalog coordinates
//! one primary index and any number of secondaries per table, routes
//! queries to the cheapest capable access path, and reports the page
//! reads, writes and elapsed time of every operation.

pub mod catalog;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod plan;
pub mod record;
pub mod storage;
pub mod types;
pub mod util;

// Re-export the main public types
pub use catalog::handle::{Capability, PrimaryHandle, SecondaryHandle};
pub use catalog::DatabaseManager;
pub use error::{Error, ErrorCode, Result};
pub use metrics::{Breakdown, IoStats, MetricSlice, OperationResult};
pub use plan::{
    ColumnDef, CreateIndexPlan, CreateTablePlan, DeletePlan, DropIndexPlan, DropTablePlan,
    IndexKind, InsertPlan, LoadFromCsvPlan, LoadReport, Plan, PlanOutput, RowSet, SelectPlan,
    WherePredicate,
};
pub use record::{FieldDef, Record, Schema};
pub use storage::InsertOutcome;
pub use types::{FieldType, PageId, Value};
