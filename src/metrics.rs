//! Operation results and I/O accounting
//!
//! Every public index operation reports the page reads, page writes and
//! wall-clock time it cost. Indexes account by delta: snapshot the owning
//! files' monotonic counters on entry, subtract on exit. The coordinator
//! folds per-index results into one `OperationResult` whose breakdown
//! preserves the per-index slices.

use std::time::Instant;

// ============================================================================
// I/O counters
// ============================================================================

/// Snapshot of monotonic page-I/O counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    pub reads: u64,
    pub writes: u64,
}

impl IoStats {
    pub fn new(reads: u64, writes: u64) -> Self {
        IoStats { reads, writes }
    }

    /// Counter movement since an earlier snapshot
    pub fn delta(self, earlier: IoStats) -> IoStats {
        IoStats {
            reads: self.reads - earlier.reads,
            writes: self.writes - earlier.writes,
        }
    }

    /// Sum of two snapshots (for indexes spanning several files)
    pub fn plus(self, other: IoStats) -> IoStats {
        IoStats {
            reads: self.reads + other.reads,
            writes: self.writes + other.writes,
        }
    }
}

// ============================================================================
// Metric slices and breakdown
// ============================================================================

/// Reads, writes and elapsed time attributed to one index
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricSlice {
    pub reads: u64,
    pub writes: u64,
    pub time_ms: f64,
}

/// Per-index decomposition of an aggregated result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Breakdown {
    slices: Vec<(String, MetricSlice)>,
}

impl Breakdown {
    pub fn new() -> Self {
        Breakdown::default()
    }

    /// Attach a labelled slice; same-label slices accumulate
    pub fn push(&mut self, label: impl Into<String>, slice: MetricSlice) {
        let label = label.into();
        if let Some((_, existing)) = self.slices.iter_mut().find(|(l, _)| *l == label) {
            existing.reads += slice.reads;
            existing.writes += slice.writes;
            existing.time_ms += slice.time_ms;
        } else {
            self.slices.push((label, slice));
        }
    }

    pub fn slices(&self) -> &[(String, MetricSlice)] {
        &self.slices
    }

    pub fn get(&self, label: &str) -> Option<&MetricSlice> {
        self.slices.iter().find(|(l, _)| l == label).map(|(_, s)| s)
    }

    /// Column-wise sum over all slices
    pub fn totals(&self) -> MetricSlice {
        let mut total = MetricSlice::default();
        for (_, s) in &self.slices {
            total.reads += s.reads;
            total.writes += s.writes;
            total.time_ms += s.time_ms;
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

// ============================================================================
// Operation result
// ============================================================================

/// The uniform return value of every index and catalog operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult<T> {
    pub data: T,
    pub time_ms: f64,
    pub reads: u64,
    pub writes: u64,
    pub rebuild_triggered: bool,
    pub breakdown: Option<Breakdown>,
}

impl<T> OperationResult<T> {
    /// Total page accesses
    pub fn total_accesses(&self) -> u64 {
        self.reads + self.writes
    }

    /// This result's metrics as a single slice
    pub fn slice(&self) -> MetricSlice {
        MetricSlice {
            reads: self.reads,
            writes: self.writes,
            time_ms: self.time_ms,
        }
    }

    /// Replace the payload, keeping the metrics
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        OperationResult {
            data: f(self.data),
            time_ms: self.time_ms,
            reads: self.reads,
            writes: self.writes,
            rebuild_triggered: self.rebuild_triggered,
            breakdown: self.breakdown,
        }
    }
}

// ============================================================================
// Timer
// ============================================================================

/// Wall-clock timer started at the top of a public operation
#[derive(Debug)]
pub struct Timer {
    started: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Timer {
            started: Instant::now(),
        }
    }

    /// Elapsed milliseconds since `start`
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// Close out an operation: payload plus the I/O it cost
    pub fn finish<T>(self, data: T, io: IoStats) -> OperationResult<T> {
        OperationResult {
            data,
            time_ms: self.elapsed_ms(),
            reads: io.reads,
            writes: io.writes,
            rebuild_triggered: false,
            breakdown: None,
        }
    }

    /// Close out an operation that may have triggered a rebuild
    pub fn finish_rebuilt<T>(self, data: T, io: IoStats, rebuilt: bool) -> OperationResult<T> {
        let mut result = self.finish(data, io);
        result.rebuild_triggered = rebuilt;
        result
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_and_plus() {
        let before = IoStats::new(10, 4);
        let after = IoStats::new(13, 9);
        assert_eq!(after.delta(before), IoStats::new(3, 5));
        assert_eq!(before.plus(after), IoStats::new(23, 13));
    }

    #[test]
    fn test_breakdown_totals_match() {
        let mut bd = Breakdown::new();
        bd.push(
            "primary",
            MetricSlice {
                reads: 3,
                writes: 1,
                time_ms: 0.5,
            },
        );
        bd.push(
            "secondary_country",
            MetricSlice {
                reads: 2,
                writes: 0,
                time_ms: 0.25,
            },
        );
        let total = bd.totals();
        assert_eq!(total.reads, 5);
        assert_eq!(total.writes, 1);
        assert!((total.time_ms - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_breakdown_accumulates_same_label() {
        let mut bd = Breakdown::new();
        bd.push("primary", MetricSlice { reads: 1, writes: 0, time_ms: 0.1 });
        bd.push("primary", MetricSlice { reads: 2, writes: 3, time_ms: 0.2 });
        assert_eq!(bd.slices().len(), 1);
        assert_eq!(bd.get("primary").unwrap().reads, 3);
        assert_eq!(bd.get("primary").unwrap().writes, 3);
    }

    #[test]
    fn test_map_keeps_metrics() {
        let timer = Timer::start();
        let result = timer.finish(vec![1, 2, 3], IoStats::new(7, 2));
        let mapped = result.map(|v| v.len());
        assert_eq!(mapped.data, 3);
        assert_eq!(mapped.reads, 7);
        assert_eq!(mapped.writes, 2);
        assert!(!mapped.rebuild_triggered);
    }
}
