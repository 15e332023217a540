//! R-tree spatial secondary index (2-D points)
//!
//! The tree itself lives in memory, bulk-loaded on open from a persistent
//! sidecar file of `(id, point, record)` entries; queries bill the sidecar
//! page I/O they perform. Node structure and the quadratic split follow
//! the classical R-tree. Two queries are supported: radius search (box
//! prune, then Euclidean filter) and best-first k-nearest-neighbours.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, ErrorCode, Result};
use crate::metrics::{IoStats, OperationResult, Timer};
use crate::record::{Record, Schema};
use crate::storage::pager::PageFile;
use crate::types::{PageId, Value};

/// Max entries per node before a split
pub const DEFAULT_NODE_CAPACITY: usize = 16;

/// id + live flag + padding + x + y
const SIDECAR_HEADER: usize = 24;

// ============================================================================
// Bounding boxes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bbox {
    min: [f64; 2],
    max: [f64; 2],
}

impl Bbox {
    fn point(x: f64, y: f64) -> Self {
        Bbox {
            min: [x, y],
            max: [x, y],
        }
    }

    fn expand(&mut self, other: &Bbox) {
        for i in 0..2 {
            self.min[i] = self.min[i].min(other.min[i]);
            self.max[i] = self.max[i].max(other.max[i]);
        }
    }

    fn area(&self) -> f64 {
        (self.max[0] - self.min[0]) * (self.max[1] - self.min[1])
    }

    fn overlaps(&self, other: &Bbox) -> bool {
        for i in 0..2 {
            if self.max[i] < other.min[i] || self.min[i] > other.max[i] {
                return false;
            }
        }
        true
    }

    /// Smallest Euclidean distance from a point to this box (0 inside)
    fn min_dist(&self, x: f64, y: f64) -> f64 {
        let dx = (self.min[0] - x).max(0.0).max(x - self.max[0]);
        let dy = (self.min[1] - y).max(0.0).max(y - self.max[1]);
        (dx * dx + dy * dy).sqrt()
    }
}

fn euclidean(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

// ============================================================================
// Nodes
// ============================================================================

/// In an internal node `id` is a child node; in a leaf it is a sidecar
/// entry id
#[derive(Debug, Clone)]
struct RtreeEntry {
    id: i64,
    bbox: Bbox,
}

#[derive(Debug, Clone)]
struct RtreeNode {
    id: i64,
    is_leaf: bool,
    parent: Option<i64>,
    entries: Vec<RtreeEntry>,
}

// ============================================================================
// Best-first search ordering
// ============================================================================

/// Min-heap item ordered by distance
struct Candidate {
    dist: f64,
    node: Option<i64>,
    point: Option<PageId>,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: BinaryHeap is a max-heap, we want the closest first
        other.dist.total_cmp(&self.dist)
    }
}

// ============================================================================
// R-tree index
// ============================================================================

/// Spatial index over 2-D points tagged with records
#[derive(Debug)]
pub struct RTreeIndex {
    schema: Schema,
    sidecar: PageFile,
    path: PathBuf,
    node_capacity: usize,
    root_id: i64,
    nodes: HashMap<i64, RtreeNode>,
    /// live sidecar entry id -> leaf node holding it
    entry_leaf: HashMap<PageId, i64>,
    points: HashMap<PageId, (f64, f64)>,
    next_node_id: i64,
}

impl RTreeIndex {
    /// Open (creating if missing) the index at `<base>.pts`, bulk-loading
    /// the tree from the sidecar
    pub fn open(base: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        let path = base.as_ref().with_extension("pts");
        let page_size = SIDECAR_HEADER + schema.record_size();
        let sidecar = PageFile::open(&path, page_size)?;

        let root_id = 1;
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id,
            RtreeNode {
                id: root_id,
                is_leaf: true,
                parent: None,
                entries: Vec::new(),
            },
        );
        let mut index = RTreeIndex {
            schema,
            sidecar,
            path,
            node_capacity: DEFAULT_NODE_CAPACITY,
            root_id,
            nodes,
            entry_leaf: HashMap::new(),
            points: HashMap::new(),
            next_node_id: root_id + 1,
        };
        index.bulk_load()?;
        Ok(index)
    }

    fn bulk_load(&mut self) -> Result<()> {
        let count = self.sidecar.page_count()?;
        for id in 0..count {
            if let Some((x, y, _)) = self.read_sidecar(id)? {
                self.tree_insert(id, x, y)?;
            }
        }
        if count > 0 {
            debug!(entries = self.points.len(), "r-tree bulk loaded");
        }
        Ok(())
    }

    /// The files backing this index
    pub fn files(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }

    /// Monotonic I/O counter snapshot across this index's files
    pub fn io_stats(&self) -> IoStats {
        self.io_totals()
    }

    fn io_totals(&self) -> IoStats {
        self.sidecar.io_stats()
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Register a record at a point
    pub fn insert(&mut self, point: (f64, f64), record: &Record) -> Result<OperationResult<bool>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        let id = self.sidecar.page_count()?;
        self.write_sidecar(id, point.0, point.1, record, true)?;
        self.tree_insert(id, point.0, point.1)?;
        Ok(timer.finish(true, self.io_totals().delta(io0)))
    }

    /// Unregister the entry whose record has the given primary key
    pub fn remove(&mut self, primary_key: &Value) -> Result<OperationResult<bool>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        let mut removed = false;
        let ids: Vec<PageId> = self.points.keys().copied().collect();
        for id in ids {
            let Some((x, y, record)) = self.read_sidecar(id)? else {
                continue;
            };
            if record.key(&self.schema).cmp_key(primary_key) == Ordering::Equal {
                self.write_sidecar(id, x, y, &record, false)?;
                self.tree_remove(id);
                removed = true;
                break;
            }
        }
        Ok(timer.finish(removed, self.io_totals().delta(io0)))
    }

    /// Records within `radius` of `center`, with distances, closest first.
    /// The tree prunes to the enclosing box; exact distances filter the rest.
    pub fn radius_search(
        &mut self,
        center: (f64, f64),
        radius: f64,
    ) -> Result<OperationResult<Vec<(Record, f64)>>> {
        let timer = Timer::start();
        let io0 = self.io_totals();
        if radius < 0.0 {
            return Err(Error::with_message(ErrorCode::Unsupported, "negative radius"));
        }

        let query = Bbox {
            min: [center.0 - radius, center.1 - radius],
            max: [center.0 + radius, center.1 + radius],
        };
        let mut hits = Vec::new();
        let mut stack = vec![self.root_id];
        while let Some(node_id) = stack.pop() {
            let Some(node) = self.nodes.get(&node_id) else { continue };
            for entry in &node.entries {
                if !entry.bbox.overlaps(&query) {
                    continue;
                }
                if node.is_leaf {
                    hits.push(entry.id as PageId);
                } else {
                    stack.push(entry.id);
                }
            }
        }

        let mut results = Vec::new();
        for id in hits {
            if let Some((x, y, record)) = self.read_sidecar(id)? {
                let dist = euclidean(center, (x, y));
                if dist <= radius {
                    results.push((record, dist));
                }
            }
        }
        results.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(timer.finish(results, self.io_totals().delta(io0)))
    }

    /// The `k` records closest to `center` (all of them when k exceeds the
    /// live count), with distances, via best-first branch and bound
    pub fn nearest(
        &mut self,
        center: (f64, f64),
        k: usize,
    ) -> Result<OperationResult<Vec<(Record, f64)>>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        let mut heap = BinaryHeap::new();
        heap.push(Candidate {
            dist: 0.0,
            node: Some(self.root_id),
            point: None,
        });
        let mut results = Vec::new();
        while let Some(candidate) = heap.pop() {
            if results.len() >= k {
                break;
            }
            if let Some(node_id) = candidate.node {
                let Some(node) = self.nodes.get(&node_id) else { continue };
                for entry in &node.entries {
                    let dist = entry.bbox.min_dist(center.0, center.1);
                    if node.is_leaf {
                        heap.push(Candidate {
                            dist,
                            node: None,
                            point: Some(entry.id as PageId),
                        });
                    } else {
                        heap.push(Candidate {
                            dist,
                            node: Some(entry.id),
                            point: None,
                        });
                    }
                }
            } else if let Some(id) = candidate.point {
                if let Some((_, _, record)) = self.read_sidecar(id)? {
                    results.push((record, candidate.dist));
                }
            }
        }
        Ok(timer.finish(results, self.io_totals().delta(io0)))
    }

    // ========================================================================
    // Sidecar codec
    // ========================================================================

    /// `None` when the slot is tombstoned
    fn read_sidecar(&mut self, id: PageId) -> Result<Option<(f64, f64, Record)>> {
        let page = self.sidecar.read_page(id)?;
        if page[4] == 0 {
            return Ok(None);
        }
        let x = f64::from_le_bytes(page[8..16].try_into().expect("8 bytes"));
        let y = f64::from_le_bytes(page[16..24].try_into().expect("8 bytes"));
        let record = self.schema.unpack(&page[SIDECAR_HEADER..])?;
        Ok(Some((x, y, record)))
    }

    fn write_sidecar(
        &mut self,
        id: PageId,
        x: f64,
        y: f64,
        record: &Record,
        live: bool,
    ) -> Result<()> {
        let mut page = vec![0u8; self.sidecar.page_size()];
        page[0..4].copy_from_slice(&id.to_le_bytes());
        page[4] = live as u8;
        page[8..16].copy_from_slice(&x.to_le_bytes());
        page[16..24].copy_from_slice(&y.to_le_bytes());
        let packed = self.schema.pack(record)?;
        page[SIDECAR_HEADER..SIDECAR_HEADER + packed.len()].copy_from_slice(&packed);
        self.sidecar.write_page(id, &page)
    }

    // ========================================================================
    // Tree maintenance
    // ========================================================================

    fn tree_insert(&mut self, id: PageId, x: f64, y: f64) -> Result<()> {
        let bbox = Bbox::point(x, y);
        let leaf_id = self.choose_leaf(&bbox)?;
        self.nodes
            .get_mut(&leaf_id)
            .expect("chosen leaf exists")
            .entries
            .push(RtreeEntry { id: id as i64, bbox });
        self.entry_leaf.insert(id, leaf_id);
        self.points.insert(id, (x, y));

        if self.nodes[&leaf_id].entries.len() > self.node_capacity {
            self.split_node(leaf_id)?;
        } else {
            self.adjust_tree(leaf_id);
        }
        Ok(())
    }

    fn tree_remove(&mut self, id: PageId) {
        self.points.remove(&id);
        let Some(leaf_id) = self.entry_leaf.remove(&id) else { return };
        if let Some(node) = self.nodes.get_mut(&leaf_id) {
            node.entries.retain(|e| e.id != id as i64);
        }
        self.prune_upward(leaf_id);
    }

    /// Drop nodes emptied by deletes and shrink a root left with one child
    fn prune_upward(&mut self, mut node_id: i64) {
        loop {
            let Some(node) = self.nodes.get(&node_id) else { return };
            let parent = node.parent;
            if node.entries.is_empty() && parent.is_some() {
                let parent_id = parent.expect("checked");
                self.nodes.remove(&node_id);
                if let Some(parent_node) = self.nodes.get_mut(&parent_id) {
                    parent_node.entries.retain(|e| e.id != node_id);
                }
                node_id = parent_id;
                continue;
            }
            self.adjust_tree(node_id);
            break;
        }
        if let Some(root) = self.nodes.get(&self.root_id) {
            if !root.is_leaf && root.entries.len() == 1 {
                let child_id = root.entries[0].id;
                self.nodes.remove(&self.root_id);
                if let Some(child) = self.nodes.get_mut(&child_id) {
                    child.parent = None;
                }
                self.root_id = child_id;
            }
        }
    }

    /// Descend by least enlargement, breaking ties on smaller area
    fn choose_leaf(&self, bbox: &Bbox) -> Result<i64> {
        let mut node_id = self.root_id;
        loop {
            let node = self
                .nodes
                .get(&node_id)
                .ok_or_else(|| Error::new(ErrorCode::Internal))?;
            if node.is_leaf {
                return Ok(node_id);
            }
            let mut best_id = None;
            let mut best_enlargement = f64::MAX;
            let mut best_area = f64::MAX;
            for entry in &node.entries {
                let mut expanded = entry.bbox;
                expanded.expand(bbox);
                let enlargement = expanded.area() - entry.bbox.area();
                if enlargement < best_enlargement
                    || (enlargement == best_enlargement && entry.bbox.area() < best_area)
                {
                    best_enlargement = enlargement;
                    best_area = entry.bbox.area();
                    best_id = Some(entry.id);
                }
            }
            node_id = best_id.ok_or_else(|| Error::new(ErrorCode::Internal))?;
        }
    }

    fn split_node(&mut self, node_id: i64) -> Result<()> {
        let node = self
            .nodes
            .remove(&node_id)
            .ok_or_else(|| Error::new(ErrorCode::Internal))?;
        let is_leaf = node.is_leaf;
        let parent_id = node.parent;
        let (group1, group2) = self.quadratic_split(node.entries);

        let node2_id = self.next_node_id;
        self.next_node_id += 1;
        let node1 = RtreeNode {
            id: node_id,
            is_leaf,
            parent: parent_id,
            entries: group1,
        };
        let node2 = RtreeNode {
            id: node2_id,
            is_leaf,
            parent: parent_id,
            entries: group2,
        };
        if is_leaf {
            for entry in &node2.entries {
                self.entry_leaf.insert(entry.id as PageId, node2_id);
            }
        } else {
            for entry in &node2.entries {
                if let Some(child) = self.nodes.get_mut(&entry.id) {
                    child.parent = Some(node2_id);
                }
            }
        }
        self.nodes.insert(node_id, node1);
        self.nodes.insert(node2_id, node2);
        debug!(node = node_id, sibling = node2_id, "r-tree node split");

        match parent_id {
            Some(parent_id) => {
                let bbox1 = self.node_bbox(node_id);
                let bbox2 = self.node_bbox(node2_id);
                if let Some(parent) = self.nodes.get_mut(&parent_id) {
                    for entry in parent.entries.iter_mut() {
                        if entry.id == node_id {
                            entry.bbox = bbox1;
                        }
                    }
                    parent.entries.push(RtreeEntry {
                        id: node2_id,
                        bbox: bbox2,
                    });
                }
                if self.nodes[&parent_id].entries.len() > self.node_capacity {
                    self.split_node(parent_id)?;
                } else {
                    self.adjust_tree(parent_id);
                }
            }
            None => {
                // the root split: grow the tree by one level
                let new_root_id = self.next_node_id;
                self.next_node_id += 1;
                let entries = vec![
                    RtreeEntry {
                        id: node_id,
                        bbox: self.node_bbox(node_id),
                    },
                    RtreeEntry {
                        id: node2_id,
                        bbox: self.node_bbox(node2_id),
                    },
                ];
                self.nodes.insert(
                    new_root_id,
                    RtreeNode {
                        id: new_root_id,
                        is_leaf: false,
                        parent: None,
                        entries,
                    },
                );
                if let Some(n) = self.nodes.get_mut(&node_id) {
                    n.parent = Some(new_root_id);
                }
                if let Some(n) = self.nodes.get_mut(&node2_id) {
                    n.parent = Some(new_root_id);
                }
                self.root_id = new_root_id;
            }
        }
        Ok(())
    }

    /// Classical quadratic split: seed with the most wasteful pair, then
    /// assign by greatest preference difference
    fn quadratic_split(&self, entries: Vec<RtreeEntry>) -> (Vec<RtreeEntry>, Vec<RtreeEntry>) {
        let (seed1, seed2) = self.pick_seeds(&entries);
        let mut group1 = vec![entries[seed1].clone()];
        let mut group2 = vec![entries[seed2].clone()];
        let mut bbox1 = entries[seed1].bbox;
        let mut bbox2 = entries[seed2].bbox;
        let mut assigned = vec![false; entries.len()];
        assigned[seed1] = true;
        assigned[seed2] = true;

        let min_size = self.node_capacity.div_ceil(2);
        loop {
            let remaining: Vec<usize> = (0..entries.len()).filter(|i| !assigned[*i]).collect();
            if remaining.is_empty() {
                break;
            }
            if group1.len() + remaining.len() == min_size {
                for idx in remaining {
                    group1.push(entries[idx].clone());
                }
                break;
            }
            if group2.len() + remaining.len() == min_size {
                for idx in remaining {
                    group2.push(entries[idx].clone());
                }
                break;
            }

            let mut best_idx = remaining[0];
            let mut best_diff = f64::MIN;
            let mut prefer_group1 = true;
            for &idx in &remaining {
                let mut e1 = bbox1;
                e1.expand(&entries[idx].bbox);
                let mut e2 = bbox2;
                e2.expand(&entries[idx].bbox);
                let d1 = e1.area() - bbox1.area();
                let d2 = e2.area() - bbox2.area();
                let diff = (d1 - d2).abs();
                if diff > best_diff {
                    best_diff = diff;
                    best_idx = idx;
                    prefer_group1 = if d1 < d2 {
                        true
                    } else if d2 < d1 {
                        false
                    } else {
                        bbox1.area() < bbox2.area()
                    };
                }
            }
            assigned[best_idx] = true;
            if prefer_group1 {
                bbox1.expand(&entries[best_idx].bbox);
                group1.push(entries[best_idx].clone());
            } else {
                bbox2.expand(&entries[best_idx].bbox);
                group2.push(entries[best_idx].clone());
            }
        }
        (group1, group2)
    }

    fn pick_seeds(&self, entries: &[RtreeEntry]) -> (usize, usize) {
        let mut best_waste = f64::MIN;
        let mut seed1 = 0;
        let mut seed2 = 1;
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                let mut combined = entries[i].bbox;
                combined.expand(&entries[j].bbox);
                let waste = combined.area() - entries[i].bbox.area() - entries[j].bbox.area();
                if waste > best_waste {
                    best_waste = waste;
                    seed1 = i;
                    seed2 = j;
                }
            }
        }
        (seed1, seed2)
    }

    fn node_bbox(&self, node_id: i64) -> Bbox {
        let node = &self.nodes[&node_id];
        let mut bbox = node.entries[0].bbox;
        for entry in &node.entries[1..] {
            bbox.expand(&entry.bbox);
        }
        bbox
    }

    /// Refresh ancestor bboxes after a change in `node_id`
    fn adjust_tree(&mut self, mut node_id: i64) {
        loop {
            let Some(node) = self.nodes.get(&node_id) else { return };
            let Some(parent_id) = node.parent else { return };
            if node.entries.is_empty() {
                return;
            }
            let bbox = self.node_bbox(node_id);
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                for entry in parent.entries.iter_mut() {
                    if entry.id == node_id {
                        entry.bbox = bbox;
                        break;
                    }
                }
            }
            node_id = parent_id;
        }
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
            vec![("id", FieldType::Int), ("pos", FieldType::ArrayFloat(2))],
            "id",
        )
        .unwrap()
    }

    fn rec(id: i64, x: f64, y: f64) -> Record {
        Record::new(vec![Value::Int(id), Value::ArrayFloat(vec![x, y])])
    }

    fn open(dir: &TempDir) -> RTreeIndex {
        RTreeIndex::open(dir.path().join("pos"), schema()).unwrap()
    }

    #[test]
    fn test_nearest_two() {
        let dir = TempDir::new().unwrap();
        let mut idx = open(&dir);
        let points = [(0.0, 0.0), (1.0, 1.0), (10.0, 10.0), (10.5, 9.8), (50.0, 50.0)];
        for (i, (x, y)) in points.iter().enumerate() {
            idx.insert((*x, *y), &rec(i as i64, *x, *y)).unwrap();
        }
        let nearest = idx.nearest((10.0, 10.0), 2).unwrap().data;
        let ids: Vec<i64> = nearest.iter().map(|(r, _)| r.values[0].as_int().unwrap()).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_radius() {
        let dir = TempDir::new().unwrap();
        let mut idx = open(&dir);
        let points = [(0.0, 0.0), (1.0, 1.0), (10.0, 10.0), (10.5, 9.8), (50.0, 50.0)];
        for (i, (x, y)) in points.iter().enumerate() {
            idx.insert((*x, *y), &rec(i as i64, *x, *y)).unwrap();
        }
        let within = idx.radius_search((0.0, 0.0), 2.0).unwrap().data;
        let ids: Vec<i64> = within.iter().map(|(r, _)| r.values[0].as_int().unwrap()).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_radius_zero_matches_exact_point_only() {
        let dir = TempDir::new().unwrap();
        let mut idx = open(&dir);
        idx.insert((3.0, 4.0), &rec(1, 3.0, 4.0)).unwrap();
        idx.insert((3.0, 4.1), &rec(2, 3.0, 4.1)).unwrap();
        let hits = idx.radius_search((3.0, 4.0), 0.0).unwrap().data;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.values[0], Value::Int(1));
        assert_eq!(hits[0].1, 0.0);
    }

    #[test]
    fn test_knn_larger_than_table_returns_all() {
        let dir = TempDir::new().unwrap();
        let mut idx = open(&dir);
        for i in 0..5 {
            idx.insert((i as f64, 0.0), &rec(i, i as f64, 0.0)).unwrap();
        }
        let all = idx.nearest((0.0, 0.0), 50).unwrap().data;
        assert_eq!(all.len(), 5);
        // ascending distance
        for pair in all.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_many_points_split_nodes() {
        let dir = TempDir::new().unwrap();
        let mut idx = open(&dir);
        for i in 0..200 {
            let x = (i % 20) as f64;
            let y = (i / 20) as f64;
            idx.insert((x, y), &rec(i, x, y)).unwrap();
        }
        let near = idx.nearest((5.0, 5.0), 1).unwrap().data;
        assert_eq!(near[0].0.values[0], Value::Int(105));
        let within = idx.radius_search((5.0, 5.0), 1.0).unwrap().data;
        assert_eq!(within.len(), 5);
    }

    #[test]
    fn test_remove_by_key() {
        let dir = TempDir::new().unwrap();
        let mut idx = open(&dir);
        idx.insert((0.0, 0.0), &rec(1, 0.0, 0.0)).unwrap();
        idx.insert((1.0, 0.0), &rec(2, 1.0, 0.0)).unwrap();
        assert!(idx.remove(&Value::Int(1)).unwrap().data);
        let all = idx.nearest((0.0, 0.0), 10).unwrap().data;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0.values[0], Value::Int(2));
        assert!(!idx.remove(&Value::Int(1)).unwrap().data);
    }

    #[test]
    fn test_persistence_bulk_load() {
        let dir = TempDir::new().unwrap();
        {
            let mut idx = open(&dir);
            for i in 0..30 {
                idx.insert((i as f64, i as f64), &rec(i, i as f64, i as f64)).unwrap();
            }
            idx.remove(&Value::Int(7)).unwrap();
        }
        let mut idx = open(&dir);
        let all = idx.nearest((0.0, 0.0), 100).unwrap().data;
        assert_eq!(all.len(), 29);
        assert!(all.iter().all(|(r, _)| r.values[0] != Value::Int(7)));
    }
}
