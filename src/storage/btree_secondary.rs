//! Unclustered B+-tree secondary index
//!
//! Same node shape and split/merge rules as the clustered tree, but keyed
//! by an indexed column value and holding one leaf entry per distinct
//! value. Each entry points at the head of a bucket chain in a sidecar
//! file; bucket pages hold the primary keys of every record carrying that
//! value. The tree is only modified when a bucket is created or becomes
//! empty — repeated values land in an existing bucket without touching the
//! tree structure.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, ErrorCode, Result};
use crate::metrics::{IoStats, OperationResult, Timer};
use crate::record::{pack_value, unpack_value};
use crate::storage::pager::{PageFile, DEFAULT_PAGE_SIZE};
use crate::types::{FieldType, PageId, Value};

const MAGIC: u32 = 0x42_50_53_32; // "BPS2"

const TAG_LEAF: u8 = 1;
const TAG_INTERNAL: u8 = 2;

const NODE_HEADER: usize = 3;
const LEAF_LINKS: usize = 8;

/// Bucket pages are small; a chain grows one page at a time
const BUCKET_PAGE_SIZE: usize = 256;
/// n_entries + next_page
const BUCKET_HEADER: usize = 6;

const NONE: PageId = 0;

fn bisect_right(keys: &[Value], key: &Value) -> usize {
    keys.partition_point(|k| k.cmp_key(key) != Ordering::Greater)
}

fn bisect_left(keys: &[Value], key: &Value) -> usize {
    keys.partition_point(|k| k.cmp_key(key) == Ordering::Less)
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone)]
enum Node {
    /// Sorted `(index value, bucket head)` entries plus sibling links
    Leaf {
        entries: Vec<(Value, PageId)>,
        prev: PageId,
        next: PageId,
    },
    Internal {
        keys: Vec<Value>,
        children: Vec<PageId>,
    },
}

// ============================================================================
// Secondary tree
// ============================================================================

/// Disk-paged unclustered B+-tree mapping index values to primary keys
#[derive(Debug)]
pub struct BPlusSecondary {
    value_ty: FieldType,
    pk_ty: FieldType,
    tree: PageFile,
    buckets: PageFile,
    tree_path: PathBuf,
    bucket_path: PathBuf,
    order: usize,
    root_page: PageId,
    first_leaf: PageId,
    next_page_id: PageId,
    free_head: PageId,
    bucket_next: PageId,
    bucket_free: PageId,
}

impl BPlusSecondary {
    /// Open (creating if missing) the index at `<base>.bpt` / `<base>.bkt`
    pub fn open(
        base: impl AsRef<Path>,
        value_ty: FieldType,
        pk_ty: FieldType,
        order: Option<usize>,
    ) -> Result<Self> {
        if !value_ty.is_orderable() {
            return Err(Error::with_message(
                ErrorCode::Schema,
                format!("{} cannot key an ordered index", value_ty),
            ));
        }
        let tree_path = base.as_ref().with_extension("bpt");
        let bucket_path = base.as_ref().with_extension("bkt");
        let mut tree = PageFile::open(&tree_path, DEFAULT_PAGE_SIZE)?;
        let buckets = PageFile::open(&bucket_path, BUCKET_PAGE_SIZE)?;

        let order = match order {
            Some(m) if m >= 3 && Self::order_fits(&value_ty, m) => m,
            Some(m) => {
                return Err(Error::with_message(
                    ErrorCode::Schema,
                    format!("order {} is invalid for this value type", m),
                ))
            }
            None => {
                let mut m = 3;
                while Self::order_fits(&value_ty, m + 1) {
                    m += 1;
                }
                m.min(128)
            }
        };

        let index = if tree.page_count()? == 0 {
            let mut index = BPlusSecondary {
                value_ty,
                pk_ty,
                tree,
                buckets,
                tree_path,
                bucket_path,
                order,
                root_page: 1,
                first_leaf: 1,
                next_page_id: 2,
                free_head: NONE,
                // bucket page 0 is reserved so 0 can mean "no page" in links
                bucket_next: 1,
                bucket_free: NONE,
            };
            index.write_node(
                1,
                &Node::Leaf {
                    entries: Vec::new(),
                    prev: NONE,
                    next: NONE,
                },
            )?;
            index.write_header()?;
            index
        } else {
            let header = tree.read_page(0)?;
            if read_u32(&header, 0) != MAGIC {
                return Err(Error::with_message(ErrorCode::Corrupt, "bad secondary tree magic"));
            }
            BPlusSecondary {
                value_ty,
                pk_ty,
                tree_path,
                bucket_path,
                order: read_u32(&header, 4) as usize,
                root_page: read_u32(&header, 8),
                first_leaf: read_u32(&header, 12),
                next_page_id: read_u32(&header, 16),
                free_head: read_u32(&header, 20),
                bucket_next: read_u32(&header, 24),
                bucket_free: read_u32(&header, 28),
                tree,
                buckets,
            }
        };
        Ok(index)
    }

    fn order_fits(value_ty: &FieldType, m: usize) -> bool {
        let entry = value_ty.packed_size() + 4;
        let leaf = NODE_HEADER + LEAF_LINKS + (m - 1) * entry;
        let internal = NODE_HEADER + (m - 1) * value_ty.packed_size() + m * 4;
        leaf <= DEFAULT_PAGE_SIZE && internal <= DEFAULT_PAGE_SIZE
    }

    /// The files backing this index
    pub fn files(&self) -> Vec<PathBuf> {
        vec![self.tree_path.clone(), self.bucket_path.clone()]
    }

    fn max_keys(&self) -> usize {
        self.order - 1
    }

    /// Leaf underflow threshold
    fn leaf_min_keys(&self) -> usize {
        (self.order + 1).div_ceil(2) - 1
    }

    /// Internal nodes keep at least half their children, so merging two
    /// minimal siblings plus the pulled-down separator never overflows
    fn internal_min_keys(&self) -> usize {
        self.order.div_ceil(2) - 1
    }

    /// Monotonic I/O counter snapshot across this index's files
    pub fn io_stats(&self) -> IoStats {
        self.io_totals()
    }

    fn io_totals(&self) -> IoStats {
        self.tree.io_stats().plus(self.buckets.io_stats())
    }

    fn pks_per_bucket_page(&self) -> usize {
        (BUCKET_PAGE_SIZE - BUCKET_HEADER) / self.pk_ty.packed_size()
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Register `primary_key` under `value`
    pub fn insert(&mut self, value: &Value, primary_key: &Value) -> Result<OperationResult<bool>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        if let Some((_, head)) = self.find_entry_with_leaf(value)? {
            // existing bucket: the tree itself stays untouched
            self.bucket_append(head, primary_key)?;
            return Ok(timer.finish(true, self.io_totals().delta(io0)));
        }

        // new distinct value: create the bucket, then insert structurally
        let head = self.bucket_create(primary_key)?;
        if let Some((promoted, right)) = self.insert_into(self.root_page, value, head)? {
            let new_root = Node::Internal {
                keys: vec![promoted],
                children: vec![self.root_page, right],
            };
            let new_root_id = self.allocate()?;
            self.write_node(new_root_id, &new_root)?;
            self.root_page = new_root_id;
            self.write_header()?;
        }
        Ok(timer.finish(true, self.io_totals().delta(io0)))
    }

    /// Primary keys registered under `value`
    pub fn search(&mut self, value: &Value) -> Result<OperationResult<Vec<Value>>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        let pks = match self.find_entry_with_leaf(value)? {
            Some((_, head)) => self.bucket_collect(head)?,
            None => Vec::new(),
        };
        Ok(timer.finish(pks, self.io_totals().delta(io0)))
    }

    /// Primary keys for every value in `[lo, hi]`, in ascending value order
    pub fn range_search(&mut self, lo: &Value, hi: &Value) -> Result<OperationResult<Vec<Value>>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        let mut pks = Vec::new();
        if lo.cmp_key(hi) != Ordering::Greater {
            let mut page_id = self.find_leaf(lo)?;
            'walk: while page_id != NONE {
                let Node::Leaf { entries, next, .. } = self.read_node(page_id)? else {
                    return Err(Error::with_message(ErrorCode::Corrupt, "leaf chain hit internal node"));
                };
                for (value, head) in entries {
                    if value.cmp_key(hi) == Ordering::Greater {
                        break 'walk;
                    }
                    if value.cmp_key(lo) != Ordering::Less {
                        pks.extend(self.bucket_collect(head)?);
                    }
                }
                page_id = next;
            }
        }
        Ok(timer.finish(pks, self.io_totals().delta(io0)))
    }

    /// Unregister `primary_key` from `value`'s bucket; drops the tree entry
    /// when the bucket becomes empty
    pub fn remove(&mut self, value: &Value, primary_key: &Value) -> Result<OperationResult<bool>> {
        let timer = Timer::start();
        let io0 = self.io_totals();

        let Some((leaf_id, head)) = self.find_entry_with_leaf(value)? else {
            return Ok(timer.finish(false, self.io_totals().delta(io0)));
        };

        let (removed, new_head) = self.bucket_remove(head, primary_key)?;
        if !removed {
            return Ok(timer.finish(false, self.io_totals().delta(io0)));
        }

        match new_head {
            Some(new_head) if new_head != head => {
                // head page died; repoint the leaf entry
                self.update_leaf_entry(leaf_id, value, new_head)?;
            }
            Some(_) => {}
            None => {
                // bucket died; remove the tree entry and rebalance
                self.remove_from(self.root_page, value)?;
                if let Node::Internal { keys, children } = self.read_node(self.root_page)? {
                    if keys.is_empty() {
                        let old_root = self.root_page;
                        self.root_page = children[0];
                        self.free(old_root)?;
                        self.write_header()?;
                    }
                }
            }
        }
        Ok(timer.finish(true, self.io_totals().delta(io0)))
    }

    // ========================================================================
    // Descent helpers
    // ========================================================================

    fn find_leaf(&mut self, value: &Value) -> Result<PageId> {
        let mut page_id = self.root_page;
        loop {
            match self.read_node(page_id)? {
                Node::Leaf { .. } => return Ok(page_id),
                Node::Internal { keys, children } => {
                    page_id = children[bisect_right(&keys, value)];
                }
            }
        }
    }

    /// `(leaf page id, bucket head)` of the entry for `value`, if present
    fn find_entry_with_leaf(&mut self, value: &Value) -> Result<Option<(PageId, PageId)>> {
        let leaf_id = self.find_leaf(value)?;
        if let Node::Leaf { entries, .. } = self.read_node(leaf_id)? {
            for (v, head) in entries {
                match v.cmp_key(value) {
                    Ordering::Equal => return Ok(Some((leaf_id, head))),
                    Ordering::Greater => break,
                    Ordering::Less => {}
                }
            }
        }
        Ok(None)
    }

    fn update_leaf_entry(&mut self, leaf_id: PageId, value: &Value, head: PageId) -> Result<()> {
        let Node::Leaf { mut entries, prev, next } = self.read_node(leaf_id)? else {
            return Err(Error::with_message(ErrorCode::Corrupt, "expected leaf"));
        };
        for entry in entries.iter_mut() {
            if entry.0.cmp_key(value) == Ordering::Equal {
                entry.1 = head;
                break;
            }
        }
        self.write_node(leaf_id, &Node::Leaf { entries, prev, next })
    }

    // ========================================================================
    // Structural insert / delete (same rules as the clustered tree)
    // ========================================================================

    fn insert_into(
        &mut self,
        page_id: PageId,
        value: &Value,
        head: PageId,
    ) -> Result<Option<(Value, PageId)>> {
        match self.read_node(page_id)? {
            Node::Leaf {
                mut entries,
                prev,
                next,
            } => {
                let keys: Vec<Value> = entries.iter().map(|(v, _)| v.clone()).collect();
                let pos = bisect_left(&keys, value);
                entries.insert(pos, (value.clone(), head));

                if entries.len() <= self.max_keys() {
                    self.write_node(page_id, &Node::Leaf { entries, prev, next })?;
                    return Ok(None);
                }

                let mid = entries.len() / 2;
                let right_entries = entries.split_off(mid);
                let promoted = right_entries[0].0.clone();
                let right_id = self.allocate()?;
                self.write_node(
                    right_id,
                    &Node::Leaf {
                        entries: right_entries,
                        prev: page_id,
                        next,
                    },
                )?;
                self.write_node(
                    page_id,
                    &Node::Leaf {
                        entries,
                        prev,
                        next: right_id,
                    },
                )?;
                if next != NONE {
                    self.set_leaf_prev(next, right_id)?;
                }
                debug!(page = page_id, right = right_id, "secondary leaf split");
                Ok(Some((promoted, right_id)))
            }
            Node::Internal {
                mut keys,
                mut children,
            } => {
                let slot = bisect_right(&keys, value);
                let child = children[slot];
                let Some((promoted, right_child)) = self.insert_into(child, value, head)? else {
                    return Ok(None);
                };
                let pos = bisect_left(&keys, &promoted);
                keys.insert(pos, promoted);
                children.insert(pos + 1, right_child);

                if keys.len() <= self.max_keys() {
                    self.write_node(page_id, &Node::Internal { keys, children })?;
                    return Ok(None);
                }

                let mid = keys.len() / 2;
                let promoted_up = keys[mid].clone();
                let right_keys = keys.split_off(mid + 1);
                keys.pop();
                let right_children = children.split_off(mid + 1);
                let right_id = self.allocate()?;
                self.write_node(
                    right_id,
                    &Node::Internal {
                        keys: right_keys,
                        children: right_children,
                    },
                )?;
                self.write_node(page_id, &Node::Internal { keys, children })?;
                Ok(Some((promoted_up, right_id)))
            }
        }
    }

    fn remove_from(&mut self, page_id: PageId, value: &Value) -> Result<bool> {
        match self.read_node(page_id)? {
            Node::Leaf {
                mut entries,
                prev,
                next,
            } => {
                let keys: Vec<Value> = entries.iter().map(|(v, _)| v.clone()).collect();
                let pos = bisect_left(&keys, value);
                if pos >= keys.len() || keys[pos].cmp_key(value) != Ordering::Equal {
                    return Ok(false);
                }
                entries.remove(pos);
                self.write_node(page_id, &Node::Leaf { entries, prev, next })?;
                Ok(true)
            }
            Node::Internal {
                mut keys,
                mut children,
            } => {
                let slot = bisect_right(&keys, value);
                let child = children[slot];
                if !self.remove_from(child, value)? {
                    return Ok(false);
                }
                if self.node_underflows(child)? {
                    self.rebalance_child(page_id, &mut keys, &mut children, slot)?;
                }
                Ok(true)
            }
        }
    }

    fn node_underflows(&mut self, page_id: PageId) -> Result<bool> {
        Ok(match self.read_node(page_id)? {
            Node::Leaf { entries, .. } => entries.len() < self.leaf_min_keys(),
            Node::Internal { keys, .. } => keys.len() < self.internal_min_keys(),
        })
    }

    /// Fix an underflowing child: borrow from the left sibling, then the
    /// right, otherwise merge; writes back every touched page including the
    /// parent
    fn rebalance_child(
        &mut self,
        parent_id: PageId,
        keys: &mut Vec<Value>,
        children: &mut Vec<PageId>,
        slot: usize,
    ) -> Result<()> {
        let child_id = children[slot];
        match self.read_node(child_id)? {
            Node::Leaf {
                entries: mut child_entries,
                prev: child_prev,
                next: child_next,
            } => {
                // borrow from left sibling
                if slot > 0 {
                    let left_id = children[slot - 1];
                    if let Node::Leaf {
                        entries: mut left_entries,
                        prev: left_prev,
                        next: left_next,
                    } = self.read_node(left_id)?
                    {
                        if left_entries.len() > self.leaf_min_keys() {
                            let moved = left_entries.pop().expect("nonempty sibling");
                            child_entries.insert(0, moved);
                            keys[slot - 1] = child_entries[0].0.clone();
                            self.write_node(
                                left_id,
                                &Node::Leaf {
                                    entries: left_entries,
                                    prev: left_prev,
                                    next: left_next,
                                },
                            )?;
                            self.write_node(
                                child_id,
                                &Node::Leaf {
                                    entries: child_entries,
                                    prev: child_prev,
                                    next: child_next,
                                },
                            )?;
                            return self.write_parent(parent_id, keys, children);
                        }
                    }
                }
                // borrow from right sibling
                if slot + 1 < children.len() {
                    let right_id = children[slot + 1];
                    if let Node::Leaf {
                        entries: mut right_entries,
                        prev: right_prev,
                        next: right_next,
                    } = self.read_node(right_id)?
                    {
                        if right_entries.len() > self.leaf_min_keys() {
                            let moved = right_entries.remove(0);
                            child_entries.push(moved);
                            keys[slot] = right_entries[0].0.clone();
                            self.write_node(
                                right_id,
                                &Node::Leaf {
                                    entries: right_entries,
                                    prev: right_prev,
                                    next: right_next,
                                },
                            )?;
                            self.write_node(
                                child_id,
                                &Node::Leaf {
                                    entries: child_entries,
                                    prev: child_prev,
                                    next: child_next,
                                },
                            )?;
                            return self.write_parent(parent_id, keys, children);
                        }
                    }
                }
                // merge with a sibling
                if slot > 0 {
                    let left_id = children[slot - 1];
                    if let Node::Leaf {
                        entries: mut left_entries,
                        prev: left_prev,
                        ..
                    } = self.read_node(left_id)?
                    {
                        left_entries.append(&mut child_entries);
                        self.write_node(
                            left_id,
                            &Node::Leaf {
                                entries: left_entries,
                                prev: left_prev,
                                next: child_next,
                            },
                        )?;
                        if child_next != NONE {
                            self.set_leaf_prev(child_next, left_id)?;
                        }
                        children.remove(slot);
                        keys.remove(slot - 1);
                        self.free(child_id)?;
                        debug!(merged = child_id, into = left_id, "secondary leaf merge");
                    }
                } else {
                    let right_id = children[slot + 1];
                    if let Node::Leaf {
                        entries: mut right_entries,
                        next: right_next,
                        ..
                    } = self.read_node(right_id)?
                    {
                        child_entries.append(&mut right_entries);
                        self.write_node(
                            child_id,
                            &Node::Leaf {
                                entries: child_entries,
                                prev: child_prev,
                                next: right_next,
                            },
                        )?;
                        if right_next != NONE {
                            self.set_leaf_prev(right_next, child_id)?;
                        }
                        children.remove(slot + 1);
                        keys.remove(slot);
                        self.free(right_id)?;
                        debug!(merged = right_id, into = child_id, "secondary leaf merge");
                    }
                }
                self.write_parent(parent_id, keys, children)
            }
            Node::Internal {
                keys: mut child_keys,
                children: mut child_children,
            } => {
                // borrow from left sibling through the separator
                if slot > 0 {
                    let left_id = children[slot - 1];
                    if let Node::Internal {
                        keys: mut left_keys,
                        children: mut left_children,
                    } = self.read_node(left_id)?
                    {
                        if left_keys.len() > self.internal_min_keys() {
                            child_keys.insert(0, keys[slot - 1].clone());
                            child_children.insert(0, left_children.pop().expect("nonempty"));
                            keys[slot - 1] = left_keys.pop().expect("nonempty");
                            self.write_node(
                                left_id,
                                &Node::Internal {
                                    keys: left_keys,
                                    children: left_children,
                                },
                            )?;
                            self.write_node(
                                child_id,
                                &Node::Internal {
                                    keys: child_keys,
                                    children: child_children,
                                },
                            )?;
                            return self.write_parent(parent_id, keys, children);
                        }
                    }
                }
                // borrow from right sibling through the separator
                if slot + 1 < children.len() {
                    let right_id = children[slot + 1];
                    if let Node::Internal {
                        keys: mut right_keys,
                        children: mut right_children,
                    } = self.read_node(right_id)?
                    {
                        if right_keys.len() > self.internal_min_keys() {
                            child_keys.push(keys[slot].clone());
                            child_children.push(right_children.remove(0));
                            keys[slot] = right_keys.remove(0);
                            self.write_node(
                                right_id,
                                &Node::Internal {
                                    keys: right_keys,
                                    children: right_children,
                                },
                            )?;
                            self.write_node(
                                child_id,
                                &Node::Internal {
                                    keys: child_keys,
                                    children: child_children,
                                },
                            )?;
                            return self.write_parent(parent_id, keys, children);
                        }
                    }
                }
                // merge with a sibling, pulling the separator down
                if slot > 0 {
                    let left_id = children[slot - 1];
                    if let Node::Internal {
                        keys: mut left_keys,
                        children: mut left_children,
                    } = self.read_node(left_id)?
                    {
                        left_keys.push(keys[slot - 1].clone());
                        left_keys.append(&mut child_keys);
                        left_children.append(&mut child_children);
                        self.write_node(
                            left_id,
                            &Node::Internal {
                                keys: left_keys,
                                children: left_children,
                            },
                        )?;
                        children.remove(slot);
                        keys.remove(slot - 1);
                        self.free(child_id)?;
                    }
                } else {
                    let right_id = children[slot + 1];
                    if let Node::Internal {
                        keys: mut right_keys,
                        children: mut right_children,
                    } = self.read_node(right_id)?
                    {
                        child_keys.push(keys[slot].clone());
                        child_keys.append(&mut right_keys);
                        child_children.append(&mut right_children);
                        self.write_node(
                            child_id,
                            &Node::Internal {
                                keys: child_keys,
                                children: child_children,
                            },
                        )?;
                        children.remove(slot + 1);
                        keys.remove(slot);
                        self.free(right_id)?;
                    }
                }
                self.write_parent(parent_id, keys, children)
            }
        }
    }

    fn write_parent(
        &mut self,
        parent_id: PageId,
        keys: &[Value],
        children: &[PageId],
    ) -> Result<()> {
        self.write_node(
            parent_id,
            &Node::Internal {
                keys: keys.to_vec(),
                children: children.to_vec(),
            },
        )
    }

    fn set_leaf_prev(&mut self, page_id: PageId, prev: PageId) -> Result<()> {
        match self.read_node(page_id)? {
            Node::Leaf { entries, next, .. } => {
                self.write_node(page_id, &Node::Leaf { entries, prev, next })
            }
            Node::Internal { .. } => Err(Error::with_message(
                ErrorCode::Corrupt,
                "leaf link points at internal node",
            )),
        }
    }

    // ========================================================================
    // Bucket chains
    // ========================================================================

    fn bucket_create(&mut self, pk: &Value) -> Result<PageId> {
        let id = self.bucket_allocate()?;
        let mut page = vec![0u8; BUCKET_PAGE_SIZE];
        page[0..2].copy_from_slice(&1u16.to_le_bytes());
        write_u32(&mut page, 2, NONE);
        let pk_size = self.pk_ty.packed_size();
        pack_value(&self.pk_ty, pk, &mut page[BUCKET_HEADER..BUCKET_HEADER + pk_size])?;
        self.buckets.write_page(id, &page)?;
        Ok(id)
    }

    fn bucket_append(&mut self, head: PageId, pk: &Value) -> Result<()> {
        let capacity = self.pks_per_bucket_page();
        let pk_size = self.pk_ty.packed_size();
        let mut page_id = head;
        loop {
            let mut page = self.buckets.read_page(page_id)?;
            let n = u16::from_le_bytes([page[0], page[1]]) as usize;
            if n < capacity {
                let offset = BUCKET_HEADER + n * pk_size;
                pack_value(&self.pk_ty, pk, &mut page[offset..offset + pk_size])?;
                page[0..2].copy_from_slice(&((n + 1) as u16).to_le_bytes());
                return self.buckets.write_page(page_id, &page);
            }
            let next = read_u32(&page, 2);
            if next != NONE {
                page_id = next;
                continue;
            }
            // chain full: link a fresh page
            let new_id = self.bucket_create(pk)?;
            write_u32(&mut page, 2, new_id);
            return self.buckets.write_page(page_id, &page);
        }
    }

    fn bucket_collect(&mut self, head: PageId) -> Result<Vec<Value>> {
        let pk_size = self.pk_ty.packed_size();
        let mut pks = Vec::new();
        let mut page_id = head;
        while page_id != NONE {
            let page = self.buckets.read_page(page_id)?;
            let n = u16::from_le_bytes([page[0], page[1]]) as usize;
            for i in 0..n {
                let offset = BUCKET_HEADER + i * pk_size;
                pks.push(unpack_value(&self.pk_ty, &page[offset..offset + pk_size])?);
            }
            page_id = read_u32(&page, 2);
        }
        Ok(pks)
    }

    /// Remove one primary key from the chain. Returns whether it was found
    /// and the surviving head (`None` when the whole chain died).
    fn bucket_remove(&mut self, head: PageId, pk: &Value) -> Result<(bool, Option<PageId>)> {
        let pk_size = self.pk_ty.packed_size();
        let mut page_id = head;
        let mut prev_id = NONE;
        while page_id != NONE {
            let mut page = self.buckets.read_page(page_id)?;
            let n = u16::from_le_bytes([page[0], page[1]]) as usize;
            let next = read_u32(&page, 2);
            let mut found = None;
            for i in 0..n {
                let offset = BUCKET_HEADER + i * pk_size;
                let stored = unpack_value(&self.pk_ty, &page[offset..offset + pk_size])?;
                if stored.cmp_key(pk) == Ordering::Equal {
                    found = Some(i);
                    break;
                }
            }
            if let Some(i) = found {
                // compact the page in place
                let start = BUCKET_HEADER + i * pk_size;
                let tail_start = BUCKET_HEADER + (i + 1) * pk_size;
                let tail_end = BUCKET_HEADER + n * pk_size;
                page.copy_within(tail_start..tail_end, start);
                page[tail_end - pk_size..tail_end].fill(0);
                page[0..2].copy_from_slice(&((n - 1) as u16).to_le_bytes());

                if n - 1 == 0 {
                    // page died: unlink and free it
                    if prev_id != NONE {
                        let mut prev = self.buckets.read_page(prev_id)?;
                        write_u32(&mut prev, 2, next);
                        self.buckets.write_page(prev_id, &prev)?;
                        self.bucket_free(page_id)?;
                        return Ok((true, Some(head)));
                    }
                    self.bucket_free(page_id)?;
                    let new_head = if next != NONE { Some(next) } else { None };
                    return Ok((true, new_head));
                }
                self.buckets.write_page(page_id, &page)?;
                return Ok((true, Some(head)));
            }
            prev_id = page_id;
            page_id = next;
        }
        Ok((false, Some(head)))
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    fn allocate(&mut self) -> Result<PageId> {
        let id = if self.free_head != NONE {
            let id = self.free_head;
            let page = self.tree.read_page(id)?;
            self.free_head = read_u32(&page, 4);
            id
        } else {
            let id = self.next_page_id;
            self.next_page_id += 1;
            id
        };
        self.write_header()?;
        Ok(id)
    }

    fn free(&mut self, page_id: PageId) -> Result<()> {
        let mut page = vec![0u8; DEFAULT_PAGE_SIZE];
        write_u32(&mut page, 4, self.free_head);
        self.tree.write_page(page_id, &page)?;
        self.free_head = page_id;
        self.write_header()
    }

    fn bucket_allocate(&mut self) -> Result<PageId> {
        let id = if self.bucket_free != NONE {
            let id = self.bucket_free;
            let page = self.buckets.read_page(id)?;
            self.bucket_free = read_u32(&page, 2);
            id
        } else {
            let id = self.bucket_next;
            self.bucket_next += 1;
            id
        };
        self.write_header()?;
        Ok(id)
    }

    fn bucket_free(&mut self, page_id: PageId) -> Result<()> {
        let mut page = vec![0u8; BUCKET_PAGE_SIZE];
        write_u32(&mut page, 2, self.bucket_free);
        self.buckets.write_page(page_id, &page)?;
        self.bucket_free = page_id;
        self.write_header()
    }

    // ========================================================================
    // Node codec
    // ========================================================================

    fn write_header(&mut self) -> Result<()> {
        let mut page = vec![0u8; DEFAULT_PAGE_SIZE];
        write_u32(&mut page, 0, MAGIC);
        write_u32(&mut page, 4, self.order as u32);
        write_u32(&mut page, 8, self.root_page);
        write_u32(&mut page, 12, self.first_leaf);
        write_u32(&mut page, 16, self.next_page_id);
        write_u32(&mut page, 20, self.free_head);
        write_u32(&mut page, 24, self.bucket_next);
        write_u32(&mut page, 28, self.bucket_free);
        self.tree.write_page(0, &page)
    }

    fn read_node(&mut self, page_id: PageId) -> Result<Node> {
        let page = self.tree.read_page(page_id)?;
        let tag = page[0];
        let n = u16::from_le_bytes([page[1], page[2]]) as usize;
        let key_size = self.value_ty.packed_size();
        match tag {
            TAG_LEAF => {
                let prev = read_u32(&page, NODE_HEADER);
                let next = read_u32(&page, NODE_HEADER + 4);
                let mut offset = NODE_HEADER + LEAF_LINKS;
                let mut entries = Vec::with_capacity(n);
                for _ in 0..n {
                    let value = unpack_value(&self.value_ty, &page[offset..offset + key_size])?;
                    offset += key_size;
                    let head = read_u32(&page, offset);
                    offset += 4;
                    entries.push((value, head));
                }
                Ok(Node::Leaf { entries, prev, next })
            }
            TAG_INTERNAL => {
                let mut offset = NODE_HEADER;
                let mut keys = Vec::with_capacity(n);
                for _ in 0..n {
                    keys.push(unpack_value(&self.value_ty, &page[offset..offset + key_size])?);
                    offset += key_size;
                }
                let mut children = Vec::with_capacity(n + 1);
                for _ in 0..=n {
                    children.push(read_u32(&page, offset));
                    offset += 4;
                }
                Ok(Node::Internal { keys, children })
            }
            other => Err(Error::with_message(
                ErrorCode::Corrupt,
                format!("unknown secondary node tag {}", other),
            )),
        }
    }

    fn write_node(&mut self, page_id: PageId, node: &Node) -> Result<()> {
        let mut page = vec![0u8; DEFAULT_PAGE_SIZE];
        let key_size = self.value_ty.packed_size();
        match node {
            Node::Leaf { entries, prev, next } => {
                page[0] = TAG_LEAF;
                page[1..3].copy_from_slice(&(entries.len() as u16).to_le_bytes());
                write_u32(&mut page, NODE_HEADER, *prev);
                write_u32(&mut page, NODE_HEADER + 4, *next);
                let mut offset = NODE_HEADER + LEAF_LINKS;
                for (value, head) in entries {
                    pack_value(&self.value_ty, value, &mut page[offset..offset + key_size])?;
                    offset += key_size;
                    write_u32(&mut page, offset, *head);
                    offset += 4;
                }
            }
            Node::Internal { keys, children } => {
                page[0] = TAG_INTERNAL;
                page[1..3].copy_from_slice(&(keys.len() as u16).to_le_bytes());
                let mut offset = NODE_HEADER;
                for key in keys {
                    pack_value(&self.value_ty, key, &mut page[offset..offset + key_size])?;
                    offset += key_size;
                }
                for child in children {
                    write_u32(&mut page, offset, *child);
                    offset += 4;
                }
            }
        }
        self.tree.write_page(page_id, &page)
    }
}

fn read_u32(page: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([page[offset], page[offset + 1], page[offset + 2], page[offset + 3]])
}

fn write_u32(page: &mut [u8], offset: usize, value: u32) {
    page[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> BPlusSecondary {
        BPlusSecondary::open(
            dir.path().join("city"),
            FieldType::Char(16),
            FieldType::Int,
            Some(4),
        )
        .unwrap()
    }

    #[test]
    fn test_duplicates_share_a_bucket() {
        let dir = TempDir::new().unwrap();
        let mut idx = open(&dir);
        idx.insert(&Value::Str("Tokyo".into()), &Value::Int(1)).unwrap();
        idx.insert(&Value::Str("Tokyo".into()), &Value::Int(2)).unwrap();
        idx.insert(&Value::Str("London".into()), &Value::Int(3)).unwrap();

        let pks = idx.search(&Value::Str("Tokyo".into())).unwrap().data;
        assert_eq!(pks, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            idx.search(&Value::Str("London".into())).unwrap().data,
            vec![Value::Int(3)]
        );
        assert!(idx.search(&Value::Str("Paris".into())).unwrap().data.is_empty());
    }

    #[test]
    fn test_remove_one_of_two() {
        let dir = TempDir::new().unwrap();
        let mut idx = open(&dir);
        idx.insert(&Value::Str("Tokyo".into()), &Value::Int(1)).unwrap();
        idx.insert(&Value::Str("Tokyo".into()), &Value::Int(2)).unwrap();

        assert!(idx.remove(&Value::Str("Tokyo".into()), &Value::Int(1)).unwrap().data);
        assert_eq!(
            idx.search(&Value::Str("Tokyo".into())).unwrap().data,
            vec![Value::Int(2)]
        );
        // dropping the last one removes the tree entry too
        assert!(idx.remove(&Value::Str("Tokyo".into()), &Value::Int(2)).unwrap().data);
        assert!(idx.search(&Value::Str("Tokyo".into())).unwrap().data.is_empty());
        assert!(!idx.remove(&Value::Str("Tokyo".into()), &Value::Int(2)).unwrap().data);
    }

    #[test]
    fn test_range_concatenates_buckets_in_value_order() {
        let dir = TempDir::new().unwrap();
        let mut idx = open(&dir);
        for (i, city) in ["Quito", "Berlin", "Ankara", "Berlin", "Cusco", "Dakar"]
            .iter()
            .enumerate()
        {
            idx.insert(&Value::Str(city.to_string()), &Value::Int(i as i64)).unwrap();
        }
        let pks = idx
            .range_search(&Value::Str("A".into()), &Value::Str("D".into()))
            .unwrap()
            .data;
        // Ankara(2), Berlin(1, 3), Cusco(4); Dakar > "D" by byte order
        assert_eq!(
            pks,
            vec![Value::Int(2), Value::Int(1), Value::Int(3), Value::Int(4)]
        );
    }

    #[test]
    fn test_many_distinct_values_split_tree() {
        let dir = TempDir::new().unwrap();
        let mut idx = open(&dir);
        for i in 0..100 {
            idx.insert(&Value::Str(format!("v{:03}", i)), &Value::Int(i)).unwrap();
        }
        for i in 0..100 {
            let pks = idx.search(&Value::Str(format!("v{:03}", i))).unwrap().data;
            assert_eq!(pks, vec![Value::Int(i)], "value v{:03}", i);
        }
        let all = idx
            .range_search(&Value::Str("v000".into()), &Value::Str("v099".into()))
            .unwrap()
            .data;
        assert_eq!(all.len(), 100);
    }

    #[test]
    fn test_bucket_overflow_chain() {
        let dir = TempDir::new().unwrap();
        let mut idx = open(&dir);
        // 100 pks under one value exceeds a single 256-byte bucket page
        for i in 0..100 {
            idx.insert(&Value::Str("same".into()), &Value::Int(i)).unwrap();
        }
        let pks = idx.search(&Value::Str("same".into())).unwrap().data;
        assert_eq!(pks.len(), 100);
        // delete from the middle of the chain
        assert!(idx.remove(&Value::Str("same".into()), &Value::Int(50)).unwrap().data);
        assert_eq!(idx.search(&Value::Str("same".into())).unwrap().data.len(), 99);
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        {
            let mut idx = open(&dir);
            idx.insert(&Value::Str("Tokyo".into()), &Value::Int(9)).unwrap();
        }
        let mut idx = BPlusSecondary::open(
            dir.path().join("city"),
            FieldType::Char(16),
            FieldType::Int,
            None,
        )
        .unwrap();
        assert_eq!(
            idx.search(&Value::Str("Tokyo".into())).unwrap().data,
            vec![Value::Int(9)]
        );
    }
}
