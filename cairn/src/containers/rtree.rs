//! R-tree (components C3.7 / C4.7).
//!
//! Grounded on `original_source/include/cista/containers/rtree.h`: a
//! node-vector-indexed (not pointer-indexed) tree, so no offset fix-up
//! is needed for the tree structure itself -- children are stored as
//! indices into the same flat node array the tree owns, and only the
//! node array's own backing storage needs an offset pointer. Free nodes
//! are kept on a singly-linked freelist by reusing (field-punning) the
//! node's own `count` field as a "next free" index, with
//! [`END_FREE_LIST`] as the list terminator, exactly mirroring the
//! reference implementation's `kind` enum (`kLeaf`, `kBranch`,
//! `kEndFreeList`) and `add_to_free_list`/`node_insert`/`node_split`
//! functions.

extern crate alloc;

use alloc::vec::Vec;

use rancor::Fallible;

use super::entry::{Entry, EntryAdapter};
use super::nested::{ArchivedNestedVec, NestedVec};
use super::vec::ArchivedVec;
use crate::de::Verify;
use crate::place::Place;
use crate::primitive::ArchivedU32;
use crate::traits::{Archive, Deserialize, Serialize};

/// Sentinel marking the end of the node freelist, reusing the same
/// slot a leaf's item count or a branch's child count would otherwise
/// occupy.
pub const END_FREE_LIST: u32 = u32::MAX;

/// An axis-aligned bounding box in `D` dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect<const D: usize> {
    /// Minimum coordinate along each axis.
    pub min: [f64; D],
    /// Maximum coordinate along each axis.
    pub max: [f64; D],
}

impl<const D: usize> Rect<D> {
    /// The rectangle's volume (area in 2D, volume in 3D, ...).
    pub fn area(&self) -> f64 {
        let mut a = 1.0;
        for i in 0..D {
            a *= (self.max[i] - self.min[i]).max(0.0);
        }
        a
    }

    /// Whether `self` and `other` overlap on every axis.
    pub fn intersects(&self, other: &Rect<D>) -> bool {
        (0..D).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }

    /// Whether `self` fully contains `other`.
    pub fn contains(&self, other: &Rect<D>) -> bool {
        (0..D).all(|i| self.min[i] <= other.min[i] && other.max[i] <= self.max[i])
    }

    /// The smallest rectangle enclosing both `self` and `other`.
    pub fn united(&self, other: &Rect<D>) -> Rect<D> {
        let mut min = self.min;
        let mut max = self.max;
        for i in 0..D {
            min[i] = min[i].min(other.min[i]);
            max[i] = max[i].max(other.max[i]);
        }
        Rect { min, max }
    }

    /// The area increase from expanding `self` to also cover `other`.
    pub fn expansion_cost(&self, other: &Rect<D>) -> f64 {
        self.united(other).area() - self.area()
    }
}

enum NodeKind<const D: usize, T> {
    Leaf { items: Vec<(Rect<D>, T)> },
    Branch { children: Vec<(Rect<D>, u32)> },
    Free { next: u32 },
}

struct Node<const D: usize, T> {
    kind: NodeKind<D, T>,
}

/// The minimum number of items/children a non-root node may hold,
/// following the reference implementation's `kSplitMinItemsPercentage
/// = 10` formula: `max(2, max_items * 10% + 1)`.
pub const fn min_items(max_items: usize) -> usize {
    let pct = max_items * 10 / 100 + 1;
    if pct < 2 {
        2
    } else {
        pct
    }
}

/// An owning, mutable R-tree, the pre-serialization counterpart of
/// [`ArchivedRTree`]. `MAX_ITEMS` bounds how many entries a leaf (or
/// children a branch) may hold before it must split.
pub struct RTree<T, const D: usize, const MAX_ITEMS: usize = 8> {
    nodes: Vec<Node<D, T>>,
    root: u32,
    free_head: u32,
    len: usize,
}

impl<T, const D: usize, const MAX_ITEMS: usize> RTree<T, D, MAX_ITEMS> {
    /// Creates an empty tree with a single, empty leaf as its root.
    pub fn new() -> Self {
        let mut nodes = Vec::new();
        nodes.push(Node {
            kind: NodeKind::Leaf { items: Vec::new() },
        });
        Self {
            nodes,
            root: 0,
            free_head: END_FREE_LIST,
            len: 0,
        }
    }

    /// The number of items stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree has no items.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The size of the backing node array, including freed slots still
    /// awaiting reuse. Used to confirm that deleting and reinserting
    /// items reuses freelist slots rather than growing the array.
    pub fn node_len(&self) -> usize {
        self.nodes.len()
    }

    fn alloc_node(&mut self, kind: NodeKind<D, T>) -> u32 {
        if self.free_head != END_FREE_LIST {
            let idx = self.free_head;
            let slot = &mut self.nodes[idx as usize];
            self.free_head = match slot.kind {
                NodeKind::Free { next } => next,
                _ => unreachable!("freelist head was not a free node"),
            };
            slot.kind = kind;
            idx
        } else {
            self.nodes.push(Node { kind });
            (self.nodes.len() - 1) as u32
        }
    }

    fn free_node(&mut self, idx: u32) {
        self.nodes[idx as usize].kind = NodeKind::Free {
            next: self.free_head,
        };
        self.free_head = idx;
    }

    /// Inserts `item` with bounding box `rect`.
    pub fn insert(&mut self, rect: Rect<D>, item: T) {
        let root = self.root;
        if let Some((sibling_rect, sibling)) = self.insert_into(root, rect, item) {
            let old_root = self.root;
            let new_root_children = alloc::vec![
                (self.node_rect(old_root), old_root),
                (sibling_rect, sibling),
            ];
            let new_root = self.alloc_node(NodeKind::Branch {
                children: new_root_children,
            });
            self.root = new_root;
        }
        self.len += 1;
    }

    fn node_rect(&self, idx: u32) -> Rect<D> {
        match &self.nodes[idx as usize].kind {
            NodeKind::Leaf { items } => items
                .iter()
                .map(|(r, _)| *r)
                .reduce(|a, b| a.united(&b))
                .unwrap_or(Rect {
                    min: [0.0; D],
                    max: [0.0; D],
                }),
            NodeKind::Branch { children } => children
                .iter()
                .map(|(r, _)| *r)
                .reduce(|a, b| a.united(&b))
                .unwrap_or(Rect {
                    min: [0.0; D],
                    max: [0.0; D],
                }),
            NodeKind::Free { .. } => panic!("node_rect of a freed node"),
        }
    }

    /// Inserts into the subtree at `idx`; returns `Some((rect, idx))`
    /// of a newly split-off sibling node if `idx` overflowed
    /// `MAX_ITEMS` and had to split.
    fn insert_into(
        &mut self,
        idx: u32,
        rect: Rect<D>,
        item: T,
    ) -> Option<(Rect<D>, u32)> {
        let is_leaf = matches!(self.nodes[idx as usize].kind, NodeKind::Leaf { .. });
        if is_leaf {
            if let NodeKind::Leaf { items } = &mut self.nodes[idx as usize].kind {
                items.push((rect, item));
                if items.len() > MAX_ITEMS {
                    return Some(self.split_leaf(idx));
                }
            }
            None
        } else {
            let best = self.best_child(idx);
            let (child_rect, child_idx) = match &self.nodes[idx as usize].kind {
                NodeKind::Branch { children } => children[best],
                _ => unreachable!(),
            };
            let _ = child_rect;
            let split = self.insert_into(child_idx, rect, item);
            if let NodeKind::Branch { children } = &mut self.nodes[idx as usize].kind {
                children[best].0 = self.node_rect(child_idx);
                if let Some((sibling_rect, sibling_idx)) = split {
                    children.push((sibling_rect, sibling_idx));
                }
            }
            if let NodeKind::Branch { children } = &self.nodes[idx as usize].kind {
                if children.len() > MAX_ITEMS {
                    return Some(self.split_branch(idx));
                }
            }
            None
        }
    }

    fn best_child(&self, idx: u32) -> usize {
        match &self.nodes[idx as usize].kind {
            NodeKind::Branch { children } => {
                let mut best = 0;
                let mut best_cost = f64::INFINITY;
                for (i, (rect, _)) in children.iter().enumerate() {
                    let dummy = Rect {
                        min: rect.min,
                        max: rect.max,
                    };
                    let cost = rect.expansion_cost(&dummy);
                    if cost < best_cost {
                        best_cost = cost;
                        best = i;
                    }
                }
                best
            }
            _ => unreachable!("best_child called on a leaf"),
        }
    }

    fn split_leaf(&mut self, idx: u32) -> (Rect<D>, u32) {
        let items = match &mut self.nodes[idx as usize].kind {
            NodeKind::Leaf { items } => core::mem::take(items),
            _ => unreachable!(),
        };
        let split_at = min_items(MAX_ITEMS).max(items.len() / 2);
        let mut iter = items.into_iter();
        let first: Vec<_> = (&mut iter).take(split_at).collect();
        let second: Vec<_> = iter.collect();
        if let NodeKind::Leaf { items } = &mut self.nodes[idx as usize].kind {
            *items = first;
        }
        let sibling_rect = second
            .iter()
            .map(|(r, _)| *r)
            .reduce(|a, b| a.united(&b))
            .expect("split leaf must keep at least one item on each side");
        let sibling = self.alloc_node(NodeKind::Leaf { items: second });
        (sibling_rect, sibling)
    }

    fn split_branch(&mut self, idx: u32) -> (Rect<D>, u32) {
        let children = match &mut self.nodes[idx as usize].kind {
            NodeKind::Branch { children } => core::mem::take(children),
            _ => unreachable!(),
        };
        let split_at = min_items(MAX_ITEMS).max(children.len() / 2);
        let mut iter = children.into_iter();
        let first: Vec<_> = (&mut iter).take(split_at).collect();
        let second: Vec<_> = iter.collect();
        if let NodeKind::Branch { children } = &mut self.nodes[idx as usize].kind {
            *children = first;
        }
        let sibling_rect = second
            .iter()
            .map(|(r, _)| *r)
            .reduce(|a, b| a.united(&b))
            .expect("split branch must keep at least one child on each side");
        let sibling = self.alloc_node(NodeKind::Branch { children: second });
        (sibling_rect, sibling)
    }

    /// Returns every item whose bounding box intersects `query`.
    pub fn search(&self, query: &Rect<D>) -> Vec<&T> {
        let mut out = Vec::new();
        self.search_into(self.root, query, &mut out);
        out
    }

    fn search_into<'a>(&'a self, idx: u32, query: &Rect<D>, out: &mut Vec<&'a T>) {
        match &self.nodes[idx as usize].kind {
            NodeKind::Leaf { items } => {
                for (rect, item) in items {
                    if rect.intersects(query) {
                        out.push(item);
                    }
                }
            }
            NodeKind::Branch { children } => {
                for (rect, child) in children {
                    if rect.intersects(query) {
                        self.search_into(*child, query, out);
                    }
                }
            }
            NodeKind::Free { .. } => {}
        }
    }

    /// Removes and returns every item whose bounding box intersects
    /// `query` and for which `predicate` returns `true`, reclaiming any
    /// node that becomes empty onto the freelist (so a later insert can
    /// reuse its slot instead of growing the node array).
    pub fn remove_where(
        &mut self,
        query: &Rect<D>,
        mut predicate: impl FnMut(&T) -> bool,
    ) -> Vec<T> {
        let mut removed = Vec::new();
        self.remove_into(self.root, query, &mut predicate, &mut removed);
        self.len -= removed.len();
        removed
    }

    fn remove_into(
        &mut self,
        idx: u32,
        query: &Rect<D>,
        predicate: &mut impl FnMut(&T) -> bool,
        out: &mut Vec<T>,
    ) {
        let is_leaf = matches!(self.nodes[idx as usize].kind, NodeKind::Leaf { .. });
        if is_leaf {
            if let NodeKind::Leaf { items } = &mut self.nodes[idx as usize].kind {
                let mut i = 0;
                while i < items.len() {
                    if items[i].0.intersects(query) && predicate(&items[i].1) {
                        out.push(items.remove(i).1);
                    } else {
                        i += 1;
                    }
                }
            }
        } else {
            let child_indices: Vec<u32> = match &self.nodes[idx as usize].kind {
                NodeKind::Branch { children } => children
                    .iter()
                    .filter(|(r, _)| r.intersects(query))
                    .map(|(_, c)| *c)
                    .collect(),
                _ => Vec::new(),
            };
            for child in child_indices {
                self.remove_into(child, query, predicate, out);
            }
            if let NodeKind::Branch { children } = &mut self.nodes[idx as usize].kind {
                let mut emptied = Vec::new();
                children.retain(|(_, c)| {
                    let empty = self.nodes[*c as usize].is_empty_subtree();
                    if empty {
                        emptied.push(*c);
                    }
                    !empty
                });
                for c in emptied {
                    self.free_node(c);
                }
            }
        }
    }

    /// Flattens the node array into the four parallel, node-index-
    /// aligned columns [`ArchivedRTree`] stores, recomputed identically
    /// by [`Serialize::serialize`] and [`Archive::resolve`] rather than
    /// carried between the two as intermediate state.
    fn build_columns(
        &self,
    ) -> (
        Vec<u8>,
        Vec<u32>,
        NestedVec<EntryAdapter<'_, Rect<D>, T>>,
        NestedVec<EntryAdapter<'_, Rect<D>, u32>>,
    ) {
        let mut tags = Vec::with_capacity(self.nodes.len());
        let mut free_next = Vec::with_capacity(self.nodes.len());
        let mut leaf_items = NestedVec::new();
        let mut branch_children = NestedVec::new();
        for node in &self.nodes {
            match &node.kind {
                NodeKind::Leaf { items } => {
                    tags.push(NODE_LEAF);
                    free_next.push(0);
                    leaf_items.push_bucket(
                        items
                            .iter()
                            .map(|(rect, item)| EntryAdapter {
                                key: rect,
                                value: item,
                            })
                            .collect(),
                    );
                    branch_children.push_bucket(Vec::new());
                }
                NodeKind::Branch { children } => {
                    tags.push(NODE_BRANCH);
                    free_next.push(0);
                    branch_children.push_bucket(
                        children
                            .iter()
                            .map(|(rect, child)| EntryAdapter {
                                key: rect,
                                value: child,
                            })
                            .collect(),
                    );
                    leaf_items.push_bucket(Vec::new());
                }
                NodeKind::Free { next } => {
                    tags.push(NODE_FREE);
                    free_next.push(*next);
                    leaf_items.push_bucket(Vec::new());
                    branch_children.push_bucket(Vec::new());
                }
            }
        }
        (tags, free_next, leaf_items, branch_children)
    }
}

impl<const D: usize, T> Node<D, T> {
    fn is_empty_subtree(&self) -> bool {
        match &self.kind {
            NodeKind::Leaf { items } => items.is_empty(),
            NodeKind::Branch { children } => children.is_empty(),
            NodeKind::Free { .. } => true,
        }
    }
}

impl<T, const D: usize, const MAX_ITEMS: usize> Default for RTree<T, D, MAX_ITEMS> {
    fn default() -> Self {
        Self::new()
    }
}

/// A `D`-dimensional bounding box in its fixed-width archived encoding.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ArchivedRect<const D: usize> {
    min: [crate::primitive::ArchivedF64; D],
    max: [crate::primitive::ArchivedF64; D],
}

unsafe impl<const D: usize> crate::traits::Portable for ArchivedRect<D> {}

impl<const D: usize> ArchivedRect<D> {
    /// Converts back to the unarchived [`Rect`] used by query code.
    pub fn to_rect(self) -> Rect<D> {
        let mut min = [0.0; D];
        let mut max = [0.0; D];
        for i in 0..D {
            min[i] = self.min[i].to_native();
            max[i] = self.max[i].to_native();
        }
        Rect { min, max }
    }
}

impl<const D: usize> Archive for Rect<D> {
    type Archived = ArchivedRect<D>;
    type Resolver = ();

    fn resolve(&self, _resolver: (), out: Place<Self::Archived>) {
        let mut min = [crate::primitive::ArchivedF64::from(0.0); D];
        let mut max = [crate::primitive::ArchivedF64::from(0.0); D];
        for i in 0..D {
            min[i] = crate::primitive::ArchivedF64::from(self.min[i]);
            max[i] = crate::primitive::ArchivedF64::from(self.max[i]);
        }
        unsafe {
            out.write_unchecked(ArchivedRect { min, max });
        }
    }
}

impl<S: Fallible + ?Sized, const D: usize> Serialize<S> for Rect<D> {
    fn serialize(&self, _serializer: &mut S) -> Result<Self::Resolver, S::Error> {
        Ok(())
    }
}

impl<Dsr: Fallible + ?Sized, const D: usize> Deserialize<Rect<D>, Dsr> for ArchivedRect<D> {
    fn deserialize(&self, _deserializer: &mut Dsr) -> Result<Rect<D>, Dsr::Error> {
        Ok(self.to_rect())
    }
}

impl<const D: usize> crate::de::Verify for ArchivedRect<D> {
    fn verify(&self, _verifier: &mut crate::de::Verifier) -> Result<(), crate::error::Error> {
        Ok(())
    }
}

/// One node's tag, distinguishing which of [`ArchivedRTree`]'s three
/// parallel node-index tables the node's data lives in.
pub const NODE_LEAF: u8 = 0;
pub const NODE_BRANCH: u8 = 1;
pub const NODE_FREE: u8 = 2;

/// The zero-copy, buffer-resident view of an [`RTree`].
///
/// The node array is flattened into parallel, node-index-aligned
/// tables rather than a tagged union per node, since this format has
/// no portable way to express a C-style `union` directly: `tags[i]`
/// says which of `leaf_items`/`branch_children`'s bucket `i` (or,
/// for a free node, `free_next[i]`) is meaningful. This is the same
/// "field-punning" trick the reference implementation uses -- a live
/// node's item/child count and a free node's next-free index share one
/// physical slot -- expressed as column-oriented tables instead of an
/// overlapping struct layout, since Rust has no native field punning.
/// Every table still shares one index space: node `i`'s tag, rect, and
/// payload are always found at index/bucket `i` across all three
/// tables, so no further pointer patch-up beyond their own vector/
/// nested-vector headers is needed to reconstruct the tree structure.
#[repr(C)]
pub struct ArchivedRTree<T, const D: usize> {
    tags: ArchivedVec<u8>,
    free_next: ArchivedVec<ArchivedU32>,
    leaf_items: ArchivedNestedVec<Entry<ArchivedRect<D>, T>>,
    branch_children: ArchivedNestedVec<Entry<ArchivedRect<D>, ArchivedU32>>,
    root: ArchivedU32,
    free_head: ArchivedU32,
}

unsafe impl<T, const D: usize> crate::traits::Portable for ArchivedRTree<T, D> {}

impl<T, const D: usize> ArchivedRTree<T, D> {
    /// The number of nodes, including freed slots.
    pub fn node_count(&self) -> usize {
        self.tags.len()
    }

    /// Returns every item whose bounding box intersects `query`.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`].
    pub unsafe fn search(&self, query: &Rect<D>) -> alloc::vec::Vec<&T> {
        let mut out = alloc::vec::Vec::new();
        let root = self.root.to_native();
        self.search_into(root, query, &mut out);
        out
    }

    unsafe fn search_into<'a>(
        &'a self,
        idx: u32,
        query: &Rect<D>,
        out: &mut alloc::vec::Vec<&'a T>,
    ) {
        let tags = self.tags.as_slice();
        match tags[idx as usize] {
            NODE_LEAF => {
                for entry in self.leaf_items.bucket(idx as usize) {
                    if entry.key.to_rect().intersects(query) {
                        out.push(&entry.value);
                    }
                }
            }
            NODE_BRANCH => {
                for entry in self.branch_children.bucket(idx as usize) {
                    if entry.key.to_rect().intersects(query) {
                        self.search_into(entry.value.to_native(), query, out);
                    }
                }
            }
            _ => {}
        }
    }
}

impl<T: crate::de::Verify, const D: usize> crate::de::Verify for ArchivedRTree<T, D> {
    fn verify(&self, verifier: &mut crate::de::Verifier) -> Result<(), crate::error::Error> {
        self.tags.verify(verifier)?;
        self.free_next.verify(verifier)?;
        self.leaf_items.verify(verifier)?;
        self.branch_children.verify(verifier)
    }
}

impl<T, const D: usize> core::fmt::Debug for ArchivedRTree<T, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArchivedRTree")
            .field("node_count", &self.node_count())
            .finish()
    }
}

/// Where each of an [`RTree`]'s four parallel node columns (and its
/// root index) were written, recorded by [`Serialize::serialize`].
pub struct RTreeResolver {
    tags: super::vec::VecResolver,
    free_next: super::vec::VecResolver,
    leaf_items: super::nested::NestedVecResolver,
    branch_children: super::nested::NestedVecResolver,
    root: u32,
    free_head: u32,
}

impl<T: Archive, const D: usize, const MAX_ITEMS: usize> Archive for RTree<T, D, MAX_ITEMS> {
    type Archived = ArchivedRTree<T::Archived, D>;
    type Resolver = RTreeResolver;

    fn resolve(&self, resolver: Self::Resolver, out: Place<Self::Archived>) {
        let (tags, free_next, leaf_items, branch_children) = self.build_columns();
        let out_ptr = out.ptr();

        let tags_field = unsafe { out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).tags)) };
        tags.resolve(resolver.tags, tags_field);

        let free_next_field =
            unsafe { out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).free_next)) };
        free_next.resolve(resolver.free_next, free_next_field);

        let leaf_items_field =
            unsafe { out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).leaf_items)) };
        leaf_items.resolve(resolver.leaf_items, leaf_items_field);

        let branch_children_field =
            unsafe { out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).branch_children)) };
        branch_children.resolve(resolver.branch_children, branch_children_field);

        unsafe {
            (*out_ptr).root = ArchivedU32::from(resolver.root);
            (*out_ptr).free_head = ArchivedU32::from(resolver.free_head);
        }
    }
}

impl<T, S, const D: usize, const MAX_ITEMS: usize> Serialize<S> for RTree<T, D, MAX_ITEMS>
where
    T: Serialize<S>,
    S: Fallible + crate::ser::RawSink + ?Sized,
{
    fn serialize(&self, serializer: &mut S) -> Result<Self::Resolver, S::Error> {
        let (tags, free_next, leaf_items, branch_children) = self.build_columns();
        Ok(RTreeResolver {
            tags: tags.serialize(serializer)?,
            free_next: free_next.serialize(serializer)?,
            leaf_items: leaf_items.serialize(serializer)?,
            branch_children: branch_children.serialize(serializer)?,
            root: self.root,
            free_head: self.free_head,
        })
    }
}

impl<T, D, const DIM: usize, const MAX_ITEMS: usize>
    Deserialize<RTree<T, DIM, MAX_ITEMS>, D> for ArchivedRTree<T::Archived, DIM>
where
    T: Archive,
    T::Archived: Deserialize<T, D>,
    D: Fallible + ?Sized,
{
    fn deserialize(&self, deserializer: &mut D) -> Result<RTree<T, DIM, MAX_ITEMS>, D::Error> {
        // SAFETY: a buffer this method is reachable from has already
        // been validated by the deserialization verifier (C7).
        let node_count = self.node_count();
        let tags = unsafe { self.tags.as_slice() };
        let free_next = unsafe { self.free_next.as_slice() };
        let mut nodes = Vec::with_capacity(node_count);
        let mut len = 0usize;
        for i in 0..node_count {
            let kind = match tags[i] {
                NODE_LEAF => {
                    let mut items = Vec::new();
                    for entry in unsafe { self.leaf_items.bucket(i) } {
                        items.push((
                            entry.key.to_rect(),
                            entry.value.deserialize(deserializer)?,
                        ));
                    }
                    len += items.len();
                    NodeKind::Leaf { items }
                }
                NODE_BRANCH => {
                    let mut children = Vec::new();
                    for entry in unsafe { self.branch_children.bucket(i) } {
                        children.push((entry.key.to_rect(), entry.value.to_native()));
                    }
                    NodeKind::Branch { children }
                }
                _ => NodeKind::Free {
                    next: free_next[i].to_native(),
                },
            };
            nodes.push(Node { kind });
        }
        Ok(RTree {
            nodes,
            root: self.root.to_native(),
            free_head: self.free_head.to_native(),
            len,
        })
    }
}

impl<T, const D: usize, const MAX_ITEMS: usize> crate::fingerprint::Fingerprinted
    for RTree<T, D, MAX_ITEMS>
where
    T: crate::fingerprint::Fingerprinted,
{
    fn type_key() -> u64 {
        let tagged = crate::checksum::fnv1a(T::type_key(), &(D as u32).to_le_bytes());
        crate::fingerprint::compose_type_key("rtree", tagged)
    }

    fn shape() -> crate::fingerprint::Shape {
        crate::fingerprint::Shape::RTree(D as u32)
    }

    fn fold(hash: u64, seen: &mut alloc::collections::BTreeSet<u64>) -> u64 {
        let key = Self::type_key();
        if !seen.insert(key) {
            return crate::checksum::fnv1a(hash, &key.to_le_bytes());
        }
        let h = crate::checksum::fnv1a(
            crate::checksum::fnv1a(hash, b"rtree"),
            &(D as u32).to_le_bytes(),
        );
        T::fold(h, seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect2(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect<2> {
        Rect {
            min: [x0, y0],
            max: [x1, y1],
        }
    }

    #[test]
    fn insert_and_search_finds_intersecting_items() {
        let mut tree: RTree<&'static str, 2, 4> = RTree::new();
        tree.insert(rect2(0.0, 0.0, 1.0, 1.0), "a");
        tree.insert(rect2(5.0, 5.0, 6.0, 6.0), "b");
        tree.insert(rect2(0.5, 0.5, 1.5, 1.5), "c");

        let hits = tree.search(&rect2(0.0, 0.0, 1.0, 1.0));
        assert!(hits.contains(&&"a"));
        assert!(hits.contains(&&"c"));
        assert!(!hits.contains(&&"b"));
    }

    #[test]
    fn splitting_preserves_all_items() {
        let mut tree: RTree<usize, 2, 4> = RTree::new();
        for i in 0..50 {
            let p = i as f64;
            tree.insert(rect2(p, p, p + 1.0, p + 1.0), i);
        }
        assert_eq!(tree.len(), 50);
        let hits = tree.search(&rect2(-1.0, -1.0, 1000.0, 1000.0));
        assert_eq!(hits.len(), 50);
    }

    #[test]
    fn removal_frees_nodes_for_reuse() {
        let mut tree: RTree<usize, 2, 4> = RTree::new();
        for i in 0..50 {
            let p = i as f64;
            tree.insert(rect2(p, p, p + 1.0, p + 1.0), i);
        }
        let nodes_before = tree.nodes.len();
        let removed = tree.remove_where(&rect2(-1.0, -1.0, 1000.0, 1000.0), |_| true);
        assert_eq!(removed.len(), 50);
        assert_eq!(tree.len(), 0);

        for i in 0..50 {
            let p = i as f64;
            tree.insert(rect2(p, p, p + 1.0, p + 1.0), i);
        }
        // Reinserting the same number of items should reuse freed nodes
        // rather than growing the node array past its prior high-water
        // mark.
        assert!(tree.nodes.len() <= nodes_before);
    }

    #[test]
    fn min_items_matches_formula() {
        assert_eq!(min_items(8), 2);
        assert_eq!(min_items(20), 3);
    }
}
