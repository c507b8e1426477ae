//! Swiss-style hash table (components C3.5 / C4.6).
//!
//! Grounded on `original_source/include/cista/containers/hash_storage.h`
//! for the overall group-probing shape, with the exact bit-level control
//! scheme pinned to what the specification requires (the reference
//! implementation's own `ctrl_t` enum and hash split use different
//! values): `GROUP_WIDTH = 8` ([`crate::simd::GROUP_WIDTH`]), `H1 = hash
//! >> 7` selects the probe seed, `H2 = hash & 0x7F` is the stored
//! control byte, `EMPTY = 0b1000_0000`, `DELETED = 0b1111_1110`, `END =
//! 0b1111_1111`. Capacity is always `2^k - 1`; control bytes are never
//! part of the serialized payload proper -- per invariant I6, the
//! control-byte array is not addressed by its own offset pointer at
//! all. It is written immediately after the entry array (with `align =
//! 1`, so no padding separates the two) and located on read by adding
//! `capacity * size_of::<T>()` to the entries pointer's resolved
//! address, so there is exactly one free-offset pointer per table
//! rather than a second one that could independently disagree with the
//! entries/capacity it is supposed to describe.

extern crate alloc;

use core::marker::PhantomData;

use rancor::Fallible;

use crate::place::Place;
use crate::primitive::{ArchivedUsize, FixedUsize};
use crate::rel_ptr::RawRelPtr;
use crate::ser::{RawSink, RawSinkExt, SinkExt};
use crate::simd::{BitMask, Group, GROUP_WIDTH};
use crate::traits::{Archive, Serialize};

/// Control byte meaning "this slot has never held an entry".
pub const EMPTY: u8 = 0b1000_0000;
/// Control byte meaning "an entry was here and was erased".
pub const DELETED: u8 = 0b1111_1110;
/// Control byte written past the last real group, terminating iteration.
pub const END: u8 = 0b1111_1111;

/// Splits a 64-bit hash into its probe seed (`H1`) and stored control
/// byte (`H2`).
pub fn h1_h2(hash: u64) -> (u64, u8) {
    (hash >> 7, (hash & 0x7F) as u8)
}

/// The smallest `2^k - 1` capacity that keeps `len` entries under the
/// load factor bound from §4.6 (`capacity - capacity / 8`, special-
/// cased to `6` live entries at `capacity == 7`).
pub fn capacity_for_len(len: usize) -> usize {
    let mut capacity = GROUP_WIDTH - 1; // smallest table: 7
    loop {
        let bound = load_factor_bound(capacity);
        if len <= bound {
            return capacity;
        }
        capacity = capacity * 2 + 1;
    }
}

/// The maximum number of live entries a table of the given `capacity`
/// may hold before it must grow.
pub fn load_factor_bound(capacity: usize) -> usize {
    if capacity == 7 {
        6
    } else {
        capacity - capacity / 8
    }
}

/// A probe sequence implementing triangular (quadratic) probing over a
/// table of the given capacity, matching the reference implementation's
/// `probe_seq`.
pub struct ProbeSeq {
    mask: usize,
    offset: usize,
    index: usize,
}

impl ProbeSeq {
    /// Starts a probe sequence seeded by `h1` over a table of
    /// `capacity` slots (`capacity` must be `2^k - 1`).
    pub fn new(h1: u64, capacity: usize) -> Self {
        Self {
            mask: capacity,
            offset: (h1 as usize) & capacity,
            index: 0,
        }
    }

    /// The current group's starting slot index.
    pub fn group_index(&self) -> usize {
        self.offset
    }

    /// Advances to the next group in the probe sequence.
    pub fn advance(&mut self) {
        self.index += GROUP_WIDTH;
        self.offset = (self.offset + self.index) & self.mask;
    }
}

/// The zero-copy, buffer-resident view of a swiss-style hash table over
/// entries of type `T`.
///
/// `T` is the stored entry type: a bare key for a set, or a `(key,
/// value)` pair for a map (see [`super::hash_map::ArchivedHashMap`] and
/// [`super::hash_set::ArchivedHashSet`]).
#[repr(C)]
pub struct ArchivedHashTable<T> {
    entries_ptr: RawRelPtr,
    len: ArchivedUsize,
    capacity: ArchivedUsize,
    _marker: PhantomData<T>,
}

unsafe impl<T> crate::traits::Portable for ArchivedHashTable<T> {}

impl<T> ArchivedHashTable<T> {
    /// The number of live entries.
    pub fn len(&self) -> usize {
        self.len.to_native() as usize
    }

    /// Whether the table has no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The table's slot capacity (always `2^k - 1`, or `0` for an empty
    /// table with no backing allocation).
    pub fn capacity(&self) -> usize {
        self.capacity.to_native() as usize
    }

    /// # Safety
    ///
    /// The buffer must already have been validated: the entry array
    /// must have `capacity` elements of type `T`, immediately followed
    /// (per invariant I6, no independent pointer, no gap) by a
    /// control-byte array of `capacity + 1` bytes (the extra byte is
    /// the `END` sentinel).
    unsafe fn control_bytes(&self) -> &[u8] {
        if self.capacity() == 0 {
            return &[];
        }
        let entries_addr = self
            .entries_ptr
            .target_addr()
            .expect("ArchivedHashTable entries pointer was not validated");
        let ctrl_addr = entries_addr + self.capacity() * core::mem::size_of::<T>();
        core::slice::from_raw_parts(ctrl_addr as *const u8, self.capacity() + 1)
    }

    /// # Safety
    ///
    /// Same precondition as [`ArchivedHashTable::control_bytes`].
    unsafe fn entries(&self) -> &[T] {
        if self.capacity() == 0 {
            return &[];
        }
        let addr = self
            .entries_ptr
            .target_addr()
            .expect("ArchivedHashTable entries pointer was not validated");
        core::slice::from_raw_parts(addr as *const T, self.capacity())
    }

    /// Looks up the entry at `hash`, calling `eq` to confirm full
    /// equality on every control-byte match, per §4.6's probe/compare
    /// loop.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`].
    pub unsafe fn find(&self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Option<&T> {
        if self.capacity() == 0 {
            return None;
        }
        let (h1, h2) = h1_h2(hash);
        let ctrl = self.control_bytes();
        let entries = self.entries();
        let mut probe = ProbeSeq::new(h1, self.capacity());

        loop {
            let start = probe.group_index();
            let available = ctrl.len() - start.min(ctrl.len());
            let group = if available >= GROUP_WIDTH {
                Group::load(&ctrl[start..])
            } else {
                let mut wrapped = [0u8; GROUP_WIDTH];
                for i in 0..GROUP_WIDTH {
                    wrapped[i] = ctrl[(start + i) % ctrl.len().max(1)];
                }
                Group::load(&wrapped)
            };

            let matches: BitMask = group.match_byte(h2);
            for lane in matches {
                let idx = (start + lane) % entries.len().max(1);
                if eq(&entries[idx]) {
                    return Some(&entries[idx]);
                }
            }
            if !group.match_empty().is_empty() {
                return None;
            }
            probe.advance();
        }
    }

    /// Iterates over every live entry in slot order.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`].
    pub unsafe fn iter(&self) -> impl Iterator<Item = &T> {
        let ctrl = self.control_bytes();
        let entries = self.entries();
        (0..entries.len()).filter_map(move |i| {
            let c = ctrl.get(i).copied().unwrap_or(EMPTY);
            if c & 0x80 == 0 {
                Some(&entries[i])
            } else {
                None
            }
        })
    }
}

impl<T> core::fmt::Debug for ArchivedHashTable<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArchivedHashTable")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl<T: crate::de::Verify> crate::de::Verify for ArchivedHashTable<T> {
    fn verify(&self, verifier: &mut crate::de::Verifier) -> Result<(), crate::error::Error> {
        if self.capacity() == 0 {
            return Ok(());
        }
        if (self.capacity() + 1).count_ones() != 1 {
            return Err(crate::error::Error::HashTableInvariantViolated(
                "hash table capacity is not 2^k - 1",
            ));
        }
        if self.len() > load_factor_bound(self.capacity()) {
            return Err(crate::error::Error::HashTableInvariantViolated(
                "hash table load factor exceeds its capacity's bound",
            ));
        }

        let entries_addr = self.entries_ptr.target_addr().ok_or(
            crate::error::Error::OffsetOutOfBounds {
                offset: 0,
                size: 0,
                len: verifier.buffer().len(),
            },
        )?;
        let entries_offset = verifier.offset_of(entries_addr);
        let entries_len = self.capacity() * core::mem::size_of::<T>();
        let ctrl_len = self.capacity() + 1;
        let region_end = entries_offset
            .checked_add(entries_len)
            .and_then(|end| end.checked_add(ctrl_len))
            .ok_or(crate::error::Error::OversizedContainer {
                offset: entries_offset as i64,
                declared: self.capacity() as u64,
                elem_size: core::mem::size_of::<T>(),
                remaining: verifier.buffer().len().saturating_sub(entries_offset),
            })?;
        verifier.check_bounds(entries_offset, entries_len, core::mem::align_of::<T>())?;

        verifier.in_subtree(entries_offset, region_end, |v| {
            let ctrl = unsafe { self.control_bytes() };
            if ctrl[self.capacity()] != END {
                return Err(crate::error::Error::HashTableInvariantViolated(
                    "control-byte array does not end with the END sentinel",
                ));
            }
            let mut live = 0usize;
            for entry in unsafe { self.iter() } {
                entry.verify(v)?;
                live += 1;
            }
            if live != self.len() {
                return Err(crate::error::Error::HashTableInvariantViolated(
                    "control bytes disagree with the declared live entry count",
                ));
            }
            Ok(())
        })
    }
}

/// Recomputes a table's control-byte array from scratch given each live
/// entry's hash, matching the specification's requirement that control
/// bytes are derived state, never themselves serialized as
/// authoritative.
pub fn build_control_bytes(capacity: usize, hashes: &[u64]) -> alloc::vec::Vec<u8> {
    let mut ctrl = alloc::vec![EMPTY; capacity + 1];
    ctrl[capacity] = END;
    for &hash in hashes {
        let (h1, h2) = h1_h2(hash);
        let mut probe = ProbeSeq::new(h1, capacity);
        loop {
            let start = probe.group_index();
            let mut placed = false;
            for i in 0..GROUP_WIDTH.min(capacity) {
                let idx = (start + i) % capacity;
                if ctrl[idx] == EMPTY {
                    ctrl[idx] = h2;
                    placed = true;
                    break;
                }
            }
            if placed {
                break;
            }
            probe.advance();
        }
    }
    ctrl
}

/// Assigns each hash's index in `hashes` to a slot in a table of
/// `capacity`, using the same triangular probe sequence
/// [`build_control_bytes`] uses, so the two stay consistent: slot `i`'s
/// control byte is derived from `hashes[slots[i].unwrap()]` whenever
/// `slots[i]` is `Some`.
fn place_by_hash(capacity: usize, hashes: &[u64]) -> alloc::vec::Vec<Option<usize>> {
    let mut slots = alloc::vec![None; capacity];
    for (idx, &hash) in hashes.iter().enumerate() {
        let (h1, _) = h1_h2(hash);
        let mut probe = ProbeSeq::new(h1, capacity);
        loop {
            let start = probe.group_index();
            let mut placed = false;
            for i in 0..GROUP_WIDTH.min(capacity) {
                let slot_idx = (start + i) % capacity;
                if slots[slot_idx].is_none() {
                    slots[slot_idx] = Some(idx);
                    placed = true;
                    break;
                }
            }
            if placed {
                break;
            }
            probe.advance();
        }
    }
    slots
}

fn control_bytes_from_slots(
    capacity: usize,
    slots: &[Option<usize>],
    hashes: &[u64],
) -> alloc::vec::Vec<u8> {
    let mut ctrl = alloc::vec![EMPTY; capacity + 1];
    ctrl[capacity] = END;
    for (slot_idx, item_idx) in slots.iter().enumerate() {
        if let Some(idx) = item_idx {
            let (_, h2) = h1_h2(hashes[*idx]);
            ctrl[slot_idx] = h2;
        }
    }
    ctrl
}

/// Where a table's entry array was written, recorded by
/// [`ArchivedHashTable::<T>::serialize_from_iter`]. `None` for an empty
/// table, which has no backing allocation at all. The control-byte
/// array carries no position of its own: it is appended immediately
/// after the entries and located relative to `entries_pos` (see
/// [`ArchivedHashTable::control_bytes`]).
pub struct HashTableResolver {
    entries_pos: Option<usize>,
}

impl<T> ArchivedHashTable<T> {
    /// Serializes `items` (with precomputed `hashes`, in the same
    /// order) as a hash table: each item lands in the slot its hash
    /// probes to under the same triangular sequence a lookup walks,
    /// with the control-byte array recomputed from that placement
    /// rather than carried as independent authoritative state.
    pub fn serialize_from_iter<U, I, H, S>(
        items: I,
        hashes: H,
        serializer: &mut S,
    ) -> Result<HashTableResolver, S::Error>
    where
        U: Serialize<S, Archived = T>,
        I: ExactSizeIterator<Item = U>,
        H: ExactSizeIterator<Item = u64>,
        S: Fallible + RawSink + ?Sized,
    {
        let len = items.len();
        if len == 0 {
            return Ok(HashTableResolver { entries_pos: None });
        }

        let hashes: alloc::vec::Vec<u64> = hashes.collect();
        let mut item_opts: alloc::vec::Vec<Option<U>> = items.map(Some).collect();
        let capacity = capacity_for_len(len);
        let slots = place_by_hash(capacity, &hashes);

        let mut resolvers: alloc::vec::Vec<Option<U::Resolver>> =
            alloc::vec::Vec::with_capacity(capacity);
        for slot in &slots {
            match slot {
                Some(idx) => {
                    let value = item_opts[*idx]
                        .as_ref()
                        .expect("a slot references each item exactly once");
                    resolvers.push(Some(value.serialize(serializer)?));
                }
                None => resolvers.push(None),
            }
        }

        let align = core::mem::align_of::<T>();
        let size = core::mem::size_of::<T>();
        let mut entries_pos = None;
        for (slot, resolver) in slots.iter().zip(resolvers) {
            match (slot, resolver) {
                (Some(idx), Some(resolver)) => {
                    let value = item_opts[*idx]
                        .take()
                        .expect("a slot references each item exactly once");
                    let pos = serializer.resolve_aligned(&value, resolver)?;
                    entries_pos.get_or_insert(pos);
                }
                _ => {
                    let pos = serializer.reserve_zeroed(align, size)?;
                    entries_pos.get_or_insert(pos);
                }
            }
        }

        // The control bytes are appended right behind the entries with
        // no intervening writes and `align = 1`, so they always land at
        // `entries_pos + capacity * size_of::<T>()` with no padding in
        // between; `control_bytes` recomputes that address instead of
        // this append returning its own position.
        let ctrl = control_bytes_from_slots(capacity, &slots, &hashes);
        serializer.append_aligned(1, &ctrl)?;

        Ok(HashTableResolver { entries_pos })
    }

    /// Resolves an archived hash table of `len` live entries from a
    /// resolver produced by [`ArchivedHashTable::<T>::serialize_from_iter`].
    pub fn resolve_from_len(len: usize, resolver: HashTableResolver, out: Place<Self>) {
        let out_ptr = out.ptr();
        unsafe {
            let entries_field =
                out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).entries_ptr));
            match resolver.entries_pos {
                Some(pos) => {
                    RawRelPtr::try_emplace(
                        entries_field.pos(),
                        pos,
                        entries_field.ptr() as *mut u8,
                    )
                    .expect("hash table entry position collides with a reserved sentinel");
                }
                None => RawRelPtr::emplace_null(entries_field.ptr() as *mut u8),
            }

            (*out_ptr).len = ArchivedUsize::from(len as FixedUsize);
            let capacity = if len == 0 { 0 } else { capacity_for_len(len) };
            (*out_ptr).capacity = ArchivedUsize::from(capacity as FixedUsize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_always_mersenne() {
        for len in [0, 1, 6, 7, 20, 100] {
            let cap = capacity_for_len(len);
            assert_eq!((cap + 1).count_ones(), 1, "cap={cap} not 2^k-1");
        }
    }

    #[test]
    fn load_factor_special_case_at_seven() {
        assert_eq!(load_factor_bound(7), 6);
        assert_eq!(load_factor_bound(15), 15 - 15 / 8);
    }

    #[test]
    fn h1_h2_split_matches_spec() {
        let hash = 0xABCD_1234_0000_00FFu64;
        let (h1, h2) = h1_h2(hash);
        assert_eq!(h1, hash >> 7);
        assert_eq!(h2, (hash & 0x7F) as u8);
    }

    #[test]
    fn control_bytes_terminate_with_end() {
        let ctrl = build_control_bytes(7, &[]);
        assert_eq!(ctrl[7], END);
        assert!(ctrl[..7].iter().all(|&b| b == EMPTY));
    }
}
