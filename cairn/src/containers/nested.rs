//! Jagged nested array (component C3.6).
//!
//! Grounded on `original_source/include/cista/containers/nvec.h` and
//! `fws_multimap.h`: a flat payload array plus one index array per
//! level of nesting, where bucket `i` at a given level spans
//! `[index[i], index[i + 1])`. Depth 1 (`ArchivedNestedVec`) is a
//! multimap-like "vector of vectors"; depth 2 (`ArchivedNestedVec2`)
//! adds one more level, matching `mutable_fws_multimap.h`'s two-index
//! layout.

extern crate alloc;

use rancor::Fallible;

use super::vec::ArchivedVec;
use crate::de::Verify;
use crate::place::Place;
use crate::primitive::{ArchivedUsize, FixedUsize};
use crate::ser::RawSink;
use crate::traits::{Archive, Deserialize, Serialize};

/// The zero-copy, buffer-resident view of a depth-1 jagged nested
/// array: a sequence of variable-length buckets of `T`.
#[repr(C)]
pub struct ArchivedNestedVec<T> {
    index: ArchivedVec<ArchivedUsize>,
    payload: ArchivedVec<T>,
}

unsafe impl<T> crate::traits::Portable for ArchivedNestedVec<T> {}

impl<T> ArchivedNestedVec<T> {
    /// The number of buckets.
    ///
    /// Per the invariant that the index array always has one more
    /// entry than there are buckets (the final entry marks the end of
    /// the payload), this is `index.len() - 1` for any
    /// correctly-constructed instance, and `0` for an empty one.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`].
    pub unsafe fn len(&self) -> usize {
        self.index.len().saturating_sub(1)
    }

    /// Whether there are no buckets.
    ///
    /// # Safety
    ///
    /// Same precondition as [`ArchivedNestedVec::len`].
    pub unsafe fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The elements of bucket `i`.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`], and `i` must be `< self.len()`.
    pub unsafe fn bucket(&self, i: usize) -> &[T] {
        let index = self.index.as_slice();
        let start = index[i].to_native() as usize;
        let end = index[i + 1].to_native() as usize;
        &self.payload.as_slice()[start..end]
    }
}

impl<T: crate::de::Verify> crate::de::Verify for ArchivedNestedVec<T> {
    fn verify(&self, verifier: &mut crate::de::Verifier) -> Result<(), crate::error::Error> {
        self.index.verify(verifier)?;
        self.payload.verify(verifier)
    }
}

impl<T> core::fmt::Debug for ArchivedNestedVec<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArchivedNestedVec")
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// The zero-copy, buffer-resident view of a depth-2 jagged nested
/// array: a sequence of buckets, each itself a sequence of
/// variable-length sub-buckets of `T`.
#[repr(C)]
pub struct ArchivedNestedVec2<T> {
    outer_index: ArchivedVec<ArchivedUsize>,
    inner_index: ArchivedVec<ArchivedUsize>,
    payload: ArchivedVec<T>,
}

unsafe impl<T> crate::traits::Portable for ArchivedNestedVec2<T> {}

impl<T> ArchivedNestedVec2<T> {
    /// The number of top-level buckets.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`].
    pub unsafe fn len(&self) -> usize {
        self.outer_index.len().saturating_sub(1)
    }

    /// The number of sub-buckets within top-level bucket `i`.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`], and `i` must be `< self.len()`.
    pub unsafe fn inner_len(&self, i: usize) -> usize {
        let outer = self.outer_index.as_slice();
        (outer[i + 1].to_native() - outer[i].to_native()) as usize
    }

    /// The elements of sub-bucket `j` within top-level bucket `i`.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`], and `i`/`j` must be in bounds per
    /// [`ArchivedNestedVec2::len`] and [`ArchivedNestedVec2::inner_len`].
    pub unsafe fn bucket(&self, i: usize, j: usize) -> &[T] {
        let outer = self.outer_index.as_slice();
        let inner = self.inner_index.as_slice();
        let inner_base = outer[i].to_native() as usize;
        let start = inner[inner_base + j].to_native() as usize;
        let end = inner[inner_base + j + 1].to_native() as usize;
        &self.payload.as_slice()[start..end]
    }
}

impl<T: crate::de::Verify> crate::de::Verify for ArchivedNestedVec2<T> {
    fn verify(&self, verifier: &mut crate::de::Verifier) -> Result<(), crate::error::Error> {
        self.outer_index.verify(verifier)?;
        self.inner_index.verify(verifier)?;
        self.payload.verify(verifier)
    }
}

impl<T> core::fmt::Debug for ArchivedNestedVec2<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArchivedNestedVec2")
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// An owning depth-1 jagged nested array, the pre-serialization
/// counterpart of [`ArchivedNestedVec`]: a sequence of variable-length
/// buckets, flattened into one index array and one payload array at
/// serialization time rather than stored as a `Vec<Vec<T>>` (which
/// would archive as a vector of independently-heap-allocated vectors
/// instead of one contiguous run).
pub struct NestedVec<T>(alloc::vec::Vec<alloc::vec::Vec<T>>);

impl<T> NestedVec<T> {
    /// Creates an empty nested array.
    pub fn new() -> Self {
        Self(alloc::vec::Vec::new())
    }

    /// Appends a new bucket.
    pub fn push_bucket(&mut self, bucket: alloc::vec::Vec<T>) {
        self.0.push(bucket);
    }

    /// The number of buckets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no buckets.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for NestedVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<alloc::vec::Vec<alloc::vec::Vec<T>>> for NestedVec<T> {
    fn from(buckets: alloc::vec::Vec<alloc::vec::Vec<T>>) -> Self {
        Self(buckets)
    }
}

/// Where a nested array's index column and flattened payload were
/// written, recorded by [`Serialize::serialize`].
pub struct NestedVecResolver {
    index_pos: Option<usize>,
    index_len: usize,
    payload_pos: Option<usize>,
    payload_len: usize,
}

impl<T: Archive> Archive for NestedVec<T> {
    type Archived = ArchivedNestedVec<T::Archived>;
    type Resolver = NestedVecResolver;

    fn resolve(&self, resolver: Self::Resolver, out: Place<Self::Archived>) {
        let out_ptr = out.ptr();
        let index_field =
            unsafe { out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).index)) };
        ArchivedVec::resolve_header(resolver.index_pos, resolver.index_len, index_field);
        let payload_field =
            unsafe { out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).payload)) };
        ArchivedVec::resolve_header(resolver.payload_pos, resolver.payload_len, payload_field);
    }
}

impl<T, S> Serialize<S> for NestedVec<T>
where
    T: Serialize<S>,
    S: Fallible + RawSink + ?Sized,
{
    fn serialize(&self, serializer: &mut S) -> Result<Self::Resolver, S::Error> {
        let mut index: alloc::vec::Vec<FixedUsize> =
            alloc::vec::Vec::with_capacity(self.0.len() + 1);
        let mut flat_len = 0usize;
        index.push(0);
        for bucket in &self.0 {
            flat_len += bucket.len();
            index.push(flat_len as FixedUsize);
        }
        let flat: alloc::vec::Vec<&T> = self.0.iter().flat_map(|bucket| bucket.iter()).collect();

        let payload_pos = crate::ser::serialize_slice(&flat, serializer)?;
        let index_pos = crate::ser::serialize_slice(&index, serializer)?;

        Ok(NestedVecResolver {
            index_pos,
            index_len: index.len(),
            payload_pos,
            payload_len: flat_len,
        })
    }
}

impl<T, D> Deserialize<NestedVec<T>, D> for ArchivedNestedVec<T::Archived>
where
    T: Archive,
    T::Archived: Deserialize<T, D>,
    D: Fallible + ?Sized,
{
    fn deserialize(&self, deserializer: &mut D) -> Result<NestedVec<T>, D::Error> {
        // SAFETY: a buffer this method is reachable from has already
        // been validated by the deserialization verifier (C7).
        let len = unsafe { self.len() };
        let mut buckets = alloc::vec::Vec::with_capacity(len);
        for i in 0..len {
            let bucket = unsafe { self.bucket(i) }
                .iter()
                .map(|archived| archived.deserialize(deserializer))
                .collect::<Result<alloc::vec::Vec<T>, D::Error>>()?;
            buckets.push(bucket);
        }
        Ok(NestedVec(buckets))
    }
}

impl<T: crate::fingerprint::Fingerprinted> crate::fingerprint::Fingerprinted for NestedVec<T> {
    fn type_key() -> u64 {
        crate::fingerprint::compose_type_key("nested1", T::type_key())
    }

    fn shape() -> crate::fingerprint::Shape {
        crate::fingerprint::Shape::Nested(1)
    }

    fn fold(hash: u64, seen: &mut alloc::collections::BTreeSet<u64>) -> u64 {
        let key = Self::type_key();
        if !seen.insert(key) {
            return crate::checksum::fnv1a(hash, &key.to_le_bytes());
        }
        let h = crate::checksum::fnv1a(crate::checksum::fnv1a(hash, b"nested"), &1u32.to_le_bytes());
        T::fold(h, seen)
    }
}

/// An owning depth-2 jagged nested array, the pre-serialization
/// counterpart of [`ArchivedNestedVec2`].
pub struct NestedVec2<T>(alloc::vec::Vec<alloc::vec::Vec<alloc::vec::Vec<T>>>);

impl<T> NestedVec2<T> {
    /// Creates an empty nested array.
    pub fn new() -> Self {
        Self(alloc::vec::Vec::new())
    }

    /// Appends a new top-level bucket of sub-buckets.
    pub fn push_bucket(&mut self, bucket: alloc::vec::Vec<alloc::vec::Vec<T>>) {
        self.0.push(bucket);
    }

    /// The number of top-level buckets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no top-level buckets.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for NestedVec2<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<alloc::vec::Vec<alloc::vec::Vec<alloc::vec::Vec<T>>>> for NestedVec2<T> {
    fn from(buckets: alloc::vec::Vec<alloc::vec::Vec<alloc::vec::Vec<T>>>) -> Self {
        Self(buckets)
    }
}

/// Where a depth-2 nested array's two index columns and flattened
/// payload were written, recorded by [`Serialize::serialize`].
pub struct NestedVec2Resolver {
    outer_index_pos: Option<usize>,
    outer_index_len: usize,
    inner_index_pos: Option<usize>,
    inner_index_len: usize,
    payload_pos: Option<usize>,
    payload_len: usize,
}

impl<T: Archive> Archive for NestedVec2<T> {
    type Archived = ArchivedNestedVec2<T::Archived>;
    type Resolver = NestedVec2Resolver;

    fn resolve(&self, resolver: Self::Resolver, out: Place<Self::Archived>) {
        let out_ptr = out.ptr();
        let outer_field =
            unsafe { out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).outer_index)) };
        ArchivedVec::resolve_header(
            resolver.outer_index_pos,
            resolver.outer_index_len,
            outer_field,
        );
        let inner_field =
            unsafe { out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).inner_index)) };
        ArchivedVec::resolve_header(
            resolver.inner_index_pos,
            resolver.inner_index_len,
            inner_field,
        );
        let payload_field =
            unsafe { out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).payload)) };
        ArchivedVec::resolve_header(resolver.payload_pos, resolver.payload_len, payload_field);
    }
}

impl<T, S> Serialize<S> for NestedVec2<T>
where
    T: Serialize<S>,
    S: Fallible + RawSink + ?Sized,
{
    fn serialize(&self, serializer: &mut S) -> Result<Self::Resolver, S::Error> {
        let mut outer_index: alloc::vec::Vec<FixedUsize> =
            alloc::vec::Vec::with_capacity(self.0.len() + 1);
        let mut inner_index: alloc::vec::Vec<FixedUsize> = alloc::vec::Vec::new();
        let mut flat_len = 0usize;
        outer_index.push(0);
        inner_index.push(0);
        for outer_bucket in &self.0 {
            for inner_bucket in outer_bucket {
                flat_len += inner_bucket.len();
                inner_index.push(flat_len as FixedUsize);
            }
            outer_index.push(inner_index.len() as FixedUsize - 1);
        }
        let flat: alloc::vec::Vec<&T> = self
            .0
            .iter()
            .flat_map(|outer| outer.iter())
            .flat_map(|inner| inner.iter())
            .collect();

        let payload_pos = crate::ser::serialize_slice(&flat, serializer)?;
        let inner_index_pos = crate::ser::serialize_slice(&inner_index, serializer)?;
        let outer_index_pos = crate::ser::serialize_slice(&outer_index, serializer)?;

        Ok(NestedVec2Resolver {
            outer_index_pos,
            outer_index_len: outer_index.len(),
            inner_index_pos,
            inner_index_len: inner_index.len(),
            payload_pos,
            payload_len: flat_len,
        })
    }
}

impl<T, D> Deserialize<NestedVec2<T>, D> for ArchivedNestedVec2<T::Archived>
where
    T: Archive,
    T::Archived: Deserialize<T, D>,
    D: Fallible + ?Sized,
{
    fn deserialize(&self, deserializer: &mut D) -> Result<NestedVec2<T>, D::Error> {
        // SAFETY: a buffer this method is reachable from has already
        // been validated by the deserialization verifier (C7).
        let len = unsafe { self.len() };
        let mut outer = alloc::vec::Vec::with_capacity(len);
        for i in 0..len {
            let inner_len = unsafe { self.inner_len(i) };
            let mut inner = alloc::vec::Vec::with_capacity(inner_len);
            for j in 0..inner_len {
                let bucket = unsafe { self.bucket(i, j) }
                    .iter()
                    .map(|archived| archived.deserialize(deserializer))
                    .collect::<Result<alloc::vec::Vec<T>, D::Error>>()?;
                inner.push(bucket);
            }
            outer.push(inner);
        }
        Ok(NestedVec2(outer))
    }
}

impl<T: crate::fingerprint::Fingerprinted> crate::fingerprint::Fingerprinted for NestedVec2<T> {
    fn type_key() -> u64 {
        crate::fingerprint::compose_type_key("nested2", T::type_key())
    }

    fn shape() -> crate::fingerprint::Shape {
        crate::fingerprint::Shape::Nested(2)
    }

    fn fold(hash: u64, seen: &mut alloc::collections::BTreeSet<u64>) -> u64 {
        let key = Self::type_key();
        if !seen.insert(key) {
            return crate::checksum::fnv1a(hash, &key.to_le_bytes());
        }
        let h = crate::checksum::fnv1a(crate::checksum::fnv1a(hash, b"nested"), &2u32.to_le_bytes());
        T::fold(h, seen)
    }
}
