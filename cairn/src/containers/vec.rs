//! Growable array (component C3.2).
//!
//! Grounded on `original_source/include/cista/containers/vector.h`: the
//! archived layout keeps the same three fields the reference
//! implementation's `el_`/`used_size_`/`allocated_size_` triple
//! represents, but `allocated_size_` collapses into `len` twice over
//! (`capacity == len` in every buffer this crate writes) since a
//! zero-copy view never appends in place -- the field is kept in the
//! wire layout anyway so foreign buffers that do over-allocate still
//! round-trip through [`ArchivedVec::capacity`].

extern crate alloc;

use core::{marker::PhantomData, mem, slice};

use rancor::Fallible;

use crate::place::Place;
use crate::primitive::ArchivedUsize;
use crate::rel_ptr::RawRelPtr;
use crate::ser::RawSink;
use crate::traits::{Archive, Deserialize, Serialize};

/// The zero-copy, buffer-resident view of a `Vec<T>`.
///
/// Its layout mirrors the reference implementation's vector header: a
/// relative pointer to the first element, the live element count, and
/// the allocated capacity (always equal to the live count for buffers
/// this crate writes, per the design note above).
#[repr(C)]
pub struct ArchivedVec<T> {
    ptr: RawRelPtr,
    len: ArchivedUsize,
    cap: ArchivedUsize,
    _marker: PhantomData<T>,
}

// SAFETY: every field is either a relative offset or a fixed-width
// archived integer, both of which are valid to read from any byte
// pattern a verified buffer can produce; `T` is constrained to
// `Portable` wherever a caller can obtain a `&[T]` (see `as_slice`).
unsafe impl<T> crate::traits::Portable for ArchivedVec<T> {}

impl<T> ArchivedVec<T> {
    /// The number of elements.
    pub fn len(&self) -> usize {
        self.len.to_native() as usize
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of elements the backing allocation was sized for at
    /// serialization time.
    pub fn capacity(&self) -> usize {
        self.cap.to_native() as usize
    }

    /// A borrowed view of the elements.
    ///
    /// # Safety
    ///
    /// The buffer this `ArchivedVec` lives in must already have been
    /// validated by [`crate::de::Verifier`]: that the offset pointer
    /// resolves in bounds, is aligned for `T`, and that `len * size_of::<T>()`
    /// does not overshoot the buffer.
    pub unsafe fn as_slice(&self) -> &[T] {
        if self.len() == 0 {
            return &[];
        }
        let ptr = self
            .ptr
            .target_addr()
            .expect("ArchivedVec pointer was not validated before use")
            as *const T;
        slice::from_raw_parts(ptr, self.len())
    }

    /// Indexes into the array, returning `None` if out of bounds.
    ///
    /// # Safety
    ///
    /// Same precondition as [`ArchivedVec::as_slice`].
    pub unsafe fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// Writes this array's header fields (offset pointer, length,
    /// capacity) in place, given the position its elements were already
    /// written at (or `None` for an empty array).
    ///
    /// Used directly by container types that build their own
    /// `ArchivedVec` fields without routing through `Vec<T>: Archive`
    /// (the jagged nested array's index/payload columns, the R-tree's
    /// node tables).
    pub(crate) fn resolve_header(pos: Option<usize>, len: usize, out: Place<Self>) {
        let out_ptr = out.ptr();
        unsafe {
            match pos {
                Some(target) => {
                    RawRelPtr::try_emplace(out.pos(), target, out_ptr as *mut u8)
                        .expect("vec element position collides with a reserved sentinel");
                }
                None => RawRelPtr::emplace_null(out_ptr as *mut u8),
            }
            let len = len as crate::primitive::FixedUsize;
            (*out_ptr).len = ArchivedUsize::from(len);
            (*out_ptr).cap = ArchivedUsize::from(len);
        }
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for ArchivedVec<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArchivedVec")
            .field("len", &self.len())
            .field("cap", &self.capacity())
            .finish()
    }
}

/// Size in bytes of the header emitted for a `Vec<T>` of any element
/// type, used by the serializer to reserve space before the elements
/// themselves are appended.
pub const HEADER_SIZE: usize = mem::size_of::<RawRelPtr>()
    + mem::size_of::<ArchivedUsize>() * 2;

/// The buffer position of a `Vec<T>`'s first element, recorded during
/// [`Serialize::serialize`]; `None` for an empty vector, which archives
/// to a null offset pointer rather than a dangling one-past-the-end
/// position.
pub struct VecResolver {
    pos: Option<usize>,
}

impl<T: Archive> Archive for alloc::vec::Vec<T> {
    type Archived = ArchivedVec<T::Archived>;
    type Resolver = VecResolver;

    fn resolve(&self, resolver: Self::Resolver, out: Place<Self::Archived>) {
        ArchivedVec::resolve_header(resolver.pos, self.len(), out);
    }
}

impl<T, S> Serialize<S> for alloc::vec::Vec<T>
where
    T: Serialize<S> + Archive,
    S: Fallible + RawSink + ?Sized,
{
    fn serialize(&self, serializer: &mut S) -> Result<Self::Resolver, S::Error> {
        crate::ser::serialize_slice(self, serializer).map(|pos| VecResolver { pos })
    }
}

impl<T, D> Deserialize<alloc::vec::Vec<T>, D> for ArchivedVec<T::Archived>
where
    T: Archive,
    T::Archived: Deserialize<T, D>,
    D: Fallible + ?Sized,
{
    fn deserialize(&self, deserializer: &mut D) -> Result<alloc::vec::Vec<T>, D::Error> {
        // SAFETY: a buffer this method is reachable from has already
        // been validated by the deserialization verifier (C7).
        unsafe { self.as_slice() }
            .iter()
            .map(|archived| archived.deserialize(deserializer))
            .collect()
    }
}

impl<T: crate::de::Verify> crate::de::Verify for ArchivedVec<T> {
    fn verify(&self, verifier: &mut crate::de::Verifier) -> Result<(), crate::error::Error> {
        if self.len() == 0 {
            return Ok(());
        }
        let addr = self
            .ptr
            .target_addr()
            .ok_or(crate::error::Error::OffsetOutOfBounds {
                offset: 0,
                size: 0,
                len: verifier.buffer().len(),
            })?;
        let offset = verifier.offset_of(addr);
        let total = mem::size_of::<T>().checked_mul(self.len()).ok_or(
            crate::error::Error::OversizedContainer {
                offset: offset as i64,
                declared: self.len() as u64,
                elem_size: mem::size_of::<T>(),
                remaining: verifier.buffer().len().saturating_sub(offset),
            },
        )?;
        verifier.check_bounds(offset, total, mem::align_of::<T>())?;
        verifier.in_subtree(offset, offset + total, |v| {
            for element in unsafe { self.as_slice() } {
                element.verify(v)?;
            }
            Ok(())
        })
    }
}

impl<T: crate::fingerprint::Fingerprinted> crate::fingerprint::Fingerprinted
    for alloc::vec::Vec<T>
{
    fn type_key() -> u64 {
        crate::fingerprint::compose_type_key("vec", T::type_key())
    }

    fn shape() -> crate::fingerprint::Shape {
        crate::fingerprint::Shape::Vec
    }

    fn fold(hash: u64, seen: &mut alloc::collections::BTreeSet<u64>) -> u64 {
        let key = Self::type_key();
        if !seen.insert(key) {
            return crate::checksum::fnv1a(hash, &key.to_le_bytes());
        }
        let h = crate::checksum::fnv1a(
            crate::checksum::fnv1a(hash, b"vec"),
            &key.to_le_bytes(),
        );
        T::fold(h, seen)
    }
}
