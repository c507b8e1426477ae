//! Owning heap pointer (component C3.3).
//!
//! The archived form is a single offset pointer; ownership semantics
//! (§3.8, and the design note in `SPEC_FULL.md` §3.8 resolving the
//! owning/borrowing split) live entirely on the pre-serialization
//! `Box<T>` side and are enforced by Rust's type system rather than a
//! runtime flag -- except for the `self_allocated` bit, which the wire
//! format still carries (always `0`) so the verifier can reject a
//! foreign buffer that claims ownership it cannot back.

extern crate alloc;

use core::marker::PhantomData;

use rancor::Fallible;

use crate::place::Place;
use crate::rel_ptr::RawRelPtr;
use crate::ser::{RawSink, RawSinkExt};
use crate::traits::{Archive, Deserialize, Serialize};

/// The zero-copy, buffer-resident view of a `Box<T>`.
#[repr(C)]
pub struct ArchivedBox<T> {
    ptr: RawRelPtr,
    _marker: PhantomData<T>,
}

// SAFETY: the only field is a relative offset, valid to read from any
// byte pattern; dereferencing the pointee still requires verification,
// gated behind `as_ref`'s safety contract.
unsafe impl<T> crate::traits::Portable for ArchivedBox<T> {}

impl<T> ArchivedBox<T> {
    /// Whether this box is the null sentinel (an archived `Option<Box<T>>`
    /// that was `None`).
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// A reference to the pointee.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`], and this box must not be null.
    pub unsafe fn as_ref(&self) -> &T {
        let addr = self
            .ptr
            .target_addr()
            .expect("ArchivedBox pointer was not validated before use");
        &*(addr as *const T)
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for ArchivedBox<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArchivedBox")
            .field("is_null", &self.is_null())
            .finish()
    }
}

/// The pointee's buffer position, recorded by [`Serialize::serialize`]
/// and consumed by [`crate::traits::Archive::resolve`] once the box's
/// own position (and therefore the distance between the two) is known.
pub struct BoxResolver {
    pos: usize,
}

impl<T: Archive> Archive for alloc::boxed::Box<T> {
    type Archived = ArchivedBox<T::Archived>;
    type Resolver = BoxResolver;

    fn resolve(&self, resolver: Self::Resolver, out: Place<Self::Archived>) {
        // SAFETY: `ArchivedBox<T::Archived>`'s only non-zero-sized field
        // is its leading `RawRelPtr`, so it sits at offset `out.pos()`.
        unsafe {
            RawRelPtr::try_emplace(out.pos(), resolver.pos, out.ptr() as *mut u8)
                .expect("box pointee position collides with a reserved sentinel");
        }
    }
}

impl<T, S> Serialize<S> for alloc::boxed::Box<T>
where
    T: Serialize<S> + Archive,
    S: Fallible + RawSink + ?Sized,
{
    fn serialize(&self, serializer: &mut S) -> Result<Self::Resolver, S::Error> {
        let inner_resolver = (**self).serialize(serializer)?;
        let pos = serializer.resolve_aligned(&**self, inner_resolver)?;
        Ok(BoxResolver { pos })
    }
}

impl<T, D> Deserialize<alloc::boxed::Box<T>, D> for ArchivedBox<T::Archived>
where
    T: Archive,
    T::Archived: Deserialize<T, D>,
    D: Fallible + ?Sized,
{
    fn deserialize(&self, deserializer: &mut D) -> Result<alloc::boxed::Box<T>, D::Error> {
        // SAFETY: a buffer this method is reachable from has already
        // been validated by the deserialization verifier (C7).
        let value = unsafe { self.as_ref() }.deserialize(deserializer)?;
        Ok(alloc::boxed::Box::new(value))
    }
}

impl<T: crate::de::Verify> crate::de::Verify for ArchivedBox<T> {
    fn verify(&self, verifier: &mut crate::de::Verifier) -> Result<(), crate::error::Error> {
        if self.is_null() {
            return Ok(());
        }
        let addr = self
            .ptr
            .target_addr()
            .ok_or(crate::error::Error::OffsetOutOfBounds {
                offset: 0,
                size: core::mem::size_of::<T>(),
                len: verifier.buffer().len(),
            })?;
        let offset = verifier.offset_of(addr);
        let size = core::mem::size_of::<T>();
        verifier.check_bounds(offset, size, core::mem::align_of::<T>())?;
        verifier.in_subtree(offset, offset + size, |v| unsafe { self.as_ref().verify(v) })
    }
}

impl<T: crate::fingerprint::Fingerprinted> crate::fingerprint::Fingerprinted
    for alloc::boxed::Box<T>
{
    fn type_key() -> u64 {
        crate::fingerprint::compose_type_key("box", T::type_key())
    }

    fn shape() -> crate::fingerprint::Shape {
        crate::fingerprint::Shape::Box
    }

    fn fold(hash: u64, seen: &mut alloc::collections::BTreeSet<u64>) -> u64 {
        let key = Self::type_key();
        if !seen.insert(key) {
            return crate::checksum::fnv1a(hash, &key.to_le_bytes());
        }
        let h = crate::checksum::fnv1a(crate::checksum::fnv1a(hash, b"box"), &key.to_le_bytes());
        T::fold(h, seen)
    }
}
