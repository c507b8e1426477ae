//! Shared, reference-counted pointer (component C3.3 continued).
//!
//! `Rc<T>` and `Arc<T>` archive to the identical wire shape as
//! [`crate::containers::boxed::ArchivedBox`] -- a single offset pointer
//! to the pointee -- but unlike a box, more than one pointer in the
//! object graph may target the same pointee, so serializing must
//! collapse repeat visits to one on-disk copy instead of duplicating
//! it, and verifying must not re-walk (or, for a maliciously crafted
//! buffer, infinitely re-walk by following an offset cycle) a pointee
//! already validated through another handle. Grounded on the teacher's
//! `rc.rs`, whose `ArchivedRc::serialize_from_ref` calls
//! `Serializer::serialize_shared` to get the same collapse and whose
//! `bytecheck` `Verify` impl calls `register_shared_ptr` to get the
//! same dedup on the read side; `cairn` reaches the same two behaviors
//! through [`crate::ser::Engine::already_serialized`]/
//! [`crate::ser::Engine::record_serialized`] and
//! [`crate::de::Verifier::mark_visited`] respectively, since this crate
//! already has both mechanisms (the first for the engine's own pending-
//! patch dedup, the second for verifier cycle-breaking) rather than
//! needing a parallel "shared pointer registry".
//!
//! Deserializing never dedups: each `Rc`/`Arc` field reached from the
//! root allocates its own fresh pointee, so two archived handles that
//! shared a pointee on the wire come back as two independent
//! allocations after `deserialize`. Recovering the sharing would need a
//! deserializer-side pointee cache keyed by source offset, which this
//! crate doesn't carry (see `SPEC_FULL.md`'s note on this tradeoff).

extern crate alloc;

use core::marker::PhantomData;

use rancor::Fallible;

use crate::de::{Verifier, Verify};
use crate::error::Error;
use crate::place::Place;
use crate::rel_ptr::RawRelPtr;
use crate::ser::{Engine, RawSink, RawSinkExt};
use crate::traits::{Archive, Deserialize, Serialize};

/// The zero-copy, buffer-resident view of an `Rc<T>` or `Arc<T>`.
#[repr(C)]
pub struct ArchivedRc<T> {
    ptr: RawRelPtr,
    _marker: PhantomData<T>,
}

// SAFETY: the only field is a relative offset, valid to read from any
// byte pattern; dereferencing the pointee still requires verification,
// gated behind `as_ref`'s safety contract.
unsafe impl<T> crate::traits::Portable for ArchivedRc<T> {}

impl<T> ArchivedRc<T> {
    /// Whether this pointer is the null sentinel (an archived
    /// `Option<Rc<T>>` that was `None`).
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// A reference to the pointee.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`], and this pointer must not be null.
    pub unsafe fn as_ref(&self) -> &T {
        let addr = self
            .ptr
            .target_addr()
            .expect("ArchivedRc pointer was not validated before use");
        &*(addr as *const T)
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for ArchivedRc<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArchivedRc")
            .field("is_null", &self.is_null())
            .finish()
    }
}

/// The pointee's buffer position. Identical in shape to
/// [`crate::containers::boxed::BoxResolver`]: the position was either
/// just written, or recovered from the engine's pending map because
/// another handle to the same pointee already wrote it.
pub struct RcResolver {
    pos: usize,
}

macro_rules! impl_shared_pointer {
    ($ptr:ident, $tag:literal) => {
        impl<T: Archive> Archive for $ptr<T> {
            type Archived = ArchivedRc<T::Archived>;
            type Resolver = RcResolver;

            fn resolve(&self, resolver: Self::Resolver, out: Place<Self::Archived>) {
                // SAFETY: `ArchivedRc<T::Archived>`'s only non-zero-sized
                // field is its leading `RawRelPtr`, so it sits at offset
                // `out.pos()`.
                unsafe {
                    RawRelPtr::try_emplace(out.pos(), resolver.pos, out.ptr() as *mut u8)
                        .expect("pointee position collides with a reserved sentinel");
                }
            }
        }

        impl<T, Inner> Serialize<Engine<Inner>> for $ptr<T>
        where
            T: Serialize<Engine<Inner>> + Archive,
            Inner: RawSink,
        {
            fn serialize(
                &self,
                serializer: &mut Engine<Inner>,
            ) -> Result<Self::Resolver, <Engine<Inner> as Fallible>::Error> {
                let addr = $ptr::as_ptr(self) as *const () as usize;
                if let Some(pos) = serializer.already_serialized(addr) {
                    return Ok(RcResolver { pos });
                }
                let inner_resolver = (**self).serialize(serializer)?;
                let pos = serializer.resolve_aligned(&**self, inner_resolver)?;
                serializer.record_serialized(addr, pos);
                Ok(RcResolver { pos })
            }
        }

        impl<T, D> Deserialize<$ptr<T>, D> for ArchivedRc<T::Archived>
        where
            T: Archive,
            T::Archived: Deserialize<T, D>,
            D: Fallible + ?Sized,
        {
            fn deserialize(&self, deserializer: &mut D) -> Result<$ptr<T>, D::Error> {
                // SAFETY: a buffer this method is reachable from has
                // already been validated by the deserialization
                // verifier (C7).
                let value = unsafe { self.as_ref() }.deserialize(deserializer)?;
                Ok($ptr::new(value))
            }
        }

        impl<T: crate::fingerprint::Fingerprinted> crate::fingerprint::Fingerprinted for $ptr<T> {
            fn type_key() -> u64 {
                crate::fingerprint::compose_type_key($tag, T::type_key())
            }

            fn shape() -> crate::fingerprint::Shape {
                crate::fingerprint::Shape::Rc
            }

            fn fold(hash: u64, seen: &mut alloc::collections::BTreeSet<u64>) -> u64 {
                let key = Self::type_key();
                if !seen.insert(key) {
                    return crate::checksum::fnv1a(hash, &key.to_le_bytes());
                }
                let h = crate::checksum::fnv1a(crate::checksum::fnv1a(hash, b"rc"), &key.to_le_bytes());
                T::fold(h, seen)
            }
        }
    };
}

use alloc::rc::Rc;
use alloc::sync::Arc;

impl_shared_pointer!(Rc, "rc");
impl_shared_pointer!(Arc, "arc");

/// The `mark_visited` namespace this module dedupes shared-pointee
/// verification in. A fixed constant is enough: two `Rc`/`Arc` handles
/// only ever share a buffer offset when they shared a source address at
/// serialize time (the engine's pending map collapses them to one
/// write), so any re-visit of that offset through this key is provably
/// the same pointee, regardless of `T`.
const RC_VISIT_KEY: u64 = 0x5243_5F44_4544_5550;

impl<T: Verify> Verify for ArchivedRc<T> {
    fn verify(&self, verifier: &mut Verifier) -> Result<(), Error> {
        if self.is_null() {
            return Ok(());
        }
        let addr = self.ptr.target_addr().ok_or(Error::OffsetOutOfBounds {
            offset: 0,
            size: core::mem::size_of::<T>(),
            len: verifier.buffer().len(),
        })?;
        let offset = verifier.offset_of(addr);
        let size = core::mem::size_of::<T>();
        verifier.check_bounds(offset, size, core::mem::align_of::<T>())?;

        // A second (or later) handle to a pointee already walked
        // through this call need not be re-verified: `mark_visited`
        // both answers that question and records this visit, so a
        // buffer with a cyclic offset back into an `Rc`'s own pointee
        // can't make this recurse forever.
        if !verifier.mark_visited(offset, RC_VISIT_KEY) {
            return Ok(());
        }

        verifier.in_subtree(offset, offset + size, |v| unsafe { self.as_ref().verify(v) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::ArchivedU64;
    use crate::ser::VecSink;

    #[test]
    fn rc_to_fresh_pointee_serializes_and_round_trips() {
        let value = alloc::rc::Rc::new(42u64);
        let mut engine = Engine::new(VecSink::new());
        let resolver = value.serialize(&mut engine).unwrap();
        let pos = engine.resolve_aligned(&value, resolver).unwrap();
        engine.flush_patches().unwrap();
        let bytes = engine.into_sink().into_bytes();
        let archived = unsafe {
            &*(bytes.as_slice().as_ptr().add(pos) as *const ArchivedRc<ArchivedU64>)
        };
        assert_eq!(unsafe { archived.as_ref() }.to_native(), 42u64);
    }

    #[test]
    fn two_rcs_to_the_same_pointee_share_one_copy() {
        let shared = alloc::rc::Rc::new(7u64);
        let a = shared.clone();
        let b = shared.clone();
        let mut engine = Engine::new(VecSink::new());
        let resolver_a = a.serialize(&mut engine).unwrap();
        let wrapper_pos_a = engine.resolve_aligned(&a, resolver_a).unwrap();
        let resolver_b = b.serialize(&mut engine).unwrap();
        let wrapper_pos_b = engine.resolve_aligned(&b, resolver_b).unwrap();
        engine.flush_patches().unwrap();

        // Each handle gets its own wrapper slot, but both wrappers must
        // point at the same pointee offset -- the thing this test
        // actually exercises.
        assert_ne!(wrapper_pos_a, wrapper_pos_b);
        let bytes = engine.into_sink().into_bytes();
        let base = bytes.as_slice().as_ptr() as usize;
        let wrapper_a = unsafe {
            &*(bytes.as_slice().as_ptr().add(wrapper_pos_a) as *const ArchivedRc<ArchivedU64>)
        };
        let wrapper_b = unsafe {
            &*(bytes.as_slice().as_ptr().add(wrapper_pos_b) as *const ArchivedRc<ArchivedU64>)
        };
        let pointee_offset_a = wrapper_a.ptr.target_addr().unwrap() - base;
        let pointee_offset_b = wrapper_b.ptr.target_addr().unwrap() - base;
        assert_eq!(pointee_offset_a, pointee_offset_b);
    }
}
