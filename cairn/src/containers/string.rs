//! Small-buffer string (component C3.4).
//!
//! Grounded on `original_source/include/cista/containers/string.h`'s
//! `union` of a 15-byte inline buffer and a heap-pointer struct, tagged
//! by the sign of a shared last byte. `cairn`'s archived layout keeps
//! the same 16-byte footprint and the same tagging trick, expressed as
//! a Rust `#[repr(C)]` byte array with accessor methods instead of an
//! actual C union (which Rust can only express unsafely and without the
//! same read-any-variant-as-bytes guarantee this format depends on).
//!
//! Layout (16 bytes total, byte 15 is always the tag):
//! - inline: bytes `[0..15)` hold up to 15 UTF-8 bytes left-aligned;
//!   byte 15 holds `15 - len` (the remaining inline capacity, `0..=15`,
//!   always non-negative as `i8`).
//! - heap: bytes `[0..8)` hold a [`RawRelPtr`] to the string's bytes,
//!   `[8..12)` hold a little/big-endian `u32` length, byte 12 holds the
//!   `self_allocated` flag (always `0` on buffers this crate writes,
//!   see the design note in `SPEC_FULL.md` §3.8), bytes `[13..15)` are
//!   padding, and byte 15 is fixed at `-1` (`0xFF`), which is always
//!   negative and therefore never collides with an inline tag.

use rancor::Fallible;

use crate::place::Place;
use crate::primitive::ArchivedU32;
use crate::rel_ptr::RawRelPtr;
use crate::ser::{Sink, SinkExt};
use crate::traits::{Archive, Deserialize, Serialize};

/// Inline capacity of the small-buffer string representation.
pub const INLINE_CAPACITY: usize = 15;

const HEAP_TAG: u8 = 0xFF;

/// The zero-copy, buffer-resident view of a `String`.
#[repr(C, align(8))]
pub struct ArchivedString {
    bytes: [u8; 16],
}

// SAFETY: every bit pattern of the 16-byte buffer is interpreted
// through the tag-byte dispatch in the accessor methods below; no
// pattern causes undefined behavior to read.
unsafe impl crate::traits::Portable for ArchivedString {}

impl ArchivedString {
    fn tag(&self) -> i8 {
        self.bytes[15] as i8
    }

    /// Whether the string is stored inline (no heap pointer to
    /// validate).
    pub fn is_inline(&self) -> bool {
        self.tag() >= 0
    }

    /// The number of UTF-8 bytes in the string.
    pub fn len(&self) -> usize {
        if self.is_inline() {
            INLINE_CAPACITY - self.tag() as usize
        } else {
            // SAFETY: bytes `[8..12)` hold a valid `ArchivedU32` for any
            // heap-tagged string, regardless of the configured endian
            // feature -- reading it through its own type (rather than
            // `from_ne_bytes`) decodes it correctly either way.
            let len_ptr = self.bytes[8..12].as_ptr() as *const ArchivedU32;
            unsafe { (*len_ptr).to_native() as usize }
        }
    }

    /// Whether the string has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `self_allocated` bit recorded in the heap representation.
    /// Always `0` for well-formed buffers; a verifier rejects any
    /// buffer where this is nonzero (§7 `OwnershipViolation`).
    pub fn self_allocated(&self) -> bool {
        !self.is_inline() && self.bytes[12] != 0
    }

    /// A view of the string's UTF-8 bytes.
    ///
    /// # Safety
    ///
    /// If stored on the heap, the buffer this string lives in must
    /// already have been validated by [`crate::de::Verifier`].
    pub unsafe fn as_bytes(&self) -> &[u8] {
        if self.is_inline() {
            &self.bytes[..self.len()]
        } else {
            let ptr_bytes: [u8; 8] = self.bytes[0..8].try_into().unwrap();
            let raw = &*(ptr_bytes.as_ptr() as *const RawRelPtr);
            let addr = raw
                .target_addr()
                .expect("ArchivedString pointer was not validated before use");
            core::slice::from_raw_parts(addr as *const u8, self.len())
        }
    }

    /// A view of the string's contents.
    ///
    /// # Safety
    ///
    /// Same precondition as [`ArchivedString::as_bytes`]. The bytes
    /// must also be valid UTF-8, which is guaranteed for buffers
    /// produced by this crate's serializer but must be checked
    /// explicitly (via [`core::str::from_utf8`]) for buffers from an
    /// untrusted source.
    pub unsafe fn as_str_unchecked(&self) -> &str {
        core::str::from_utf8_unchecked(self.as_bytes())
    }
}

impl PartialEq for ArchivedString {
    fn eq(&self, other: &Self) -> bool {
        // SAFETY: reached only through a hash table lookup/iteration,
        // both of which already require a verified buffer (see
        // `ArchivedHashTable::find`/`iter`).
        unsafe { self.as_bytes() == other.as_bytes() }
    }
}

impl Eq for ArchivedString {}

impl core::fmt::Debug for ArchivedString {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArchivedString")
            .field("is_inline", &self.is_inline())
            .field("len", &self.len())
            .finish()
    }
}

/// Writes the inline representation of `s` into a fresh 16-byte buffer.
/// Returns `None` if `s` is longer than [`INLINE_CAPACITY`].
pub fn encode_inline(s: &str) -> Option<[u8; 16]> {
    if s.len() > INLINE_CAPACITY {
        return None;
    }
    let mut bytes = [0u8; 16];
    bytes[..s.len()].copy_from_slice(s.as_bytes());
    bytes[15] = (INLINE_CAPACITY - s.len()) as u8;
    Some(bytes)
}

/// Where a heap-stored `String`'s bytes were appended, recorded by
/// [`Serialize::serialize`]. `None` means the string fit inline and
/// [`crate::traits::Archive::resolve`] needs no out-of-line position.
pub struct StringResolver {
    heap_pos: Option<usize>,
}

impl Archive for alloc::string::String {
    type Archived = ArchivedString;
    type Resolver = StringResolver;

    fn resolve(&self, resolver: Self::Resolver, out: Place<Self::Archived>) {
        let out_ptr = out.ptr() as *mut u8;
        match resolver.heap_pos {
            None => {
                let bytes = encode_inline(self)
                    .expect("resolver selected inline encoding for an over-length string");
                unsafe {
                    out.write_unchecked(ArchivedString { bytes });
                }
            }
            Some(target) => unsafe {
                RawRelPtr::try_emplace(out.pos(), target, out_ptr)
                    .expect("string heap position collides with a reserved sentinel");
                out_ptr
                    .add(8)
                    .cast::<ArchivedU32>()
                    .write_unaligned(ArchivedU32::from(self.len() as u32));
                out_ptr.add(12).write(0);
                out_ptr.add(15).write(HEAP_TAG);
            },
        }
    }
}

impl<S> Serialize<S> for alloc::string::String
where
    S: Fallible + Sink + ?Sized,
{
    fn serialize(&self, serializer: &mut S) -> Result<Self::Resolver, S::Error> {
        if self.len() <= INLINE_CAPACITY {
            Ok(StringResolver { heap_pos: None })
        } else {
            let pos = serializer.append_aligned(1, self.as_bytes())?;
            Ok(StringResolver {
                heap_pos: Some(pos),
            })
        }
    }
}

impl<D: Fallible + ?Sized> Deserialize<alloc::string::String, D> for ArchivedString {
    fn deserialize(&self, _deserializer: &mut D) -> Result<alloc::string::String, D::Error> {
        // SAFETY: a buffer this method is reachable from has already
        // been validated by the deserialization verifier (C7).
        let s = unsafe { self.as_str_unchecked() };
        Ok(alloc::string::String::from(s))
    }
}

impl crate::de::Verify for ArchivedString {
    fn verify(&self, verifier: &mut crate::de::Verifier) -> Result<(), crate::error::Error> {
        if self.is_inline() {
            return Ok(());
        }
        if self.self_allocated() {
            return Err(crate::error::Error::OwnershipViolation(
                "ArchivedString's self_allocated bit was set in a serialized buffer",
            ));
        }
        let ptr_bytes: [u8; 8] = self.bytes[0..8].try_into().unwrap();
        let raw = unsafe { &*(ptr_bytes.as_ptr() as *const RawRelPtr) };
        let addr = raw
            .target_addr()
            .ok_or(crate::error::Error::OffsetOutOfBounds {
                offset: 0,
                size: self.len(),
                len: verifier.buffer().len(),
            })?;
        let offset = verifier.offset_of(addr);
        verifier.check_bounds(offset, self.len(), 1)
    }
}

impl crate::fingerprint::Fingerprinted for alloc::string::String {
    fn type_key() -> u64 {
        crate::checksum::fnv1a(crate::checksum::FNV_OFFSET_BASIS_U64, b"string")
    }

    fn shape() -> crate::fingerprint::Shape {
        crate::fingerprint::Shape::String
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_archived(bytes: [u8; 16]) -> ArchivedString {
        ArchivedString { bytes }
    }

    #[test]
    fn inline_round_trips_boundary_lengths() {
        for len in [0usize, 14, 15] {
            let s: alloc::string::String =
                core::iter::repeat('a').take(len).collect();
            let bytes = encode_inline(&s).unwrap();
            let archived = as_archived(bytes);
            assert!(archived.is_inline());
            assert_eq!(archived.len(), len);
            unsafe {
                assert_eq!(archived.as_bytes(), s.as_bytes());
            }
        }
    }

    #[test]
    fn sixteen_bytes_does_not_fit_inline() {
        let s: alloc::string::String = core::iter::repeat('a').take(16).collect();
        assert!(encode_inline(&s).is_none());
    }

    #[test]
    fn heap_tag_is_recognized() {
        let mut bytes = [0u8; 16];
        bytes[15] = HEAP_TAG;
        let archived = as_archived(bytes);
        assert!(!archived.is_inline());
    }
}

extern crate alloc;
