//! Core traits tying a Rust type to its archived, zero-copy counterpart.
//!
//! Adapted from the teacher's `traits` module (`rkyv/src/traits.rs`),
//! dropped to the subset this format needs: every pointee here is
//! sized, so the unsized-pointee traits (`ArchiveUnsized`,
//! `SerializeUnsized`, ...) the teacher carries for trait objects and
//! slices-behind-a-pointer are not part of this crate.

use rancor::Fallible;

use crate::place::Place;

/// Marker trait for types whose byte representation is the same
/// regardless of the machine's native pointer width or provenance --
/// i.e. types that are safe to read back out of a byte buffer that
/// wasn't produced by the current process.
///
/// # Safety
///
/// A type must not implement `Portable` unless every bit pattern
/// reachable by copying its bytes verbatim from any source (a foreign
/// process, a different machine of the same endianness, a memory-mapped
/// file) is either a valid instance of the type or is caught by that
/// type's [`crate::de::verifier`] checks before being exposed as a safe
/// reference.
pub unsafe trait Portable {}

/// A type that has a zero-copy archived representation.
pub trait Archive {
    /// The zero-copy, buffer-resident representation of `Self`.
    type Archived: Portable;

    /// Scratch state threaded from [`Archive::resolve`] to
    /// [`Serialize::serialize`], used when the archived representation
    /// needs information gathered during a prior serialization pass
    /// (for example, the buffer offset a nested container's payload was
    /// written at).
    type Resolver;

    /// Initializes `out` with the archived form of `self`, using
    /// `resolver` for any information that required a prior write pass.
    ///
    /// # Safety
    ///
    /// `out` must point at a region large enough and aligned for
    /// `Self::Archived`.
    fn resolve(&self, resolver: Self::Resolver, out: Place<Self::Archived>);
}

/// A type that can write the bytes its archived form's pointers need to
/// resolve into a [`crate::ser::Sink`] before [`Archive::resolve`] runs.
pub trait Serialize<S: Fallible + ?Sized>: Archive {
    /// Writes any out-of-line data `self`'s archived form will point to,
    /// returning the resolver [`Archive::resolve`] needs to fill in
    /// those pointers.
    fn serialize(&self, serializer: &mut S) -> Result<Self::Resolver, S::Error>;
}

/// A type that can be reconstructed as an owned value from its archived
/// form, reversing [`Archive`].
pub trait Deserialize<T, D: Fallible + ?Sized> {
    /// Reconstructs an owned `T` by copying out of `self`.
    fn deserialize(&self, deserializer: &mut D) -> Result<T, D::Error>;
}

/// Lets a borrowed `&T` feed anything that serializes owned items (a hash
/// set's `iter()` yields `&T`, not `T`) without cloning.
impl<T: Archive + ?Sized> Archive for &T {
    type Archived = T::Archived;
    type Resolver = T::Resolver;

    fn resolve(&self, resolver: Self::Resolver, out: Place<Self::Archived>) {
        (**self).resolve(resolver, out)
    }
}

impl<T: Serialize<S> + ?Sized, S: Fallible + ?Sized> Serialize<S> for &T {
    fn serialize(&self, serializer: &mut S) -> Result<Self::Resolver, S::Error> {
        (**self).serialize(serializer)
    }
}
