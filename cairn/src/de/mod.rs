//! Deserialization: the bounds/alignment/cycle-safe verifier (C7) that
//! must approve a buffer before any of its pointers are followed, and
//! the [`Verify`] trait that walks a value's pointer fields recursively
//! using that verifier.

pub mod verifier;
pub mod verify;

pub use verifier::Verifier;
pub use verify::Verify;

/// A [`rancor::Fallible`] deserializer with no scratch state attached,
/// mirroring [`crate::ser::sink::Serializer`]'s role on the write side:
/// every `Deserialize` impl in this crate reads straight out of the
/// archived buffer, so no shared-pointee cache or allocator needs to
/// ride along with the deserializer itself -- including for `Rc`/`Arc`,
/// whose `Deserialize` impl always allocates a fresh, unshared owner
/// rather than reconstructing the original aliasing (see
/// `containers::rc`).
pub struct Deserializer;

impl rancor::Fallible for Deserializer {
    type Error = rancor::Error;
}
