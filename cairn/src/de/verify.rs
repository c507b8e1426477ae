//! Recursive structural validation (component C7 continued).
//!
//! [`crate::de::Verifier`] checks a single offset's bounds, alignment,
//! and non-overlap; it says nothing about what's stored there. [`Verify`]
//! is the per-type counterpart §4.5 calls "walk the root as a structural
//! type": every archived type that can contain a pointer implements it,
//! and the implementation dereferences and validates each pointer-like
//! field in turn, recursing into whatever it points to. [`crate::from_bytes`]
//! calls the root's `verify` once the root's own bounds have been
//! checked, so a single call walks the whole transitively-reachable
//! object graph before any of it is trusted.
//!
//! Grounded on the teacher's `bytecheck::Verify` trait
//! (`rkyv/src/validation/mod.rs` and the per-type impls throughout
//! `rkyv/src/impls/`): a trait with one method, `verify`, implemented by
//! hand for every built-in archived type and by `#[derive(Archive)]` for
//! every aggregate, exactly mirroring how this crate's own
//! `resolve`/`serialize`/`deserialize` triad is split between hand
//! written container impls and derive-generated struct/enum impls.

use crate::de::Verifier;
use crate::error::Error;

/// Recursively validates an archived value already known to be in
/// bounds and aligned at its own address: dereferences and bounds-checks
/// every pointer-like field it holds, recursing into each pointee in
/// turn.
///
/// A type with no pointer fields (every primitive, every `#[repr(C)]`
/// struct of such fields) implements this as a no-op: there's nothing
/// further to walk.
pub trait Verify {
    /// Validates `self`'s own pointer-like fields against `verifier`,
    /// recursing into whatever they point to.
    fn verify(&self, verifier: &mut Verifier) -> Result<(), Error>;
}

macro_rules! impl_verify_noop {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Verify for $ty {
                fn verify(&self, _verifier: &mut Verifier) -> Result<(), Error> {
                    Ok(())
                }
            }
        )*
    };
}

impl_verify_noop!(
    bool,
    u8,
    i8,
    u64,
    crate::primitive::ArchivedI16,
    crate::primitive::ArchivedI32,
    crate::primitive::ArchivedI64,
    crate::primitive::ArchivedI128,
    crate::primitive::ArchivedU16,
    crate::primitive::ArchivedU32,
    crate::primitive::ArchivedU64,
    crate::primitive::ArchivedU128,
    crate::primitive::ArchivedF32,
    crate::primitive::ArchivedF64,
);

impl<T: Verify> Verify for crate::impls::ArchivedOption<T> {
    fn verify(&self, verifier: &mut Verifier) -> Result<(), Error> {
        match self.as_ref() {
            None => Ok(()),
            Some(value) => value.verify(verifier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_verify_as_no_ops() {
        let mut verifier = Verifier::new(&[], false);
        assert!(0u8.verify(&mut verifier).is_ok());
        assert!(true.verify(&mut verifier).is_ok());
    }
}
