//! Type fingerprint (component C5): a 64-bit FNV-1a structural hash of a
//! type's canonical shape, used by the framing envelope (C8) as a
//! version tag.
//!
//! Grounded on `original_source/include/cista/type_hash/type_hash.h`:
//! the reference implementation folds a description of each field's
//! type into a running hash, recursing into aggregate fields and
//! breaking cycles with a set of "already folded" types. [`Fingerprinted::fold`]
//! mirrors that recursion directly: the default implementation only has
//! a type-erased [`Shape`] tag to work with, so it folds in a type's
//! own `type_key` and stops there. Every generic container in
//! [`crate::containers`] overrides `fold` to additionally recurse into
//! its element type's own `fold`, and `#[derive(Archive)]` does the
//! same for user-defined structs/enums by chaining each field's `fold`
//! call -- without that recursion, a field's name staying put while its
//! own shape changes underneath it (a struct gaining a field without
//! being renamed) would go undetected, since `type_key` is deliberately
//! flat and non-recursive (it must stay cycle-safe for self-referential
//! types like `Option<Box<Self>>`, which rules out folding field keys
//! into it directly).

use crate::checksum::{fnv1a, FNV_OFFSET_BASIS_U64};

/// Re-exported so `cairn_derive`'s generated `Fingerprinted::fold`
/// signatures can name this type without requiring the downstream
/// crate to declare its own `extern crate alloc;`.
pub use alloc::collections::BTreeSet;

/// The tag a type contributes to the running fingerprint hash before
/// any of its type parameters or fields are folded in.
#[derive(Debug, Clone, Copy)]
pub enum Shape {
    /// A fixed-size primitive, tagged by name (`"u8"`, `"f64"`, ...).
    Primitive(&'static str),
    /// A growable array.
    Vec,
    /// An owning pointer.
    Box,
    /// A shared, reference-counted pointer (`Rc`/`Arc`).
    Rc,
    /// The small-buffer string type.
    String,
    /// A hash table (or set).
    HashTable,
    /// A jagged nested array at the given depth.
    Nested(u32),
    /// An R-tree in the given number of dimensions.
    RTree(u32),
    /// A bitset.
    Bitset,
    /// A user-defined struct, tagged by name.
    Struct(&'static str),
    /// A user-defined enum, tagged by name.
    Enum(&'static str),
}

/// A type that can describe its own canonical shape for fingerprinting
/// and fold itself (and, for aggregates, its fields) into a running
/// hash.
///
/// `#[derive(Archive)]` implements this for user-defined types by
/// overriding [`Fingerprinted::fold`] directly; the built-in containers
/// in [`crate::containers`] rely on the default implementation, which
/// derives its folding purely from [`Fingerprinted::shape`].
pub trait Fingerprinted {
    /// A process-wide-unique identifier for this type, used to break
    /// cycles (a struct containing `Option<Box<Self>>`, for instance)
    /// without needing `'static` type information in `no_std`.
    fn type_key() -> u64;

    /// This type's canonical shape tag.
    fn shape() -> Shape;

    /// Folds this type (and, by recursive calls the derive macro
    /// generates for aggregates, its fields) into `hash`.
    fn fold(hash: u64, seen: &mut BTreeSet<u64>) -> u64
    where
        Self: Sized,
    {
        let key = Self::type_key();
        if !seen.insert(key) {
            // Cycle: fold in the type key alone and stop recursing,
            // exactly as cista's type_hash breaks cycles via its `pred`
            // set.
            return fnv1a(hash, &key.to_le_bytes());
        }
        match Self::shape() {
            Shape::Primitive(name) => fnv1a(hash, name.as_bytes()),
            Shape::Vec => fnv1a(fnv1a(hash, b"vec"), &key.to_le_bytes()),
            Shape::Box => fnv1a(fnv1a(hash, b"box"), &key.to_le_bytes()),
            Shape::Rc => fnv1a(fnv1a(hash, b"rc"), &key.to_le_bytes()),
            Shape::String => fnv1a(hash, b"string"),
            Shape::HashTable => {
                fnv1a(fnv1a(hash, b"hash_table"), &key.to_le_bytes())
            }
            Shape::Nested(depth) => {
                fnv1a(fnv1a(hash, b"nested"), &depth.to_le_bytes())
            }
            Shape::RTree(dims) => {
                fnv1a(fnv1a(hash, b"rtree"), &dims.to_le_bytes())
            }
            Shape::Bitset => fnv1a(hash, b"bitset"),
            Shape::Struct(name) => fnv1a(fnv1a(hash, b"struct"), name.as_bytes()),
            Shape::Enum(name) => fnv1a(fnv1a(hash, b"enum"), name.as_bytes()),
        }
    }
}

/// Computes the recursive structural fingerprint of `T`.
pub fn fingerprint<T: Fingerprinted>() -> u64 {
    let mut seen = BTreeSet::new();
    T::fold(FNV_OFFSET_BASIS_U64, &mut seen)
}

/// Builds a [`Fingerprinted::type_key`] for a generic container from a
/// fixed tag identifying the container (`"vec"`, `"box"`, ...) and its
/// type parameter's own key, so `Vec<A>` and `Vec<B>` get distinct keys
/// even though they share a tag.
pub fn compose_type_key(tag: &str, inner: u64) -> u64 {
    fnv1a(fnv1a(FNV_OFFSET_BASIS_U64, tag.as_bytes()), &inner.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct U8;
    impl Fingerprinted for U8 {
        fn type_key() -> u64 {
            1
        }
        fn shape() -> Shape {
            Shape::Primitive("u8")
        }
    }

    struct U16;
    impl Fingerprinted for U16 {
        fn type_key() -> u64 {
            2
        }
        fn shape() -> Shape {
            Shape::Primitive("u16")
        }
    }

    struct Pair;
    impl Fingerprinted for Pair {
        fn type_key() -> u64 {
            3
        }
        fn shape() -> Shape {
            Shape::Struct("Pair")
        }
        fn fold(hash: u64, seen: &mut BTreeSet<u64>) -> u64 {
            let key = Self::type_key();
            if !seen.insert(key) {
                return fnv1a(hash, &key.to_le_bytes());
            }
            let h = fnv1a(fnv1a(hash, b"struct"), b"Pair");
            let h = U8::fold(h, seen);
            U16::fold(h, seen)
        }
    }

    #[test]
    fn distinct_primitives_hash_differently() {
        assert_ne!(fingerprint::<U8>(), fingerprint::<U16>());
    }

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(fingerprint::<U8>(), fingerprint::<U8>());
    }

    #[test]
    fn struct_folds_fields() {
        let fp = fingerprint::<Pair>();
        assert_ne!(fp, fingerprint::<U8>());
        assert_ne!(fp, fingerprint::<U16>());
    }
}
