//! Convenience set view over [`super::hash_table::ArchivedHashTable`],
//! storing bare keys as its entry type.

extern crate alloc;

use core::hash::Hash;

use rancor::Fallible;

use super::hash_table::{ArchivedHashTable, HashTableResolver};
use crate::de::Verify;
use crate::hash::{hash_value, FxHasher64};
use crate::place::Place;
use crate::traits::{Archive, Deserialize, Serialize};

/// The zero-copy, buffer-resident view of a `HashSet<T>`.
#[repr(transparent)]
pub struct ArchivedHashSet<T> {
    table: ArchivedHashTable<T>,
}

unsafe impl<T> crate::traits::Portable for ArchivedHashSet<T> {}

impl<T: PartialEq> ArchivedHashSet<T> {
    /// The number of elements.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the set has no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Whether `value` is a member, given its precomputed hash.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`].
    pub unsafe fn contains(&self, hash: u64, value: &T) -> bool {
        self.table.find(hash, |v| v == value).is_some()
    }

    /// Iterates over every element.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`].
    pub unsafe fn iter(&self) -> impl Iterator<Item = &T> {
        self.table.iter()
    }
}

impl<T> core::fmt::Debug for ArchivedHashSet<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArchivedHashSet")
            .field("len", &self.table.len())
            .finish()
    }
}

impl<T: crate::de::Verify> crate::de::Verify for ArchivedHashSet<T> {
    fn verify(&self, verifier: &mut crate::de::Verifier) -> Result<(), crate::error::Error> {
        self.table.verify(verifier)
    }
}

/// The resolver for [`ArchivedHashSet`].
pub struct HashSetResolver(HashTableResolver);

impl<T: Archive> Archive for hashbrown::HashSet<T>
where
    T::Archived: PartialEq,
{
    type Archived = ArchivedHashSet<T::Archived>;
    type Resolver = HashSetResolver;

    fn resolve(&self, resolver: Self::Resolver, out: Place<Self::Archived>) {
        let out_ptr = out.ptr();
        let table_place =
            unsafe { out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).table)) };
        ArchivedHashTable::resolve_from_len(self.len(), resolver.0, table_place);
    }
}

impl<T, S> Serialize<S> for hashbrown::HashSet<T>
where
    T: Serialize<S> + Hash + Eq,
    S: Fallible + crate::ser::RawSink + ?Sized,
{
    fn serialize(&self, serializer: &mut S) -> Result<Self::Resolver, S::Error> {
        let items = self.iter();
        let hashes = self.iter().map(|value| hash_value::<T, FxHasher64>(value));
        ArchivedHashTable::serialize_from_iter(items, hashes, serializer).map(HashSetResolver)
    }
}

impl<T, D> Deserialize<hashbrown::HashSet<T>, D> for ArchivedHashSet<T::Archived>
where
    T: Archive + Hash + Eq,
    T::Archived: Deserialize<T, D> + PartialEq,
    D: Fallible + ?Sized,
{
    fn deserialize(&self, deserializer: &mut D) -> Result<hashbrown::HashSet<T>, D::Error> {
        let mut result = hashbrown::HashSet::with_capacity(self.len());
        for value in unsafe { self.iter() } {
            result.insert(value.deserialize(deserializer)?);
        }
        Ok(result)
    }
}

impl<T: crate::fingerprint::Fingerprinted> crate::fingerprint::Fingerprinted
    for hashbrown::HashSet<T>
{
    fn type_key() -> u64 {
        crate::fingerprint::compose_type_key("hash_set", T::type_key())
    }

    fn shape() -> crate::fingerprint::Shape {
        crate::fingerprint::Shape::HashTable
    }

    fn fold(hash: u64, seen: &mut alloc::collections::BTreeSet<u64>) -> u64 {
        let key = Self::type_key();
        if !seen.insert(key) {
            return crate::checksum::fnv1a(hash, &key.to_le_bytes());
        }
        let h = crate::checksum::fnv1a(
            crate::checksum::fnv1a(hash, b"hash_table"),
            &key.to_le_bytes(),
        );
        T::fold(h, seen)
    }
}
