//! Convenience map view over [`super::hash_table::ArchivedHashTable`],
//! storing [`Entry<K, V>`](super::entry::Entry) pairs as its entry type.

extern crate alloc;

use core::hash::Hash;

use rancor::Fallible;

use super::entry::{Entry, EntryAdapter};
use super::hash_table::{ArchivedHashTable, HashTableResolver};
use crate::de::Verify;
use crate::hash::{hash_value, FxHasher64};
use crate::place::Place;
use crate::traits::{Archive, Deserialize, Serialize};

/// The zero-copy, buffer-resident view of a `HashMap<K, V>`.
#[repr(transparent)]
pub struct ArchivedHashMap<K, V> {
    table: ArchivedHashTable<Entry<K, V>>,
}

unsafe impl<K, V> crate::traits::Portable for ArchivedHashMap<K, V> {}

impl<K: PartialEq, V> ArchivedHashMap<K, V> {
    /// The number of entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Looks up the value for `key`, given its precomputed hash.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`].
    pub unsafe fn get(&self, hash: u64, key: &K) -> Option<&V> {
        self.table
            .find(hash, |entry| &entry.key == key)
            .map(|entry| &entry.value)
    }

    /// Iterates over every `(key, value)` pair.
    ///
    /// # Safety
    ///
    /// The buffer must already have been validated by
    /// [`crate::de::Verifier`].
    pub unsafe fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.table.iter().map(|entry| (&entry.key, &entry.value))
    }
}

impl<K, V> core::fmt::Debug for ArchivedHashMap<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArchivedHashMap")
            .field("len", &self.table.len())
            .finish()
    }
}

impl<K: crate::de::Verify, V: crate::de::Verify> crate::de::Verify for ArchivedHashMap<K, V> {
    fn verify(&self, verifier: &mut crate::de::Verifier) -> Result<(), crate::error::Error> {
        self.table.verify(verifier)
    }
}

/// The resolver for [`ArchivedHashMap`].
pub struct HashMapResolver(HashTableResolver);

impl<K: Archive, V: Archive> Archive for hashbrown::HashMap<K, V>
where
    K::Archived: PartialEq,
{
    type Archived = ArchivedHashMap<K::Archived, V::Archived>;
    type Resolver = HashMapResolver;

    fn resolve(&self, resolver: Self::Resolver, out: Place<Self::Archived>) {
        let out_ptr = out.ptr();
        let table_place =
            unsafe { out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).table)) };
        ArchivedHashTable::resolve_from_len(self.len(), resolver.0, table_place);
    }
}

impl<K, V, S> Serialize<S> for hashbrown::HashMap<K, V>
where
    K: Serialize<S> + Hash + Eq,
    V: Serialize<S>,
    S: Fallible + crate::ser::RawSink + ?Sized,
{
    fn serialize(&self, serializer: &mut S) -> Result<Self::Resolver, S::Error> {
        let items = self
            .iter()
            .map(|(key, value)| EntryAdapter { key, value });
        let hashes = self.keys().map(|key| hash_value::<K, FxHasher64>(key));
        ArchivedHashTable::serialize_from_iter(items, hashes, serializer).map(HashMapResolver)
    }
}

impl<K, V, D> Deserialize<hashbrown::HashMap<K, V>, D> for ArchivedHashMap<K::Archived, V::Archived>
where
    K: Archive + Hash + Eq,
    K::Archived: Deserialize<K, D> + PartialEq,
    V: Archive,
    V::Archived: Deserialize<V, D>,
    D: Fallible + ?Sized,
{
    fn deserialize(&self, deserializer: &mut D) -> Result<hashbrown::HashMap<K, V>, D::Error> {
        let mut result = hashbrown::HashMap::with_capacity(self.len());
        for (k, v) in unsafe { self.iter() } {
            result.insert(k.deserialize(deserializer)?, v.deserialize(deserializer)?);
        }
        Ok(result)
    }
}

impl<K, V> crate::fingerprint::Fingerprinted for hashbrown::HashMap<K, V>
where
    K: crate::fingerprint::Fingerprinted,
    V: crate::fingerprint::Fingerprinted,
{
    fn type_key() -> u64 {
        let combined = crate::checksum::fnv1a(K::type_key(), &V::type_key().to_le_bytes());
        crate::fingerprint::compose_type_key("hash_map", combined)
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
        let h = K::fold(h, seen);
        V::fold(h, seen)
    }
}
