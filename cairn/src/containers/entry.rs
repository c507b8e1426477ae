//! The archived entry type a hash map's table stores, and an adapter
//! that lets `ArchivedHashTable::serialize_from_iter` serialize a
//! `(&K, &V)` pair without first assembling an owned `(K, V)` tuple.
//!
//! Grounded on the teacher's `collections::util::{Entry, EntryAdapter}`.

use rancor::Fallible;

use crate::place::Place;
use crate::traits::{Archive, Serialize};

/// A key-value entry, stored directly (not behind a pointer) in a hash
/// map's entry array.
#[repr(C)]
pub struct Entry<K, V> {
    /// The entry's key.
    pub key: K,
    /// The entry's value.
    pub value: V,
}

unsafe impl<K, V> crate::traits::Portable for Entry<K, V> {}

/// Borrows a key and value for the duration of
/// [`hash_table::ArchivedHashTable::serialize_from_iter`], so a hash
/// map's `(&K, &V)` iterator can feed the table serializer directly.
pub struct EntryAdapter<'a, K, V> {
    /// The key to serialize and resolve.
    pub key: &'a K,
    /// The value to serialize and resolve.
    pub value: &'a V,
}

/// A resolver for a key-value pair.
pub struct EntryResolver<K, V> {
    key: K,
    value: V,
}

impl<K: crate::de::Verify, V: crate::de::Verify> crate::de::Verify for Entry<K, V> {
    fn verify(&self, verifier: &mut crate::de::Verifier) -> Result<(), crate::error::Error> {
        self.key.verify(verifier)?;
        self.value.verify(verifier)
    }
}

impl<K: Archive, V: Archive> Archive for EntryAdapter<'_, K, V> {
    type Archived = Entry<K::Archived, V::Archived>;
    type Resolver = EntryResolver<K::Resolver, V::Resolver>;

    fn resolve(&self, resolver: Self::Resolver, out: Place<Self::Archived>) {
        let out_ptr = out.ptr();
        let key_place =
            unsafe { out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).key)) };
        let value_place =
            unsafe { out.field_unchecked(core::ptr::addr_of_mut!((*out_ptr).value)) };
        self.key.resolve(resolver.key, key_place);
        self.value.resolve(resolver.value, value_place);
    }
}

impl<S, K, V> Serialize<S> for EntryAdapter<'_, K, V>
where
    S: Fallible + ?Sized,
    K: Serialize<S>,
    V: Serialize<S>,
{
    fn serialize(&self, serializer: &mut S) -> Result<Self::Resolver, S::Error> {
        Ok(EntryResolver {
            key: self.key.serialize(serializer)?,
            value: self.value.serialize(serializer)?,
        })
    }
}
