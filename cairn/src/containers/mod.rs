//! Zero-copy containers built on the offset pointer (component C1):
//! growable array, owning pointer, small-buffer string, swiss-style
//! hash table, jagged nested array, bitset, and R-tree.

pub mod bitset;
pub mod boxed;
pub mod entry;
pub mod hash_map;
pub mod hash_set;
pub mod hash_table;
pub mod nested;
pub mod rc;
pub mod rtree;
pub mod string;
pub mod vec;

pub use bitset::{ArchivedBitset, Bitset};
pub use boxed::ArchivedBox;
pub use entry::{Entry, EntryAdapter};
pub use hash_map::ArchivedHashMap;
pub use hash_set::ArchivedHashSet;
pub use hash_table::ArchivedHashTable;
pub use nested::{ArchivedNestedVec, ArchivedNestedVec2, NestedVec, NestedVec2};
pub use rc::ArchivedRc;
pub use rtree::{ArchivedRTree, RTree, Rect};
pub use string::ArchivedString;
pub use vec::ArchivedVec;
