//! Serialization engine (component C6).
//!
//! Unlike the teacher's per-field `resolve`-into-`Place` model (which
//! exists to support unsized pointees via `ptr_meta`/`munge`), this
//! engine follows the original algorithm directly, matching
//! `original_source/cista.h`'s `to_tuple`/`for_each_field`-driven
//! serializer: copy the value's bytes to a freshly-appended, aligned
//! region of the sink, then walk the copy's pointer-shaped fields (via
//! the [`crate::field_walk::FieldWalk`] descriptor table `cairn_derive`
//! generates) and patch each one from a pending/cyclic-reference queue.
//!
//! Steps, matching §4.4 of the specification:
//! 1. If the source address is already in the pending map, write a
//!    pointer to the existing offset and stop (shared-pointee collapse).
//! 2. Otherwise, append the value's archived bytes and record the
//!    mapping in the pending map *before* recursing into children, so a
//!    cycle back to this value resolves instead of infinitely
//!    recursing.
//! 3. Recurse into every pointer-shaped field in declaration order,
//!    patching each in place once its pointee has been written.

use alloc::collections::VecDeque;

use crate::ser::sharing::{PendingMap, Sharing};
use crate::ser::sink::{RawSink, Sink, SinkExt};

/// A unit of deferred work: a pointer field at `patch_offset` in the
/// sink that must be pointed at wherever `source_addr`'s archived form
/// ends up once it's written.
struct PendingPatch {
    patch_offset: usize,
    source_addr: usize,
}

/// Drives the depth-first walk plus pending-queue algorithm described
/// in §4.4.
///
/// `S` is any [`Sink`] implementation (component C2); `cairn_derive`'s
/// generated `Serialize` impls call [`Engine::serialize_value`] for
/// each pointer-shaped field they own.
pub struct Engine<S> {
    sink: S,
    pending: PendingMap,
    queue: VecDeque<PendingPatch>,
}

impl<S: Sink> Engine<S> {
    /// Creates an engine writing into `sink`.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            pending: PendingMap::new(),
            queue: VecDeque::new(),
        }
    }

    /// The current write position, i.e. where the next appended value
    /// would land.
    pub fn pos(&self) -> usize {
        self.sink.pos()
    }

    /// Appends `bytes`, aligned to `align`, returning the offset it was
    /// written at. Used for leaf values -- scalars, containers that own
    /// no further pointer fields of their own.
    pub fn append(&mut self, align: usize, bytes: &[u8]) -> Result<usize, S::Error> {
        self.sink.append_aligned(align, bytes)
    }

    /// Looks up whether `source_addr` has already been serialized,
    /// returning its buffer offset if so.
    pub fn already_serialized(&self, source_addr: usize) -> Option<usize> {
        self.pending.get_pending(source_addr)
    }

    /// Records that `source_addr`'s archived form begins at `offset`.
    /// Must be called *before* recursing into that value's own pointer
    /// fields, so a cycle back to `source_addr` finds this entry
    /// instead of re-entering serialization.
    pub fn record_serialized(&mut self, source_addr: usize, offset: usize) {
        self.pending.insert_pending(source_addr, offset);
    }

    /// Defers patching the offset-pointer field at `patch_offset` until
    /// `source_addr` has been (or will be) serialized. Used when a
    /// pointee hasn't been visited yet (a forward reference), so its
    /// serialization can happen after the structural walk reaches it,
    /// rather than requiring perfect topological order up front.
    pub fn defer_patch(&mut self, patch_offset: usize, source_addr: usize) {
        self.queue.push_back(PendingPatch {
            patch_offset,
            source_addr,
        });
    }

    /// Drains the deferred-patch queue, writing each recorded offset
    /// pointer now that every value has been serialized. Must be called
    /// once, after the structural walk finishes, and every
    /// `source_addr` pushed via [`Engine::defer_patch`] must by then
    /// have a corresponding [`Engine::record_serialized`] call (if not,
    /// it is a bug in the calling `Serialize` impl -- every pointer
    /// field observed during the walk is reachable from the root and
    /// therefore visited exactly once).
    pub fn flush_patches(&mut self) -> Result<(), S::Error> {
        while let Some(patch) = self.queue.pop_front() {
            let target = self
                .pending
                .get_pending(patch.source_addr)
                .expect("pending pointee was never serialized");
            let offset_bytes = crate::rel_ptr::signed_offset(
                patch.patch_offset,
                target,
            )
            .expect("patch offset collides with a reserved sentinel")
            .to_le_bytes();
            self.sink.write_at(patch.patch_offset, &offset_bytes)?;
        }
        Ok(())
    }

    /// Consumes the engine, returning the underlying sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// A shared reference to the underlying sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// A mutable reference to the underlying sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

impl<S: Sink> Sink for Engine<S> {
    type Error = S::Error;

    fn pos(&self) -> usize {
        self.sink.pos()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.sink.write(bytes)
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), Self::Error> {
        self.sink.write_at(offset, bytes)
    }
}

impl<S> rancor::Fallible for Engine<S> {
    type Error = rancor::Error;
}

impl<S: RawSink> RawSink for Engine<S> {
    fn as_mut_ptr(&mut self) -> *mut u8 {
        self.sink.as_mut_ptr()
    }
}

extern crate alloc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ser::sink::VecSink;

    #[test]
    fn shared_pointee_collapses_to_one_copy() {
        let mut engine = Engine::new(VecSink::new());
        let fake_addr = 0xdead_beef_usize;
        assert!(engine.already_serialized(fake_addr).is_none());

        let offset = engine.append(1, b"payload").unwrap();
        engine.record_serialized(fake_addr, offset);

        assert_eq!(engine.already_serialized(fake_addr), Some(offset));
    }

    #[test]
    fn deferred_patches_flush_after_walk() {
        let mut engine = Engine::new(VecSink::new());
        // Reserve space for a pointer field at offset 0.
        engine.append(8, &0i64.to_le_bytes()).unwrap();
        let target_addr = 0x1234_usize;
        engine.defer_patch(0, target_addr);

        let target_offset = engine.append(1, b"x").unwrap();
        engine.record_serialized(target_addr, target_offset);

        engine.flush_patches().unwrap();
        let bytes = engine.into_sink().into_bytes();
        let patched = i64::from_le_bytes(bytes.as_slice()[0..8].try_into().unwrap());
        assert_eq!(patched, target_offset as i64);
    }
}
