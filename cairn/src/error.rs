//! Top-level error type (component of §7).
//!
//! Low-level building blocks throughout the crate stay generic over
//! `E: rancor::Source`, matching the teacher's layered error design, so
//! they compile in `no_std` contexts with no concrete error type in
//! scope. [`Error`] is the concrete, `thiserror`-derived enum that the
//! `std`-gated convenience entry points (`to_bytes`, `from_bytes`,
//! [`crate::mmap::MmapFile`]) return, with one variant per kind in §7 of
//! the specification.
#![cfg(feature = "std")]

use thiserror::Error;

/// Errors that can occur while framing, serializing, deserializing, or
/// memory-mapping a cairn buffer.
#[derive(Debug, Error)]
pub enum Error {
    /// The buffer is shorter than the framing header requires.
    #[error("framing header requires at least {expected} bytes, found {found}")]
    FramingTooShort {
        /// Bytes required by the enabled framing mode.
        expected: usize,
        /// Bytes actually present.
        found: usize,
    },

    /// The type fingerprint recorded in the framing header does not match
    /// the fingerprint of the type being deserialized into.
    #[error(
        "type fingerprint mismatch: buffer was written with {written:#018x}, \
         expected {expected:#018x}"
    )]
    FramingBadVersion {
        /// Fingerprint recorded in the buffer.
        written: u64,
        /// Fingerprint of the type requested by the caller.
        expected: u64,
    },

    /// The checksum recorded in the framing header does not match the
    /// checksum recomputed over the payload.
    #[error(
        "checksum mismatch: buffer recorded {recorded:#018x}, computed \
         {computed:#018x}"
    )]
    FramingBadChecksum {
        /// Checksum recorded in the buffer.
        recorded: u64,
        /// Checksum recomputed from the payload bytes.
        computed: u64,
    },

    /// A relative pointer resolves outside the bounds of the buffer.
    #[error("offset {offset} with pointee size {size} is out of bounds for a buffer of {len} bytes")]
    OffsetOutOfBounds {
        /// Absolute byte offset the pointer resolved to.
        offset: i64,
        /// Size in bytes of the pointee that would be read there.
        size: usize,
        /// Length of the buffer being validated.
        len: usize,
    },

    /// A relative pointer resolves to an address that isn't aligned for
    /// its pointee type.
    #[error("offset {offset} is not aligned to {align} bytes")]
    BadAlignment {
        /// Absolute byte offset the pointer resolved to.
        offset: i64,
        /// Required alignment in bytes.
        align: usize,
    },

    /// A container's `self_allocated` bit was set in a buffer being read
    /// back as a borrowed view, or two live pointers claimed ownership of
    /// overlapping byte ranges.
    #[error("{0}")]
    OwnershipViolation(&'static str),

    /// A container's declared length or capacity exceeds what the
    /// remaining buffer could possibly hold.
    #[error("container at offset {offset} declares {declared} elements of size {elem_size}, which overflows the {remaining}-byte region left in the buffer")]
    OversizedContainer {
        /// Offset of the container header.
        offset: i64,
        /// Declared element count.
        declared: u64,
        /// Size in bytes of one element.
        elem_size: usize,
        /// Bytes remaining in the buffer from `offset` onward.
        remaining: usize,
    },

    /// A swiss-style hash table's control bytes are inconsistent with its
    /// declared length and capacity.
    #[error("{0}")]
    HashTableInvariantViolated(&'static str),

    /// An I/O operation on a file-backed sink or mapping failed.
    #[error("I/O failure: {0}")]
    IOFailure(#[from] std::io::Error),

    /// The sink could not grow its backing allocation.
    #[error("out of memory while growing to {requested} bytes")]
    OutOfMemory {
        /// Bytes requested.
        requested: usize,
    },
}
