//! Endian-aware archived primitive types.
//!
//! `cairn` picks its scalar encoding at compile time through the
//! `little_endian`/`big_endian` features, exactly like the `rend` crate it
//! wraps. Every multi-byte value written into a buffer -- offsets, lengths,
//! hashes, user scalars -- goes through one of these types so that a buffer
//! produced on one endianness can be read back correctly so long as the
//! same feature is enabled on both ends (see `Mode::SERIALIZE_BIG_ENDIAN`
//! in [`crate::framing`] for the one case where the encoding is chosen at
//! runtime instead).

#[cfg(feature = "little_endian")]
use rend::{
    f32_le, f64_le, i128_le, i16_le, i32_le, i64_le, u128_le, u16_le, u32_le,
    u64_le,
};

#[cfg(feature = "big_endian")]
use rend::{
    f32_be, f64_be, i128_be, i16_be, i32_be, i64_be, u128_be, u16_be, u32_be,
    u64_be,
};

macro_rules! define_archived {
    ($archived:ident, $le:ty, $be:ty) => {
        #[cfg(feature = "little_endian")]
        pub type $archived = $le;
        #[cfg(feature = "big_endian")]
        pub type $archived = $be;
    };
}

define_archived!(ArchivedI16, i16_le, i16_be);
define_archived!(ArchivedI32, i32_le, i32_be);
define_archived!(ArchivedI64, i64_le, i64_be);
define_archived!(ArchivedI128, i128_le, i128_be);
define_archived!(ArchivedU16, u16_le, u16_be);
define_archived!(ArchivedU32, u32_le, u32_be);
define_archived!(ArchivedU64, u64_le, u64_be);
define_archived!(ArchivedU128, u128_le, u128_be);
define_archived!(ArchivedF32, f32_le, f32_be);
define_archived!(ArchivedF64, f64_le, f64_be);

/// The fixed native width used for container lengths and capacities.
///
/// Reference implementations of this data model have used pointer-width
/// offsets; `cairn` fixes the width at 64 bits unconditionally rather than
/// tracking the host's pointer width, since the whole point of the format
/// is to be read back on a different machine than the one that wrote it.
pub type FixedUsize = u64;

/// The archived counterpart of [`FixedUsize`].
pub type ArchivedUsize = ArchivedU64;

/// The signed twin of [`FixedUsize`], used for relative-pointer arithmetic
/// (see [`crate::rel_ptr`]) since an offset may be negative.
pub type FixedIsize = i64;

/// The archived counterpart of [`FixedIsize`].
pub type ArchivedIsize = ArchivedI64;
