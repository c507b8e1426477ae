//! The framing envelope (component C8): an optional fingerprint, an
//! optional checksum, and the payload, in that order.

use alloc::vec::Vec;

use crate::checksum::{fnv1a, FNV_OFFSET_BASIS_U64};

/// Bit flags selecting which parts of the framing envelope are present
/// and how the payload inside it is encoded.
///
/// Unlike the teacher, which picks most of this at compile time through
/// Cargo features, `Mode` is a runtime value here: §6 of the
/// specification requires per-call control over versioning and
/// integrity checking, independent of the target's compiled-in
/// endianness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode(u32);

impl Mode {
    /// No framing at all: the buffer is the bare payload, and the
    /// deserialization verifier's bounds/alignment checks are skipped
    /// entirely. Fastest, least safe; only meant for buffers that are
    /// already known-trusted (e.g. round-tripped in the same process).
    pub const UNCHECKED: Mode = Mode(1 << 0);

    /// Prefix the payload with an 8-byte type fingerprint (C5), checked
    /// against the fingerprint of the type being deserialized into.
    pub const WITH_VERSION: Mode = Mode(1 << 1);

    /// Prefix the payload with an 8-byte FNV-1a checksum (C2), checked
    /// against a recomputed checksum of the payload before trusting it.
    pub const WITH_INTEGRITY: Mode = Mode(1 << 2);

    /// Serialize multi-byte scalars and offsets in big-endian order
    /// regardless of the crate's compiled-in endian feature. Used by the
    /// cross-endian round-trip scenario in §8.
    pub const SERIALIZE_BIG_ENDIAN: Mode = Mode(1 << 3);

    /// Keep revalidating already-visited offsets on every revisit
    /// instead of trusting the verifier's visited set after the first
    /// pass. Slower, used when a buffer must be proven fully self-
    /// consistent rather than merely cycle-safe.
    pub const DEEP_CHECK: Mode = Mode(1 << 4);

    /// An empty mode: no flags set.
    pub const fn empty() -> Self {
        Mode(0)
    }

    /// Whether `self` has every flag set in `other`.
    pub const fn contains(self, other: Mode) -> bool {
        self.0 & other.0 == other.0
    }

    /// The union of `self` and `other`.
    pub const fn union(self, other: Mode) -> Mode {
        Mode(self.0 | other.0)
    }
}

impl core::ops::BitOr for Mode {
    type Output = Mode;

    fn bitor(self, rhs: Mode) -> Mode {
        self.union(rhs)
    }
}

/// Size in bytes of the fingerprint field, when present.
pub const FINGERPRINT_LEN: usize = 8;

/// Size in bytes of the checksum field, when present.
pub const CHECKSUM_LEN: usize = 8;

/// The parsed framing header of a buffer: which fields were present and
/// what they recorded, plus the byte offset at which the payload begins.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    /// The recorded type fingerprint, if [`Mode::WITH_VERSION`] was set.
    pub fingerprint: Option<u64>,
    /// The recorded checksum, if [`Mode::WITH_INTEGRITY`] was set.
    pub checksum: Option<u64>,
    /// Byte offset within the buffer at which the payload begins.
    pub payload_start: usize,
}

/// Parses the framing header out of `buf` according to `mode`.
///
/// Returns `Err` with `(expected, found)` lengths if `buf` is shorter
/// than the header `mode` requires.
pub fn parse_header(buf: &[u8], mode: Mode) -> Result<Header, (usize, usize)> {
    let mut expected = 0usize;
    if mode.contains(Mode::WITH_VERSION) {
        expected += FINGERPRINT_LEN;
    }
    if mode.contains(Mode::WITH_INTEGRITY) {
        expected += CHECKSUM_LEN;
    }
    if buf.len() < expected {
        return Err((expected, buf.len()));
    }

    let mut pos = 0;
    let fingerprint = if mode.contains(Mode::WITH_VERSION) {
        let bytes: [u8; 8] = buf[pos..pos + 8].try_into().unwrap();
        pos += 8;
        Some(decode_u64(bytes, mode))
    } else {
        None
    };
    let checksum = if mode.contains(Mode::WITH_INTEGRITY) {
        let bytes: [u8; 8] = buf[pos..pos + 8].try_into().unwrap();
        pos += 8;
        Some(decode_u64(bytes, mode))
    } else {
        None
    };

    Ok(Header {
        fingerprint,
        checksum,
        payload_start: pos,
    })
}

/// Writes a framing header for `payload` into `out`, returning the bytes
/// written.
pub fn write_header(mode: Mode, fingerprint: u64, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    if mode.contains(Mode::WITH_VERSION) {
        out.extend_from_slice(&encode_u64(fingerprint, mode));
    }
    if mode.contains(Mode::WITH_INTEGRITY) {
        let sum = fnv1a(FNV_OFFSET_BASIS_U64, payload);
        out.extend_from_slice(&encode_u64(sum, mode));
    }
    out
}

/// Recomputes the checksum of `payload` the same way [`write_header`]
/// does, for verification on read.
pub fn payload_checksum(payload: &[u8]) -> u64 {
    fnv1a(FNV_OFFSET_BASIS_U64, payload)
}

fn encode_u64(value: u64, mode: Mode) -> [u8; 8] {
    if mode.contains(Mode::SERIALIZE_BIG_ENDIAN) {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    }
}

fn decode_u64(bytes: [u8; 8], mode: Mode) -> u64 {
    if mode.contains(Mode::SERIALIZE_BIG_ENDIAN) {
        u64::from_be_bytes(bytes)
    } else {
        u64::from_le_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mode_has_no_header() {
        let header = parse_header(&[], Mode::empty()).unwrap();
        assert_eq!(header.payload_start, 0);
        assert!(header.fingerprint.is_none());
        assert!(header.checksum.is_none());
    }

    #[test]
    fn version_and_integrity_round_trip() {
        let mode = Mode::WITH_VERSION | Mode::WITH_INTEGRITY;
        let payload = b"payload bytes";
        let mut buf = write_header(mode, 0x1234, payload);
        buf.extend_from_slice(payload);
        let header = parse_header(&buf, mode).unwrap();
        assert_eq!(header.fingerprint, Some(0x1234));
        assert_eq!(header.checksum, Some(payload_checksum(payload)));
    }

    #[test]
    fn short_buffer_rejected() {
        assert!(parse_header(&[0; 4], Mode::WITH_VERSION).is_err());
    }
}
