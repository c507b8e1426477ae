//! Hashing support for [`containers::hash_map`](crate::containers::hash_map)
//! and [`containers::hash_set`](crate::containers::hash_set).
//!
//! Ported from the teacher's `hash.rs`: a small, dependency-free,
//! cross-platform 64-bit fxhash variant, used as the default hasher for
//! both serializing a key (to place it in a probe sequence) and looking
//! one up again later from an archived buffer, so the two sides agree
//! on where an entry landed without shipping a third-party hasher
//! dependency just for this.

use core::hash::{Hash, Hasher};
use core::ops::BitXor as _;

/// A cross-platform 64-bit implementation of fxhash.
#[derive(Default)]
pub struct FxHasher64 {
    hash: u64,
}

#[inline]
fn hash_word(hash: u64, word: u64) -> u64 {
    const ROTATE: u32 = 5;
    const SEED: u64 = 0x51_7c_c1_b7_27_22_0a_95;

    hash.rotate_left(ROTATE).bitxor(word).wrapping_mul(SEED)
}

#[inline]
fn hash_bytes(mut hash: u64, bytes: &[u8]) -> u64 {
    for chunk in bytes.chunks(8) {
        let mut buf = [0u8; 8];
        buf[..chunk.len()].copy_from_slice(chunk);
        hash = hash_word(hash, u64::from_le_bytes(buf));
    }
    hash
}

impl Hasher for FxHasher64 {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.hash = hash_bytes(self.hash, bytes);
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.hash
    }

    #[inline]
    fn write_u8(&mut self, i: u8) {
        self.hash = hash_word(self.hash, i as u64);
    }

    #[inline]
    fn write_u16(&mut self, i: u16) {
        self.hash = hash_word(self.hash, i as u64);
    }

    #[inline]
    fn write_u32(&mut self, i: u32) {
        self.hash = hash_word(self.hash, i as u64);
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.hash = hash_word(self.hash, i);
    }

    #[inline]
    fn write_usize(&mut self, i: usize) {
        self.hash = hash_word(self.hash, i as u64);
    }
}

/// Hashes `value` with a fresh default `H`.
pub fn hash_value<Q, H>(value: &Q) -> u64
where
    Q: Hash + ?Sized,
    H: Hasher + Default,
{
    let mut state = H::default();
    value.hash(&mut state);
    state.finish()
}
