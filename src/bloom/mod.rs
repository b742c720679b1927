//! Bloom Filter Module
//!
//! A space-efficient probabilistic set with no false negatives, used by
//! every [`SSTable`](crate::sstable::SSTable) to answer "is this key
//! definitely absent?" without touching disk.
//!
//! ## Design
//!
//! A bit array of `m` bits is probed at `k` positions per key using the
//! standard double-hashing scheme `h_i = (a + i·b) mod m`, where `a` and
//! `b` are the two 64-bit halves of an in-house keyed hash of the key
//! (two independently-seeded [`DefaultHasher`](std::collections::hash_map::DefaultHasher)
//! instances, not an external crate — this keeps the on-disk bit pattern
//! stable across dependency upgrades).
//!
//! `m` and `k` are derived once from the expected element count `n` and a
//! target false-positive rate `p`:
//!
//! ```text
//! m = ceil(-n * ln(p) / (ln 2)^2)
//! k = max(1, round((m / n) * ln 2))
//! ```
//!
//! ## On-disk format
//!
//! ```text
//! [k: u32 BE][m: u32 BE][bits: ceil(m / 8) bytes]
//! ```
//!
//! ## Guarantees
//!
//! - **No false negatives**: `contains(key)` is always `true` for every
//!   key previously passed to `add`.
//! - **Deterministic serialization**: `to_bytes`/`from_bytes` round-trip
//!   exactly.

#[cfg(test)]
mod tests;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use thiserror::Error;

/// Two distinct, fixed seeds used to derive the pair of 64-bit hash halves.
///
/// These are arbitrary constants baked into the format; changing them
/// would change the bit pattern produced for a given key, so they must
/// never be altered once data has been written with this format.
const SEED_A: u64 = 0x9E37_79B9_7F4A_7C15;
const SEED_B: u64 = 0xC2B2_AE3D_27D4_EB4F;

/// Header size in bytes: `k: u32 BE` + `m: u32 BE`.
const HEADER_SIZE: usize = 8;

/// Errors returned while deserializing a [`BloomFilter`] from bytes.
#[derive(Debug, Error)]
pub enum BloomError {
    /// The byte slice was too short to contain a valid header or bit array.
    #[error("truncated bloom filter: need at least {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required to decode the header or bit array.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },
}

/// A probabilistic set supporting insertion and membership queries with
/// no false negatives and a bounded false-positive rate.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    /// Number of hash probes per key.
    k: u32,
    /// Number of bits in the array.
    m: u32,
    /// Packed bit array, `ceil(m / 8)` bytes.
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Builds an empty filter sized for `expected_items` entries at the
    /// given target false-positive rate `fp_rate` (e.g. `0.01` for 1%).
    ///
    /// `expected_items = 0` still produces a usable (tiny) filter so that
    /// empty SSTables don't require special-casing at the call site.
    pub fn with_capacity(expected_items: usize, fp_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = fp_rate.clamp(f64::MIN_POSITIVE, 0.5);

        let m = (-(n * p.ln()) / (std::f64::consts::LN_2.powi(2))).ceil();
        let m = (m as u64).max(8) as u32;

        let k = ((m as f64 / n) * std::f64::consts::LN_2).round().max(1.0) as u32;

        Self {
            k,
            m,
            bits: vec![0u8; m.div_ceil(8) as usize],
        }
    }

    /// Number of hash probes performed per key.
    pub fn k(&self) -> u32 {
        self.k
    }

    /// Number of bits in the underlying array.
    pub fn m(&self) -> u32 {
        self.m
    }

    /// Computes the two 64-bit hash halves used to derive every probe
    /// position for `key`.
    fn hash_halves(key: &[u8]) -> (u64, u64) {
        let mut ha = DefaultHasher::new();
        SEED_A.hash(&mut ha);
        key.hash(&mut ha);
        let a = ha.finish();

        let mut hb = DefaultHasher::new();
        SEED_B.hash(&mut hb);
        key.hash(&mut hb);
        let b = hb.finish();

        (a, b)
    }

    /// Yields the `k` bit positions probed for `key`.
    fn positions(&self, key: &[u8]) -> impl Iterator<Item = u32> + '_ {
        let (a, b) = Self::hash_halves(key);
        let m = u64::from(self.m);
        (0..self.k).map(move |i| {
            let combined = a.wrapping_add((i as u64).wrapping_mul(b));
            (combined % m) as u32
        })
    }

    /// Inserts `key` into the filter.
    pub fn add(&mut self, key: &[u8]) {
        for pos in self.positions(key).collect::<Vec<_>>() {
            let byte = (pos / 8) as usize;
            let bit = pos % 8;
            self.bits[byte] |= 1 << bit;
        }
    }

    /// Returns `true` if `key` *might* be present; `false` means it is
    /// definitely absent.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.positions(key).all(|pos| {
            let byte = (pos / 8) as usize;
            let bit = pos % 8;
            self.bits[byte] & (1 << bit) != 0
        })
    }

    /// Serializes the filter as `[k: u32 BE][m: u32 BE][bits]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.bits.len());
        buf.extend_from_slice(&self.k.to_be_bytes());
        buf.extend_from_slice(&self.m.to_be_bytes());
        buf.extend_from_slice(&self.bits);
        buf
    }

    /// Deserializes a filter previously produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(buf: &[u8]) -> Result<Self, BloomError> {
        if buf.len() < HEADER_SIZE {
            return Err(BloomError::Truncated {
                needed: HEADER_SIZE,
                available: buf.len(),
            });
        }

        let k = u32::from_be_bytes(buf[0..4].try_into().expect("slice is 4 bytes"));
        let m = u32::from_be_bytes(buf[4..8].try_into().expect("slice is 4 bytes"));
        let expected_bits = m.div_ceil(8) as usize;

        if buf.len() < HEADER_SIZE + expected_bits {
            return Err(BloomError::Truncated {
                needed: HEADER_SIZE + expected_bits,
                available: buf.len(),
            });
        }

        let bits = buf[HEADER_SIZE..HEADER_SIZE + expected_bits].to_vec();
        Ok(Self { k, m, bits })
    }
}
