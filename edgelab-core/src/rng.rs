//! Deterministic random source with a published algorithm.
//!
//! The generator is part of the public contract: any runtime that implements the
//! same three lines of arithmetic reproduces the same sequence from the same seed.
//!
//! - 32-bit linear congruential generator, modulus 2^32
//! - multiplier `1664525`, increment `1013904223`
//! - seeding: `state = (seed ^ (seed >> 32)) as u32`
//! - step: `state = state * 1664525 + 1013904223 (mod 2^32)`, output is the new state
//! - uniform: `state / 2^32`, index draws use `floor(uniform * n)` (high bits only)
//!
//! Sub-seeds for independent streams are derived with BLAKE3 so they do not
//! depend on the order in which streams are created.

use rand::{RngCore, SeedableRng};

pub const LCG_MULTIPLIER: u32 = 1_664_525;
pub const LCG_INCREMENT: u32 = 1_013_904_223;
const TWO_POW_32: f64 = 4_294_967_296.0;

/// Seedable, reproducible pseudo-random generator.
///
/// Not cryptographically secure. Reproducible across runtimes is the only goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterministicRng {
    state: u32,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: fold_seed(seed),
        }
    }

    /// Advance the generator and return the raw 32-bit state.
    pub fn next_raw(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        self.state
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_uniform(&mut self) -> f64 {
        self.next_raw() as f64 / TWO_POW_32
    }

    /// Uniform index in `[0, n)`. `n` must be non-zero.
    pub fn next_index(&mut self, n: usize) -> usize {
        debug_assert!(n > 0, "next_index requires n > 0");
        let idx = (self.next_uniform() * n as f64) as usize;
        // uniform < 1.0 keeps idx < n; clamp guards float edge cases for huge n
        idx.min(n - 1)
    }

    /// `size` independent draws from `[0, n)`, with replacement.
    pub fn resample_indices(&mut self, n: usize, size: usize) -> Vec<usize> {
        if n == 0 {
            return Vec::new();
        }
        (0..size).map(|_| self.next_index(n)).collect()
    }

    /// Block-bootstrap index sequence of length `n`.
    ///
    /// Draws contiguous blocks of `block_size` (clamped to `n`) starting at
    /// uniform offsets in `[0, n - block_size]`, concatenated and truncated to `n`.
    pub fn resample_blocks(&mut self, n: usize, block_size: usize) -> Vec<usize> {
        if n == 0 {
            return Vec::new();
        }
        let block = block_size.clamp(1, n);
        let offsets = n - block + 1;
        let mut out = Vec::with_capacity(n + block);
        while out.len() < n {
            let start = self.next_index(offsets);
            out.extend(start..start + block);
        }
        out.truncate(n);
        out
    }
}

impl RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.next_raw()
    }

    fn next_u64(&mut self) -> u64 {
        let hi = self.next_raw() as u64;
        let lo = self.next_raw() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_raw().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for DeterministicRng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u64::from_le_bytes(seed))
    }

    // rand's default expands the seed through its own PCG; the contract here is
    // that a u64 seed means exactly `DeterministicRng::new(seed)`.
    fn seed_from_u64(seed: u64) -> Self {
        Self::new(seed)
    }
}

fn fold_seed(seed: u64) -> u32 {
    (seed ^ (seed >> 32)) as u32
}

/// Derive an independent sub-seed for a labelled stream (symbol, regime, ...).
///
/// Hash-based, so the same `(master, label)` always yields the same seed no
/// matter how many other streams were derived before it.
pub fn derive_seed(master: u64, label: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&master.to_le_bytes());
    hasher.update(label.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}
