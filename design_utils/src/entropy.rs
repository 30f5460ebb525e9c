//! Entropy pool for fault-injection delay jitter.
//!
//! Grounded in `fiproc.c`: a 128-byte pool is refilled by expanding 8 fresh
//! TRNG bytes into two 64-byte blocks under a keyed BLAKE2b (the block index
//! is the hashed message, the TRNG bytes are the key), which are then
//! XOR-mixed into whatever was already in the pool rather than overwriting
//! it outright. `fi_delay` consumes one pool byte per call as a busy-loop
//! tick count; asserting the pool is non-empty mirrors the original's
//! `UTIL_ASSERT(!fiproc_pool_empty())` - running dry is a firmware bug, not
//! a recoverable condition.

use max78000_hal::timer::spin_ticks;
use max78000_hal::trng::TrueRandom;

use crate::crypto::keyed_hash_64;

pub const POOL_SIZE: usize = 128;

pub struct EntropyPool {
    buf: [u8; POOL_SIZE],
    cursor: usize,
}

impl EntropyPool {
    pub const fn new() -> Self {
        EntropyPool {
            buf: [0; POOL_SIZE],
            cursor: POOL_SIZE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cursor >= POOL_SIZE
    }

    /// Refills the pool from 8 bytes of true randomness, XOR-mixing the
    /// freshly expanded bytes into whatever residue remains.
    pub fn refill(&mut self, trng_bytes: [u8; 8]) {
        for (block_index, chunk) in self.buf.chunks_mut(64).enumerate() {
            let message = (block_index as u32).to_le_bytes();
            let expansion = keyed_hash_64(&trng_bytes, &message);
            for (slot, fresh) in chunk.iter_mut().zip(expansion.iter()) {
                *slot ^= fresh;
            }
        }
        self.cursor = 0;
    }

    /// Refills the pool by drawing 8 Von Neumann-whitened bytes from `trng`.
    pub fn refill_from(&mut self, trng: &mut impl TrueRandom) {
        let mut bytes = [0u8; 8];
        trng.fill_unbiased(&mut bytes);
        self.refill(bytes);
    }

    fn next_byte(&mut self) -> u8 {
        assert!(!self.is_empty(), "entropy pool exhausted before refill");
        let byte = self.buf[self.cursor];
        self.cursor += 1;
        byte
    }
}

impl Default for EntropyPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Busy-waits for a data-dependent, short interval, consuming one byte of
/// entropy as the tick count.
pub fn fi_delay(pool: &mut EntropyPool) {
    let ticks = pool.next_byte();
    spin_ticks(ticks as u32);
}

/// Busy-waits for a longer, data-dependent interval, drawing its tick count
/// straight from the TRNG rather than the entropy pool - used around the
/// host command dispatch, where the extra jitter budget is available.
pub fn fi_ranged_delay(trng: &mut impl TrueRandom) {
    let ticks = trng.next_u16();
    spin_ticks(ticks as u32);
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use max78000_hal::trng::SimTrng;

    #[test]
    fn fresh_pool_is_empty() {
        let pool = EntropyPool::new();
        assert!(pool.is_empty());
    }

    #[test]
    fn refill_makes_pool_nonempty_and_consumable() {
        let mut pool = EntropyPool::new();
        pool.refill([1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(!pool.is_empty());

        for _ in 0..POOL_SIZE {
            fi_delay(&mut pool);
        }
        assert!(pool.is_empty());
    }

    #[test]
    #[should_panic(expected = "entropy pool exhausted")]
    fn draining_past_empty_panics() {
        let mut pool = EntropyPool::new();
        pool.refill([0; 8]);
        for _ in 0..(POOL_SIZE + 1) {
            fi_delay(&mut pool);
        }
    }

    #[test]
    fn refill_from_trng_draws_eight_bytes() {
        let mut pool = EntropyPool::new();
        let mut trng = SimTrng::new(42);
        pool.refill_from(&mut trng);
        assert!(!pool.is_empty());
    }
}
