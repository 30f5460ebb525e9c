//! True random number source.
//!
//! Shaped after the board support package's `Trng`, which busy-waits on the
//! hardware TRNG's ready flag and hands back 32-bit words. `TrueRandom` is
//! the trait boundary the firmware's entropy pool and FI jitter delays are
//! written against; a real backend wires `next_u32` to the MAX78000's TRNG
//! peripheral, `SimTrng` wires it to a seeded PRNG for host testing.

use core::mem::size_of;

pub trait TrueRandom {
    fn next_u32(&mut self) -> u32;

    fn next_u16(&mut self) -> u16 {
        self.next_u32() as u16
    }

    fn rand_bytes(&mut self, data: &mut [u8]) {
        for chunk in data.chunks_mut(size_of::<u32>()) {
            let n = self.next_u32();
            chunk.copy_from_slice(&n.to_be_bytes()[..chunk.len()]);
        }
    }

    fn gen_nonce<const N: usize>(&mut self) -> [u8; N] {
        let mut nonce = [0; N];
        self.rand_bytes(&mut nonce);
        nonce
    }

    /// Von Neumann-whitened fill: draws raw words and keeps one bit per
    /// differing pair, discarding matching pairs, so a biased hardware TRNG
    /// cannot skew the output toward 0 or 1. Slower than [`rand_bytes`] and
    /// unbounded in the number of underlying draws; used for secret-facing
    /// randomness rather than nonces, where a biased source is a real
    /// cryptographic weakness rather than a cosmetic one.
    ///
    /// [`rand_bytes`]: TrueRandom::rand_bytes
    fn fill_unbiased(&mut self, output: &mut [u8]) {
        let mut current_byte = 0u8;
        let mut bits_generated = 0u8;
        let mut index = 0usize;

        while index < output.len() {
            let mut stream = self.next_u32();

            let mut bit = 0u32;
            while bit < 8 {
                let bit1 = (stream >> 1) as u8 & 1;
                let bit2 = stream as u8 & 1;
                stream >>= 2;
                bit += 2;

                if (bit1 ^ bit2) & 1 != 0 {
                    current_byte = (current_byte << 1) | bit1;
                    bits_generated += 1;

                    if bits_generated == 8 {
                        output[index] = current_byte;
                        index += 1;
                        current_byte = 0;
                        bits_generated = 0;

                        if index >= output.len() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Host-testable TRNG backed by a counter-mixed splitmix-style generator.
///
/// This is not cryptographically meaningful - it exists only so the FI
/// shield and entropy pool can be exercised deterministically off the
/// target. A real backend should draw straight from the MAX78000 hardware
/// TRNG rather than any software PRNG.
pub struct SimTrng {
    state: u64,
}

impl SimTrng {
    pub fn new(seed: u64) -> Self {
        SimTrng { state: seed }
    }
}

impl TrueRandom for SimTrng {
    fn next_u32(&mut self) -> u32 {
        // splitmix64 step
        self.state = self.state.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        (z ^ (z >> 31)) as u32
    }
}
