//! Attack lockout.
//!
//! Grounded in `lockout.c`: a countdown persisted at a fixed flash address
//! is decremented once per [`LOCKOUT_PERIOD_US`] until it hits zero.
//! `attack_detected` resets it to [`LOCKOUT_TIME_PERIODS`] and immediately
//! runs the countdown inline, so the firmware is unresponsive to host
//! commands for the full lockout window rather than merely refusing to act
//! on them. `lockout_process` at boot clamps a corrupted counter back down
//! to the maximum rather than trusting it, since a counter that reads
//! higher than the max can only be flash corruption or tampering, never a
//! legitimate state.

use bytemuck::{Pod, Zeroable};
use max78000_hal::flash::{FlashPage, NvmPage};
use max78000_hal::timer::Delay;

pub const LOCKOUT_TIME_PERIODS: u32 = 60;
pub const LOCKOUT_PERIOD_US: u64 = 100_000;

const LOCKOUT_MAGIC: u32 = 0x4c4f_434b; // "LOCK"

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Counter {
    remaining: u32,
}

pub struct LockoutTimer<P: NvmPage> {
    page: FlashPage<Counter, P>,
}

impl<P: NvmPage> LockoutTimer<P> {
    pub fn new(page: P) -> Self {
        LockoutTimer {
            page: FlashPage::new(page, LOCKOUT_MAGIC),
        }
    }

    fn remaining(&self) -> u32 {
        self.page.get().map(|c| c.remaining).unwrap_or(0)
    }

    fn set_remaining(&mut self, value: u32) {
        self.page.set(&Counter { remaining: value });
    }

    /// Runs at boot (and after `attack_detected`): clamps a corrupted or
    /// missing counter down to [`LOCKOUT_TIME_PERIODS`], then blocks until
    /// it reaches zero, persisting the decremented value every tick so a
    /// reset mid-countdown resumes rather than restarts.
    pub fn run(&mut self, delay: &mut impl Delay) {
        let mut remaining = self.remaining();
        if remaining > LOCKOUT_TIME_PERIODS {
            remaining = LOCKOUT_TIME_PERIODS;
            self.set_remaining(remaining);
        }

        while remaining > 0 {
            delay.delay_us(LOCKOUT_PERIOD_US);
            remaining -= 1;
            self.set_remaining(remaining);
        }

        self.set_remaining(0);
    }

    /// Arms a full lockout window and immediately waits it out.
    pub fn attack_detected(&mut self, delay: &mut impl Delay) {
        self.set_remaining(LOCKOUT_TIME_PERIODS);
        self.run(delay);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use max78000_hal::flash::SimPage;
    use max78000_hal::timer::NullDelay;

    #[test]
    fn fresh_timer_runs_through_without_blocking_state() {
        let mut timer = LockoutTimer::new(SimPage::erased());
        timer.run(&mut NullDelay);
        assert_eq!(timer.remaining(), 0);
    }

    #[test]
    fn attack_detected_rearms_to_the_maximum_then_drains() {
        let mut timer = LockoutTimer::new(SimPage::erased());
        timer.attack_detected(&mut NullDelay);
        assert_eq!(timer.remaining(), 0);
    }

    #[test]
    fn corrupted_counter_above_max_is_clamped_at_boot() {
        let mut timer = LockoutTimer::new(SimPage::erased());
        timer.set_remaining(9000);
        timer.run(&mut NullDelay);
        assert_eq!(timer.remaining(), 0);
    }
}
