//! Monotonic clock and busy-wait delays.
//!
//! The board support package derives [`Instant`] from a free-running SysTick
//! counter plus a software wrap count, and implements `sleep` by spinning
//! until that clock has advanced far enough. This crate keeps the same
//! shape - a wrapping tick counter behind a `Clock` trait - but without a
//! wired SysTick the tick rate is a calibration constant rather than a
//! measured system clock frequency; a real backend should replace
//! [`TickClock`]'s counter with the actual SysTick/GCR pair.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

pub trait Clock {
    /// Ticks elapsed since boot, at [`Clock::TICKS_PER_SECOND`] resolution.
    fn ticks(&self) -> u64;

    const TICKS_PER_SECOND: u64;

    fn now(&self) -> Duration {
        let ticks = self.ticks();
        Duration::from_secs(ticks / Self::TICKS_PER_SECOND)
            + Duration::from_nanos(
                (ticks % Self::TICKS_PER_SECOND) * 1_000_000_000 / Self::TICKS_PER_SECOND,
            )
    }
}

/// Software tick counter, advanced by a `tick()` call per elapsed
/// millisecond. A real backend wires this to the SysTick exception instead.
pub struct TickClock {
    ticks: AtomicU64,
}

impl TickClock {
    pub const TICKS_PER_SECOND: u64 = 1000;

    pub const fn new() -> Self {
        TickClock {
            ticks: AtomicU64::new(0),
        }
    }

    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

impl Clock for TickClock {
    const TICKS_PER_SECOND: u64 = TickClock::TICKS_PER_SECOND;

    fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

/// Spins until `duration` has elapsed on `clock`.
pub fn sleep(clock: &TickClock, duration: Duration) {
    let start = clock.now();
    while clock.now() - start < duration {
        core::hint::spin_loop();
    }
}

/// A blocking wait of a given length, abstracted so code that must wait
/// between retries (the lockout countdown) can be driven by a real clock on
/// the target and by an instant no-op off it.
pub trait Delay {
    fn delay_us(&mut self, microseconds: u64);
}

/// Delays by spinning `clock` forward, the real-firmware backend.
pub struct SpinDelay<'a> {
    clock: &'a TickClock,
}

impl<'a> SpinDelay<'a> {
    pub fn new(clock: &'a TickClock) -> Self {
        SpinDelay { clock }
    }
}

impl Delay for SpinDelay<'_> {
    fn delay_us(&mut self, microseconds: u64) {
        sleep(self.clock, Duration::from_micros(microseconds));
    }
}

/// A delay that returns immediately, for driving time-dependent logic in
/// tests without actually waiting on it.
#[derive(Default)]
pub struct NullDelay;

impl Delay for NullDelay {
    fn delay_us(&mut self, _microseconds: u64) {}
}

/// Busy-spins for roughly `ticks` iterations. Used by the FI shield to add
/// jitter around security-sensitive compares; the exact cycle count is not
/// meaningful off-target, only that it is non-zero and data-dependent.
pub fn spin_ticks(mut ticks: u32) {
    while ticks > 0 {
        core::hint::black_box(ticks);
        ticks -= 1;
    }
}
