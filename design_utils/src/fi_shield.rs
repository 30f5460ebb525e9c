//! Fault-injection hardening primitives.
//!
//! Grounded in `anti_hardware.rs`'s `multi_if!`/`const_time_equal_or_error!`
//! macros and the original firmware's `MULTI_IF_FAILIN`/`MULTI_IF_FAILOUT`:
//!
//! ```c
//! #define MULTI_IF_FAILIN(condition)  if (condition || condition || condition)
//! #define MULTI_IF_FAILOUT(condition) if (condition && condition && condition)
//! ```
//!
//! Both macros evaluate the already-computed condition three times rather
//! than recomputing it, so a fault that flips a single read of the flag -
//! not a fault in whatever produced the flag - cannot flip the verdict.
//! `multi_if_failin`/`multi_if_failout` below preserve that shape: the
//! caller computes `cond` once, volatile reads replay it three times.

use core::hint::black_box;
use core::ptr::read_volatile;

/// Three-fold re-read of `cond`, entering on any one of the three reads
/// being true. Use this to guard an error/attack branch: any single
/// corrupted read is enough to take the safe path.
pub fn multi_if_failin(cond: bool) -> bool {
    let flag = black_box(cond);
    let a = unsafe { read_volatile(&flag) };
    let b = unsafe { read_volatile(&flag) };
    let c = unsafe { read_volatile(&flag) };
    a || b || c
}

/// Three-fold re-read of `cond`, entering only if all three reads agree it
/// is true. Use this to guard a success branch: a single corrupted read is
/// enough to fall back to the safe (non-entered) path.
pub fn multi_if_failout(cond: bool) -> bool {
    let flag = black_box(cond);
    let a = unsafe { read_volatile(&flag) };
    let b = unsafe { read_volatile(&flag) };
    let c = unsafe { read_volatile(&flag) };
    a && b && c
}

/// Constant-time equality check, for comparisons that must not leak timing
/// (channel ids, magic words derived from attacker input are fine to
/// compare directly; subscription key material is not).
pub fn const_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failin_enters_on_true() {
        assert!(multi_if_failin(true));
        assert!(!multi_if_failin(false));
    }

    #[test]
    fn failout_requires_true() {
        assert!(multi_if_failout(true));
        assert!(!multi_if_failout(false));
    }

    #[test]
    fn const_time_eq_matches_plain_comparison() {
        assert!(const_time_eq(b"abcd", b"abcd"));
        assert!(!const_time_eq(b"abcd", b"abce"));
        assert!(!const_time_eq(b"abcd", b"abc"));
    }
}
