#![no_std]

//! Board-support layer for the decoder firmware.
//!
//! The vendored register definitions for the MAX78000 (the `max78000_device`
//! SVD crate) are not part of this tree, so this HAL does not poke PAC
//! registers directly the way the original board support package does.
//! Instead it exposes the same three port abstractions the firmware actually
//! consumes - a flash page, a byte-oriented serial port and a true random
//! number source - as traits, plus a small set of concrete backends. Wiring
//! a trait impl to real MAX78000 registers (UART0, the flash controller,
//! TRNG, GCR/GPIO clock and pin setup, the MPU) is board bring-up work that
//! lives outside this crate's scope.

pub mod flash;
pub mod timer;
pub mod trng;
pub mod uart;

use thiserror_no_std::Error;

#[derive(Debug, Error)]
pub enum HalError {
    #[error("flash operation failed")]
    FlashError,
    #[error("operation timed out")]
    Timeout,
}
