#![no_std]

//! Shared cryptographic primitives and fault-injection hardening used by
//! the decoder firmware.
//!
//! This crate used to also carry the application-processor/component
//! secure-boot protocol (signed/encrypted post-boot messages, I2C framing).
//! That protocol belongs to a different part of the system than the
//! satellite-TV decoder this tree now implements, so it has been dropped;
//! see `DESIGN.md` at the workspace root for the trim rationale.

pub mod crypto;
pub mod entropy;
pub mod fi_shield;

use thiserror_no_std::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    #[error("signature did not verify")]
    BadSignature,
    #[error("authenticated decryption failed")]
    BadAead,
    #[error("ciphertext shorter than the required metadata")]
    Truncated,
}
