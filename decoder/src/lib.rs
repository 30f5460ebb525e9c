//! Decoder core: subscription storage, key-tree derivation, frame
//! decryption, the host wire protocol and the attack lockout, all expressed
//! against the [`max78000_hal`] traits so it can be exercised on a desk as
//! well as on target. `main.rs` is the thin `#![no_main]` shell that wires
//! this library to the real MAX78000 peripherals.
#![no_std]

pub mod context;
pub mod decode;
pub mod ectf_params;
pub mod keytree;
pub mod lockout;
pub mod message;
pub mod subscribe;
pub mod subscription;
