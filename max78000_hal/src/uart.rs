//! Byte-oriented serial port.
//!
//! The board support package's `Uart` busy-waits on UART0's FIFO status
//! flags and echoes every received byte back out (emulating the MSDK's
//! `_read`/`_write` semantics so a terminal looks normal over the link).
//! `SerialPort` captures that same read/write/echo contract as a trait so
//! the host framing layer in the decoder crate can run against a recorded
//! byte stream in tests instead of a live UART.

use core::str;

pub trait SerialPort {
    fn write_byte(&mut self, byte: u8);
    fn read_byte(&mut self) -> u8;
}

/// Thin convenience wrapper adding the buffered helpers the host framing
/// layer needs on top of a raw [`SerialPort`].
pub struct Uart<P: SerialPort> {
    port: P,
}

impl<P: SerialPort> Uart<P> {
    pub fn new(port: P) -> Self {
        Uart { port }
    }

    pub fn write_byte(&mut self, byte: u8) {
        self.port.write_byte(byte);
    }

    pub fn read_byte(&mut self) -> u8 {
        self.port.read_byte()
    }

    pub fn write_bytes(&mut self, buffer: &[u8]) {
        for &byte in buffer {
            self.port.write_byte(byte);
        }
    }

    /// Reads bytes into `buffer`, echoing each one back and stopping (and
    /// translating `\r` into `\n`) the moment a carriage return arrives,
    /// matching the line-oriented console behaviour hosts talk to the
    /// decoder with.
    pub fn read_bytes<'a>(&mut self, buffer: &'a mut [u8]) -> &'a [u8] {
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.port.read_byte();
            self.port.write_byte(*byte);

            if *byte == b'\r' {
                *byte = b'\n';
                return &buffer[..(i + 1)];
            }
        }

        buffer
    }

    pub fn recv_input<'a>(&mut self, buf: &'a mut [u8]) -> Option<&'a str> {
        let input = self.read_bytes(buf);
        str::from_utf8(input).ok()
    }
}

/// Host-testable serial port backed by an input queue and an output log.
///
/// `N` bounds both the replayed input and the recorded output; it has no
/// firmware-side counterpart, it just has to be big enough for a test's
/// longest exchange.
pub struct LoopbackPort<const N: usize> {
    rx: [u8; N],
    rx_len: usize,
    rx_pos: usize,
    tx: [u8; N],
    tx_len: usize,
}

impl<const N: usize> LoopbackPort<N> {
    pub fn with_input(input: &[u8]) -> Self {
        let mut rx = [0u8; N];
        rx[..input.len()].copy_from_slice(input);
        LoopbackPort {
            rx,
            rx_len: input.len(),
            rx_pos: 0,
            tx: [0u8; N],
            tx_len: 0,
        }
    }

    pub fn written(&self) -> &[u8] {
        &self.tx[..self.tx_len]
    }
}

impl<const N: usize> SerialPort for LoopbackPort<N> {
    fn write_byte(&mut self, byte: u8) {
        self.tx[self.tx_len] = byte;
        self.tx_len += 1;
    }

    fn read_byte(&mut self) -> u8 {
        debug_assert!(self.rx_pos < self.rx_len, "loopback port exhausted");
        let byte = self.rx[self.rx_pos];
        self.rx_pos += 1;
        byte
    }
}
