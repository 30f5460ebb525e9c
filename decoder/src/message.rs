//! Host framing protocol.
//!
//! Grounded in `host_messaging.c`'s `send_msg`/`get_msg`: every message
//! starts with a one-byte magic sync (`'%'`), a one-byte type and a
//! little-endian 16-bit length, then the body in `MSG_CHUNK_SIZE`-byte
//! chunks. An ACK follows the header and every chunk, except for `DEBUG`
//! messages, which are fire-and-forget diagnostics that never get (or
//! expect) one. A bad ACK is a protocol violation the original firmware
//! silently gives up on rather than retries or reports.

use max78000_hal::uart::{SerialPort, Uart};
use thiserror_no_std::Error;

pub const MAGIC: u8 = b'%';
pub const HEADER_SIZE: usize = 4;
pub const CHUNK_SIZE: usize = 256;
pub const MAX_BODY_SIZE: usize = 2188; // largest packet: the subscription update

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Decode = b'D',
    Subscribe = b'S',
    List = b'L',
    Ack = b'A',
    Error = b'E',
    Debug = b'G',
}

impl Opcode {
    fn from_byte(byte: u8) -> Option<Opcode> {
        match byte {
            b'D' => Some(Opcode::Decode),
            b'S' => Some(Opcode::Subscribe),
            b'L' => Some(Opcode::List),
            b'A' => Some(Opcode::Ack),
            b'E' => Some(Opcode::Error),
            b'G' => Some(Opcode::Debug),
            _ => None,
        }
    }

    /// `DEBUG` is the only opcode that neither expects nor sends an ACK.
    fn acks(self) -> bool {
        !matches!(self, Opcode::Debug)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MessageError {
    #[error("unrecognised opcode byte")]
    UnknownOpcode,
    #[error("message body exceeds the receive buffer")]
    BodyTooLarge,
    #[error("host did not acknowledge, protocol violation")]
    ProtocolViolation,
}

pub struct Message<'a> {
    pub opcode: Opcode,
    pub body: &'a [u8],
}

/// Host-framing channel layered over a byte-oriented serial port.
pub struct HostChannel<P: SerialPort> {
    uart: Uart<P>,
}

impl<P: SerialPort> HostChannel<P> {
    pub fn new(uart: Uart<P>) -> Self {
        HostChannel { uart }
    }

    /// Blocks until the next message header synchronises on [`MAGIC`],
    /// reads its body (ACKing the header and every chunk along the way
    /// unless the opcode is `DEBUG`), and returns it in `buf`.
    pub fn receive<'a>(&mut self, buf: &'a mut [u8; MAX_BODY_SIZE]) -> Result<Message<'a>, MessageError> {
        let (opcode, len) = self.read_header()?;

        if opcode.acks() {
            self.send_ack();
        }

        if len > MAX_BODY_SIZE {
            self.drain_body(len, opcode);
            return Err(MessageError::BodyTooLarge);
        }

        self.read_body(&mut buf[..len], opcode)?;
        Ok(Message { opcode, body: &buf[..len] })
    }

    pub fn send(&mut self, opcode: Opcode, body: &[u8]) -> Result<(), MessageError> {
        self.write_header(opcode, body.len())?;

        if opcode.acks() && !self.read_ack() {
            return Err(MessageError::ProtocolViolation);
        }

        for chunk in body.chunks(CHUNK_SIZE) {
            self.uart.write_bytes(chunk);

            if opcode.acks() && !self.read_ack() {
                return Err(MessageError::ProtocolViolation);
            }
        }

        Ok(())
    }

    pub fn send_error(&mut self, text: &[u8]) {
        // best-effort: diagnostics never fail the caller, a dropped ACK
        // here is the host's problem, not ours.
        let _ = self.send(Opcode::Error, text);
    }

    pub fn send_debug(&mut self, text: &[u8]) {
        let _ = self.send(Opcode::Debug, text);
    }

    fn read_header(&mut self) -> Result<(Opcode, usize), MessageError> {
        loop {
            if self.uart.read_byte() == MAGIC {
                break;
            }
        }

        let type_byte = self.uart.read_byte();
        let opcode = Opcode::from_byte(type_byte).ok_or(MessageError::UnknownOpcode)?;

        let len_lo = self.uart.read_byte();
        let len_hi = self.uart.read_byte();
        let len = u16::from_le_bytes([len_lo, len_hi]) as usize;

        Ok((opcode, len))
    }

    fn write_header(&mut self, opcode: Opcode, len: usize) -> Result<(), MessageError> {
        if len > u16::MAX as usize {
            return Err(MessageError::BodyTooLarge);
        }

        let len_bytes = (len as u16).to_le_bytes();
        self.uart.write_byte(MAGIC);
        self.uart.write_byte(opcode as u8);
        self.uart.write_byte(len_bytes[0]);
        self.uart.write_byte(len_bytes[1]);
        Ok(())
    }

    fn read_body(&mut self, buf: &mut [u8], opcode: Opcode) -> Result<(), MessageError> {
        for chunk in buf.chunks_mut(CHUNK_SIZE) {
            for byte in chunk.iter_mut() {
                *byte = self.uart.read_byte();
            }

            if opcode.acks() {
                self.send_ack();
            }
        }
        Ok(())
    }

    /// Reads and discards `len` declared body bytes without ever holding
    /// more than a chunk of them, keeping the wire synchronised for the
    /// next header after an oversized body is rejected.
    fn drain_body(&mut self, len: usize, opcode: Opcode) {
        let mut remaining = len;
        while remaining > 0 {
            let this_chunk = remaining.min(CHUNK_SIZE);
            for _ in 0..this_chunk {
                self.uart.read_byte();
            }

            if opcode.acks() {
                self.send_ack();
            }
            remaining -= this_chunk;
        }
    }

    fn send_ack(&mut self) {
        let _ = self.write_header(Opcode::Ack, 0);
    }

    fn read_ack(&mut self) -> bool {
        matches!(self.read_header(), Ok((Opcode::Ack, 0)))
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use max78000_hal::uart::LoopbackPort;

    fn ack_bytes() -> [u8; HEADER_SIZE] {
        [MAGIC, Opcode::Ack as u8, 0, 0]
    }

    #[test]
    fn receive_decode_body_reassembles_single_chunk() {
        let mut input = std::vec::Vec::new();
        input.extend_from_slice(&[MAGIC, Opcode::Decode as u8, 5, 0]);
        input.extend_from_slice(b"hello");

        let mut channel = HostChannel::new(Uart::new(LoopbackPort::<512>::with_input(&input)));
        let mut buf = [0u8; MAX_BODY_SIZE];
        let msg = channel.receive(&mut buf).unwrap();

        assert_eq!(msg.opcode, Opcode::Decode);
        assert_eq!(msg.body, b"hello");
    }

    #[test]
    fn receive_rejects_unknown_opcode() {
        let input = [MAGIC, b'Z', 0, 0];
        let mut channel = HostChannel::new(Uart::new(LoopbackPort::<32>::with_input(&input)));
        let mut buf = [0u8; MAX_BODY_SIZE];
        assert_eq!(channel.receive(&mut buf), Err(MessageError::UnknownOpcode));
    }

    #[test]
    fn send_list_response_waits_for_ack_after_header_and_chunk() {
        let mut input = std::vec::Vec::new();
        input.extend_from_slice(&ack_bytes()); // header ack
        input.extend_from_slice(&ack_bytes()); // single-chunk body ack

        let mut channel = HostChannel::new(Uart::new(LoopbackPort::<512>::with_input(&input)));
        assert!(channel.send(Opcode::List, b"payload").is_ok());
    }

    #[test]
    fn debug_message_never_waits_for_an_ack() {
        // no bytes queued at all: if send_debug tried to read an ack it
        // would deadlock on an empty loopback port.
        let mut channel = HostChannel::new(Uart::new(LoopbackPort::<32>::with_input(&[])));
        channel.send_debug(b"booting");
    }
}
