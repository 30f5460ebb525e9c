//! Frame decode pipeline.
//!
//! Transcribed from `frame.c`'s `decode()`. The pipeline peels two
//! authenticated layers - the channel key `kch` opens the outer timestamped
//! envelope, the key-tree leaf key opens the inner frame payload - and
//! treats a handful of failures as signs of an active attacker (wrong
//! frequency key, oversized frame) rather than ordinary protocol errors
//! (unknown channel, stale timestamp, timestamp outside the subscription
//! window). Only the attacker-signal failures arm the lockout; the rest
//! just get a generic error back to the host. Signature failure on the
//! outer envelope is deliberately *not* one of the attacker-signal cases:
//! the original firmware treats a bad encoder signature on a frame as
//! benign, since an encoder-signed stream glitching in transit is exactly
//! the kind of thing that should not cost the viewer sixty seconds of
//! lockout.

use bytemuck::{Pod, Zeroable};
use design_utils::crypto::{decrypt_aead, verify_sig, AEAD_METADATA_LEN, SIGNATURE_LEN};
use max78000_hal::flash::NvmPage;
use max78000_hal::timer::Delay;
use max78000_hal::trng::TrueRandom;

use crate::context::DecoderContext;
use crate::keytree::{derive_tree_key, key_index_for_time};

pub const MAX_FRAME_SIZE: usize = 64;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FrameData {
    pub length: u32,
    pub frame: [u8; MAX_FRAME_SIZE],
}

const _: () = assert!(core::mem::size_of::<FrameData>() == 68);

const FRAME_CH_CIPHERTEXT_LEN: usize = AEAD_METADATA_LEN + core::mem::size_of::<FrameData>();

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FrameCh {
    pub timestamp: u64,
    pub enc_frame_data: [u8; FRAME_CH_CIPHERTEXT_LEN],
    _pad: [u8; 4],
}

const _: () = assert!(core::mem::size_of::<FrameCh>() == 120);

const FRAME_PACKET_CIPHERTEXT_LEN: usize = AEAD_METADATA_LEN + core::mem::size_of::<FrameCh>();

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FramePacket {
    pub channel_id: u32,
    pub enc_frame_ch: [u8; FRAME_PACKET_CIPHERTEXT_LEN],
    pub signature: [u8; SIGNATURE_LEN],
}

const _: () = assert!(core::mem::size_of::<FramePacket>() == 228);

/// Every way `decode` can fail to hand the host a frame, split by whether
/// the failure is evidence of an attack (and so arms the lockout) or an
/// ordinary protocol condition the host should just be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    Benign(BenignReason),
    Attack(AttackReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenignReason {
    UnknownChannel,
    BadSignature,
    StaleTimestamp,
    TimestampOutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackReason {
    OuterDecryptFailed,
    InnerDecryptFailed,
    OversizedFrame,
}

pub fn decode<P: NvmPage>(
    ctx: &mut DecoderContext<P>,
    trng: &mut impl TrueRandom,
    delay: &mut impl Delay,
    packet: &FramePacket,
) -> Result<FrameData, DecodeOutcome> {
    design_utils::entropy::fi_delay(&mut ctx.entropy);

    let Some((_, subscription)) = ctx.subscriptions.get_by_channel(packet.channel_id) else {
        return Err(DecodeOutcome::Benign(BenignReason::UnknownChannel));
    };

    let mut signed_payload = [0u8; 4 + FRAME_PACKET_CIPHERTEXT_LEN];
    signed_payload[..4].copy_from_slice(&packet.channel_id.to_le_bytes());
    signed_payload[4..].copy_from_slice(&packet.enc_frame_ch);

    let sig_failed = verify_sig(&packet.signature, &signed_payload, &ctx.encoder_public_key).is_err();
    if design_utils::fi_shield::multi_if_failin(sig_failed) {
        return Err(DecodeOutcome::Benign(BenignReason::BadSignature));
    }

    let mut enc_frame_ch = packet.enc_frame_ch;
    let frame_ch: FrameCh = {
        let Ok(plaintext) = decrypt_aead(&mut enc_frame_ch, &subscription.kch) else {
            ctx.lockout.attack_detected(delay);
            return Err(DecodeOutcome::Attack(AttackReason::OuterDecryptFailed));
        };
        *bytemuck::from_bytes(plaintext)
    };

    design_utils::entropy::fi_delay(&mut ctx.entropy);

    if ctx.received_first_frame && frame_ch.timestamp <= ctx.current_timestamp {
        return Err(DecodeOutcome::Benign(BenignReason::StaleTimestamp));
    }

    let Some((key_index, vertex)) = key_index_for_time(
        subscription.start,
        subscription.end,
        subscription.key_count,
        frame_ch.timestamp,
    ) else {
        return Err(DecodeOutcome::Benign(BenignReason::TimestampOutOfRange));
    };

    let sym_key = derive_tree_key(
        frame_ch.timestamp,
        &subscription.ktree[key_index],
        vertex,
        &ctx.left_tree_key,
        &ctx.right_tree_key,
    );

    design_utils::entropy::fi_ranged_delay(trng);

    let mut enc_frame_data = frame_ch.enc_frame_data;
    let frame_data: FrameData = {
        let Ok(plaintext) = decrypt_aead(&mut enc_frame_data, &sym_key) else {
            ctx.lockout.attack_detected(delay);
            return Err(DecodeOutcome::Attack(AttackReason::InnerDecryptFailed));
        };
        *bytemuck::from_bytes(plaintext)
    };

    if design_utils::fi_shield::multi_if_failin(frame_data.length as usize > MAX_FRAME_SIZE) {
        ctx.lockout.attack_detected(delay);
        return Err(DecodeOutcome::Attack(AttackReason::OversizedFrame));
    }

    // written twice: a single faulted skip of this store must not leave
    // the monotonicity check armed against a stale timestamp.
    ctx.current_timestamp = frame_ch.timestamp;
    ctx.current_timestamp = frame_ch.timestamp;
    ctx.received_first_frame = true;

    Ok(frame_data)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::context::test_support::test_context;
    use crate::subscription::EMERGENCY_CHANNEL_ID;
    use chacha20poly1305::aead::generic_array::GenericArray;
    use chacha20poly1305::{AeadInPlace, KeyInit, XChaCha20Poly1305};
    use design_utils::crypto::kdf_leaf;
    use ed25519_dalek::{Signer, SigningKey};
    use max78000_hal::timer::NullDelay;
    use max78000_hal::trng::SimTrng;

    fn seal(key: &[u8; 32], nonce: [u8; 24], plaintext: &[u8]) -> std::vec::Vec<u8> {
        let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));
        let mut body = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce), &[], &mut body)
            .unwrap();
        let mut out = std::vec::Vec::new();
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&tag);
        out.extend_from_slice(&body);
        out
    }

    fn build_packet(
        signing_key: &SigningKey,
        kch: &[u8; 32],
        sym_key: &[u8; 32],
        channel_id: u32,
        timestamp: u64,
        frame: &[u8],
    ) -> FramePacket {
        let mut frame_data = FrameData::zeroed();
        frame_data.length = frame.len() as u32;
        frame_data.frame[..frame.len()].copy_from_slice(frame);

        let sealed_inner = seal(sym_key, [1u8; 24], bytemuck::bytes_of(&frame_data));
        let mut frame_ch = FrameCh::zeroed();
        frame_ch.timestamp = timestamp;
        frame_ch.enc_frame_data.copy_from_slice(&sealed_inner);

        let sealed_outer = seal(kch, [2u8; 24], bytemuck::bytes_of(&frame_ch));
        let mut packet = FramePacket::zeroed();
        packet.channel_id = channel_id;
        packet.enc_frame_ch.copy_from_slice(&sealed_outer);

        let mut signed_payload = std::vec::Vec::new();
        signed_payload.extend_from_slice(&packet.channel_id.to_le_bytes());
        signed_payload.extend_from_slice(&packet.enc_frame_ch);
        packet.signature = signing_key.sign(&signed_payload).to_bytes();

        packet
    }

    #[test]
    fn valid_frame_on_subscribed_channel_decodes() {
        let mut ctx = test_context();
        let (signing_key, sym_key) = {
            let left = ctx.left_tree_key;
            let right = ctx.right_tree_key;
            let root_tree_key = [0x55u8; 16];
            ctx.install_test_channel(9, 0, u64::MAX, root_tree_key, [0x66u8; 32]);

            let vertex = crate::keytree::Vertex { prefix: 0, bits: 0 };
            let sym_key = derive_tree_key(42, &root_tree_key, vertex, &left, &right);
            (ctx.test_signing_key(), sym_key)
        };

        let kch = ctx.subscriptions.get_by_channel(9).unwrap().1.kch;
        let packet = build_packet(&signing_key, &kch, &sym_key, 9, 42, b"frame-bytes");

        let mut trng = SimTrng::new(1);
        let mut delay = NullDelay;
        let decoded = decode(&mut ctx, &mut trng, &mut delay, &packet).unwrap();
        assert_eq!(&decoded.frame[..decoded.length as usize], b"frame-bytes");
        assert!(ctx.received_first_frame);
        assert_eq!(ctx.current_timestamp, 42);
    }

    #[test]
    fn unknown_channel_is_benign() {
        let mut ctx = test_context();
        let signing_key = ctx.test_signing_key();
        let packet = build_packet(&signing_key, &[0u8; 32], &[0u8; 32], 123, 1, b"x");

        let mut trng = SimTrng::new(1);
        let mut delay = NullDelay;
        let outcome = decode(&mut ctx, &mut trng, &mut delay, &packet).unwrap_err();
        assert_eq!(outcome, DecodeOutcome::Benign(BenignReason::UnknownChannel));
    }

    #[test]
    fn tampered_outer_ciphertext_is_an_attack() {
        let mut ctx = test_context();
        let root_tree_key = [0x77u8; 16];
        ctx.install_test_channel(4, 0, u64::MAX, root_tree_key, [0x88u8; 32]);
        let signing_key = ctx.test_signing_key();
        let kch = ctx.subscriptions.get_by_channel(4).unwrap().1.kch;

        let mut packet = build_packet(&signing_key, &kch, &[0u8; 32], 4, 10, b"x");
        packet.enc_frame_ch[0] ^= 0xff;
        packet.signature = signing_key
            .sign(
                &{
                    let mut buf = std::vec::Vec::new();
                    buf.extend_from_slice(&packet.channel_id.to_le_bytes());
                    buf.extend_from_slice(&packet.enc_frame_ch);
                    buf
                },
            )
            .to_bytes();

        let mut trng = SimTrng::new(1);
        let mut delay = NullDelay;
        let outcome = decode(&mut ctx, &mut trng, &mut delay, &packet).unwrap_err();
        assert_eq!(outcome, DecodeOutcome::Attack(AttackReason::OuterDecryptFailed));
    }

    #[test]
    fn stale_timestamp_after_a_newer_frame_is_benign() {
        let mut ctx = test_context();
        let root_tree_key = [0x22u8; 16];
        ctx.install_test_channel(EMERGENCY_CHANNEL_ID + 1, 0, u64::MAX, root_tree_key, [0x33u8; 32]);
        let signing_key = ctx.test_signing_key();
        let kch = ctx.subscriptions.get_by_channel(EMERGENCY_CHANNEL_ID + 1).unwrap().1.kch;

        ctx.received_first_frame = true;
        ctx.current_timestamp = 100;

        let vertex = crate::keytree::Vertex { prefix: 0, bits: 0 };
        let sym_key = derive_tree_key(50, &root_tree_key, vertex, &ctx.left_tree_key, &ctx.right_tree_key);
        let packet = build_packet(&signing_key, &kch, &sym_key, EMERGENCY_CHANNEL_ID + 1, 50, b"x");

        let mut trng = SimTrng::new(1);
        let mut delay = NullDelay;
        let outcome = decode(&mut ctx, &mut trng, &mut delay, &packet).unwrap_err();
        assert_eq!(outcome, DecodeOutcome::Benign(BenignReason::StaleTimestamp));
    }
}
