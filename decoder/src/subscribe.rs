//! Subscription update pipeline.
//!
//! Transcribed from `subscription.c`'s `update_subscription()`. A signature
//! failure or a failure to decrypt the subscription payload under this
//! decoder's `id_key` are both attacker signals (a legitimate host-issued
//! update is always correctly signed and correctly encrypted for the
//! decoder it targets). Once the payload is open, a handful of structural
//! checks run against the plaintext fields before anything is written to
//! flash: channel 0 can never be subscribed to (it is provisioned once at
//! build time and is otherwise immutable), a reversed `[start, end]` range
//! or a bad in-payload magic word are both treated as attacks, but running
//! out of subscription slots is an ordinary, benign capacity error. Every
//! check is preceded by an entropy-pool delay and the signature check is
//! wrapped in `multi_if_failin`, matching `update_subscription()`'s own
//! `fiproc_delay()`/`MULTI_IF_FAILIN` placement.

use design_utils::crypto::{decrypt_aead, verify_sig, SIGNATURE_LEN};
use max78000_hal::flash::NvmPage;
use max78000_hal::timer::Delay;

use crate::context::DecoderContext;
use crate::subscription::{SubscriptionSlot, SUBSCRIPTION_MAGIC, EMERGENCY_CHANNEL_ID};

const ENC_SUB_LEN: usize = design_utils::crypto::AEAD_METADATA_LEN + core::mem::size_of::<SubscriptionSlot>();

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SubscriptionUpdatePayload {
    pub decoder_id: u32,
    pub enc_sub: [u8; ENC_SUB_LEN],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SubscriptionUpdate {
    pub payload: SubscriptionUpdatePayload,
    pub signature: [u8; SIGNATURE_LEN],
}

const _: () = assert!(core::mem::size_of::<SubscriptionUpdate>() == 2188);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Benign(SubscribeBenignReason),
    Attack(SubscribeAttackReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeBenignReason {
    CannotSubscribeToChannelZero,
    StoreFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeAttackReason {
    BadSignature,
    DecryptFailed,
    ReversedRange,
    BadMagic,
}

pub fn subscribe<P: NvmPage>(
    ctx: &mut DecoderContext<P>,
    delay: &mut impl Delay,
    update: &SubscriptionUpdate,
) -> Result<(), SubscribeOutcome> {
    design_utils::entropy::fi_delay(&mut ctx.entropy);

    let signed = bytemuck::bytes_of(&update.payload);
    let sig_failed = verify_sig(&update.signature, signed, &ctx.encoder_public_key).is_err();
    if design_utils::fi_shield::multi_if_failin(sig_failed) {
        ctx.lockout.attack_detected(delay);
        return Err(SubscribeOutcome::Attack(SubscribeAttackReason::BadSignature));
    }

    design_utils::entropy::fi_delay(&mut ctx.entropy);

    let mut enc_sub = update.payload.enc_sub;
    let candidate: SubscriptionSlot = {
        let Ok(plaintext) = decrypt_aead(&mut enc_sub, &ctx.id_key) else {
            ctx.lockout.attack_detected(delay);
            return Err(SubscribeOutcome::Attack(SubscribeAttackReason::DecryptFailed));
        };
        *bytemuck::from_bytes(plaintext)
    };

    design_utils::entropy::fi_delay(&mut ctx.entropy);

    if candidate.channel == EMERGENCY_CHANNEL_ID {
        return Err(SubscribeOutcome::Benign(SubscribeBenignReason::CannotSubscribeToChannelZero));
    }

    design_utils::entropy::fi_delay(&mut ctx.entropy);

    if candidate.end < candidate.start {
        ctx.lockout.attack_detected(delay);
        return Err(SubscribeOutcome::Attack(SubscribeAttackReason::ReversedRange));
    }

    design_utils::entropy::fi_delay(&mut ctx.entropy);

    if candidate.magic != SUBSCRIPTION_MAGIC {
        ctx.lockout.attack_detected(delay);
        return Err(SubscribeOutcome::Attack(SubscribeAttackReason::BadMagic));
    }

    ctx.subscriptions
        .install(&candidate)
        .map_err(|_| SubscribeOutcome::Benign(SubscribeBenignReason::StoreFull))
}
