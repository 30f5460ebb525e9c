//! Decoder global state.
//!
//! Bundles the subscription store, the lockout timer, the entropy pool and
//! the provisioned secret material the decode and subscribe pipelines
//! share, the same role `DecoderContext` plays in the board support
//! package this tree is descended from - minus the MPU/flash-region
//! locking bring-up, which belongs to board init, not this state.

use design_utils::entropy::EntropyPool;
use max78000_hal::flash::NvmPage;

use crate::lockout::LockoutTimer;
use crate::subscription::{SubscriptionSlot, SubscriptionStore, EMERGENCY_CHANNEL_ID, MAX_CHANNEL_COUNT};

pub struct DecoderContext<P: NvmPage> {
    pub subscriptions: SubscriptionStore<P>,
    pub lockout: LockoutTimer<P>,
    pub entropy: EntropyPool,

    pub decoder_id: u32,
    pub id_key: [u8; 32],
    pub encoder_public_key: [u8; 32],
    pub left_tree_key: [u8; 32],
    pub right_tree_key: [u8; 32],

    /// Timestamp of the last successfully decoded frame, on any channel.
    /// `None`/`received_first_frame == false` until the first one lands.
    pub current_timestamp: u64,
    pub received_first_frame: bool,
}

/// Secrets and channel-0 provisioning baked in by `build.rs`, passed to
/// [`DecoderContext::boot`].
pub struct Provisioning {
    pub decoder_id: u32,
    pub id_key: [u8; 32],
    pub encoder_public_key: [u8; 32],
    pub left_tree_key: [u8; 32],
    pub right_tree_key: [u8; 32],
    pub channel0_root_key: [u8; 16],
    pub channel0_kch: [u8; 32],
}

impl<P: NvmPage> DecoderContext<P> {
    /// Builds the decoder's runtime state from flash pages and burned-in
    /// secrets, provisioning slot 0 with the always-decodable channel.
    pub fn boot(
        subscription_pages: [P; MAX_CHANNEL_COUNT],
        lockout_page: P,
        provisioning: Provisioning,
    ) -> Self {
        let mut subscriptions = SubscriptionStore::new(subscription_pages);

        let mut channel0 = SubscriptionSlot::empty();
        channel0.channel = EMERGENCY_CHANNEL_ID;
        channel0.start = 0;
        channel0.end = u64::MAX;
        channel0.key_count = 1;
        channel0.ktree[0] = provisioning.channel0_root_key;
        channel0.kch = provisioning.channel0_kch;
        channel0.magic = crate::subscription::SUBSCRIPTION_MAGIC;
        subscriptions.provision_channel_zero(&channel0);

        DecoderContext {
            subscriptions,
            lockout: LockoutTimer::new(lockout_page),
            entropy: EntropyPool::new(),
            decoder_id: provisioning.decoder_id,
            id_key: provisioning.id_key,
            encoder_public_key: provisioning.encoder_public_key,
            left_tree_key: provisioning.left_tree_key,
            right_tree_key: provisioning.right_tree_key,
            current_timestamp: 0,
            received_first_frame: false,
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use ed25519_dalek::SigningKey;
    use max78000_hal::flash::SimPage;
    use max78000_hal::trng::SimTrng;

    /// A booted context with its entropy pool already refilled, the way the
    /// command loop in `main.rs` refills it once per iteration before
    /// dispatch - callers that exercise `decode`/`subscribe` directly, as
    /// the tests in this crate do, need the same precondition the real loop
    /// would have established.
    pub fn test_context() -> DecoderContext<SimPage> {
        let signing_key = fixed_signing_key();
        let mut ctx = DecoderContext::boot(
            core::array::from_fn(|_| SimPage::erased()),
            SimPage::erased(),
            Provisioning {
                decoder_id: 0xdead_beef,
                id_key: [0x01u8; 32],
                encoder_public_key: signing_key.verifying_key().to_bytes(),
                left_tree_key: [0x02u8; 32],
                right_tree_key: [0x03u8; 32],
                channel0_root_key: [0x04u8; 16],
                channel0_kch: [0x05u8; 32],
            },
        );
        ctx.entropy.refill_from(&mut SimTrng::new(0x7e57));
        ctx
    }

    fn fixed_signing_key() -> SigningKey {
        SigningKey::from_bytes(&[0x42u8; 32])
    }

    impl<P: NvmPage> DecoderContext<P> {
        pub fn test_signing_key(&self) -> SigningKey {
            fixed_signing_key()
        }

        /// Installs a single-entry (whole-tree) subscription for `channel`,
        /// covering `[start, end]` with `root_tree_key` as the bits==0
        /// vertex key, for tests that need a channel to decode against
        /// without going through the full subscribe pipeline.
        pub fn install_test_channel(
            &mut self,
            channel: u32,
            start: u64,
            end: u64,
            root_tree_key: [u8; 16],
            kch: [u8; 32],
        ) {
            let mut slot = SubscriptionSlot::empty();
            slot.channel = channel;
            slot.start = start;
            slot.end = end;
            slot.key_count = 1;
            slot.ktree[0] = root_tree_key;
            slot.kch = kch;
            slot.magic = crate::subscription::SUBSCRIPTION_MAGIC;
            self.subscriptions.install(&slot).expect("test store has room");
        }
    }
}
