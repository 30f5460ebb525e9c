//! Subscription slot layout and the fixed-arity store that holds them.
//!
//! Grounded in `subscription.h`'s `valid_subscription_t`
//! (`static_assert(sizeof(valid_subscription_t) == 2080)`) and
//! `subscription.c`'s flash-backed array of `MAX_CHANNEL_COUNT` slots. Slot
//! 0 is reserved for the always-decodable channel 0 and is provisioned once
//! at build time; `update_subscription`'s replace-or-insert search always
//! starts from index 1.

use bytemuck::{Pod, Zeroable};
use max78000_hal::flash::{FlashPage, NvmPage, FLASH_PAGE_SIZE};

pub const MAX_TREE_KEYS: usize = 126;
pub const MAX_CHANNEL_COUNT: usize = 9;
pub const EMERGENCY_CHANNEL_ID: u32 = 0;

/// `"BNYA"` read as a little-endian `u32`, written last when a slot is
/// committed so a power loss mid-write reads back as an empty slot.
pub const SUBSCRIPTION_MAGIC: u32 = 0x4159_4e42;

/// A single channel's provisioned key-tree covering set.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct SubscriptionSlot {
    /// Up to [`MAX_TREE_KEYS`] tree nodes covering `[start, end]`, stored
    /// left-boundary-first then right-boundary-first; only the first
    /// `key_count` entries are meaningful.
    pub ktree: [[u8; 16]; MAX_TREE_KEYS],
    /// Channel symmetric key, used to open a frame's outer ciphertext.
    pub kch: [u8; 32],
    pub start: u64,
    pub end: u64,
    pub channel: u32,
    pub key_count: u32,
    pub magic: u32,
    _pad: [u8; 4],
}

const _: () = assert!(core::mem::size_of::<SubscriptionSlot>() == 2080);

impl SubscriptionSlot {
    pub fn empty() -> Self {
        SubscriptionSlot::zeroed()
    }

    pub fn committed(&self) -> bool {
        self.magic == SUBSCRIPTION_MAGIC
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub channel: u32,
    pub start: u64,
    pub end: u64,
}

/// Fixed-arity, flash-backed store of [`MAX_CHANNEL_COUNT`] subscription
/// slots.
pub struct SubscriptionStore<P: NvmPage> {
    slots: [FlashPage<SubscriptionSlot, P>; MAX_CHANNEL_COUNT],
}

impl<P: NvmPage> SubscriptionStore<P> {
    pub fn new(pages: [P; MAX_CHANNEL_COUNT]) -> Self {
        let mut iter = pages.into_iter();
        SubscriptionStore {
            slots: core::array::from_fn(|_| {
                FlashPage::new(iter.next().expect("exactly MAX_CHANNEL_COUNT pages"), SUBSCRIPTION_MAGIC)
            }),
        }
    }

    /// Provisions slot 0 with the always-available channel, bypassing the
    /// normal update pipeline. Intended to run once, at boot.
    pub fn provision_channel_zero(&mut self, slot: &SubscriptionSlot) {
        debug_assert_eq!(slot.channel, EMERGENCY_CHANNEL_ID);
        self.slots[0].set(slot);
    }

    pub fn get(&self, index: usize) -> Option<SubscriptionSlot> {
        self.slots[index].get().filter(SubscriptionSlot::committed)
    }

    pub fn get_by_channel(&self, channel: u32) -> Option<(usize, SubscriptionSlot)> {
        (0..MAX_CHANNEL_COUNT)
            .filter_map(|i| self.get(i).map(|slot| (i, slot)))
            .find(|(_, slot)| slot.channel == channel)
    }

    /// Installs `slot`, replacing any existing entry for the same channel,
    /// otherwise filling the first empty index, skipping index 0.
    /// Mirrors `update_subscription`'s two-pass search.
    pub fn install(&mut self, slot: &SubscriptionSlot) -> Result<(), StoreFullError> {
        for i in 1..MAX_CHANNEL_COUNT {
            if self.get(i).map(|s| s.channel) == Some(slot.channel) {
                self.slots[i].set(slot);
                return Ok(());
            }
        }

        for i in 1..MAX_CHANNEL_COUNT {
            if self.get(i).is_none() {
                self.slots[i].set(slot);
                return Ok(());
            }
        }

        Err(StoreFullError)
    }

    /// Channel info for every committed slot excluding channel 0, in slot
    /// order, matching `list_subscriptions`'s host response.
    pub fn list(&self) -> tinyvec::ArrayVec<[ChannelInfo; MAX_CHANNEL_COUNT - 1]> {
        let mut out = tinyvec::ArrayVec::new();
        for i in 1..MAX_CHANNEL_COUNT {
            if let Some(slot) = self.get(i) {
                out.push(ChannelInfo {
                    channel: slot.channel,
                    start: slot.start,
                    end: slot.end,
                });
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreFullError;

const _: () = assert!(FLASH_PAGE_SIZE >= core::mem::size_of::<SubscriptionSlot>() + 4);
