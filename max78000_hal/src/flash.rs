//! Flash page storage.
//!
//! Mirrors the page-erase/page-write contract of the real flash controller
//! (`max78000_hal::flash::Flash` in the board support package this is
//! descended from): a page must be erased before it can be rewritten, and a
//! write of fewer than a full page leaves the remainder as erased (`0xff`)
//! bytes. `FlashPage` additionally gives typed, magic-committed storage of a
//! single `Pod` value, the same pattern `DecoderContext`'s `FlashEntry<T>`
//! used for subscription slots and the lockout counter.

use bytemuck::{bytes_of, bytes_of_mut, Pod, Zeroable};

/// Page size of the MAX78000's internal flash, used to size every
/// persisted record so a write never straddles an erase boundary.
pub const FLASH_PAGE_SIZE: usize = 0x2000;

/// A single erasable/writable unit of non-volatile storage.
///
/// A real implementation backs this with the MAX78000 flash controller
/// (`MXC_FLC_PageErase` / `MXC_FLC_Write`); `SimPage` below backs it with a
/// plain byte array so the rest of the firmware can be exercised on a host.
pub trait NvmPage {
    /// Erases the entire page, resetting every byte to `0xff`.
    fn erase(&mut self);

    /// Writes `data` starting at `offset`. `offset + data.len()` must not
    /// exceed [`FLASH_PAGE_SIZE`].
    fn write(&mut self, offset: usize, data: &[u8]);

    /// Copies `buf.len()` bytes starting at `offset` into `buf`.
    fn read(&self, offset: usize, buf: &mut [u8]);
}

/// Host-testable flash page backed by a plain byte array.
pub struct SimPage {
    bytes: [u8; FLASH_PAGE_SIZE],
}

impl SimPage {
    pub const fn erased() -> Self {
        SimPage {
            bytes: [0xff; FLASH_PAGE_SIZE],
        }
    }
}

impl Default for SimPage {
    fn default() -> Self {
        Self::erased()
    }
}

impl NvmPage for SimPage {
    fn erase(&mut self) {
        self.bytes = [0xff; FLASH_PAGE_SIZE];
    }

    fn write(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn read(&self, offset: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
    }
}

/// Marker word written last when committing a [`FlashPage`] record, so a
/// power loss mid-write always leaves the slot reading back as empty rather
/// than as a record with a corrupted tail.
const STATUS_EMPTY: u32 = 0xffff_ffff;

/// Typed, crash-safe storage of one `Pod` value inside a flash page.
///
/// The value is written first, the four-byte status word last; `has_object`
/// only reports a record present once that status word reads back
/// non-empty, so a reset during `set` is observed as "still empty" rather
/// than as a torn write.
pub struct FlashPage<T: Pod + Zeroable, P: NvmPage> {
    page: P,
    magic: u32,
    _marker: core::marker::PhantomData<T>,
}

impl<T: Pod + Zeroable, P: NvmPage> FlashPage<T, P> {
    const STATUS_OFFSET: usize = FLASH_PAGE_SIZE - 4;

    pub fn new(page: P, magic: u32) -> Self {
        FlashPage {
            page,
            magic,
            _marker: core::marker::PhantomData,
        }
    }

    pub fn has_object(&self) -> bool {
        let mut status = [0u8; 4];
        self.page.read(Self::STATUS_OFFSET, &mut status);
        u32::from_le_bytes(status) == self.magic
    }

    pub fn get(&self) -> Option<T> {
        if !self.has_object() {
            return None;
        }

        let mut value = T::zeroed();
        self.page.read(0, bytes_of_mut(&mut value));
        Some(value)
    }

    /// Erases the page, writes `value`, then writes the magic status word.
    pub fn set(&mut self, value: &T) {
        self.page.erase();
        self.page.write(0, bytes_of(value));
        self.page.write(Self::STATUS_OFFSET, &self.magic.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Pod, Zeroable)]
    #[repr(C)]
    struct Counter {
        value: u32,
    }

    #[test]
    fn empty_page_has_no_object() {
        let page = FlashPage::<Counter, SimPage>::new(SimPage::erased(), 0xabcd_1234);
        assert!(!page.has_object());
        assert!(page.get().is_none());
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut page = FlashPage::<Counter, SimPage>::new(SimPage::erased(), 0xabcd_1234);
        page.set(&Counter { value: 42 });
        assert!(page.has_object());
        assert_eq!(page.get().unwrap().value, 42);
    }

    #[test]
    fn magic_is_page_specific() {
        // a page committed with one magic is unreadable through a handle
        // configured with a different one, the same way a lockout page and
        // a subscription page must never be confused for one another.
        let mut page = FlashPage::<Counter, SimPage>::new(SimPage::erased(), 0x1111_1111);
        page.set(&Counter { value: 7 });
        let inner = page.page;
        let other = FlashPage::<Counter, SimPage>::new(inner, 0x2222_2222);
        assert!(!other.has_object());
    }
}
