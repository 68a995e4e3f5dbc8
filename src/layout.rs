//! Flash memory layout configuration.
//!
//! The bootloader never hardcodes device geometry: flash size, bootloader
//! start address, and page size are supplied once at startup as a
//! [`MemoryLayout`] and threaded through every component. All derived
//! addresses — the saved entry-vector slot, page addresses, the frame
//! length — come from here, as does the `rjmp` word arithmetic used to
//! patch and recover the application's reset vector.
//!
//! Addresses are byte addresses into program memory except where a word
//! address is explicitly called out (the AVR reset vector jumps in words).

use crate::consts::{FRAME_HEADER_LEN, MAX_PAGE_SIZE, RJMP_OPCODE, VECTOR_SLOT_LEN};
use thiserror::Error;

/// Errors raised while validating a [`MemoryLayout`].
#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum LayoutError {
    /// The page size must be nonzero, even, and no larger than
    /// [`MAX_PAGE_SIZE`] so a full page fits the fixed receive buffer.
    #[error("unsupported page size")]
    BadPageSize,

    /// The bootloader start address must be aligned to the page size;
    /// the self-preservation guard and page erase both assume it.
    #[error("bootloader start not page aligned")]
    MisalignedBootloader,

    /// The bootloader must live inside the device flash, with room for
    /// the entry-vector slot below it.
    #[error("bootloader start outside flash")]
    BootloaderOutOfRange,
}

/// Device flash geometry and the bootloader's place in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    /// Total size of the device flash in bytes.
    pub flash_size: u32,
    /// First byte address of the bootloader. Everything at or above this
    /// address is never erased or written.
    pub bootloader_start: u32,
    /// Erase/write granularity of the device flash in bytes.
    pub page_size: usize,
}

impl MemoryLayout {
    /// Builds a layout after validating its invariants.
    pub fn new(
        flash_size: u32,
        bootloader_start: u32,
        page_size: usize,
    ) -> Result<Self, LayoutError> {
        if page_size == 0 || page_size % 2 != 0 || page_size > MAX_PAGE_SIZE {
            return Err(LayoutError::BadPageSize);
        }
        if bootloader_start % page_size as u32 != 0 {
            return Err(LayoutError::MisalignedBootloader);
        }
        if bootloader_start >= flash_size || bootloader_start < VECTOR_SLOT_LEN as u32 {
            return Err(LayoutError::BootloaderOutOfRange);
        }
        Ok(Self {
            flash_size,
            bootloader_start,
            page_size,
        })
    }

    /// The ATtiny85 reference layout: 8 KiB flash, 64-byte pages, and the
    /// bootloader in the topmost kilobyte.
    pub const fn attiny85() -> Self {
        Self {
            flash_size: 0x2000,
            bootloader_start: 0x1BC0,
            page_size: 64,
        }
    }

    /// Total length in bytes of one protocol frame for this layout.
    pub const fn frame_len(&self) -> usize {
        self.page_size + FRAME_HEADER_LEN
    }

    /// Byte address of the saved entry-vector slot: one pointer width
    /// below the bootloader, inside the last application page.
    pub const fn vector_slot(&self) -> u32 {
        self.bootloader_start - VECTOR_SLOT_LEN as u32
    }

    /// Byte address of the given flash page.
    pub const fn page_address(&self, index: u16) -> u32 {
        index as u32 * self.page_size as u32
    }

    /// The word written into the reset vector: a relative jump from
    /// address zero into the bootloader.
    pub const fn boot_entry_word(&self) -> u16 {
        (RJMP_OPCODE - 1).wrapping_add((self.bootloader_start / 2) as u16)
    }

    /// Recovers the application entry point (a flash word address) from
    /// the relative-jump word the application carried in its reset vector.
    pub const fn decode_entry(word: u16) -> u16 {
        word.wrapping_sub(RJMP_OPCODE - 1)
    }
}
