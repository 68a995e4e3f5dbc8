//! Page-granular flash programming with reset-vector patching.
//!
//! Two write paths, differing in where the words outside the caller's
//! data come from:
//!
//! - [`program_page`] takes exactly one page of payload and rewrites the
//!   whole page from it. Writing page zero is special: the payload's
//!   first word is the application's reset jump, which is captured and
//!   returned while a jump into the bootloader is written in its place.
//!   Whatever happens to the device afterwards, reset re-enters the
//!   bootloader — never half-flashed application code.
//! - [`write_block`] takes a short block at an arbitrary word-aligned
//!   address and preserves the rest of the enclosing page by reading it
//!   back from the array before the erase. The boot controller uses it to
//!   park the saved entry vector in the slot just below the bootloader.
//!
//! The flash controller requires its erase/fill/commit command sequences
//! to run uninterrupted; both paths execute under `critical_section::with`
//! so the prior interrupt state is restored on every exit. Neither path
//! validates its address — the command dispatcher keeps writes below the
//! bootloader, and this module trusts that guard.

use crate::layout::MemoryLayout;
use crate::platform::PageFlash;

/// Erases and programs one full page from `payload`.
///
/// `page` must be page-aligned and `payload` exactly one page long. On
/// page zero the first payload word is intercepted: the application entry
/// it jumps to is returned (a flash word address) and the word written is
/// a jump to the bootloader instead. Every other word is programmed
/// verbatim, little-endian.
pub fn program_page<F: PageFlash>(
    flash: &mut F,
    layout: &MemoryLayout,
    page: u32,
    payload: &[u8],
) -> Option<u16> {
    let mut captured = None;

    critical_section::with(|_| {
        flash.erase_page(page);

        for i in (0..layout.page_size).step_by(2) {
            let mut word = u16::from_le_bytes([payload[i], payload[i + 1]]);

            // Page zero, word zero is the reset vector.
            if page == 0 && i == 0 {
                captured = Some(MemoryLayout::decode_entry(word));
                word = layout.boot_entry_word();
            }

            flash.fill_word(page + i as u32, word);
        }

        flash.commit_page(page);
        flash.enable_rww();
    });

    captured
}

/// Writes `block` at `addr`, preserving the rest of the enclosing page.
///
/// The page is filled word by word — from `block` for positions at or
/// past `addr` while block bytes remain, from the current array contents
/// everywhere else — then erased and committed. `addr` must be word
/// aligned; `block` is padded with an existing flash byte if its length
/// is odd.
pub fn write_block<F: PageFlash>(flash: &mut F, layout: &MemoryLayout, addr: u32, block: &[u8]) {
    let page = addr - addr % layout.page_size as u32;

    critical_section::with(|_| {
        let mut offset = 0;

        for i in 0..layout.page_size / 2 {
            let word_addr = page + 2 * i as u32;

            let word = if word_addr >= addr && offset < block.len() {
                let lo = block[offset];
                let hi = if offset + 1 < block.len() {
                    block[offset + 1]
                } else {
                    (flash.read_word(word_addr) >> 8) as u8
                };
                offset += 2;
                u16::from_le_bytes([lo, hi])
            } else {
                flash.read_word(word_addr)
            };

            flash.fill_word(word_addr, word);
        }

        flash.erase_page(page);
        flash.commit_page(page);
        flash.enable_rww();
    });
}
