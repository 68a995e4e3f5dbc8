//! Hardware capability traits.
//!
//! The decoder, flash programmer, and boot controller never touch device
//! registers directly; they work against the small capability set defined
//! here, so the logic runs unchanged on real silicon and against test
//! doubles feeding synthetic pin traces and an in-memory flash image.
//!
//! The audio input pin and the status LED are plain
//! [`embedded_hal::digital::InputPin`] / [`embedded_hal::digital::OutputPin`]
//! implementations; only the capabilities `embedded-hal` has no trait for
//! live in this module.
//!
//! Every trait has a `&mut`-forwarding impl so a caller can lend its
//! peripherals to the bootloader and keep ownership for later inspection.

/// A free-running hardware timer read with the reset-and-read pattern.
///
/// The decoder measures edge-to-edge intervals by resetting the counter at
/// one edge and reading it at the next; the boot controller uses the same
/// counter to pace its blink schedule. Tick width and rate are
/// device-specific — all consumers work in relative ticks only.
pub trait BitTimer {
    /// Resets the counter to zero. Counting continues immediately.
    fn reset(&mut self);

    /// Current counter value in ticks since the last reset.
    fn ticks(&mut self) -> u16;
}

impl<T: BitTimer> BitTimer for &mut T {
    fn reset(&mut self) {
        T::reset(self)
    }

    fn ticks(&mut self) -> u16 {
        T::ticks(self)
    }
}

/// Page-granular access to the device's self-programmable flash.
///
/// The operation set mirrors the AVR SPM sequence: words are staged into a
/// hardware fill buffer separate from the array, then an erased page is
/// committed in one go. None of the operations report errors — the
/// hardware has no failure channel, and address validity is the caller's
/// contract (the command dispatcher guards the bootloader region).
///
/// Implementations need not be interrupt-safe themselves: every caller in
/// this crate runs the erase/fill/commit sequence inside a
/// `critical_section::with` block.
pub trait PageFlash {
    /// Erases the page containing `addr` to the flash blank state.
    fn erase_page(&mut self, addr: u32);

    /// Stages one little-endian word for `addr` into the page fill buffer.
    fn fill_word(&mut self, addr: u32, word: u16);

    /// Commits the fill buffer to the (erased) page containing `addr`,
    /// waiting for the operation to finish.
    fn commit_page(&mut self, addr: u32);

    /// Re-enables reading the programmed section after a commit.
    fn enable_rww(&mut self);

    /// Reads one little-endian word from the flash array.
    fn read_word(&mut self, addr: u32) -> u16;
}

impl<F: PageFlash> PageFlash for &mut F {
    fn erase_page(&mut self, addr: u32) {
        F::erase_page(self, addr)
    }

    fn fill_word(&mut self, addr: u32, word: u16) {
        F::fill_word(self, addr, word)
    }

    fn commit_page(&mut self, addr: u32) {
        F::commit_page(self, addr)
    }

    fn enable_rww(&mut self) {
        F::enable_rww(self)
    }

    fn read_word(&mut self, addr: u32) -> u16 {
        F::read_word(self, addr)
    }
}

/// Byte-level EEPROM write primitive.
///
/// An external collaborator: the register sequencing (and any address
/// clamping the device needs) lives in the implementation, not here.
pub trait Eeprom {
    /// Writes one byte, blocking until the cell is programmed.
    fn write_byte(&mut self, addr: u16, value: u8);
}

impl<E: Eeprom> Eeprom for &mut E {
    fn write_byte(&mut self, addr: u16, value: u8) {
        E::write_byte(self, addr, value)
    }
}
