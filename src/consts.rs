//! Constants used across the bootloader implementation.
//!
//! This module defines the protocol-wide constants for frame layout,
//! command codes, signal synchronization, and the boot state machine's
//! timing defaults.
//!
//! The frame layout and command space follow the AudioBoot wire
//! protocol: a fixed seven-byte header followed by exactly one flash
//! page of payload. The timing defaults assume a free-running timer
//! clocked at F_CPU / 8 with a 16 MHz clock (a 20 kHz poll rate); see
//! [`crate::timing`] for deriving them on other clocks.
//!
//! ## Key Concepts
//!
//! - **Header offsets**: fixed byte positions of the command and
//!   address fields inside a received frame.
//! - **Command codes**: the raw byte values dispatched by the boot
//!   controller; see [`crate::frame::Command`].
//! - **Synchronization**: how many preamble edge intervals are measured
//!   to estimate the bit period, and how many of those are trusted.
//! - **Capacity bounds**: compile-time maxima used to size the fixed
//!   receive buffer for any supported page size.

/// Byte offset of the command field inside a frame.
pub const COMMAND: usize = 0;

/// Byte offset of the low half of the 16-bit flash page index.
pub const PAGE_INDEX_LOW: usize = 1;

/// Byte offset of the high half of the 16-bit flash page index.
pub const PAGE_INDEX_HIGH: usize = 2;

/// Byte offset of the low half of the 16-bit payload length field.
pub const LENGTH_LOW: usize = 3;

/// Byte offset of the high half of the 16-bit payload length field.
pub const LENGTH_HIGH: usize = 4;

/// Byte offset of the low half of the 16-bit checksum field.
///
/// The checksum is carried by the protocol but not verified by the
/// current decoder contract; see [`crate::decoder::DecodeError`].
pub const CHECKSUM_LOW: usize = 5;

/// Byte offset of the high half of the 16-bit checksum field.
pub const CHECKSUM_HIGH: usize = 6;

/// Byte offset of the first payload byte; everything before is header.
pub const PAYLOAD_START: usize = 7;

/// Command code marking an idle frame. Never dispatched.
pub const CMD_NONE: u8 = 0;

/// Reserved test command. Accepted and ignored.
pub const CMD_TEST: u8 = 1;

/// Program one flash page from the frame payload.
pub const CMD_PROGRAM: u8 = 2;

/// Restore the application entry vector and hand control to it.
pub const CMD_RUN: u8 = 3;

/// Write payload bytes into EEPROM, then hand off to the application.
pub const CMD_EEPROM_WRITE: u8 = 4;

/// Reserved exit command. Defined in the command space but inert.
pub const CMD_EXIT: u8 = 5;

/// Opcode base of the AVR `rjmp` instruction.
///
/// A reset vector holding `RJMP_OPCODE - 1 + target/2` is a relative
/// jump from address zero to the flash word address `target`; see
/// [`crate::layout::MemoryLayout::boot_entry_word`].
pub const RJMP_OPCODE: u16 = 0xC000;

/// Width in bytes of the saved entry-vector slot below the bootloader.
pub const VECTOR_SLOT_LEN: usize = 2;

/// Number of edge-to-edge intervals measured during synchronization.
pub const SYNC_EDGES: usize = 16;

/// Number of trailing synchronization intervals averaged into the bit
/// period estimate. The earlier half is discarded as startup
/// distortion.
pub const SYNC_EDGES_AVERAGED: usize = SYNC_EDGES / 2;

/// Level changes required on the input pin before the wait phase
/// accepts an incoming signal as real rather than noise.
pub const SIGNAL_EDGES: u8 = 3;

/// Poll cycles per status-LED blink while waiting for a signal.
pub const WAIT_BLINK_TIME: u16 = 10_000;

/// Poll cycles per status-LED blink in the terminal error state. Much
/// shorter than [`WAIT_BLINK_TIME`] so the failure is visibly distinct.
pub const ERROR_BLINK_TIME: u16 = 1_000;

/// Blink cycles to wait for a signal before resuming the application.
pub const BOOT_TIMEOUT: u8 = 50;

/// Free-running timer ticks per poll cycle in the wait and error loops.
pub const POLL_WINDOW: u16 = 100;

/// Analog level above which the bootloader is skipped at power-on.
pub const SKIP_THRESHOLD: u8 = 75;

/// Largest flash page size supported by the fixed receive buffer.
pub const MAX_PAGE_SIZE: usize = 256;

/// Length in bytes of the frame header preceding the payload.
pub const FRAME_HEADER_LEN: usize = PAYLOAD_START;

/// Capacity of the receive buffer: one maximal page plus the header.
pub const MAX_FRAME_LEN: usize = MAX_PAGE_SIZE + FRAME_HEADER_LEN;
