//! # audioboot
//!
//! A portable, no_std bootloader core for reflashing an AVR-class
//! microcontroller over a line-level audio channel (a PC sound card
//! output through a capacitor is enough). No debugger, serial port, or
//! USB: the device recovers bit timing and bit values from the signal's
//! own transitions, assembles fixed-length frames, and rewrites its own
//! program memory page by page — while guaranteeing that a reset always
//! lands back in the bootloader until the application is deliberately
//! resumed.
//!
//! This crate implements the decoder, frame protocol, flash programming
//! engine, and boot state machine using:
//! - `embedded-hal` traits for the audio input pin and status LED
//! - small capability traits for the timer, flash controller, and EEPROM
//!   (see [`platform`]), so the logic is testable off-target
//! - `critical-section` around every flash erase/write sequence
//!
//! ## Crate features
//! | Feature     | Description |
//! |-------------|-------------|
//! | `std`       | Disables `#![no_std]`; enables `thiserror/std`, `critical-section/std`, and `log/std` (used by the test suite) |
//! | `log`       | Uses `log` logging |
//! | `defmt-0-3` | Uses `defmt` logging |
//!
//! ## Usage
//!
//! The firmware binary wires the device peripherals to the capability
//! traits and lets the bootloader run to its hand-off:
//!
//! ```rust,ignore
//! use audioboot::boot::{BootConfig, Bootloader};
//! use audioboot::layout::MemoryLayout;
//!
//! let config = BootConfig::new(MemoryLayout::attiny85());
//! let mut boot = Bootloader::new(rx_pin, led_pin, timer, flash, eeprom, config);
//! let handoff = boot.run(adc_skip_level);
//! // De-init peripherals, then jump to handoff.entry (a word address).
//! ```
//!
//! ## Integration Notes
//!
//! - Reception is blocking and self-clocking: a frame's bit rate is
//!   re-estimated from its preamble, so no timer calibration against the
//!   transmitter is needed — but a silent line blocks forever.
//! - The hand-off itself (the jump, and any register de-initialization
//!   the device wants first) belongs to the firmware binary; `run`
//!   returns the entry address and everything in flash is already in
//!   place when it does.
//! - The bootloader never erases or writes any address at or above its
//!   own start address.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

pub use critical_section;
pub use heapless;

pub mod boot;
pub mod consts;
pub mod decoder;
pub mod flash;
pub mod frame;
pub mod layout;
pub mod platform;
#[cfg(test)]
mod testutil;
pub mod timing;
