//! Poll-rate scaling helpers for the free-running timer.
//!
//! The wait and error loops of the boot controller pace themselves by
//! letting the free-running timer run up to a threshold
//! ([`BootConfig::poll_window`](crate::boot::BootConfig::poll_window)),
//! resetting it, and counting the resets. The reference firmware uses a
//! window of 100 ticks with the timer at 16 MHz / 8, a 20 kHz poll rate;
//! these helpers derive the equivalent window for other clocks so the
//! blink and timeout periods stay the same wall-clock durations.
//!
//! Common configurations (20 kHz poll rate):
//!
//! | F_CPU  | PRESCALER | POLL_WINDOW |
//! |--------|-----------|-------------|
//! | 16 MHz |         8 |         100 |
//! |  8 MHz |         8 |          50 |
//! |  8 MHz |         1 |         400 |
//! |  1 MHz |         1 |          50 |

use libm::round;

/// Computes the poll window for a timer clocked at `f_cpu / prescaler`.
///
/// # Arguments
/// - `f_cpu`: CPU frequency in Hz
/// - `prescaler`: timer prescaler (e.g., 1, 8, 64)
/// - `poll_hz`: desired poll rate in Hz (the reference rate is 20 kHz)
///
/// # Returns
/// Timer ticks per poll cycle, rounded to the nearest integer.
pub fn poll_window(f_cpu: u32, prescaler: u32, poll_hz: f32) -> u16 {
    let ticks_per_second = f_cpu as f64 / prescaler as f64;
    round(ticks_per_second / poll_hz as f64) as u16
}

/// Compile-time poll window calculator.
///
/// Integer arithmetic with round-to-nearest; agrees with [`poll_window`]
/// for every configuration in the table above.
pub const fn const_poll_window(f_cpu: u32, prescaler: u32, poll_hz: u32) -> u16 {
    let ticks_per_second = f_cpu / prescaler;
    ((ticks_per_second + poll_hz / 2) / poll_hz) as u16
}
