//! Boot controller: the top-level state machine.
//!
//! Sequences power-on skip detection, the signal wait phase, and the
//! command interpreter, and owns every piece of mutable state the
//! components share — the frame buffer, the decoder's timing estimate,
//! and the saved application entry vector. Nothing here is global; the
//! firmware binary builds one [`Bootloader`] at reset and calls
//! [`run`](Bootloader::run).
//!
//! `run` returns a [`Handoff`] naming the application entry point; the
//! actual jump (and any peripheral de-initialization the device needs
//! first) is the caller's job, since only the firmware binary knows how
//! to transfer control on its target. Everything up to that jump —
//! including the vector restore written to flash — happens in here.
//!
//! The wait phase blinks the status LED on a slow schedule and gives up
//! after a configured number of blink cycles; the error state blinks fast
//! forever. Both paces derive from the same free-running timer the
//! decoder uses.

use crate::consts::{
    BOOT_TIMEOUT, ERROR_BLINK_TIME, POLL_WINDOW, SIGNAL_EDGES, SKIP_THRESHOLD, WAIT_BLINK_TIME,
};
use crate::decoder::FrameDecoder;
use crate::flash;
use crate::frame::{Command, Frame};
use crate::layout::MemoryLayout;
use crate::platform::{BitTimer, Eeprom, PageFlash};
use embedded_hal::digital::{InputPin, OutputPin};

/// Runtime configuration for the boot controller.
///
/// The memory layout aside, these are the original firmware's timing
/// constants lifted into configuration: they depend on the timer clock,
/// which is the integrator's choice, not this crate's.
#[derive(Debug, Clone, Copy)]
pub struct BootConfig {
    /// Device flash geometry.
    pub layout: MemoryLayout,
    /// Analog level above which the bootloader is skipped at power-on.
    pub skip_threshold: u8,
    /// Poll cycles per status-LED blink while waiting for a signal.
    pub wait_blink: u16,
    /// Blink cycles to wait for a signal before resuming the application.
    pub boot_timeout: u8,
    /// Timer ticks per poll cycle in the wait and error loops.
    pub poll_window: u16,
    /// Level changes required to accept an incoming signal as real.
    pub signal_edges: u8,
}

impl BootConfig {
    /// Configuration with the reference timing defaults (16 MHz clock,
    /// timer at F_CPU / 8) for the given layout.
    pub const fn new(layout: MemoryLayout) -> Self {
        Self {
            layout,
            skip_threshold: SKIP_THRESHOLD,
            wait_blink: WAIT_BLINK_TIME,
            boot_timeout: BOOT_TIMEOUT,
            poll_window: POLL_WINDOW,
            signal_edges: SIGNAL_EDGES,
        }
    }
}

/// The boot controller's observable phases.
///
/// The two terminal outcomes are not phases: handing off to the
/// application is the return value of [`Bootloader::run`], and the
/// decode-failure blink loop never returns at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootPhase {
    /// Polling the input for a qualifying signal, blinking slowly,
    /// counting down to the no-signal timeout.
    #[default]
    WaitSignal,
    /// Decoding and dispatching frames until a run-class command.
    Listening,
}

/// The terminal hand-off to application code.
///
/// `entry` is the application's entry point as a flash word address,
/// recovered from the reset vector it was flashed with. After the
/// bootloader returns this, control belongs to the application; the
/// bootloader is only re-entered through a hardware reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handoff {
    /// Application entry point, in flash words.
    pub entry: u16,
}

/// Signals that the wait phase ran out of blink cycles.
#[derive(Debug)]
struct WaitExpired;

/// The audio bootloader.
///
/// Generic over the five hardware capabilities it consumes: the audio
/// input pin, the status LED, the free-running timer, the flash
/// controller, and the EEPROM writer. Lend `&mut` peripherals to keep
/// them inspectable after [`run`](Bootloader::run) returns.
#[derive(Debug)]
pub struct Bootloader<RX, LED, T, F, E>
where
    RX: InputPin,
    LED: OutputPin,
    T: BitTimer,
    F: PageFlash,
    E: Eeprom,
{
    /// The audio input pin.
    pub rx: RX,
    /// The status LED.
    pub led: LED,
    /// Current phase of the state machine.
    pub phase: BootPhase,
    led_on: bool,
    timer: T,
    flash: F,
    eeprom: E,
    config: BootConfig,
    decoder: FrameDecoder,
    frame: Frame,
    saved_entry: u16,
    blink_left: u16,
    timeout_left: u8,
    edges_left: u8,
    last_level: bool,
}

impl<RX, LED, T, F, E> Bootloader<RX, LED, T, F, E>
where
    RX: InputPin,
    LED: OutputPin,
    T: BitTimer,
    F: PageFlash,
    E: Eeprom,
{
    /// Builds the bootloader. The LED is driven low (off) immediately.
    pub fn new(rx: RX, mut led: LED, timer: T, flash: F, eeprom: E, config: BootConfig) -> Self {
        let _ = led.set_low();
        let frame = Frame::new(&config.layout);
        Self {
            rx,
            led,
            phase: BootPhase::WaitSignal,
            led_on: false,
            timer,
            flash,
            eeprom,
            config,
            decoder: FrameDecoder::new(),
            frame,
            saved_entry: 0,
            blink_left: 0,
            timeout_left: 0,
            edges_left: 0,
            last_level: false,
        }
    }

    /// The entry vector captured from the last page-zero write, as a
    /// flash word address. Zero until page zero has been programmed.
    pub fn saved_entry(&self) -> u16 {
        self.saved_entry
    }

    /// Runs the bootloader to its terminal hand-off.
    ///
    /// `skip_level` is the externally measured power-on analog level;
    /// above the configured threshold the listening machinery is bypassed
    /// entirely and the stored application resumes at once (if one is
    /// stored — otherwise the bootloader proceeds normally).
    ///
    /// Blocks indefinitely while no signal and no stored application
    /// exist, and never returns at all from the decode-failure error
    /// state; both are accepted terminal conditions for a device whose
    /// only other exit is a hardware reset.
    pub fn run(&mut self, skip_level: u8) -> Handoff {
        if skip_level > self.config.skip_threshold {
            if let Some(handoff) = self.stored_handoff() {
                return handoff;
            }
        }

        loop {
            match self.phase {
                BootPhase::WaitSignal => {
                    if let Some(handoff) = self.wait_for_signal() {
                        return handoff;
                    }
                    self.phase = BootPhase::Listening;
                    self.set_led(true);
                }
                BootPhase::Listening => return self.listen(),
            }
        }
    }

    /// One wait-phase poll step.
    ///
    /// `Ok` once enough level changes qualified the signal, `WouldBlock`
    /// while still waiting, `WaitExpired` when the blink-cycle countdown
    /// ran out with no qualifying signal.
    fn poll_signal(&mut self) -> nb::Result<(), WaitExpired> {
        if self.timer.ticks() > self.config.poll_window {
            self.timer.reset();
            self.blink_left -= 1;
            if self.blink_left == 0 {
                self.toggle_led();
                self.blink_left = self.config.wait_blink;
                self.timeout_left -= 1;
                if self.timeout_left == 0 {
                    self.set_led(false);
                    return Err(nb::Error::Other(WaitExpired));
                }
            }
        }

        if self.line_level() != self.last_level {
            self.last_level = !self.last_level;
            self.edges_left -= 1;
            if self.edges_left == 0 {
                return Ok(());
            }
        }
        Err(nb::Error::WouldBlock)
    }

    /// Waits for a qualifying signal; `Some` hands the stored application
    /// back on timeout, `None` means a signal arrived and listening
    /// should begin.
    fn wait_for_signal(&mut self) -> Option<Handoff> {
        self.blink_left = self.config.wait_blink;
        self.timeout_left = self.config.boot_timeout;
        self.edges_left = self.config.signal_edges;
        self.last_level = self.line_level();
        self.timer.reset();

        loop {
            match self.poll_signal() {
                Ok(()) => return None,
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(WaitExpired)) => {
                    if let Some(handoff) = self.stored_handoff() {
                        return Some(handoff);
                    }
                    // Nothing flashed yet; keep listening for a signal.
                    self.timeout_left = self.config.boot_timeout;
                }
            }
        }
    }

    /// The command interpreter loop. Returns only by hand-off.
    fn listen(&mut self) -> Handoff {
        loop {
            match self
                .decoder
                .receive(&mut self.rx, &mut self.timer, &mut self.frame)
            {
                Err(_) => self.error_hang(),
                Ok(()) => {
                    if let Some(handoff) = self.dispatch() {
                        return handoff;
                    }
                    self.frame.clear_command();
                }
            }
        }
    }

    /// Executes the received frame's command.
    fn dispatch(&mut self) -> Option<Handoff> {
        match Command::from(self.frame.command()) {
            Command::Program => {
                let address = self.config.layout.page_address(self.frame.page_index());
                // Never let a frame overwrite the bootloader itself.
                if address < self.config.layout.bootloader_start {
                    if let Some(entry) = flash::program_page(
                        &mut self.flash,
                        &self.config.layout,
                        address,
                        self.frame.payload(),
                    ) {
                        self.saved_entry = entry;
                    }
                    self.toggle_led();
                }
                None
            }
            Command::Run => {
                let entry = self.saved_entry;
                flash::write_block(
                    &mut self.flash,
                    &self.config.layout,
                    self.config.layout.vector_slot(),
                    &entry.to_le_bytes(),
                );
                Some(Handoff { entry })
            }
            Command::EepromWrite => {
                let base = self.frame.page_index_low() as u16 * self.config.layout.page_size as u16;
                let count = self.frame.length_low() as usize;
                for i in 0..count.min(self.config.layout.page_size) {
                    let value = self.frame.payload()[i];
                    self.eeprom.write_byte(base + i as u16, value);
                }
                // Payloads larger than one frame are not awaited; the
                // device hands off after the first one.
                self.set_led(false);
                self.stored_handoff()
            }
            Command::None | Command::Test | Command::Exit | Command::Invalid => None,
        }
    }

    /// Reads the entry vector parked below the bootloader. Zero means no
    /// application has ever been stored.
    fn stored_handoff(&mut self) -> Option<Handoff> {
        let entry = self.flash.read_word(self.config.layout.vector_slot());
        (entry != 0).then_some(Handoff { entry })
    }

    /// Terminal decode-failure state: blink fast until hardware reset.
    fn error_hang(&mut self) -> ! {
        let mut window = ERROR_BLINK_TIME;
        self.timer.reset();
        loop {
            if self.timer.ticks() > self.config.poll_window {
                self.timer.reset();
                window -= 1;
                if window == 0 {
                    self.toggle_led();
                    window = ERROR_BLINK_TIME;
                }
            }
        }
    }

    fn line_level(&mut self) -> bool {
        self.rx.is_high().unwrap_or(false)
    }

    fn set_led(&mut self, on: bool) {
        self.led_on = on;
        if on {
            let _ = self.led.set_high();
        } else {
            let _ = self.led.set_low();
        }
    }

    fn toggle_led(&mut self) {
        self.set_led(!self.led_on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemEeprom, MemFlash, SimBus, line_schedule};
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    fn quiet_line() -> SimBus {
        SimBus::with_schedule(Vec::new())
    }

    #[test]
    fn skip_level_hands_off_without_listening() {
        let layout = MemoryLayout::attiny85();
        let mut flash = MemFlash::new(&layout);
        flash.set_word(layout.vector_slot(), 0x0123);
        let mut eeprom = MemEeprom::new();

        let bus = quiet_line();
        let mut led = PinMock::new(&[PinTransaction::set(PinState::Low)]);
        let mut boot = Bootloader::new(
            bus.line(),
            led.clone(),
            bus.timer(),
            &mut flash,
            &mut eeprom,
            BootConfig::new(layout),
        );

        let handoff = boot.run(200);
        assert_eq!(handoff, Handoff { entry: 0x0123 });
        assert_eq!(boot.phase, BootPhase::WaitSignal);
        led.done();
    }

    #[test]
    fn timeout_with_no_signal_resumes_stored_application() {
        let layout = MemoryLayout::attiny85();
        let mut flash = MemFlash::new(&layout);
        flash.set_word(layout.vector_slot(), 0x0DE0);
        let mut eeprom = MemEeprom::new();

        let bus = quiet_line();
        // Off at construction, two slow blinks, then off at timeout.
        let mut led = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::Low),
        ]);
        let mut config = BootConfig::new(layout);
        config.wait_blink = 2;
        config.boot_timeout = 2;
        config.poll_window = 4;

        let mut boot = Bootloader::new(
            bus.line(),
            led.clone(),
            bus.timer(),
            &mut flash,
            &mut eeprom,
            config,
        );

        let handoff = boot.run(0);
        assert_eq!(handoff, Handoff { entry: 0x0DE0 });
        led.done();
    }

    #[test]
    fn program_at_or_above_bootloader_start_is_silently_skipped() {
        let layout = MemoryLayout::attiny85();
        let mut flash = MemFlash::new(&layout);
        let mut eeprom = MemEeprom::new();

        let bus = quiet_line();
        let mut led = PinMock::new(&[PinTransaction::set(PinState::Low)]);
        let mut boot = Bootloader::new(
            bus.line(),
            led.clone(),
            bus.timer(),
            &mut flash,
            &mut eeprom,
            BootConfig::new(layout),
        );

        // Page index 111 is the bootloader's own first page (0x1BC0 / 64).
        boot.frame.bytes_mut()[0] = 2;
        boot.frame.bytes_mut()[1] = 111;
        for b in boot.frame.bytes_mut()[7..].iter_mut() {
            *b = 0xAB;
        }
        assert_eq!(boot.dispatch(), None);
        drop(boot);

        assert!(flash.image().iter().all(|&b| b == 0xFF), "flash mutated");
        led.done();
    }

    #[test]
    fn page_zero_program_captures_entry_from_the_payload() {
        let layout = MemoryLayout::attiny85();
        let mut flash = MemFlash::new(&layout);
        let mut eeprom = MemEeprom::new();

        let bus = quiet_line();
        // Construction, then the success toggle.
        let mut led = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let mut boot = Bootloader::new(
            bus.line(),
            led.clone(),
            bus.timer(),
            &mut flash,
            &mut eeprom,
            BootConfig::new(layout),
        );

        // An all-0xFF page image: word zero decodes to 0xFFFF - (0xC000-1).
        boot.frame.bytes_mut()[0] = 2;
        for b in boot.frame.bytes_mut()[7..].iter_mut() {
            *b = 0xFF;
        }
        assert_eq!(boot.dispatch(), None);
        assert_eq!(boot.saved_entry(), 0x4000);
        drop(boot);

        assert_eq!(flash.word(0), layout.boot_entry_word());
        assert!(flash.bytes(0)[2..].iter().all(|&b| b == 0xFF));
        led.done();
    }

    #[test]
    fn eeprom_write_stores_bytes_and_hands_off() {
        let layout = MemoryLayout::attiny85();
        let mut flash = MemFlash::new(&layout);
        flash.set_word(layout.vector_slot(), 0x0200);
        let mut eeprom = MemEeprom::new();

        let bus = quiet_line();
        // Construction, then LED off before hand-off.
        let mut led = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::Low),
        ]);
        let mut boot = Bootloader::new(
            bus.line(),
            led.clone(),
            bus.timer(),
            &mut flash,
            &mut eeprom,
            BootConfig::new(layout),
        );

        boot.frame.bytes_mut()[0] = 4;
        boot.frame.bytes_mut()[1] = 1; // EEPROM page 1 => offset 64
        boot.frame.bytes_mut()[3] = 3; // three bytes
        boot.frame.bytes_mut()[7..10].copy_from_slice(&[9, 8, 7]);

        assert_eq!(boot.dispatch(), Some(Handoff { entry: 0x0200 }));
        drop(boot);

        assert_eq!(&eeprom.bytes[64..67], &[9, 8, 7]);
        assert!(eeprom.bytes[..64].iter().all(|&b| b == 0));
        assert!(eeprom.bytes[67..].iter().all(|&b| b == 0));
        led.done();
    }

    #[test]
    fn reserved_commands_do_nothing() {
        let layout = MemoryLayout::attiny85();
        let mut flash = MemFlash::new(&layout);
        let mut eeprom = MemEeprom::new();

        let bus = quiet_line();
        let mut led = PinMock::new(&[PinTransaction::set(PinState::Low)]);
        let mut boot = Bootloader::new(
            bus.line(),
            led.clone(),
            bus.timer(),
            &mut flash,
            &mut eeprom,
            BootConfig::new(layout),
        );

        for code in [0_u8, 1, 5, 0x7F] {
            boot.frame.bytes_mut()[0] = code;
            assert_eq!(boot.dispatch(), None);
        }
        drop(boot);

        assert!(flash.image().iter().all(|&b| b == 0xFF));
        led.done();
    }

    #[test]
    fn program_and_run_over_the_wire() {
        // Full path: audio signal in, two frames decoded and dispatched,
        // hand-off out. Small pages keep the simulated trace short.
        let layout = MemoryLayout::new(0x400, 0x380, 8).unwrap();
        let mut flash = MemFlash::new(&layout);
        let mut eeprom = MemEeprom::new();

        // Frame 1 programs page zero with an image whose reset vector
        // jumps to word 0x001A; frame 2 runs it.
        let program = [0x02, 0, 0, 8, 0, 0, 0, 0x19, 0xC0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let run = [0x03, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

        let mut schedule = line_schedule(&program, 64, 24);
        let resume_at = schedule.last().copied().unwrap_or(0) + 256;
        schedule.extend(
            line_schedule(&run, 64, 20)
                .into_iter()
                .map(|t| t + resume_at),
        );
        let bus = SimBus::with_schedule(schedule);

        // Construction, listening, one program toggle.
        let mut led = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ]);
        let mut boot = Bootloader::new(
            bus.line(),
            led.clone(),
            bus.timer(),
            &mut flash,
            &mut eeprom,
            BootConfig::new(layout),
        );

        let handoff = boot.run(0);
        assert_eq!(handoff, Handoff { entry: 0x001A });
        assert_eq!(boot.phase, BootPhase::Listening);
        drop(boot);

        // Page zero: patched vector plus the payload's remaining bytes.
        assert_eq!(flash.word(0), layout.boot_entry_word());
        assert!(flash.bytes(0)[2..].iter().all(|&b| b == 0xFF));
        // The run command parked the captured entry below the bootloader.
        assert_eq!(flash.word(layout.vector_slot()), 0x001A);
        led.done();
    }
}
