//! Concrete ATmega328P wiring for `crate::board::Board` (SPEC_FULL.md §12).
//!
//! Gated behind the `avr` Cargo feature and compiled only for the
//! `atmega328p` target; the host test build (`cfg(test)`) never pulls this
//! in. Register access goes through `avr_device::atmega328p`, the closest
//! real crate on crates.io to the PAC-style peripheral-struct API the
//! teacher's `esp32s2`/`esp32s3` dependencies expose for their own MCU
//! family — everything below is the one place in the crate `unsafe`
//! register access is permitted, per `board`'s module doc comment.
//!
//! The timer/ADC/EEPROM wiring here is deliberately unremarkable: it
//! exists only to satisfy the `Board` trait's peripheral contracts
//! (spec.md §1 calls the PWM generator, ADC, EEPROM, display driver, and
//! sleep primitive external collaborators). The four-button tick/debounce
//! driver is likewise out of scope per spec.md §1; `AvrButton` below is a
//! minimal polling implementation only so `main` has something concrete to
//! hand the control loop, not a faithful port of any particular debounce
//! algorithm.
//!
//! Register reads that several owners need (the raw `PIND` pin state, in
//! particular) go through `Peripherals::steal()`, the escape hatch
//! svd2rust-generated PACs provide for exactly this "more than one logical
//! owner of a read-only register" situation, rather than threading one
//! shared `&PORTD` handle through every button and the fire line.

use core::sync::atomic::{AtomicU32, Ordering};

use avr_device::atmega328p::Peripherals;
use avr_device::interrupt;
use avr_device::interrupt::Mutex;
use core::cell::Cell;

use crate::board::{Board, DisplaySink, MosfetDrive, PwmOutput, SleepController};
use crate::buttons::{ButtonEvents, FireLine};
use crate::clock::MonotonicClock;
use crate::constants::{EDIT_REPEAT_MS, T_DEB_MS};
use crate::display::Frame;
use crate::persistence::EepromBus;
use crate::voltage::VoltageAdc;

/// Free-running millisecond counter, advanced by `TIMER1_COMPA` (Timer1 in
/// CTC mode at 1 kHz, §6's display/PWM timers are separate hardware
/// timers). `Ordering::Relaxed` is sufficient: the only consumer is
/// `AvrClock::now_ms`, and every deadline check in this crate is a `>=`
/// against a duration measured in tens to thousands of milliseconds.
static MILLIS: AtomicU32 = AtomicU32::new(0);

#[avr_device::interrupt(atmega328p)]
fn TIMER1_COMPA() {
    MILLIS.fetch_add(1, Ordering::Relaxed);
}

/// Set by the fire-button pin-change interrupt while the CPU is parked in
/// deep sleep (spec.md §4.F.4); cleared again by
/// `AvrSleep::deep_sleep_until_fire_press` on the way back out.
static WOKE_BY_FIRE: Mutex<Cell<bool>> = Mutex::new(Cell::new(false));

#[avr_device::interrupt(atmega328p)]
fn PCINT2() {
    interrupt::free(|cs| WOKE_BY_FIRE.borrow(cs).set(true));
}

const MODE_PIN: u8 = 1 << 2;
const UP_PIN: u8 = 1 << 3;
const DOWN_PIN: u8 = 1 << 4;
const FIRE_PIN: u8 = 1 << 5;
const MOSFET_PIN: u8 = 1 << 1;

/// PIND is read by three independent owners (the fire line, and each of
/// the four button drivers); `Peripherals::steal()` is the PAC's sanctioned
/// way to do that without threading a shared handle through all of them.
fn read_pind() -> u8 {
    unsafe { Peripherals::steal().PORTD.pind.read().bits() }
}

/// Fast-PWM duty register on Timer0/OC0A (spec.md §6's ~20 kHz MOSFET
/// drive; at a 16 MHz system clock and no prescaling, 8-bit fast PWM tops
/// out near 62.5 kHz, well above the spec's floor — see DESIGN.md for why
/// the 10-bit spec duty word is right-shifted onto this 8-bit timer).
pub struct AvrPwm {
    tc0: avr_device::atmega328p::TC0,
}

impl AvrPwm {
    fn new(tc0: avr_device::atmega328p::TC0) -> Self {
        tc0.tccr0a.write(|w| w.wgm0().pwm_fast().com0a().match_clear());
        tc0.tccr0b.write(|w| w.cs0().direct());
        Self { tc0 }
    }
}

impl PwmOutput for AvrPwm {
    fn set_duty(&mut self, duty: u16) {
        let duty8 = (duty >> 2).min(u8::MAX as u16) as u8;
        self.tc0.ocr0a.write(|w| unsafe { w.bits(duty8) });
    }

    fn disable(&mut self) {
        self.tc0.ocr0a.write(|w| unsafe { w.bits(0) });
    }
}

/// Direct digital drive of the MOSFET gate pin (PB1), used only by `Hell`
/// mode and the disarm primitive — `AvrPwm` drives the same physical pin
/// the rest of the time, matching spec.md §4.C's "the MOSFET remains LOW"
/// dead-zone wording (this struct is how "LOW" is actually asserted
/// outside of active PWM).
pub struct AvrMosfet {
    portb: avr_device::atmega328p::PORTB,
}

impl MosfetDrive for AvrMosfet {
    fn set_high(&mut self) {
        self.portb.portb.modify(|r, w| unsafe { w.bits(r.bits() | MOSFET_PIN) });
    }

    fn set_low(&mut self) {
        self.portb.portb.modify(|r, w| unsafe { w.bits(r.bits() & !MOSFET_PIN) });
    }
}

/// Blocking band-gap ADC read (spec.md §4.A): ADMUX selects the internal
/// 1.1 V reference against AVCC; the conversion result is the `adc_code`
/// the voltage estimator turns back into millivolts.
pub struct AvrAdc {
    adc: avr_device::atmega328p::ADC,
}

impl VoltageAdc for AvrAdc {
    type Error = core::convert::Infallible;

    fn sample_adc_code(&mut self) -> nb::Result<u16, Self::Error> {
        if self.adc.adcsra.read().adsc().bit_is_set() {
            return Err(nb::Error::WouldBlock);
        }
        self.adc.adcsra.modify(|_, w| w.adsc().set_bit());
        while self.adc.adcsra.read().adsc().bit_is_set() {}
        Ok(self.adc.adc.read().bits())
    }
}

/// Byte-addressed EEPROM controller (spec.md §6, §4.H): a synchronous,
/// polled read/write over the on-chip EEPROM, addressed directly by the
/// fixed offsets `persistence` already computes.
pub struct AvrEeprom {
    eeprom: avr_device::atmega328p::EEPROM,
}

impl EepromBus for AvrEeprom {
    type Error = core::convert::Infallible;

    fn read(&mut self, offset: u16, buf: &mut [u8]) -> Result<(), Self::Error> {
        for (i, slot) in buf.iter_mut().enumerate() {
            let addr = offset + i as u16;
            while self.eeprom.eecr.read().eepe().bit_is_set() {}
            self.eeprom.eear.write(|w| unsafe { w.bits(addr) });
            self.eeprom.eecr.modify(|_, w| w.eere().set_bit());
            *slot = self.eeprom.eedr.read().bits();
        }
        Ok(())
    }

    fn write(&mut self, offset: u16, buf: &[u8]) -> Result<(), Self::Error> {
        for (i, byte) in buf.iter().enumerate() {
            let addr = offset + i as u16;
            while self.eeprom.eecr.read().eepe().bit_is_set() {}
            self.eeprom.eear.write(|w| unsafe { w.bits(addr) });
            self.eeprom.eedr.write(|w| unsafe { w.bits(*byte) });
            interrupt::free(|_| {
                self.eeprom.eecr.modify(|_, w| w.eempe().set_bit());
                self.eeprom.eecr.modify(|_, w| w.eepe().set_bit());
            });
        }
        Ok(())
    }
}

/// Deep-sleep primitive (spec.md §4.F.4): enables the fire-button's
/// pin-change interrupt, enters `SLEEP_MODE_PWR_DOWN`, and detaches the
/// interrupt again once the `sleep` instruction returns.
pub struct AvrSleep {
    cpu: avr_device::atmega328p::CPU,
    exint: avr_device::atmega328p::EXINT,
}

impl SleepController for AvrSleep {
    fn deep_sleep_until_fire_press(&mut self) {
        interrupt::free(|cs| WOKE_BY_FIRE.borrow(cs).set(false));
        self.exint.pcicr.modify(|_, w| w.pcie2().set_bit());
        self.cpu.smcr.write(|w| w.sm().pdown().se().set_bit());
        unsafe { core::arch::asm!("sleep") };
        self.cpu.smcr.write(|w| w.se().clear_bit());
        self.exint.pcicr.modify(|_, w| w.pcie2().clear_bit());
    }
}

pub struct AvrDisplay {
    portd: avr_device::atmega328p::PORTD,
}

impl DisplaySink for AvrDisplay {
    /// Bit-bangs the 4-glyph frame out over the shift-register serial
    /// lines the screen driver is wired to (spec.md §1: the driver itself,
    /// given a glyph buffer, is out of scope — this is only the hand-off).
    fn show(&mut self, frame: &Frame) {
        const DATA: u8 = 1 << 0;
        const CLOCK: u8 = 1 << 1;
        const LATCH: u8 = 1 << 6;

        for &glyph in frame {
            for bit in (0..8).rev() {
                let set = (glyph >> bit) & 1 != 0;
                self.portd.portd.modify(|r, w| unsafe {
                    w.bits(if set { r.bits() | DATA } else { r.bits() & !DATA })
                });
                self.portd.portd.modify(|r, w| unsafe { w.bits(r.bits() | CLOCK) });
                self.portd.portd.modify(|r, w| unsafe { w.bits(r.bits() & !CLOCK) });
            }
        }
        self.portd.portd.modify(|r, w| unsafe { w.bits(r.bits() | LATCH) });
        self.portd.portd.modify(|r, w| unsafe { w.bits(r.bits() & !LATCH) });
    }
}

pub struct AvrClock;

impl MonotonicClock for AvrClock {
    fn now_ms(&self) -> u32 {
        MILLIS.load(Ordering::Relaxed)
    }
}

const DOUBLE_CLICK_WINDOW_MS: u32 = 400;

/// Minimal tick/debounce/long-press/double-press driver over one active-low
/// GPIO line with an internal pull-up (spec.md §1's "push-button tick/
/// long-press detector", implemented here only because `main` needs a
/// concrete type — see this module's doc comment).
pub struct AvrButton {
    pin_mask: u8,
    stable: bool,
    pending: bool,
    changed_at: u32,
    next_repeat_at: u32,
    last_release_at: u32,
    awaiting_second_click: bool,
    short_pending: bool,
    long_pending: bool,
    double_pending: bool,
}

impl AvrButton {
    fn new(pin_mask: u8) -> Self {
        Self {
            pin_mask,
            stable: false,
            pending: false,
            changed_at: 0,
            next_repeat_at: 0,
            last_release_at: 0,
            awaiting_second_click: false,
            short_pending: false,
            long_pending: false,
            double_pending: false,
        }
    }

    /// Called once per control-loop iteration (spec.md §4.G step 1),
    /// feeding in the live `PIND` read and the current millisecond clock.
    fn tick(&mut self, pind: u8, now_ms: u32) {
        let raw_pressed = pind & self.pin_mask == 0;

        if raw_pressed != self.pending {
            self.pending = raw_pressed;
            self.changed_at = now_ms;
        } else if self.pending != self.stable
            && crate::clock::elapsed_at_least(now_ms, self.changed_at, T_DEB_MS)
        {
            self.stable = self.pending;
            if self.stable {
                self.next_repeat_at = now_ms.wrapping_add(EDIT_REPEAT_MS);
            } else if self.awaiting_second_click {
                self.double_pending = true;
                self.awaiting_second_click = false;
            } else {
                self.awaiting_second_click = true;
                self.last_release_at = now_ms;
                self.short_pending = true;
            }
        }

        if self.stable && crate::clock::deadline_reached(now_ms, self.next_repeat_at) {
            self.long_pending = true;
            self.next_repeat_at = now_ms.wrapping_add(EDIT_REPEAT_MS);
        }

        if self.awaiting_second_click
            && crate::clock::elapsed_at_least(now_ms, self.last_release_at, DOUBLE_CLICK_WINDOW_MS)
        {
            self.awaiting_second_click = false;
        }
    }
}

impl ButtonEvents for AvrButton {
    fn take_short_press(&mut self) -> bool {
        core::mem::take(&mut self.short_pending)
    }

    fn take_long_press_tick(&mut self) -> bool {
        core::mem::take(&mut self.long_pending)
    }

    fn take_double_press(&mut self) -> bool {
        core::mem::take(&mut self.double_pending)
    }
}

pub struct AvrFireLine;

impl FireLine for AvrFireLine {
    fn is_pressed(&self) -> bool {
        read_pind() & FIRE_PIN == 0
    }
}

/// Bundles every peripheral handle the `Board` trait needs, taking
/// ownership of `Peripherals` once at boot the way the teacher's
/// `esp_hal::Peripherals::take()` is consumed exactly once in
/// `board::startup`.
pub struct AvrBoard {
    pwm: AvrPwm,
    mosfet: AvrMosfet,
    display: AvrDisplay,
    adc: AvrAdc,
    eeprom: AvrEeprom,
    sleep: AvrSleep,
    clock: AvrClock,
    mode_btn: AvrButton,
    up_btn: AvrButton,
    down_btn: AvrButton,
    fire_evt: AvrButton,
    fire_line: AvrFireLine,
}

impl AvrBoard {
    /// One-time boot wiring: configures GPIO directions/pull-ups, starts
    /// Timer1's 1 kHz CTC tick, and leaves the ADC/EEPROM/PWM peripherals
    /// in their reset-default state until first used.
    pub fn take() -> Self {
        let p = Peripherals::take().unwrap_or_else(|| unreachable!());

        p.PORTD.ddrd.write(|w| unsafe { w.bits((1 << 0) | (1 << 1) | (1 << 6)) });
        p.PORTD
            .portd
            .write(|w| unsafe { w.bits(MODE_PIN | UP_PIN | DOWN_PIN | FIRE_PIN) });
        p.PORTB.ddrb.write(|w| unsafe { w.bits(MOSFET_PIN) });

        // Timer1, CTC, 1 kHz tick at 16 MHz / 64 prescale (OCR1A = 249).
        p.TC1.tccr1b.write(|w| w.wgm1().bits(0b01).cs1().prescale_64());
        p.TC1.ocr1a.write(|w| unsafe { w.bits(249) });
        p.TC1.timsk1.write(|w| w.ocie1a().set_bit());

        p.ADC.admux.write(|w| w.refs().avcc().mux().adc6());
        p.ADC.adcsra.write(|w| w.aden().set_bit().adps().prescaler_128());

        p.EXINT.pcmsk2.write(|w| unsafe { w.bits(FIRE_PIN) });

        unsafe { interrupt::enable() };

        Self {
            pwm: AvrPwm::new(p.TC0),
            mosfet: AvrMosfet { portb: p.PORTB },
            display: AvrDisplay { portd: p.PORTD },
            adc: AvrAdc { adc: p.ADC },
            eeprom: AvrEeprom { eeprom: p.EEPROM },
            sleep: AvrSleep { cpu: p.CPU, exint: p.EXINT },
            clock: AvrClock,
            mode_btn: AvrButton::new(MODE_PIN),
            up_btn: AvrButton::new(UP_PIN),
            down_btn: AvrButton::new(DOWN_PIN),
            fire_evt: AvrButton::new(FIRE_PIN),
            fire_line: AvrFireLine,
        }
    }

    /// Step 1 of the control loop (spec.md §4.G): tick every button
    /// driver against one shared `PIND` read. Called by `main` immediately
    /// before `Controller::tick`.
    pub fn tick_buttons(&mut self) {
        let pind = read_pind();
        let now = self.clock.now_ms();
        self.mode_btn.tick(pind, now);
        self.up_btn.tick(pind, now);
        self.down_btn.tick(pind, now);
        self.fire_evt.tick(pind, now);
    }
}

impl Board for AvrBoard {
    type Error = core::convert::Infallible;
    type Pwm = AvrPwm;
    type Mosfet = AvrMosfet;
    type Display = AvrDisplay;
    type Adc = AvrAdc;
    type Eeprom = AvrEeprom;
    type Sleep = AvrSleep;
    type Clock = AvrClock;
    type ModeButton = AvrButton;
    type UpButton = AvrButton;
    type DownButton = AvrButton;
    type FireButton = AvrFireLine;
    type FireEvents = AvrButton;

    fn pwm(&mut self) -> &mut Self::Pwm {
        &mut self.pwm
    }

    fn mosfet(&mut self) -> &mut Self::Mosfet {
        &mut self.mosfet
    }

    fn display(&mut self) -> &mut Self::Display {
        &mut self.display
    }

    fn adc(&mut self) -> &mut Self::Adc {
        &mut self.adc
    }

    fn eeprom(&mut self) -> &mut Self::Eeprom {
        &mut self.eeprom
    }

    fn sleep(&mut self) -> &mut Self::Sleep {
        &mut self.sleep
    }

    fn clock(&self) -> &Self::Clock {
        &self.clock
    }

    fn mode_button(&mut self) -> &mut Self::ModeButton {
        &mut self.mode_btn
    }

    fn up_button(&mut self) -> &mut Self::UpButton {
        &mut self.up_btn
    }

    fn down_button(&mut self) -> &mut Self::DownButton {
        &mut self.down_btn
    }

    fn fire_button(&mut self) -> &mut Self::FireButton {
        &mut self.fire_line
    }

    fn fire_events(&mut self) -> &mut Self::FireEvents {
        &mut self.fire_evt
    }
}
