//! Peripheral contracts (SPEC_FULL.md §12). Everything in this module is
//! an external collaborator per spec.md §1 — the PWM timer peripheral, the
//! MOSFET gate line, the display driver, and the sleep-mode primitive are
//! all "given", not implemented here. Keeping them as traits is what makes
//! the control loop and the regulation components hardware-agnostic and
//! host-testable, the way the teacher's `board` module lets `states::*`
//! depend on `Board` rather than concrete ESP32 peripherals.

pub use crate::buttons::{ButtonEvents, FireLine};
pub use crate::clock::MonotonicClock;
pub use crate::persistence::EepromBus;
pub use crate::voltage::VoltageAdc;

/// The hardware PWM generator driving the MOSFET gate (~20 kHz,
/// spec.md §6). `set_duty` takes the 10-bit duty word directly; the
/// generator itself, and its interrupt-driven output-compare behavior, are
/// out of scope (spec.md §1).
pub trait PwmOutput {
    fn set_duty(&mut self, duty: u16);
    fn disable(&mut self);
}

/// Direct digital drive of the MOSFET gate, used by the `Hell` mode
/// (unregulated — full on while firing) and by the disarm primitive
/// (spec.md §4.C, §9).
pub trait MosfetDrive {
    fn set_high(&mut self);
    fn set_low(&mut self);
}

/// Sink for the 4-glyph display frame (spec.md §4.I). The shift-register
/// driver and its refresh ISR are out of scope (spec.md §1, §6); this is
/// only the hand-off of a rendered frame.
pub trait DisplaySink {
    fn show(&mut self, frame: &crate::display::Frame);
}

/// The MCU's deep-sleep primitive (spec.md §4.F.4): attaches a falling-edge
/// interrupt to the fire-button line and parks the CPU until it fires,
/// detaching the interrupt itself on the way out.
pub trait SleepController {
    fn deep_sleep_until_fire_press(&mut self);
}

/// Bundles every peripheral contract the control loop (spec.md §4.G) needs
/// into one handle, the way the teacher's `Board` struct bundles its own
/// concrete ESP32 peripherals behind a single value passed to `states::*`.
/// Associated types rather than a generic struct keep `control::Controller`
/// hardware-agnostic: swapping in `board::sim`'s fakes for host tests, or a
/// concrete AVR wiring (`board::avr`, gated by a Cargo feature) for the
/// real target, requires no change to `Controller` itself.
pub trait Board {
    type Error;
    type Pwm: PwmOutput;
    type Mosfet: MosfetDrive;
    type Display: DisplaySink;
    type Adc: VoltageAdc<Error = Self::Error>;
    type Eeprom: EepromBus<Error = Self::Error>;
    type Sleep: SleepController;
    type Clock: MonotonicClock;
    type ModeButton: ButtonEvents;
    type UpButton: ButtonEvents;
    type DownButton: ButtonEvents;
    type FireButton: FireLine;
    /// Short/double-press events on the fire button, produced by the same
    /// external tick/long-press detector as the other three buttons
    /// (spec.md §1). Distinct from `FireButton`'s raw level: the fire
    /// gate's own debouncer (spec.md §4.C) consumes the raw line, while
    /// the lock/unlock puzzle (spec.md §4.F.3) consumes discrete press
    /// events the same way the mode selector consumes the mode button's.
    type FireEvents: ButtonEvents;

    fn pwm(&mut self) -> &mut Self::Pwm;
    fn mosfet(&mut self) -> &mut Self::Mosfet;
    fn display(&mut self) -> &mut Self::Display;
    fn adc(&mut self) -> &mut Self::Adc;
    fn eeprom(&mut self) -> &mut Self::Eeprom;
    fn sleep(&mut self) -> &mut Self::Sleep;
    fn clock(&self) -> &Self::Clock;
    fn mode_button(&mut self) -> &mut Self::ModeButton;
    fn up_button(&mut self) -> &mut Self::UpButton;
    fn down_button(&mut self) -> &mut Self::DownButton;
    fn fire_button(&mut self) -> &mut Self::FireButton;
    fn fire_events(&mut self) -> &mut Self::FireEvents;
}

/// Concrete ATmega328P wiring (SPEC_FULL.md §12: "concrete AVR wiring is
/// sketched in `board::avr` behind a Cargo feature, the way the teacher
/// gates concrete MCU wiring behind `hw_v1`/`hw_v2`/etc. features").
#[cfg(feature = "avr")]
pub mod avr;

#[cfg(test)]
pub mod sim {
    //! Host-testable fakes for every peripheral contract, used by the
    //! `control` module's integration tests.

    use super::*;
    use crate::display::Frame;

    pub struct FakePwm {
        pub duty: Option<u16>,
    }

    impl Default for FakePwm {
        fn default() -> Self {
            Self { duty: None }
        }
    }

    impl PwmOutput for FakePwm {
        fn set_duty(&mut self, duty: u16) {
            self.duty = Some(duty);
        }

        fn disable(&mut self) {
            self.duty = None;
        }
    }

    #[derive(Default)]
    pub struct FakeMosfet {
        pub high: bool,
    }

    impl MosfetDrive for FakeMosfet {
        fn set_high(&mut self) {
            self.high = true;
        }

        fn set_low(&mut self) {
            self.high = false;
        }
    }

    #[derive(Default)]
    pub struct FakeDisplay {
        pub last_frame: Option<Frame>,
    }

    impl DisplaySink for FakeDisplay {
        fn show(&mut self, frame: &Frame) {
            self.last_frame = Some(*frame);
        }
    }

    #[derive(Default)]
    pub struct FakeSleep {
        pub entered: u32,
    }

    impl SleepController for FakeSleep {
        fn deep_sleep_until_fire_press(&mut self) {
            self.entered += 1;
        }
    }

    pub struct FixedVoltageAdc {
        pub code: u16,
    }

    impl VoltageAdc for FixedVoltageAdc {
        type Error = core::convert::Infallible;

        fn sample_adc_code(&mut self) -> nb::Result<u16, Self::Error> {
            Ok(self.code)
        }
    }

    /// A fully host-simulated `Board`, wiring every fake above together
    /// for `control::Controller`'s integration tests.
    pub struct SimBoard {
        pub pwm: FakePwm,
        pub mosfet: FakeMosfet,
        pub display: FakeDisplay,
        pub adc: FixedVoltageAdc,
        pub eeprom: crate::persistence::test_support::MemoryEeprom,
        pub sleep: FakeSleep,
        pub clock: crate::clock::TestClock,
        pub mode_btn: crate::buttons::test_support::ScriptedButton,
        pub up_btn: crate::buttons::test_support::ScriptedButton,
        pub down_btn: crate::buttons::test_support::ScriptedButton,
        pub fire_btn: crate::buttons::test_support::ScriptedFireLine,
        pub fire_evt: crate::buttons::test_support::ScriptedButton,
    }

    impl SimBoard {
        pub fn new(now_ms: u32, adc_code: u16) -> Self {
            Self {
                pwm: FakePwm::default(),
                mosfet: FakeMosfet::default(),
                display: FakeDisplay::default(),
                adc: FixedVoltageAdc { code: adc_code },
                eeprom: crate::persistence::test_support::MemoryEeprom::default(),
                sleep: FakeSleep::default(),
                clock: crate::clock::TestClock::new(now_ms),
                mode_btn: Default::default(),
                up_btn: Default::default(),
                down_btn: Default::default(),
                fire_btn: Default::default(),
                fire_evt: Default::default(),
            }
        }
    }

    impl Board for SimBoard {
        type Error = core::convert::Infallible;
        type Pwm = FakePwm;
        type Mosfet = FakeMosfet;
        type Display = FakeDisplay;
        type Adc = FixedVoltageAdc;
        type Eeprom = crate::persistence::test_support::MemoryEeprom;
        type Sleep = FakeSleep;
        type Clock = crate::clock::TestClock;
        type ModeButton = crate::buttons::test_support::ScriptedButton;
        type UpButton = crate::buttons::test_support::ScriptedButton;
        type DownButton = crate::buttons::test_support::ScriptedButton;
        type FireButton = crate::buttons::test_support::ScriptedFireLine;
        type FireEvents = crate::buttons::test_support::ScriptedButton;

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
            &mut self.fire_btn
        }

        fn fire_events(&mut self) -> &mut Self::FireEvents {
            &mut self.fire_evt
        }
    }
}
