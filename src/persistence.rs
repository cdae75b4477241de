//! Persistence (spec.md §4.F.4, §6, §7): fixed little-endian EEPROM layout,
//! read on boot, written on sleep with an update-if-differs primitive.
//!
//! Ported from the teacher's `Storable`/`Loadable` trait pair
//! (`board/config/current.rs`, `config/types.rs`), made synchronous since
//! this firmware has no async executor, and specialized to the one fixed
//! layout spec.md §6 names (no version migration — there is exactly one
//! on-disk format).

use crate::mode::Mode;
use crate::setpoints::{SetPoints, VCC_CONST_DEFAULT};

pub trait EepromBus {
    type Error;

    fn read(&mut self, offset: u16, buf: &mut [u8]) -> Result<(), Self::Error>;
    fn write(&mut self, offset: u16, buf: &[u8]) -> Result<(), Self::Error>;
}

const OFFSET_VCC_CONST: u16 = 0;
const OFFSET_MODE: u16 = 4;
const OFFSET_VOLT: u16 = 5;
const OFFSET_WATT: u16 = 9;
const OFFSET_AMP: u16 = 10;
const OFFSET_OHM: u16 = 11;
#[cfg(not(all(feature = "gen_early", not(feature = "gen_current"))))]
const OFFSET_BATT_RES: u16 = 15;

/// Update-if-differs primitive (spec.md §6: "Writes use update-semantics
/// (write-if-differs)"). Reads the current bytes, compares, and only
/// issues a write when they differ — the EEPROM write cycle is the
/// expensive/wear-limited operation on this hardware.
fn write_if_differs<B: EepromBus>(bus: &mut B, offset: u16, bytes: &[u8]) -> Result<(), B::Error> {
    let mut current = [0u8; 4];
    let scratch = &mut current[..bytes.len()];
    bus.read(offset, scratch)?;
    if scratch != bytes {
        bus.write(offset, bytes)?;
    }
    Ok(())
}

/// Reads the fixed layout from `bus`, applying the only boot-time
/// substitution spec.md §7 calls out: `vcc_const == 0` becomes the default
/// `1.100`. Every other field is accepted as-is — per spec.md §7 they are
/// "clamped on first use" by the set-point editor (spec.md §4.D), not at
/// boot.
pub fn boot<B: EepromBus>(bus: &mut B) -> Result<(SetPoints, Mode), B::Error> {
    let mut buf4 = [0u8; 4];
    let mut buf1 = [0u8; 1];

    bus.read(OFFSET_VCC_CONST, &mut buf4)?;
    let mut vcc_const = f32::from_le_bytes(buf4);
    if vcc_const == 0.0 {
        vcc_const = VCC_CONST_DEFAULT;
    }

    bus.read(OFFSET_MODE, &mut buf1)?;
    let mode = Mode::from_persisted_code(buf1[0]);

    bus.read(OFFSET_VOLT, &mut buf4)?;
    let volt = f32::from_le_bytes(buf4);

    bus.read(OFFSET_WATT, &mut buf1)?;
    let watt = buf1[0] as u32;

    bus.read(OFFSET_AMP, &mut buf1)?;
    let amp = buf1[0] as u32;

    bus.read(OFFSET_OHM, &mut buf4)?;
    let ohm = f32::from_le_bytes(buf4);

    #[cfg(not(all(feature = "gen_early", not(feature = "gen_current"))))]
    let batt_res = {
        bus.read(OFFSET_BATT_RES, &mut buf4)?;
        f32::from_le_bytes(buf4)
    };
    #[cfg(all(feature = "gen_early", not(feature = "gen_current")))]
    let batt_res = 0.0;

    Ok((
        SetPoints {
            volt,
            watt,
            amp,
            ohm,
            batt_res,
            vcc_const,
        },
        mode,
    ))
}

/// Writes the current user-visible fire-cluster values to their fixed
/// offsets (spec.md §4.F.4), called exclusively on the sleep transition.
pub fn save<B: EepromBus>(
    bus: &mut B,
    setpoints: &SetPoints,
    last_fire_mode: Mode,
) -> Result<(), B::Error> {
    write_if_differs(bus, OFFSET_VCC_CONST, &setpoints.vcc_const.to_le_bytes())?;
    if let Some(code) = last_fire_mode.to_persisted_code() {
        write_if_differs(bus, OFFSET_MODE, &[code])?;
    }
    write_if_differs(bus, OFFSET_VOLT, &setpoints.volt.to_le_bytes())?;
    write_if_differs(bus, OFFSET_WATT, &[setpoints.watt.min(255) as u8])?;
    write_if_differs(bus, OFFSET_AMP, &[setpoints.amp.min(255) as u8])?;
    write_if_differs(bus, OFFSET_OHM, &setpoints.ohm.to_le_bytes())?;

    #[cfg(not(all(feature = "gen_early", not(feature = "gen_current"))))]
    write_if_differs(bus, OFFSET_BATT_RES, &setpoints.batt_res.to_le_bytes())?;

    Ok(())
}
