//! Persisted set-points (spec.md §3) and their dynamic bounds.

use crate::constants::BATTERY_MAX;
use crate::quantize::{clamp_quantized, snap};

pub const VOLT_STEP: f32 = 0.05;
pub const OHM_STEP: f32 = 0.005;
pub const BATT_RES_STEP: f32 = 0.001;
pub const VCC_CONST_STEP: f32 = 0.001;

pub const VCC_CONST_MIN: f32 = 1.000;
pub const VCC_CONST_MAX: f32 = 1.200;
pub const VCC_CONST_DEFAULT: f32 = 1.100;

pub const BATT_RES_MAX: f32 = 0.100;
pub const OHM_MAX: f32 = 1.000;
pub const AMP_MAX: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetPoints {
    pub volt: f32,
    pub watt: u32,
    pub amp: u32,
    pub ohm: f32,
    pub batt_res: f32,
    pub vcc_const: f32,
}

impl Default for SetPoints {
    /// First-boot defaults (spec.md §3): all zero, `vcc_const = 1.1`.
    fn default() -> Self {
        Self {
            volt: 0.0,
            watt: 0,
            amp: 0,
            ohm: 0.0,
            batt_res: 0.0,
            vcc_const: VCC_CONST_DEFAULT,
        }
    }
}

impl SetPoints {
    /// Lower bound on `ohm` enforcing the discharge limit: `BATTERY_MAX /
    /// (amp * 1000)`, or `0` when `amp == 0` — in which case `ohm` is
    /// itself forced to zero (spec.md §3).
    pub fn ohm_lower_bound(amp: u32) -> f32 {
        if amp == 0 {
            0.0
        } else {
            BATTERY_MAX as f32 / (amp as f32 * 1000.0)
        }
    }

    /// Clamps every field to its static bounds and re-quantizes, the way
    /// `boot()` must after reading possibly-stale EEPROM contents
    /// (spec.md §4.D applies these same bounds to user edits; §7 applies
    /// them to EEPROM reads beyond the `vcc_const == 0` substitution).
    pub fn clamp_to_bounds(&mut self) {
        self.amp = self.amp.min(AMP_MAX);

        if self.amp == 0 {
            self.ohm = 0.0;
        } else {
            let lo = Self::ohm_lower_bound(self.amp);
            self.ohm = clamp_quantized(self.ohm, lo, OHM_MAX, OHM_STEP);
        }

        self.batt_res = clamp_quantized(self.batt_res, 0.0, BATT_RES_MAX, BATT_RES_STEP).max(0.0);

        if self.vcc_const == 0.0 {
            self.vcc_const = VCC_CONST_DEFAULT;
        } else {
            self.vcc_const =
                snap(self.vcc_const, VCC_CONST_STEP).clamp(VCC_CONST_MIN, VCC_CONST_MAX);
        }

        if self.volt < 0.0 {
            self.volt = 0.0;
        }
    }
}
