//! Set-point Editor (spec.md §4.D): applies quantized increment/decrement
//! steps to the mode-specific set-point, clamping to safety bounds.

use crate::mode::Mode;
use crate::quantize::clamp_quantized;
use crate::setpoints::{
    SetPoints, BATT_RES_MAX, BATT_RES_STEP, OHM_MAX, OHM_STEP, VCC_CONST_MAX, VCC_CONST_MIN,
    VCC_CONST_STEP, VOLT_STEP,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn sign(self) -> f32 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }

    fn sign_i32(self) -> i32 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

pub struct SetpointEditor;

impl SetpointEditor {
    /// Applies one signed step to the set-point of `mode` (spec.md §4.D).
    /// `voltage_mv` is the latest filtered rail reading, used for the
    /// VariVolt/VariWatt static edit-time bounds of spec.md §3 (the tighter,
    /// voltage-drop-aware bound is re-applied continuously by the duty
    /// synthesizer, spec.md §4.B). No-op steps still count as "applied" for
    /// idle-timer purposes (the caller resets the idle timer regardless).
    pub fn apply_step(mode: Mode, setpoints: &mut SetPoints, direction: Direction, voltage_mv: u16) {
        match mode {
            Mode::VariVolt => Self::step_volt(setpoints, direction, voltage_mv),
            Mode::VariWatt => Self::step_watt(setpoints, direction, voltage_mv),
            Mode::Amp => Self::step_amp(setpoints, direction),
            Mode::Ohm => Self::step_ohm(setpoints, direction),
            Mode::BattRes => Self::step_batt_res(setpoints, direction),
            Mode::VccConst => Self::step_vcc_const(setpoints, direction),
            Mode::Hell => {}
        }
    }

    fn step_volt(setpoints: &mut SetPoints, direction: Direction, voltage_mv: u16) {
        if setpoints.ohm <= 0.0 {
            // Edge case (spec.md §4.D): no coil, edit is a no-op that
            // zeros the set-point.
            setpoints.volt = 0.0;
            return;
        }
        let cap = voltage_mv as f32 / 1000.0;
        let stepped = setpoints.volt + direction.sign() * VOLT_STEP;
        setpoints.volt = clamp_quantized(stepped, 0.0, cap, VOLT_STEP);
    }

    fn step_watt(setpoints: &mut SetPoints, direction: Direction, voltage_mv: u16) {
        if setpoints.ohm <= 0.0 {
            setpoints.watt = 0;
            return;
        }
        let volts = voltage_mv as f32 / 1000.0;
        let cap = libm::floorf(volts * volts / setpoints.ohm);
        let stepped = setpoints.watt as i64 + direction.sign_i32() as i64;
        setpoints.watt = stepped.clamp(0, cap.max(0.0) as i64) as u32;
    }

    fn step_amp(setpoints: &mut SetPoints, direction: Direction) {
        let stepped = setpoints.amp as i64 + direction.sign_i32() as i64;
        setpoints.amp = stepped.clamp(0, crate::setpoints::AMP_MAX as i64) as u32;
        if setpoints.amp == 0 {
            setpoints.ohm = 0.0;
        } else {
            // Re-floor ohm in case the new, tighter lower bound invalidates it.
            let lo = SetPoints::ohm_lower_bound(setpoints.amp);
            setpoints.ohm = clamp_quantized(setpoints.ohm, lo, OHM_MAX, OHM_STEP);
        }
    }

    fn step_ohm(setpoints: &mut SetPoints, direction: Direction) {
        if setpoints.amp == 0 {
            // Edge case (spec.md §4.D): no amperage limit set, edit is a
            // no-op that zeros `ohm`.
            setpoints.ohm = 0.0;
            return;
        }
        let lo = SetPoints::ohm_lower_bound(setpoints.amp);
        let stepped = setpoints.ohm + direction.sign() * OHM_STEP;
        setpoints.ohm = clamp_quantized(stepped, lo, OHM_MAX, OHM_STEP);
    }

    fn step_batt_res(setpoints: &mut SetPoints, direction: Direction) {
        let stepped = setpoints.batt_res + direction.sign() * BATT_RES_STEP;
        setpoints.batt_res = clamp_quantized(stepped, 0.0, BATT_RES_MAX, BATT_RES_STEP);
    }

    fn step_vcc_const(setpoints: &mut SetPoints, direction: Direction) {
        let stepped = setpoints.vcc_const + direction.sign() * VCC_CONST_STEP;
        setpoints.vcc_const = clamp_quantized(stepped, VCC_CONST_MIN, VCC_CONST_MAX, VCC_CONST_STEP);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sp_with_coil() -> SetPoints {
        SetPoints {
            ohm: 0.5,
            amp: 30,
            ..SetPoints::default()
        }
    }

    #[test]
    fn volt_steps_and_clamps_to_voltage() {
        let mut sp = sp_with_coil();
        SetpointEditor::apply_step(Mode::VariVolt, &mut sp, Direction::Up, 4000);
        assert!((sp.volt - 0.05).abs() < 1e-4);

        sp.volt = 3.98;
        SetpointEditor::apply_step(Mode::VariVolt, &mut sp, Direction::Up, 4000);
        assert!(sp.volt <= 4.0);
    }

    #[test]
    fn volt_edit_is_noop_zeroing_without_coil() {
        let mut sp = SetPoints::default();
        sp.volt = 2.0;
        SetpointEditor::apply_step(Mode::VariVolt, &mut sp, Direction::Up, 4000);
        assert_eq!(sp.volt, 0.0);
    }

    #[test]
    fn ohm_edit_noop_zeroes_without_amp() {
        let mut sp = SetPoints::default();
        sp.ohm = 0.3;
        SetpointEditor::apply_step(Mode::Ohm, &mut sp, Direction::Up, 0);
        assert_eq!(sp.ohm, 0.0);
    }

    #[test]
    fn ohm_respects_amperage_lower_bound() {
        let mut sp = SetPoints {
            amp: 30,
            ohm: SetPoints::ohm_lower_bound(30),
            ..SetPoints::default()
        };
        SetpointEditor::apply_step(Mode::Ohm, &mut sp, Direction::Down, 0);
        let lo = SetPoints::ohm_lower_bound(30);
        assert!(sp.ohm >= lo - 1e-4);
    }

    #[test]
    fn property_volt_always_multiple_of_step_and_in_range() {
        let mut sp = sp_with_coil();
        let mut dir = Direction::Up;
        for i in 0..200 {
            SetpointEditor::apply_step(Mode::VariVolt, &mut sp, dir, 4000);
            if i % 7 == 0 {
                dir = if dir == Direction::Up { Direction::Down } else { Direction::Up };
            }
            let ratio = sp.volt / VOLT_STEP;
            assert!((ratio - ratio.round()).abs() < 1e-3);
            assert!(sp.volt >= 0.0 && sp.volt <= 4.0);
        }
    }

    #[test]
    fn property_ohm_bounds_hold_for_nonzero_amp() {
        let mut sp = SetPoints {
            amp: 30,
            ohm: 0.5,
            ..SetPoints::default()
        };
        for _ in 0..500 {
            SetpointEditor::apply_step(Mode::Ohm, &mut sp, Direction::Down, 0);
        }
        let lo = SetPoints::ohm_lower_bound(30);
        assert!(sp.ohm >= lo - 1e-4);
        assert!(sp.ohm <= OHM_MAX);
    }
}
