//! Duty Synthesizer (spec.md §4.B): converts (mode, set-point, voltage,
//! coil Ω, battery Ω) into a filtered PWM duty word and the inferred
//! voltage drop, with a secondary smoothing pipeline built from the same
//! `filter::MedianEwma` the voltage estimator uses (module doc, §2 of
//! SPEC_FULL.md).

use crate::constants::PWM_MAX;
use crate::filter::{round, MedianEwma};
use crate::mode::Mode;
use crate::quantize::clamp_quantized;
use crate::setpoints::{SetPoints, VOLT_STEP};

/// Sampled, volatile state shared across components (spec.md §3).
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SampledState {
    pub voltage_mv: u16,
    pub voltage_drop_mv: u16,
    /// Filtered duty, 0..=1023.
    pub pwm: u16,
}

pub struct DutySynthesizer {
    smoothing: MedianEwma<3>,
}

impl DutySynthesizer {
    pub const fn new() -> Self {
        Self {
            // window of 3, alpha = 0.1 (spec.md §4.B).
            smoothing: MedianEwma::new(0.1),
        }
    }

    pub fn reset(&mut self) {
        self.smoothing.clear();
    }

    /// Runs one tick of duty synthesis for `mode`, mutating `setpoints` (the
    /// dynamic clamp in VariVolt/VariWatt can reduce the stored set-point,
    /// spec.md §8 S4) and `state` (`voltage_drop_mv` and `pwm` are outputs).
    ///
    /// Invariants upheld unconditionally: `0 <= pwm <= 1023` and
    /// `0 <= voltage_drop_mv <= voltage_mv` (spec.md §3 invariants 1, 3).
    pub fn tick(&mut self, mode: Mode, setpoints: &mut SetPoints, state: &mut SampledState) {
        let voltage = state.voltage_mv as f32;
        let prev_drop = state.voltage_drop_mv as f32;
        let ohm = setpoints.ohm;
        let batt_res = setpoints.batt_res;

        let (drop_mv, raw_duty) = match mode {
            Mode::VariVolt => self.vari_volt(setpoints, voltage, prev_drop, ohm, batt_res),
            Mode::VariWatt => self.vari_watt(setpoints, voltage, prev_drop, ohm, batt_res),
            Mode::Hell => (hell_drop(voltage, ohm, batt_res), None),
            _ => (0.0, None),
        };

        state.voltage_drop_mv = (round(drop_mv).max(0.0) as u32).min(state.voltage_mv as u32) as u16;

        state.pwm = match raw_duty {
            Some(raw) => {
                let raw = raw.clamp(0.0, PWM_MAX as f32);
                match self.smoothing.update(raw) {
                    Some(filtered) => round(filtered).clamp(0.0, PWM_MAX as f32) as u16,
                    None => 0,
                }
            }
            None => 0,
        };
    }

    fn vari_volt(
        &self,
        setpoints: &mut SetPoints,
        voltage: f32,
        prev_drop: f32,
        ohm: f32,
        batt_res: f32,
    ) -> (f32, Option<f32>) {
        let cap = ((voltage - prev_drop) / 1000.0).max(0.0);
        setpoints.volt = clamp_quantized(setpoints.volt, 0.0, cap, VOLT_STEP);

        if ohm <= 0.0 || voltage <= 0.0 {
            return (0.0, None);
        }

        let volt = setpoints.volt;
        let drop = round(volt * batt_res * 1000.0 / (ohm + batt_res));
        let raw_duty = round(volt * 1000.0 * PWM_MAX as f32 / voltage);
        (drop, Some(raw_duty))
    }

    fn vari_watt(
        &self,
        setpoints: &mut SetPoints,
        voltage: f32,
        prev_drop: f32,
        ohm: f32,
        batt_res: f32,
    ) -> (f32, Option<f32>) {
        if ohm <= 0.0 {
            setpoints.watt = 0;
            return (0.0, None);
        }

        let headroom_mv = (voltage - prev_drop).max(0.0);
        let cap_w = round(headroom_mv * headroom_mv / ohm / 1_000_000.0).max(0.0);

        setpoints.watt = (setpoints.watt as f32).min(cap_w).max(0.0) as u32;

        if voltage <= 0.0 {
            return (0.0, None);
        }

        let watt = setpoints.watt as f32;
        let amplitude_v = libm::sqrtf(ohm * watt);
        let drop = round(amplitude_v * batt_res * 1000.0 / ohm);
        let raw_duty = round(amplitude_v * 1000.0 * PWM_MAX as f32 / voltage);
        (drop, Some(raw_duty))
    }
}

impl Default for DutySynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

fn hell_drop(voltage: f32, ohm: f32, batt_res: f32) -> f32 {
    if ohm + batt_res <= 0.0 {
        return 0.0;
    }
    round(voltage * batt_res / (ohm + batt_res))
}
