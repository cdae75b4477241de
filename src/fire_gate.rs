//! Fire Gate (spec.md §4.C): debounces the fire button and enforces the
//! arm/disarm/cooldown state machine with a max-burn timeout.

use crate::clock::elapsed_at_least;
use crate::constants::{FIRE_LIMIT_MS, T_DEB_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GateState {
    Idle,
    Armed,
    Cooldown,
}

/// Tracks the last-change timestamp of a boolean signal and only reports a
/// change once it has held past `T_DEB_MS` (spec.md §4.C: "The debouncer
/// records the last-change timestamp and commits state only after the
/// level has held past T_deb").
#[derive(Debug, Clone, Copy)]
struct Debouncer {
    committed: bool,
    pending: bool,
    changed_at: u32,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            committed: false,
            pending: false,
            changed_at: 0,
        }
    }

    /// Feeds a new raw reading. Returns the stable, debounced level.
    fn update(&mut self, raw: bool, now_ms: u32) -> bool {
        if raw != self.pending {
            self.pending = raw;
            self.changed_at = now_ms;
        } else if self.pending != self.committed && elapsed_at_least(now_ms, self.changed_at, T_DEB_MS) {
            self.committed = self.pending;
        }
        self.committed
    }
}

pub struct FireGate {
    state: GateState,
    debouncer: Debouncer,
    burn_started_at: u32,
    pub allow_fire: bool,
}

impl FireGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Idle,
            debouncer: Debouncer::new(),
            burn_started_at: 0,
            allow_fire: false,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Single disarm primitive (spec.md §9 open question: "implement a
    /// single disarm primitive that (a) disables PWM, (b) drives MOSFET
    /// LOW, (c) clears allow_fire"). PWM-disable and MOSFET-LOW are board
    /// operations performed by the caller (the control loop, §4.G) as soon
    /// as this returns — this method's job is only to make `allow_fire`
    /// authoritative *before* that happens, per the safety ordering in
    /// spec.md §5.
    fn disarm(&mut self, next: GateState) {
        self.allow_fire = false;
        self.state = next;
    }

    /// Advances the gate by one control-loop tick. `ohm_present` and
    /// `voltage_ok` are the Idle->Armed guard (spec.md §4.C,
    /// invariant 2 of spec.md §3).
    pub fn tick(&mut self, raw: bool, now_ms: u32, ohm_present: bool, voltage_ok: bool) -> GateState {
        let debounced = self.debouncer.update(raw, now_ms);

        match self.state {
            GateState::Idle => {
                if debounced && ohm_present && voltage_ok {
                    self.burn_started_at = now_ms;
                    self.allow_fire = true;
                    self.state = GateState::Armed;
                }
            }
            GateState::Armed => {
                if !debounced {
                    self.disarm(GateState::Idle);
                } else if elapsed_at_least(now_ms, self.burn_started_at, FIRE_LIMIT_MS) {
                    self.disarm(GateState::Cooldown);
                }
            }
            GateState::Cooldown => {
                if !debounced {
                    self.state = GateState::Idle;
                }
            }
        }

        self.state
    }

    /// Forces a disarm regardless of button state (used by the lifecycle
    /// manager's low-battery trip, spec.md §4.F.2).
    pub fn force_disarm(&mut self) {
        self.disarm(GateState::Idle);
    }
}

impl Default for FireGate {
    fn default() -> Self {
        Self::new()
    }
}
