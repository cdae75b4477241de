//! Button driver contract (spec.md §1: "the push-button tick/long-press
//! detector" is an external collaborator). The fire button additionally
//! exposes a raw level, consumed directly by `fire_gate::FireGate`'s own
//! debouncer; the other three buttons are consumed only through the
//! discrete events below, since their debounce/long-press timing is
//! implemented by the external driver, not this crate.

/// One of the three non-fire buttons (up, down, mode), or the fire button
/// when it participates in the lock/unlock puzzle (spec.md §4.F.3).
pub trait ButtonEvents {
    /// True for exactly one tick per completed short press.
    fn take_short_press(&mut self) -> bool;

    /// True once per repeat interval while a long-press is held (spec.md
    /// §4.D: "re-applies the same step every 100 ms" — the repeat cadence
    /// itself is produced by the external long-press detector).
    fn take_long_press_tick(&mut self) -> bool;

    /// True once per completed double-press gesture.
    fn take_double_press(&mut self) -> bool;
}

/// The fire button's raw, undebounced level, polled once per control-loop
/// iteration (spec.md §4.G step 3).
pub trait FireLine {
    fn is_pressed(&self) -> bool;
}
