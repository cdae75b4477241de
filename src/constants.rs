//! Fixed constants and tuning-generation selection (spec.md §6).
//!
//! The reference firmware shipped two tuning generations that disagree on a
//! handful of timing constants. Both are preserved behind Cargo features
//! (`gen_early` / `gen_current`) the way the teacher selects hardware
//! revisions behind `hw_v1`..`hw_v6` features in `board::hardware`.

/// Cell is considered empty below this rail voltage.
pub const BATTERY_MIN: u16 = 2800;
/// Fully charged cell voltage, used as the amperage-limit numerator.
pub const BATTERY_MAX: u16 = 4200;

/// Maximum continuous burn before a forced cooldown.
pub const FIRE_LIMIT_MS: u32 = 5_000;

/// Unlock/lock puzzle window.
pub const UNLOCK_TIME_MS: u32 = 3_000;

/// Hardware PWM generator frequency (informational; consumed by `board`).
pub const FIRE_FREQUENCY_HZ: u32 = 20_000;
/// Hardware display-refresh ISR frequency (informational; consumed by `board`).
pub const DISPLAY_FREQUENCY_HZ: u32 = 30;

/// 10-bit PWM duty ceiling.
pub const PWM_MAX: u16 = 1023;

#[cfg(all(feature = "gen_early", not(feature = "gen_current")))]
mod generation {
    /// Debounce settle time for the fire button.
    pub const T_DEB_MS: u32 = 50;
    /// Idle-to-sleep deadline.
    pub const STANDBY_TIME_MS: u32 = 60_000;
    /// Control-loop measurement refresh period (spec.md §4.G step 4).
    pub const VALUES_UPDATE_INTERVAL_MS: u32 = 10;
}

#[cfg(not(all(feature = "gen_early", not(feature = "gen_current"))))]
mod generation {
    /// Debounce settle time for the fire button.
    pub const T_DEB_MS: u32 = 100;
    /// Idle-to-sleep deadline.
    pub const STANDBY_TIME_MS: u32 = 300_000;
    /// Control-loop measurement refresh period (spec.md §4.G step 4).
    pub const VALUES_UPDATE_INTERVAL_MS: u32 = 50;
}

pub use generation::{STANDBY_TIME_MS, T_DEB_MS, VALUES_UPDATE_INTERVAL_MS};

/// Long-press set-point repeat interval (spec.md §4.D).
pub const EDIT_REPEAT_MS: u32 = 100;
