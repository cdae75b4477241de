//! Fire/settings mode enumeration and cluster cycling (spec.md §3, §4.E).
//!
//! The REDESIGN FLAG in spec.md §9 calls out the original's operator
//! overloading for mode rotation; this is `Mode::next_in_cluster`, an
//! explicit, pure function instead.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    VariVolt,
    VariWatt,
    Hell,
    Amp,
    Ohm,
    BattRes,
    VccConst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cluster {
    Fire,
    Settings,
}

const FIRE_CLUSTER: [Mode; 3] = [Mode::VariVolt, Mode::VariWatt, Mode::Hell];
const SETTINGS_CLUSTER: [Mode; 4] = [Mode::Amp, Mode::Ohm, Mode::BattRes, Mode::VccConst];

impl Mode {
    pub const fn cluster(self) -> Cluster {
        match self {
            Mode::VariVolt | Mode::VariWatt | Mode::Hell => Cluster::Fire,
            Mode::Amp | Mode::Ohm | Mode::BattRes | Mode::VccConst => Cluster::Settings,
        }
    }

    fn cluster_slice(cluster: Cluster) -> &'static [Mode] {
        match cluster {
            Cluster::Fire => &FIRE_CLUSTER,
            Cluster::Settings => &SETTINGS_CLUSTER,
        }
    }

    /// Advances circularly within `self`'s cluster, skipping the other
    /// cluster entirely (spec.md §4.E).
    pub fn next_in_cluster(self) -> Mode {
        let slice = Self::cluster_slice(self.cluster());
        let pos = slice.iter().position(|m| *m == self).unwrap_or(0);
        slice[(pos + 1) % slice.len()]
    }

    /// EEPROM persistence code for fire-cluster modes (spec.md §6 offset 4).
    /// Only fire-cluster modes are ever persisted (§3: set-points are
    /// mutated by the editor or calibration; the last-selected fire mode is
    /// the only mode value written to disk).
    pub fn to_persisted_code(self) -> Option<u8> {
        match self {
            Mode::VariVolt => Some(0),
            Mode::VariWatt => Some(1),
            Mode::Hell => Some(2),
            _ => None,
        }
    }

    pub fn from_persisted_code(code: u8) -> Mode {
        match code {
            1 => Mode::VariWatt,
            2 => Mode::Hell,
            _ => Mode::VariVolt,
        }
    }
}

/// Remembers the last-selected mode per cluster and implements the toggle
/// semantics of spec.md §4.E ("toggling clusters restores that memory").
#[derive(Debug, Clone, Copy)]
pub struct ModeMemory {
    last_fire: Mode,
    last_settings: Mode,
}

impl Default for ModeMemory {
    fn default() -> Self {
        Self {
            last_fire: Mode::VariVolt,
            last_settings: Mode::Amp,
        }
    }
}

impl ModeMemory {
    pub fn remember(&mut self, mode: Mode) {
        match mode.cluster() {
            Cluster::Fire => self.last_fire = mode,
            Cluster::Settings => self.last_settings = mode,
        }
    }

    pub fn recall(&self, cluster: Cluster) -> Mode {
        match cluster {
            Cluster::Fire => self.last_fire,
            Cluster::Settings => self.last_settings,
        }
    }

    pub fn last_fire_mode(&self) -> Mode {
        self.last_fire
    }
}
