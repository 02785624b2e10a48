//! Mode profiles: the static mode → (threshold, pump run-time, indicator)
//! table.
//!
//! Thresholds are raw sensor units where a *higher* reading means *drier*
//! soil. Mode `wet` has the lowest threshold (pumps earliest) and the longest
//! run; mode `dry` the highest threshold and the shortest run.

use serde::Deserialize;
use std::fmt;

/// Number of operating modes. Fixed.
pub const MODE_COUNT: usize = 3;

/// Default trigger thresholds, indexed by mode.
pub const DEFAULT_THRESHOLDS: [u16; MODE_COUNT] = [430, 520, 610];

/// Default pump run-time per activation (ms), indexed by mode.
pub const DEFAULT_PUMP_RUN_MS: [u32; MODE_COUNT] = [3000, 2000, 1000];

/// Irrigation profile selected with the mode button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Keep the soil wet.
    Wet = 0,
    Medium = 1,
    /// Let the soil get fairly dry before watering.
    Dry = 2,
}

impl Mode {
    pub const ALL: [Mode; MODE_COUNT] = [Mode::Wet, Mode::Medium, Mode::Dry];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Cyclic successor: wet → medium → dry → wet.
    pub fn next(self) -> Self {
        match self {
            Mode::Wet => Mode::Medium,
            Mode::Medium => Mode::Dry,
            Mode::Dry => Mode::Wet,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Wet => "wet",
            Mode::Medium => "medium",
            Mode::Dry => "dry",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters of a single mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfile {
    pub threshold: u16,
    pub pump_run_ms: u32,
    pub indicator_pin: u8,
}

/// Exactly one profile per [`Mode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTable {
    profiles: [ModeProfile; MODE_COUNT],
}

impl ProfileTable {
    pub fn new(profiles: [ModeProfile; MODE_COUNT]) -> Self {
        Self { profiles }
    }

    /// Default thresholds and run-times with the given indicator pins
    /// (wet, medium, dry).
    pub fn with_defaults(indicator_pins: [u8; MODE_COUNT]) -> Self {
        let profiles = std::array::from_fn(|i| ModeProfile {
            threshold: DEFAULT_THRESHOLDS[i],
            pump_run_ms: DEFAULT_PUMP_RUN_MS[i],
            indicator_pin: indicator_pins[i],
        });
        Self { profiles }
    }

    pub fn get(&self, mode: Mode) -> &ModeProfile {
        &self.profiles[mode.index()]
    }

    /// Indicator pins of every mode, in mode order.
    pub fn indicator_pins(&self) -> [u8; MODE_COUNT] {
        self.profiles.map(|p| p.indicator_pin)
    }

    /// Reading at or above which `mode` asks for water.
    pub fn trigger_level(&self, mode: Mode, hysteresis: u16) -> u32 {
        u32::from(self.get(mode).threshold) + u32::from(hysteresis)
    }

    /// `true` iff `moisture >= threshold + hysteresis`.
    pub fn needs_water(&self, mode: Mode, moisture: u16, hysteresis: u16) -> bool {
        u32::from(moisture) >= self.trigger_level(mode, hysteresis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ProfileTable {
        ProfileTable::with_defaults([22, 23, 24])
    }

    #[test]
    fn next_cycles_through_all_modes() {
        assert_eq!(Mode::Wet.next(), Mode::Medium);
        assert_eq!(Mode::Medium.next(), Mode::Dry);
        assert_eq!(Mode::Dry.next(), Mode::Wet);
        for m in Mode::ALL {
            assert_eq!(m.next().next().next(), m);
        }
    }

    #[test]
    fn index_follows_mode_order() {
        for (i, m) in Mode::ALL.iter().enumerate() {
            assert_eq!(m.index(), i);
        }
    }

    #[test]
    fn default_table_matches_calibration() {
        let t = table();
        assert_eq!(t.get(Mode::Wet).threshold, 430);
        assert_eq!(t.get(Mode::Medium).threshold, 520);
        assert_eq!(t.get(Mode::Dry).threshold, 610);
        assert_eq!(t.get(Mode::Wet).pump_run_ms, 3000);
        assert_eq!(t.get(Mode::Medium).pump_run_ms, 2000);
        assert_eq!(t.get(Mode::Dry).pump_run_ms, 1000);
        assert_eq!(t.indicator_pins(), [22, 23, 24]);
    }

    #[test]
    fn trigger_boundary_is_inclusive() {
        let t = table();
        assert!(!t.needs_water(Mode::Wet, 449, 20));
        assert!(t.needs_water(Mode::Wet, 450, 20));
        assert!(t.needs_water(Mode::Wet, 451, 20));
        assert!(!t.needs_water(Mode::Dry, 629, 20));
        assert!(t.needs_water(Mode::Dry, 630, 20));
    }

    #[test]
    fn trigger_level_does_not_overflow() {
        let t = ProfileTable::new([ModeProfile {
            threshold: u16::MAX,
            pump_run_ms: 1,
            indicator_pin: 2,
        }; MODE_COUNT]);
        assert_eq!(t.trigger_level(Mode::Wet, u16::MAX), 2 * u32::from(u16::MAX));
        assert!(!t.needs_water(Mode::Wet, u16::MAX, 1));
    }

    #[test]
    fn mode_display_and_deserialize() {
        assert_eq!(Mode::Medium.to_string(), "medium");

        #[derive(Deserialize)]
        struct Wrapper {
            mode: Mode,
        }
        let w: Wrapper = toml::from_str(r#"mode = "dry""#).unwrap();
        assert_eq!(w.mode, Mode::Dry);
        assert!(toml::from_str::<Wrapper>(r#"mode = "soggy""#).is_err());
    }
}
