//! TOML config file loading and validation for pins, control timing, mode
//! profiles and the soil simulator.
//!
//! Every table and key is optional; a missing file means built-in defaults.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::button::ButtonPolicy;
use crate::profile::{Mode, ModeProfile, ProfileTable, MODE_COUNT};

/// Looked up in the working directory when `CONFIG_PATH` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "ardqua.toml";

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pins: PinConfig,
    pub control: ControlConfig,
    /// Empty means the calibrated defaults from [`crate::profile`].
    pub profiles: Vec<ProfileEntry>,
    pub sim: SimConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// ADS1115 input (AIN0..AIN3) the soil probe is wired to.
    pub soil_channel: u8,
    pub button: u8,
    pub pump: u8,
    pub led_wet: u8,
    pub led_medium: u8,
    pub led_dry: u8,
    pub relay_active_low: bool,
    #[cfg_attr(not(feature = "adc"), allow(dead_code))]
    pub ads1115_addr: u16,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            soil_channel: 0,
            button: 27,
            pump: 17,
            led_wet: 22,
            led_medium: 23,
            led_dry: 24,
            relay_active_low: false,
            ads1115_addr: 0x48,
        }
    }
}

impl PinConfig {
    /// Indicator pins in mode order (wet, medium, dry).
    pub fn indicator_pins(&self) -> [u8; MODE_COUNT] {
        [self.led_wet, self.led_medium, self.led_dry]
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub sample_interval_ms: u32,
    pub hysteresis: u16,
    pub samples: u16,
    pub sample_gap_ms: u32,
    pub settle_ms: u32,
    pub soak_ms: u32,
    pub confirm_window_ms: u32,
    /// How long the button must read pressed before it counts.
    pub debounce_ms: u32,
    /// Delay at the end of every idle iteration. 0 spins.
    pub poll_ms: u32,
    pub button_policy: ButtonPolicy,
    /// Pump runs per irrigation before giving up. Absent = no limit.
    pub max_pump_cycles: Option<u32>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 30_000,
            hysteresis: 20,
            samples: 10,
            sample_gap_ms: 5,
            settle_ms: 1_000,
            soak_ms: 15_000,
            confirm_window_ms: 5_000,
            debounce_ms: 20,
            poll_ms: 10,
            button_policy: ButtonPolicy::Confirm,
            max_pump_cycles: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileEntry {
    pub mode: Mode,
    pub threshold: u16,
    pub pump_run_ms: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
#[cfg_attr(not(feature = "sim"), allow(dead_code))]
pub struct SimConfig {
    pub scenario: String,
    pub raw_dry: f64,
    pub raw_wet: f64,
    pub diurnal_period_s: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            scenario: "drying".to_string(),
            raw_dry: 700.0,
            raw_wet: 300.0,
            diurnal_period_s: 600.0,
        }
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 28+ are not exposed on the standard header.
const VALID_GPIO_PINS: &[u8] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

/// Maximum single-ended reading from the ADS1115 (15-bit unsigned).
pub const ADS1115_MAX: u32 = 32767;

/// Highest single-ended ADS1115 input.
const MAX_SOIL_CHANNEL: u8 = 3;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_pins(&mut errors);
        self.validate_control(&mut errors);
        self.validate_profiles(&mut errors);
        self.validate_trigger_range(&mut errors);
        self.validate_sim(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_pins(&self, errors: &mut Vec<String>) {
        let p = &self.pins;
        let mut seen: HashSet<u8> = HashSet::new();

        for (role, pin) in [
            ("button", p.button),
            ("pump", p.pump),
            ("led_wet", p.led_wet),
            ("led_medium", p.led_medium),
            ("led_dry", p.led_dry),
        ] {
            if !VALID_GPIO_PINS.contains(&pin) {
                errors.push(format!(
                    "pins.{role}: {pin} is not a valid BCM GPIO pin (allowed: 2-27)"
                ));
            } else if !seen.insert(pin) {
                errors.push(format!("pins.{role}: {pin} is already used by another role"));
            }
        }

        if p.soil_channel > MAX_SOIL_CHANNEL {
            errors.push(format!(
                "pins.soil_channel: {} out of ADS1115 range (0-{MAX_SOIL_CHANNEL})",
                p.soil_channel
            ));
        }
    }

    fn validate_control(&self, errors: &mut Vec<String>) {
        let c = &self.control;

        if c.sample_interval_ms == 0 {
            errors.push("control.sample_interval_ms must be positive".to_string());
        }
        if c.samples == 0 {
            errors.push("control.samples must be positive".to_string());
        }
        if c.confirm_window_ms == 0 {
            errors.push("control.confirm_window_ms must be positive".to_string());
        }
        if c.max_pump_cycles == Some(0) {
            errors.push(
                "control.max_pump_cycles must be positive (omit it for no limit)".to_string(),
            );
        }
    }

    fn validate_profiles(&self, errors: &mut Vec<String>) {
        if self.profiles.is_empty() {
            return;
        }

        let mut seen: HashSet<Mode> = HashSet::new();
        for (i, entry) in self.profiles.iter().enumerate() {
            let ctx = format!("profiles[{i}] ({})", entry.mode);

            if !seen.insert(entry.mode) {
                errors.push(format!("{ctx}: duplicate profile for mode '{}'", entry.mode));
            }
            if entry.pump_run_ms == 0 {
                errors.push(format!("{ctx}: pump_run_ms must be positive"));
            }
        }

        for mode in Mode::ALL {
            if !seen.contains(&mode) {
                errors.push(format!("profiles: missing profile for mode '{mode}'"));
            }
        }

        // Wetter modes must trigger earlier (lower reading) than drier ones.
        if seen.len() == MODE_COUNT {
            let thresholds: Vec<u16> = Mode::ALL
                .iter()
                .filter_map(|m| self.profiles.iter().find(|e| e.mode == *m))
                .map(|e| e.threshold)
                .collect();
            if thresholds.windows(2).any(|w| w[0] >= w[1]) {
                errors.push(format!(
                    "profiles: thresholds must increase from wet to dry, got {thresholds:?}"
                ));
            }
        }
    }

    /// Every mode of the effective table, defaults included, must be able to
    /// trigger within the ADC range.
    fn validate_trigger_range(&self, errors: &mut Vec<String>) {
        let table = self.profile_table();
        for mode in Mode::ALL {
            let trigger = table.trigger_level(mode, self.control.hysteresis);
            if trigger > ADS1115_MAX {
                errors.push(format!(
                    "profile '{mode}': threshold ({}) + hysteresis ({}) exceeds ADC maximum {ADS1115_MAX}",
                    table.get(mode).threshold,
                    self.control.hysteresis
                ));
            }
        }
    }

    fn validate_sim(&self, errors: &mut Vec<String>) {
        let s = &self.sim;
        let adc_max = f64::from(ADS1115_MAX);

        if !(0.0..=adc_max).contains(&s.raw_wet) {
            errors.push(format!("sim.raw_wet {} out of range [0, {ADS1115_MAX}]", s.raw_wet));
        }
        if !(0.0..=adc_max).contains(&s.raw_dry) {
            errors.push(format!("sim.raw_dry {} out of range [0, {ADS1115_MAX}]", s.raw_dry));
        }
        if s.raw_dry <= s.raw_wet {
            errors.push(format!(
                "sim.raw_dry ({}) must be greater than sim.raw_wet ({})",
                s.raw_dry, s.raw_wet
            ));
        }
        if s.diurnal_period_s <= 0.0 {
            errors.push(format!(
                "sim.diurnal_period_s must be positive, got {}",
                s.diurnal_period_s
            ));
        }
    }

    /// Mode profiles with indicator pins filled in from `[pins]`.
    ///
    /// Assumes a validated config.
    pub fn profile_table(&self) -> ProfileTable {
        let pins = self.pins.indicator_pins();
        if self.profiles.is_empty() {
            return ProfileTable::with_defaults(pins);
        }

        let defaults = ProfileTable::with_defaults(pins);
        let profiles = std::array::from_fn(|i| {
            let mode = Mode::ALL[i];
            match self.profiles.iter().find(|e| e.mode == mode) {
                Some(e) => ModeProfile {
                    threshold: e.threshold,
                    pump_run_ms: e.pump_run_ms,
                    indicator_pin: pins[i],
                },
                None => *defaults.get(mode),
            }
        });
        ProfileTable::new(profiles)
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    tracing::info!(path, profiles = config.profiles.len(), "config loaded");
    Ok(config)
}

/// Load `explicit` if given (it must exist), else [`DEFAULT_CONFIG_PATH`]
/// if present, else built-in defaults.
pub fn load_or_default(explicit: Option<&str>) -> Result<Config> {
    match explicit {
        Some(path) => load(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load(DEFAULT_CONFIG_PATH),
        None => {
            tracing::info!("no config file found, using built-in defaults");
            let config = Config::default();
            config.validate().context("invalid built-in defaults")?;
            Ok(config)
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
