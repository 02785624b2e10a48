//! Stateful soil moisture sensor simulator for running the controller
//! without a probe attached.
//!
//! Models realistic capacitive sensor behaviour:
//! - Temporal coherence via random walk with mean reversion
//! - Gradual drying drift (evaporation)
//! - Per-reading ADC electronic noise
//! - Occasional spikes (sensor flakiness)
//! - Diurnal (day/night) cycle
//! - A fixed calibration offset for the simulated probe
//! - Closed-loop watering response: time the pump spends on lowers the
//!   reading once it switches off
//!
//! All magnitudes scale with the calibration range (`raw_dry - raw_wet`),
//! so the same scenarios work for 10-bit style thresholds and full-scale
//! ADS1115 values.

use std::fmt;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

/// Sample from N(mean, sigma).
fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles selectable via `sim.scenario`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Starts mid-range, drifts toward dry. Moderate noise, ~3% spikes.
    Drying,
    /// Hovers near the centre. Low noise, rare spikes.
    Stable,
    /// High noise, ~10% spike rate, larger spikes. Exercises the averaging.
    Flaky,
    /// Starts near the wet end and dries very slowly.
    Wet,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "stable" => Self::Stable,
            "flaky" => Self::Flaky,
            "wet" => Self::Wet,
            _ => Self::Drying, // default
        }
    }

    /// Fractions of the calibration range:
    /// (drift, walk sigma, mean reversion, noise sigma, spike prob,
    /// spike sigma, start position).
    fn params(self) -> (f64, f64, f64, f64, f32, f64, f64) {
        match self {
            // start: 0.0 = at raw_wet (wettest), 1.0 = at raw_dry (driest)
            Self::Drying => (0.0011, 0.011, 0.02, 0.0057, 0.03, 0.14, 0.5),
            Self::Stable => (0.00015, 0.0043, 0.05, 0.0029, 0.005, 0.07, 0.5),
            Self::Flaky => (0.0007, 0.018, 0.02, 0.014, 0.10, 0.21, 0.5),
            Self::Wet => (0.0002, 0.0057, 0.02, 0.0043, 0.02, 0.11, 0.2),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drying => write!(f, "drying"),
            Self::Stable => write!(f, "stable"),
            Self::Flaky => write!(f, "flaky"),
            Self::Wet => write!(f, "wet"),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Produces raw readings where higher means drier.
pub struct SoilMoistureSim {
    /// Current "true" soil moisture in ADC units. Evolves each sample.
    base: f64,
    /// Permanent calibration offset of this probe (ADC units).
    offset: f64,
    noise_sigma: f64,

    raw_dry: f64,
    raw_wet: f64,

    // Random walk parameters
    drift_per_sample: f64,
    walk_sigma: f64,
    mean_reversion: f64,
    center: f64,

    // Spike parameters
    spike_prob: f32,
    spike_sigma: f64,

    // Diurnal cycle
    diurnal_amplitude: f64,
    diurnal_period_s: f64,

    // Watering response
    pump_since: Option<Instant>,
    wet_per_pump_sec: f64,
}

impl SoilMoistureSim {
    /// `diurnal_period_s` controls the day/night cycle length. Use 600
    /// (10 min) for fast dev iteration or 86400 for real-time.
    pub fn new(scenario: Scenario, raw_dry: f64, raw_wet: f64, diurnal_period_s: f64) -> Self {
        let range = raw_dry - raw_wet;
        let center = (raw_dry + raw_wet) / 2.0;
        let (drift, walk, mean_rev, noise, spike_prob, spike, start_frac) = scenario.params();

        let start_base = raw_wet + start_frac * range;
        let jitter = gaussian(0.0, range * 0.03);

        Self {
            base: (start_base + jitter).clamp(raw_wet, raw_dry),
            offset: gaussian(0.0, range * 0.02),
            noise_sigma: range * noise * (1.0 + 0.2 * approx_std_normal()).max(0.3),
            raw_dry,
            raw_wet,
            drift_per_sample: range * drift,
            walk_sigma: range * walk,
            mean_reversion: mean_rev,
            center,
            spike_prob,
            spike_sigma: range * spike,
            diurnal_amplitude: range * 0.06,
            diurnal_period_s,
            pump_since: None,
            // 3 s of pumping moves the soil ~15% of the range toward wet
            wet_per_pump_sec: -range * 0.05,
        }
    }

    /// The pump output switched on.
    pub fn pump_on(&mut self) {
        if self.pump_since.is_none() {
            self.pump_since = Some(Instant::now());
        }
    }

    /// The pump output switched off: soak in the water delivered since
    /// [`pump_on`](Self::pump_on).
    pub fn pump_off(&mut self) {
        if let Some(since) = self.pump_since.take() {
            self.apply_watering(since.elapsed().as_secs_f64());
        }
    }

    /// Move the soil toward wet by `pump_secs` worth of pumping.
    pub fn apply_watering(&mut self, pump_secs: f64) {
        let margin = (self.raw_dry - self.raw_wet) * 0.036;
        self.base = (self.base + self.wet_per_pump_sec * pump_secs)
            .clamp(self.raw_wet - margin, self.raw_dry + margin);
    }

    /// Produce the next raw reading. The internal state evolves with each
    /// call, so call frequency matters.
    pub fn sample(&mut self) -> u16 {
        let range = self.raw_dry - self.raw_wet;

        // -- Evolve the base value ----------------------------------------

        // Mean reversion: pull toward centre
        let pull = self.mean_reversion * (self.center - self.base);
        let walk = gaussian(0.0, self.walk_sigma);

        // Drying drift (positive = toward raw_dry = drier)
        self.base = (self.base + self.drift_per_sample + pull + walk)
            .clamp(self.raw_wet - range * 0.036, self.raw_dry + range * 0.036);

        // -- Build the instantaneous reading ------------------------------

        // Diurnal offset: sinusoidal, peaks at "afternoon" (period/2).
        let now_s = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        let phase = 2.0 * std::f64::consts::PI * now_s / self.diurnal_period_s;
        let diurnal = self.diurnal_amplitude * phase.sin();

        let noise = gaussian(0.0, self.noise_sigma);

        let spike = if fastrand::f32() < self.spike_prob {
            gaussian(0.0, self.spike_sigma)
        } else {
            0.0
        };

        let reading = self.base + self.offset + diurnal + noise + spike;

        // Clamp to physically possible ADC range (ADS1115: 0..32767).
        reading.round().clamp(0.0, 32767.0) as u16
    }
}

// ===========================================================================
// Tests
// ===========================================================================
