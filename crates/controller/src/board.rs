//! The concrete [`Hardware`] the binary runs on.
//!
//! Digital pins: the `gpio` feature gates the real rppal driver; without
//! it, a mock bank records levels and logs state changes. Analog: the `adc`
//! feature reads an ADS1115 over I2C, otherwise the soil simulator (`sim`)
//! stands in and is told when the pump runs.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::hw::{Hardware, Level};

#[cfg(not(any(feature = "adc", feature = "sim")))]
compile_error!("enable an analog source: feature `adc` (ADS1115) or `sim` (simulator)");

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, InputPin, OutputPin};

/// Longest uninterrupted sleep; shutdown is checked between slices.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

pub(crate) struct Board {
    gpio: GpioBank,
    analog: AnalogSource,
    pump_pin: u8,
    relay_active_low: bool,
    started: Instant,
    shutdown: Arc<AtomicBool>,
}

impl Board {
    /// Claim the configured pins and the analog source. Every output starts
    /// in its off state.
    pub(crate) fn new(config: &Config, shutdown: Arc<AtomicBool>) -> Result<Self> {
        let p = &config.pins;

        // Fail-safe: pump relay and indicators off at startup
        let pump_off = Level::from_bool(p.relay_active_low);
        let outputs = [
            (p.pump, pump_off),
            (p.led_wet, Level::Low),
            (p.led_medium, Level::Low),
            (p.led_dry, Level::Low),
        ];

        let gpio = GpioBank::new(&[p.button], &outputs)?;
        let analog = AnalogSource::new(config)?;

        Ok(Self {
            gpio,
            analog,
            pump_pin: p.pump,
            relay_active_low: p.relay_active_low,
            started: Instant::now(),
            shutdown,
        })
    }
}

impl Hardware for Board {
    fn read_analog(&mut self, channel: u8) -> u16 {
        self.analog.read(channel)
    }

    fn read_digital(&mut self, pin: u8) -> Level {
        self.gpio.read(pin)
    }

    fn write_digital(&mut self, pin: u8, level: Level) {
        self.gpio.write(pin, level);
        if pin == self.pump_pin {
            self.analog.pump_changed(level.is_high() != self.relay_active_low);
        }
    }

    /// Returns early once shutdown is requested.
    fn sleep_ms(&mut self, ms: u32) {
        let deadline = Instant::now() + Duration::from_millis(u64::from(ms));
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    /// Milliseconds since the board was created, truncated to 32 bits.
    fn now_ms(&mut self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }
}

// ---------------------------------------------------------------------------
// Real GPIO bank (requires rppal and Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
struct GpioBank {
    inputs: HashMap<u8, InputPin>,
    outputs: HashMap<u8, OutputPin>,
}

#[cfg(feature = "gpio")]
impl GpioBank {
    fn new(inputs: &[u8], outputs: &[(u8, Level)]) -> Result<Self> {
        let gpio = Gpio::new()?;

        let mut input_pins = HashMap::new();
        for pin_num in inputs {
            // button pulls the line high when pressed
            let pin = gpio.get(*pin_num)?.into_input_pulldown();
            input_pins.insert(*pin_num, pin);
        }

        let mut output_pins = HashMap::new();
        for (pin_num, initial) in outputs {
            let mut pin = gpio.get(*pin_num)?.into_output();
            match initial {
                Level::High => pin.set_high(),
                Level::Low => pin.set_low(),
            }
            output_pins.insert(*pin_num, pin);
        }

        tracing::info!(
            inputs = ?inputs,
            outputs = ?outputs.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            "gpio initialised"
        );

        Ok(Self {
            inputs: input_pins,
            outputs: output_pins,
        })
    }

    fn read(&mut self, pin: u8) -> Level {
        match self.inputs.get(&pin) {
            Some(input) => Level::from_bool(input.is_high()),
            None => {
                tracing::warn!(pin, "read from unregistered input pin");
                Level::Low
            }
        }
    }

    fn write(&mut self, pin: u8, level: Level) {
        match self.outputs.get_mut(&pin) {
            Some(output) => match level {
                Level::High => output.set_high(),
                Level::Low => output.set_low(),
            },
            None => tracing::warn!(pin, "write to unregistered output pin"),
        }
    }
}

// ---------------------------------------------------------------------------
// Mock GPIO bank (no hardware, logs state changes)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
struct GpioBank {
    levels: HashMap<u8, Level>,
}

#[cfg(not(feature = "gpio"))]
impl GpioBank {
    fn new(inputs: &[u8], outputs: &[(u8, Level)]) -> Result<Self> {
        let mut levels = HashMap::new();
        for pin in inputs {
            levels.insert(*pin, Level::Low);
        }
        for (pin, initial) in outputs {
            levels.insert(*pin, *initial);
        }
        tracing::info!(
            inputs = ?inputs,
            outputs = ?outputs.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            "[mock-gpio] pins registered (no hardware)"
        );
        Ok(Self { levels })
    }

    fn read(&mut self, pin: u8) -> Level {
        self.levels.get(&pin).copied().unwrap_or(Level::Low)
    }

    fn write(&mut self, pin: u8, level: Level) {
        match self.levels.get_mut(&pin) {
            Some(current) => {
                *current = level;
                tracing::debug!(pin, ?level, "[mock-gpio] pin set");
            }
            None => tracing::warn!(pin, "[mock-gpio] write to unregistered pin"),
        }
    }
}

// ---------------------------------------------------------------------------
// Analog source: ADS1115
// ---------------------------------------------------------------------------
#[cfg(feature = "adc")]
struct AnalogSource {
    adc: crate::adc::Ads1115,
    last_good: u16,
}

#[cfg(feature = "adc")]
impl AnalogSource {
    fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            adc: crate::adc::Ads1115::new(config.pins.ads1115_addr)?,
            last_good: 0,
        })
    }

    /// A failed conversion reuses the previous reading.
    fn read(&mut self, channel: u8) -> u16 {
        match self.adc.read(channel) {
            Ok(raw) => {
                self.last_good = raw;
                raw
            }
            Err(e) => {
                tracing::error!(channel, last_good = self.last_good, "adc read failed: {e}");
                self.last_good
            }
        }
    }

    fn pump_changed(&mut self, _on: bool) {}
}

// ---------------------------------------------------------------------------
// Analog source: simulator
// ---------------------------------------------------------------------------
#[cfg(all(feature = "sim", not(feature = "adc")))]
struct AnalogSource {
    sim: crate::sim::SoilMoistureSim,
}

#[cfg(all(feature = "sim", not(feature = "adc")))]
impl AnalogSource {
    fn new(config: &Config) -> Result<Self> {
        use crate::sim::{Scenario, SoilMoistureSim};

        let s = &config.sim;
        let scenario = Scenario::from_str_lossy(&s.scenario);
        tracing::info!(
            %scenario,
            raw_dry = s.raw_dry,
            raw_wet = s.raw_wet,
            "soil simulator enabled (no probe attached)"
        );
        Ok(Self {
            sim: SoilMoistureSim::new(scenario, s.raw_dry, s.raw_wet, s.diurnal_period_s),
        })
    }

    fn read(&mut self, _channel: u8) -> u16 {
        self.sim.sample()
    }

    fn pump_changed(&mut self, on: bool) {
        if on {
            self.sim.pump_on();
        } else {
            self.sim.pump_off();
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
