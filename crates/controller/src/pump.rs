//! Pump relay and mode indicators.
//!
//! The controller owns the current [`Mode`], lights that mode's indicator
//! LED and runs the pump for the mode's run-time. Every operation blocks
//! and none can fail: pin writes are fire-and-forget.

use tracing::info;

use crate::hw::{Hardware, Level};
use crate::profile::{Mode, ModeProfile, ProfileTable};

pub struct PumpController {
    mode: Mode,
    profiles: ProfileTable,
    pump_pin: u8,
    relay_active_low: bool, // many relay boards are active-low
    settle_ms: u32,
}

impl PumpController {
    /// Starts in [`Mode::Wet`].
    pub fn new(
        profiles: ProfileTable,
        pump_pin: u8,
        relay_active_low: bool,
        settle_ms: u32,
    ) -> Self {
        Self {
            mode: Mode::Wet,
            profiles,
            pump_pin,
            relay_active_low,
            settle_ms,
        }
    }

    /// Pump off, every indicator off, then the current mode's indicator on.
    pub fn init<H: Hardware>(&self, hw: &mut H) {
        self.set_pump(hw, false);
        for pin in self.profiles.indicator_pins() {
            hw.write_digital(pin, Level::Low);
        }
        hw.write_digital(self.profile().indicator_pin, Level::High);
        info!(mode = %self.mode, "pump controller ready");
    }

    /// Switch to the next mode and hold for the settle delay so the new
    /// indicator can be seen before further input is processed.
    pub fn advance_mode<H: Hardware>(&mut self, hw: &mut H) -> Mode {
        hw.write_digital(self.profile().indicator_pin, Level::Low);
        self.mode = self.mode.next();
        hw.write_digital(self.profile().indicator_pin, Level::High);

        info!(
            mode = %self.mode,
            index = self.mode.index(),
            threshold = self.profile().threshold,
            pump_run_ms = self.profile().pump_run_ms,
            "pump mode changed"
        );

        hw.sleep_ms(self.settle_ms);
        self.mode
    }

    /// Run the pump once for the current mode's run-time.
    pub fn run_pump<H: Hardware>(&self, hw: &mut H) {
        let run_ms = self.profile().pump_run_ms;
        info!(mode = %self.mode, run_ms, "*** pump START ***");

        self.set_pump(hw, true);
        hw.sleep_ms(run_ms);
        self.set_pump(hw, false);

        info!(mode = %self.mode, "*** pump STOP ***");
    }

    /// Pump off and every indicator dark. Used on shutdown.
    pub fn all_off<H: Hardware>(&self, hw: &mut H) {
        self.set_pump(hw, false);
        for pin in self.profiles.indicator_pins() {
            hw.write_digital(pin, Level::Low);
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn profile(&self) -> &ModeProfile {
        self.profiles.get(self.mode)
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    fn set_pump<H: Hardware>(&self, hw: &mut H, on: bool) {
        // active-low relay: LOW = ON, HIGH = OFF
        let level = Level::from_bool(on != self.relay_active_low);
        hw.write_digital(self.pump_pin, level);
    }
}
