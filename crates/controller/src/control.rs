//! The irrigation control loop: button polling, interval sampling and the
//! pump/soak/re-sample sequence.
//!
//! Everything runs on one thread and every delay blocks, so a pump run or
//! soak pause also stalls button handling. That is the intended timing
//! model for this controller.
//!
//! ## State machine
//!
//! ```text
//!            ┌──────── moisture < threshold + hysteresis ◀───────┐
//!            ▼                                                   │
//! IdlePoll ──[tick && moisture >= threshold + hysteresis]──▶ Irrigating
//!   ▲  │                                                     pump, soak,
//!   │  └─ button / clock checks every iteration              re-sample
//!   └──────────────[cycle cap reached | shutdown]────────────────┘
//! ```
//!
//! With no cycle cap (the default) a sensor that never reads wet keeps the
//! pump cycling forever. Set `control.max_pump_cycles` on installations
//! where that is not acceptable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::button::{ButtonAction, ButtonDebouncer};
use crate::config::Config;
use crate::hw::Hardware;
use crate::pump::PumpController;
use crate::sensor::SensorReader;

// ---------------------------------------------------------------------------
// Sample clock
// ---------------------------------------------------------------------------

/// Interval timer over a wrapping millisecond clock.
#[derive(Debug, Clone)]
pub struct SampleClock {
    last_sample_ms: u32,
    interval_ms: u32,
}

impl SampleClock {
    /// The first tick fires one interval after clock zero.
    pub fn new(interval_ms: u32) -> Self {
        Self {
            last_sample_ms: 0,
            interval_ms,
        }
    }

    /// `true` once per elapsed interval. A clock reading behind the stored
    /// baseline (counter wrapped) resets the baseline to `now_ms`.
    pub fn poll(&mut self, now_ms: u32) -> bool {
        if now_ms < self.last_sample_ms {
            self.last_sample_ms = now_ms;
        }
        if now_ms - self.last_sample_ms >= self.interval_ms {
            self.last_sample_ms = now_ms;
            return true;
        }
        false
    }

    #[cfg(test)]
    pub fn last_sample_ms(&self) -> u32 {
        self.last_sample_ms
    }
}

// ---------------------------------------------------------------------------
// Control loop
// ---------------------------------------------------------------------------

/// How an irrigation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrrigationOutcome {
    /// Re-sampled moisture fell below the trigger level.
    Satisfied { cycles: u32 },
    /// `max_pump_cycles` pump runs without reaching the exit condition.
    CutOff { cycles: u32 },
    /// Shutdown was requested between cycles.
    Interrupted { cycles: u32 },
}

impl IrrigationOutcome {
    /// Pump runs made before the outcome.
    pub fn cycles(self) -> u32 {
        match self {
            Self::Satisfied { cycles } | Self::CutOff { cycles } | Self::Interrupted { cycles } => {
                cycles
            }
        }
    }
}

pub struct ControlLoop<H: Hardware> {
    hw: H,
    pump: PumpController,
    button: ButtonDebouncer,
    sensor: SensorReader,
    clock: SampleClock,
    button_pin: u8,
    hysteresis: u16,
    soak_ms: u32,
    poll_ms: u32,
    max_pump_cycles: Option<u32>,
    shutdown: Arc<AtomicBool>,
}

impl<H: Hardware> ControlLoop<H> {
    /// Build the loop from a validated config.
    pub fn new(hw: H, config: &Config, shutdown: Arc<AtomicBool>) -> Self {
        let pins = &config.pins;
        let ctl = &config.control;

        Self {
            hw,
            pump: PumpController::new(
                config.profile_table(),
                pins.pump,
                pins.relay_active_low,
                ctl.settle_ms,
            ),
            button: ButtonDebouncer::new(
                ctl.button_policy,
                ctl.confirm_window_ms,
                ctl.debounce_ms,
            ),
            sensor: SensorReader::new(pins.soil_channel, ctl.samples, ctl.sample_gap_ms),
            clock: SampleClock::new(ctl.sample_interval_ms),
            button_pin: pins.button,
            hysteresis: ctl.hysteresis,
            soak_ms: ctl.soak_ms,
            poll_ms: ctl.poll_ms,
            max_pump_cycles: ctl.max_pump_cycles,
            shutdown,
        }
    }

    /// Run until shutdown is requested, then switch every output off.
    pub fn run(&mut self) {
        self.pump.init(&mut self.hw);
        info!(
            mode = %self.pump.mode(),
            policy = ?self.button.policy(),
            max_pump_cycles = ?self.max_pump_cycles,
            "control loop started"
        );

        let mut irrigation_runs: u32 = 0;
        let mut pump_cycles: u64 = 0;
        while !self.shutdown_requested() {
            if let Some(outcome) = self.step() {
                irrigation_runs += 1;
                pump_cycles += u64::from(outcome.cycles());
            }
            if self.poll_ms > 0 {
                self.hw.sleep_ms(self.poll_ms);
            }
        }

        self.pump.all_off(&mut self.hw);
        info!(irrigation_runs, pump_cycles, "control loop stopped, outputs off");
    }

    /// One idle iteration: button, clock guard, and on an interval tick a
    /// sample plus the irrigation decision.
    pub fn step(&mut self) -> Option<IrrigationOutcome> {
        let level = self.hw.read_digital(self.button_pin);
        let now = self.hw.now_ms();
        match self.button.poll(level, now) {
            Some(ButtonAction::Armed) => {
                debug!(now_ms = now, "mode button armed");
            }
            Some(ButtonAction::Advance) => {
                self.pump.advance_mode(&mut self.hw);
            }
            None => {}
        }

        let now = self.hw.now_ms();
        if !self.clock.poll(now) {
            return None;
        }

        let moisture = self.sensor.read_averaged(&mut self.hw);
        let mode = self.pump.mode();
        let threshold = self.pump.profile().threshold;
        info!(mode = %mode, moisture, threshold, "soil sample");

        if self.pump.profiles().needs_water(mode, moisture, self.hysteresis) {
            Some(self.irrigate())
        } else {
            None
        }
    }

    /// Pump, soak and re-sample until the soil reads wet enough, the cycle
    /// cap is hit, or shutdown is requested.
    pub fn irrigate(&mut self) -> IrrigationOutcome {
        let mode = self.pump.mode();
        let trigger = self.pump.profiles().trigger_level(mode, self.hysteresis);
        info!(mode = %mode, trigger, "irrigation started");

        let mut cycles: u32 = 0;
        loop {
            if self.shutdown_requested() {
                info!(cycles, "irrigation interrupted by shutdown");
                return IrrigationOutcome::Interrupted { cycles };
            }

            self.pump.run_pump(&mut self.hw);
            cycles += 1;

            self.hw.sleep_ms(self.soak_ms);

            let moisture = self.sensor.read_averaged(&mut self.hw);
            debug!(cycles, moisture, trigger, "re-sample after soak");

            if !self.pump.profiles().needs_water(mode, moisture, self.hysteresis) {
                info!(cycles, moisture, "irrigation finished, soil wet enough");
                return IrrigationOutcome::Satisfied { cycles };
            }

            if let Some(max) = self.max_pump_cycles {
                if cycles >= max {
                    warn!(
                        cycles,
                        moisture,
                        trigger,
                        "irrigation cut off: soil still dry after max pump cycles"
                    );
                    return IrrigationOutcome::CutOff { cycles };
                }
            }
        }
    }

    #[cfg(test)]
    fn pump(&self) -> &PumpController {
        &self.pump
    }

    #[cfg(test)]
    fn hardware(&self) -> &H {
        &self.hw
    }

    #[cfg(test)]
    fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::button::ButtonPolicy;
    use crate::hw::fake::FakeBoard;
    use crate::hw::Level;
    use crate::profile::Mode;

    const PUMP: u8 = 17;
    const SAMPLES: usize = 10;

    fn test_config() -> Config {
        Config::default()
    }

    fn control_with(config: &Config) -> ControlLoop<FakeBoard> {
        ControlLoop::new(FakeBoard::new(), config, Arc::new(AtomicBool::new(false)))
    }

    fn control() -> ControlLoop<FakeBoard> {
        control_with(&test_config())
    }

    fn pump_runs(ctl: &ControlLoop<FakeBoard>) -> usize {
        ctl.hardware().count_writes(PUMP, Level::High)
    }

    /// Hold the button through `held_ms` worth of 10 ms polls, then release.
    fn hold_button(ctl: &mut ControlLoop<FakeBoard>, held_ms: u32) {
        for _ in 0..=held_ms / 10 {
            ctl.hardware_mut().press();
            ctl.step();
            let hw = ctl.hardware_mut();
            hw.now = hw.now.wrapping_add(10);
        }
        ctl.step();
    }

    // -- Sample clock -------------------------------------------------------

    #[test]
    fn clock_fires_after_interval() {
        let mut clock = SampleClock::new(30_000);
        assert!(!clock.poll(0));
        assert!(!clock.poll(29_999));
        assert!(clock.poll(30_000));
        assert_eq!(clock.last_sample_ms(), 30_000);
        assert!(!clock.poll(59_999));
        assert!(clock.poll(60_000));
    }

    #[test]
    fn clock_wrap_resets_baseline() {
        let mut clock = SampleClock::new(30_000);
        assert!(clock.poll(u32::MAX - 10));

        // counter wrapped: baseline jumps to now, no spurious tick
        assert!(!clock.poll(10));
        assert_eq!(clock.last_sample_ms(), 10);
        assert!(!clock.poll(30_009));
        assert!(clock.poll(30_010));
    }

    #[test]
    fn clock_late_poll_fires_once() {
        let mut clock = SampleClock::new(30_000);
        assert!(clock.poll(95_000));
        assert!(!clock.poll(95_001));
    }

    // -- Idle polling -------------------------------------------------------

    #[test]
    fn no_sample_before_interval() {
        let mut ctl = control();
        ctl.hardware_mut().now = 29_999;
        assert_eq!(ctl.step(), None);
        assert_eq!(ctl.hardware().analog_reads, 0);
    }

    #[test]
    fn sample_below_trigger_stays_idle() {
        let mut ctl = control();
        ctl.hardware_mut().now = 30_000;
        ctl.hardware_mut().push_reading(449, SAMPLES);

        assert_eq!(ctl.step(), None);
        assert_eq!(ctl.hardware().analog_reads, SAMPLES);
        assert_eq!(pump_runs(&ctl), 0);
    }

    #[test]
    fn sample_at_trigger_starts_irrigation() {
        let mut ctl = control();
        ctl.hardware_mut().now = 30_000;
        ctl.hardware_mut().push_reading(450, SAMPLES);
        ctl.hardware_mut().push_reading(300, SAMPLES);

        assert_eq!(ctl.step(), Some(IrrigationOutcome::Satisfied { cycles: 1 }));
        assert_eq!(pump_runs(&ctl), 1);
    }

    #[test]
    fn trigger_uses_current_mode_threshold() {
        let mut ctl = control();
        // two presses: arm, then advance to medium (threshold 520)
        hold_button(&mut ctl, 50);
        hold_button(&mut ctl, 50);
        assert_eq!(ctl.pump().mode(), Mode::Medium);

        ctl.hardware_mut().now = 60_000;
        ctl.hardware_mut().push_reading(530, SAMPLES);
        assert_eq!(ctl.step(), None);

        ctl.hardware_mut().now = 90_000;
        ctl.hardware_mut().push_reading(540, SAMPLES);
        ctl.hardware_mut().push_reading(100, SAMPLES);
        assert_eq!(ctl.step(), Some(IrrigationOutcome::Satisfied { cycles: 1 }));
    }

    // -- Irrigating ---------------------------------------------------------

    #[test]
    fn irrigation_continues_at_trigger_and_exits_below() {
        let mut ctl = control();
        ctl.hardware_mut().now = 30_000;
        ctl.hardware_mut().push_reading(450, SAMPLES); // trigger
        ctl.hardware_mut().push_reading(450, SAMPLES); // still dry
        ctl.hardware_mut().push_reading(449, SAMPLES); // wet enough

        assert_eq!(ctl.step(), Some(IrrigationOutcome::Satisfied { cycles: 2 }));
        assert_eq!(pump_runs(&ctl), 2);
        assert_eq!(ctl.hardware().level(PUMP), Level::Low);
    }

    #[test]
    fn irrigation_cycle_timing() {
        let mut ctl = control();
        ctl.hardware_mut().now = 30_000;
        ctl.hardware_mut().push_reading(500, SAMPLES);
        ctl.hardware_mut().push_reading(200, SAMPLES);
        ctl.step();

        // sample burst, 3000 ms pump (wet mode), 15000 ms soak, re-sample burst
        let sleeps = &ctl.hardware().sleeps;
        assert_eq!(sleeps.len(), SAMPLES + 2 + SAMPLES);
        assert_eq!(sleeps[SAMPLES], 3_000);
        assert_eq!(sleeps[SAMPLES + 1], 15_000);
        assert_eq!(ctl.hardware().now, 30_000 + 50 + 3_000 + 15_000 + 50);
    }

    #[test]
    fn cycle_cap_cuts_off_dry_sensor() {
        let mut cfg = test_config();
        cfg.control.max_pump_cycles = Some(3);
        let mut ctl = control_with(&cfg);
        ctl.hardware_mut().now = 30_000;
        ctl.hardware_mut().analog_fallback = 1000; // stuck dry

        assert_eq!(ctl.step(), Some(IrrigationOutcome::CutOff { cycles: 3 }));
        assert_eq!(pump_runs(&ctl), 3);
        assert_eq!(ctl.hardware().level(PUMP), Level::Low);
    }

    #[test]
    fn cycle_cap_not_hit_when_soil_recovers() {
        let mut cfg = test_config();
        cfg.control.max_pump_cycles = Some(3);
        let mut ctl = control_with(&cfg);
        ctl.hardware_mut().now = 30_000;
        ctl.hardware_mut().push_reading(600, SAMPLES);
        ctl.hardware_mut().push_reading(600, SAMPLES);
        ctl.hardware_mut().push_reading(600, SAMPLES);
        ctl.hardware_mut().push_reading(400, SAMPLES);

        assert_eq!(ctl.step(), Some(IrrigationOutcome::Satisfied { cycles: 3 }));
    }

    #[test]
    fn shutdown_interrupts_before_pumping() {
        let mut ctl = control();
        ctl.shutdown.store(true, Ordering::SeqCst);
        assert_eq!(ctl.irrigate(), IrrigationOutcome::Interrupted { cycles: 0 });
        assert_eq!(pump_runs(&ctl), 0);
    }

    // -- Clock wrap ---------------------------------------------------------

    #[test]
    fn wrapped_clock_defers_next_sample_by_one_interval() {
        let mut ctl = control();
        ctl.hardware_mut().now = 40_000;
        ctl.hardware_mut().push_reading(100, SAMPLES);
        ctl.step(); // sample at 40_000, clock now ~40_050

        ctl.hardware_mut().now = 5;
        assert_eq!(ctl.step(), None);
        assert_eq!(ctl.hardware().analog_reads, SAMPLES);

        ctl.hardware_mut().now = 30_004;
        ctl.step();
        assert_eq!(ctl.hardware().analog_reads, SAMPLES);

        ctl.hardware_mut().now = 30_005;
        ctl.hardware_mut().push_reading(100, SAMPLES);
        ctl.step();
        assert_eq!(ctl.hardware().analog_reads, 2 * SAMPLES);
    }

    // -- Button -------------------------------------------------------------

    #[test]
    fn two_presses_within_window_advance_once() {
        let mut ctl = control();
        ctl.hardware_mut().now = 1_000;
        hold_button(&mut ctl, 50);
        assert_eq!(ctl.pump().mode(), Mode::Wet);

        ctl.hardware_mut().now = 1_200;
        hold_button(&mut ctl, 50);
        assert_eq!(ctl.pump().mode(), Mode::Medium);
        // settle delay after the mode change
        assert_eq!(ctl.hardware().sleeps, vec![1_000]);
    }

    #[test]
    fn single_press_only_arms() {
        let mut ctl = control();
        ctl.hardware_mut().now = 1_000;
        hold_button(&mut ctl, 50);

        ctl.hardware_mut().now = 10_000;
        ctl.step();
        assert_eq!(ctl.pump().mode(), Mode::Wet);
        assert!(ctl.hardware().sleeps.is_empty());
    }

    #[test]
    fn held_button_only_arms() {
        let mut ctl = control();
        hold_button(&mut ctl, 3_000);
        assert_eq!(ctl.pump().mode(), Mode::Wet);
        assert!(ctl.hardware().sleeps.is_empty());
    }

    #[test]
    fn held_button_advances_once_under_direct() {
        let mut cfg = test_config();
        cfg.control.button_policy = ButtonPolicy::Direct;
        let mut ctl = control_with(&cfg);
        hold_button(&mut ctl, 3_000);
        assert_eq!(ctl.pump().mode(), Mode::Medium);
        assert_eq!(ctl.hardware().sleeps, vec![1_000]);
    }

    #[test]
    fn bounce_shorter_than_debounce_is_ignored() {
        let mut cfg = test_config();
        cfg.control.button_policy = ButtonPolicy::Direct;
        let mut ctl = control_with(&cfg);
        for level in [Level::High, Level::Low, Level::High, Level::Low] {
            ctl.hardware_mut().digital_inputs.push_back(level);
            ctl.step();
            let hw = ctl.hardware_mut();
            hw.now += 5;
        }
        assert_eq!(ctl.pump().mode(), Mode::Wet);
    }

    #[test]
    fn direct_policy_advances_on_every_press() {
        let mut cfg = test_config();
        cfg.control.button_policy = ButtonPolicy::Direct;
        let mut ctl = control_with(&cfg);

        hold_button(&mut ctl, 50);
        assert_eq!(ctl.pump().mode(), Mode::Medium);
        hold_button(&mut ctl, 50);
        assert_eq!(ctl.pump().mode(), Mode::Dry);
        hold_button(&mut ctl, 50);
        assert_eq!(ctl.pump().mode(), Mode::Wet);
    }

    #[test]
    fn released_button_does_nothing() {
        let mut cfg = test_config();
        cfg.control.button_policy = ButtonPolicy::Direct;
        let mut ctl = control_with(&cfg);
        ctl.hardware_mut().digital_inputs.push_back(Level::Low);
        ctl.step();
        assert_eq!(ctl.pump().mode(), Mode::Wet);
    }

    // -- Run ----------------------------------------------------------------

    #[test]
    fn run_returns_immediately_when_shut_down_and_leaves_outputs_off() {
        let shutdown = Arc::new(AtomicBool::new(true));
        let mut ctl = ControlLoop::new(FakeBoard::new(), &test_config(), Arc::clone(&shutdown));
        ctl.run();

        let hw = ctl.hardware();
        assert_eq!(hw.level(PUMP), Level::Low);
        assert!([22, 23, 24].iter().all(|p| hw.level(*p) == Level::Low));
        // init lit the wet indicator before all_off darkened it
        assert_eq!(hw.count_writes(22, Level::High), 1);
    }

    #[test]
    fn run_polls_and_irrigates_until_shutdown() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut hw = FakeBoard::new();
        hw.push_reading(500, SAMPLES); // first sample at 30_000 is dry
        hw.push_reading(300, SAMPLES); // wet after one pump run
        hw.analog_fallback = 300;
        hw.shutdown_at = Some((60_000, Arc::clone(&shutdown)));
        let mut ctl = ControlLoop::new(hw, &test_config(), Arc::clone(&shutdown));

        ctl.run();

        let hw = ctl.hardware();
        assert!(shutdown.load(Ordering::SeqCst));
        assert_eq!(pump_runs(&ctl), 1);
        assert_eq!(hw.level(PUMP), Level::Low);
        assert!([22, 23, 24].iter().all(|p| hw.level(*p) == Level::Low));
        // stopped on the first poll delay ending at or past the deadline
        assert!((60_000..60_010).contains(&hw.now), "now = {}", hw.now);
        assert!(hw.sleeps.iter().filter(|ms| **ms == 10).count() > 1_000);
    }
}
