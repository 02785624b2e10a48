//! Hardware capability surface consumed by the control loop.
//!
//! Everything the controller does to the outside world goes through
//! [`Hardware`]: raw ADC samples, digital pin reads and writes, blocking
//! delays and the monotonic millisecond clock. The production adapter lives
//! in `board.rs`; tests use [`fake::FakeBoard`].

/// Logical level of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    High,
    Low,
}

impl Level {
    /// `High` when `on`, `Low` otherwise.
    pub fn from_bool(on: bool) -> Self {
        if on {
            Level::High
        } else {
            Level::Low
        }
    }

    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

/// Blocking I/O primitives of a single-board controller.
///
/// All calls are treated as infallible. Implementations deal with bus
/// errors internally (log and fall back) rather than surfacing them.
pub trait Hardware {
    /// One raw ADC sample from analog `channel`.
    fn read_analog(&mut self, channel: u8) -> u16;

    /// Current level of digital input `pin`.
    fn read_digital(&mut self, pin: u8) -> Level;

    /// Drive digital output `pin` to `level`.
    fn write_digital(&mut self, pin: u8, level: Level);

    /// Block the calling thread for `ms` milliseconds.
    fn sleep_ms(&mut self, ms: u32);

    /// Monotonic millisecond clock. Wraps at `u32::MAX`.
    fn now_ms(&mut self) -> u32;
}

// ===========================================================================
// Test double
// ===========================================================================
