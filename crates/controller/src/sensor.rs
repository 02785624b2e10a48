//! Averaged soil-moisture reads.

use crate::hw::Hardware;

/// Takes `samples` raw ADC readings, `gap_ms` apart, and averages them.
///
/// Averaging is the only noise mitigation; out-of-range values pass
/// through untouched.
#[derive(Debug, Clone)]
pub struct SensorReader {
    channel: u8,
    samples: u16,
    gap_ms: u32,
}

impl SensorReader {
    pub fn new(channel: u8, samples: u16, gap_ms: u32) -> Self {
        Self {
            channel,
            // a zero sample count would divide by zero
            samples: samples.max(1),
            gap_ms,
        }
    }

    /// Truncated arithmetic mean of one burst of samples. Blocks for
    /// roughly `samples * gap_ms`.
    pub fn read_averaged<H: Hardware>(&self, hw: &mut H) -> u16 {
        let mut sum: u32 = 0;
        for _ in 0..self.samples {
            sum += u32::from(hw.read_analog(self.channel));
            hw.sleep_ms(self.gap_ms);
        }
        (sum / u32::from(self.samples)) as u16
    }
}
