//! Clock and bus timing configuration.
//!
//! The peripheral runs from a single system clock. The PWM modulus is fixed at
//! construction time from the clock rate and the target PWM frequency; the
//! default 10 MHz / 3 kHz pair gives `M = 3333` (a 333.3 µs period).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default system clock: 10 MHz (100 ns period)
pub const DEFAULT_CLOCK_HZ: u32 = 10_000_000;
/// Default PWM output frequency
pub const DEFAULT_PWM_HZ: u32 = 3_000;

/// Peripheral clocking parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// System clock frequency in Hz
    pub clock_hz: u32,
    /// Target PWM waveform frequency in Hz
    pub pwm_hz: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config { clock_hz: DEFAULT_CLOCK_HZ, pwm_hz: DEFAULT_PWM_HZ }
    }
}

impl Config {
    /// PWM counter modulus `M = round(clock_hz / pwm_hz)`.
    pub fn pwm_modulus(&self) -> u32 {
        u32::try_from(self.modulus_wide()).unwrap_or(u32::MAX)
    }

    fn modulus_wide(&self) -> u64 {
        if self.pwm_hz == 0 {
            return 0;
        }
        (self.clock_hz as u64 + self.pwm_hz as u64 / 2) / self.pwm_hz as u64
    }

    /// Reject clock pairs that cannot produce a usable counter.
    pub fn validate(&self) -> Result<()> {
        if self.clock_hz == 0 || self.pwm_hz == 0 {
            return Err(Error::InvalidConfig {
                reason: format!("clock_hz={} pwm_hz={} must be non-zero", self.clock_hz, self.pwm_hz),
            });
        }
        let m = self.modulus_wide();
        if m < 2 || m > u16::MAX as u64 {
            return Err(Error::InvalidConfig {
                reason: format!("PWM modulus {} out of range 2..={}", m, u16::MAX),
            });
        }
        Ok(())
    }

    /// Number of system clock ticks in `us` microseconds.
    pub fn cycles_for_us(&self, us: u64) -> u64 {
        us * self.clock_hz as u64 / 1_000_000
    }
}

/// Host-side SPI bit-bang timing, in system clock cycles.
///
/// Defaults give a 10 µs SCLK period at 10 MHz and
/// 600 idle cycles after each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusTiming {
    /// Cycles SCLK stays low, then high, per bit
    pub half_period: u32,
    /// Cycles between nCS falling and the first bit
    pub setup: u32,
    /// Cycles of idle bus after nCS rises
    pub trailing_idle: u32,
}

impl Default for BusTiming {
    fn default() -> Self {
        BusTiming { half_period: 50, setup: 1, trailing_idle: 600 }
    }
}
