//! PWM frequency and duty measurement on one output channel.
//!
//! Works like a bench counter: sync to a rising edge, then time `periods`
//! high/low cycles in system clock ticks. A channel that never leaves its
//! level within the timeout reports 0 Hz and 0 % or 100 %.

use crate::peripherals::SpiPins;
use crate::Peripheral;

/// Give up waiting for an edge after this much simulated time.
const TIMEOUT_US: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PwmMeasurement {
    pub freq_hz: f64,
    pub duty_percent: f64,
}

impl PwmMeasurement {
    /// Channel stuck at `level` for the whole timeout.
    fn stuck(level: bool) -> Self {
        PwmMeasurement { freq_hz: 0.0, duty_percent: if level { 100.0 } else { 0.0 } }
    }
}

/// Measure `channel` over `periods` full PWM periods with the SPI bus idle.
pub fn measure_pwm(p: &mut Peripheral, channel: usize, periods: u32) -> PwmMeasurement {
    let periods = periods.max(1);
    let timeout = p.config.cycles_for_us(TIMEOUT_US);

    let start = p.tick;
    // Let a high phase in progress finish so timing starts on a real edge.
    if !wait_while(p, channel, true, start, timeout) {
        return PwmMeasurement::stuck(true);
    }
    if !wait_while(p, channel, false, start, timeout) {
        return PwmMeasurement::stuck(false);
    }

    let mut t0 = p.tick;
    let mut total_high = 0u64;
    let mut total_period = 0u64;
    for _ in 0..periods {
        if !wait_while(p, channel, true, t0, timeout) {
            return PwmMeasurement::stuck(true);
        }
        let t_fall = p.tick;
        if !wait_while(p, channel, false, t0, timeout) {
            return PwmMeasurement::stuck(false);
        }
        let t_rise = p.tick;
        total_high += t_fall - t0;
        total_period += t_rise - t0;
        t0 = t_rise;
    }

    let avg_period = total_period as f64 / periods as f64;
    PwmMeasurement {
        freq_hz: p.config.clock_hz as f64 / avg_period,
        duty_percent: total_high as f64 * 100.0 / total_period as f64,
    }
}

/// Clock until `channel` leaves `level`. False on timeout.
fn wait_while(p: &mut Peripheral, channel: usize, level: bool, since: u64, timeout: u64) -> bool {
    while p.channel(channel) == level {
        p.tick(SpiPins::IDLE);
        if p.tick - since > timeout {
            return false;
        }
    }
    true
}
