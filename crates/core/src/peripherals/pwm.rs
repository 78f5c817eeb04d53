//! Shared PWM waveform generator.
//!
//! Counter/compare scheme: a free-running counter counts `0..M` once per
//! system clock and the output is high while `counter < threshold`, with
//! `threshold = round(DUTY * M / 255)`. The threshold is latched when the
//! counter wraps to 0, so a DUTY change never splices into a running period.
//!
//! With the default 10 MHz clock, `M = 3333`:
//! f_pwm = 10 MHz / 3333 ≈ 3000.3 Hz

/// Compare threshold for an 8-bit duty value: `round(duty * modulus / 255)`.
pub fn duty_threshold(duty: u8, modulus: u32) -> u32 {
    (duty as u32 * modulus + 127) / 255
}

pub struct PwmGenerator {
    modulus: u32,
    counter: u32,
    /// Threshold in effect for the running period
    threshold: u32,
    /// Duty latched at the start of the running period
    active_duty: u8,
    // Debug counters
    pub dbg_periods: u64,
}

impl PwmGenerator {
    pub fn new(modulus: u32) -> Self {
        PwmGenerator {
            modulus: modulus.max(1),
            counter: 0,
            threshold: 0,
            active_duty: 0,
            dbg_periods: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = PwmGenerator::new(self.modulus);
    }

    /// Advance one system clock. `duty` is the current DUTY register.
    pub fn tick(&mut self, duty: u8) {
        self.counter += 1;
        if self.counter >= self.modulus {
            self.counter = 0;
            self.dbg_periods += 1;
        }
        if self.counter == 0 {
            self.latch(duty);
        }
    }

    fn latch(&mut self, duty: u8) {
        self.active_duty = duty;
        self.threshold = duty_threshold(duty, self.modulus);
    }

    /// Current waveform level.
    pub fn level(&self) -> bool {
        self.counter < self.threshold
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn modulus(&self) -> u32 {
        self.modulus
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Duty value in effect for the running period.
    pub fn active_duty(&self) -> u8 {
        self.active_duty
    }

    /// Waveform frequency for a given system clock.
    pub fn frequency_hz(&self, clock_hz: u32) -> f64 {
        clock_hz as f64 / self.modulus as f64
    }

    /// Exact duty (percent) of the running period.
    pub fn duty_percent(&self) -> f64 {
        self.threshold as f64 * 100.0 / self.modulus as f64
    }

    pub fn dbg_info(&self) -> String {
        format!("cnt={}/{} thr={} duty=0x{:02X} periods={}",
            self.counter, self.modulus, self.threshold, self.active_duty, self.dbg_periods)
    }

    /// Capture state for save state.
    pub fn save_state(&self) -> crate::savestate::PwmState {
        crate::savestate::PwmState {
            counter: self.counter, active_duty: self.active_duty,
        }
    }

    /// Restore state from save state. The threshold is recomputed for this
    /// generator's modulus.
    pub fn load_state(&mut self, s: &crate::savestate::PwmState) {
        self.counter = s.counter % self.modulus;
        self.latch(s.active_duty);
    }
}
