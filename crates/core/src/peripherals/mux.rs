//! Per-channel output select.
//!
//! | enable | pwm-mode | output        |
//! |--------|----------|---------------|
//! |   0    |    x     | 0             |
//! |   1    |    0     | 1             |
//! |   1    |    1     | PWM waveform  |
//!
//! Pure combinational logic, evaluated bitwise over all 16 channels at once.

/// Number of output channels
pub const CHANNEL_COUNT: usize = 16;

/// Compute all 16 channel outputs (channel 0 = bit 0).
#[inline]
pub fn select(enable: u16, pwm_mode: u16, pwm_level: bool) -> u16 {
    let pwm = if pwm_level { 0xFFFF } else { 0 };
    enable & ((!pwm_mode) | pwm)
}

/// What a channel is configured to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Off,
    High,
    Pwm,
}

impl ChannelMode {
    /// Mode of `channel`. Channels past the last one read as `Off`.
    pub fn of(channel: usize, enable: u16, pwm_mode: u16) -> Self {
        if channel >= CHANNEL_COUNT {
            return ChannelMode::Off;
        }
        let bit = 1u16 << channel;
        match (enable & bit != 0, pwm_mode & bit != 0) {
            (false, _) => ChannelMode::Off,
            (true, false) => ChannelMode::High,
            (true, true) => ChannelMode::Pwm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truth_table() {
        // ch0: off/static, ch1: off/pwm, ch2: on/static, ch3: on/pwm
        let enable = 0b1100;
        let mode = 0b1010;
        assert_eq!(select(enable, mode, false), 0b0100);
        assert_eq!(select(enable, mode, true), 0b1100);
    }

    #[test]
    fn test_disabled_forces_low() {
        for &level in &[false, true] {
            assert_eq!(select(0x0000, 0xFFFF, level), 0);
            assert_eq!(select(0x0000, 0x0000, level), 0);
        }
    }

    #[test]
    fn test_bus_split() {
        let out = select(0xCCF0, 0x0000, false);
        assert_eq!(out as u8, 0xF0);
        assert_eq!((out >> 8) as u8, 0xCC);
    }

    #[test]
    fn test_channel_mode() {
        assert_eq!(ChannelMode::of(0, 0x0001, 0x0001), ChannelMode::Pwm);
        assert_eq!(ChannelMode::of(8, 0x0100, 0x0000), ChannelMode::High);
        assert_eq!(ChannelMode::of(15, 0x7FFF, 0xFFFF), ChannelMode::Off);
    }

    #[test]
    fn test_channel_mode_out_of_range() {
        assert_eq!(ChannelMode::of(16, 0xFFFF, 0x0000), ChannelMode::Off);
        assert_eq!(ChannelMode::of(16, 0xFFFF, 0xFFFF), ChannelMode::Off);
        assert_eq!(ChannelMode::of(usize::MAX, 0xFFFF, 0xFFFF), ChannelMode::Off);
    }
}
