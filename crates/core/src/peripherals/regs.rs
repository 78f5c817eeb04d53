//! Write-only register file.
//!
//! ```text
//! 0x00  ENABLE_A    output enable, channels 0-7
//! 0x01  ENABLE_B    output enable, channels 8-15
//! 0x02  PWM_MODE_A  PWM select, channels 0-7
//! 0x03  PWM_MODE_B  PWM select, channels 8-15
//! 0x04  DUTY        shared duty cycle (0 = 0 %, 255 = 100 %)
//! 0x05-0x7F         reserved, writes dropped
//! ```

use tracing::debug;

use super::spi::Frame;

pub const ENABLE_A: u8 = 0x00;
pub const ENABLE_B: u8 = 0x01;
pub const PWM_MODE_A: u8 = 0x02;
pub const PWM_MODE_B: u8 = 0x03;
pub const DUTY: u8 = 0x04;

/// Number of implemented registers
pub const REG_COUNT: usize = 5;

/// Register names indexed by address, for debug views.
pub const REG_NAMES: [&str; REG_COUNT] = ["ENABLE_A", "ENABLE_B", "PWM_MODE_A", "PWM_MODE_B", "DUTY"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterFile {
    regs: [u8; REG_COUNT],
    // Debug counters
    pub dbg_writes: u32,
    pub dbg_dropped: u32,
}

impl RegisterFile {
    pub fn new() -> Self {
        RegisterFile { regs: [0; REG_COUNT], dbg_writes: 0, dbg_dropped: 0 }
    }

    pub fn reset(&mut self) {
        *self = RegisterFile::new();
    }

    /// Apply one received frame. Reads and reserved addresses change nothing.
    pub fn apply(&mut self, frame: Frame) {
        if !frame.write {
            debug!(address = frame.address, "read frame consumed (no read-back)");
            return;
        }
        self.write(frame.address, frame.data);
    }

    /// Returns true if addr was handled
    pub fn write(&mut self, addr: u8, value: u8) -> bool {
        match self.regs.get_mut(addr as usize) {
            Some(reg) => {
                *reg = value;
                self.dbg_writes += 1;
                debug!(reg = REG_NAMES[addr as usize], value, "register write");
                true
            }
            None => {
                self.dbg_dropped += 1;
                debug!(address = addr, value, "write to reserved address dropped");
                false
            }
        }
    }

    /// Direct register lookup (debug views and scripts; not visible on the bus).
    pub fn get(&self, addr: u8) -> Option<u8> {
        self.regs.get(addr as usize).copied()
    }

    /// Enable bits for all 16 channels (channel 0 = bit 0).
    pub fn enable(&self) -> u16 {
        u16::from_le_bytes([self.regs[ENABLE_A as usize], self.regs[ENABLE_B as usize]])
    }

    /// PWM-mode bits for all 16 channels (channel 0 = bit 0).
    pub fn pwm_mode(&self) -> u16 {
        u16::from_le_bytes([self.regs[PWM_MODE_A as usize], self.regs[PWM_MODE_B as usize]])
    }

    pub fn duty(&self) -> u8 {
        self.regs[DUTY as usize]
    }

    pub fn as_array(&self) -> [u8; REG_COUNT] {
        self.regs
    }

    pub fn dump(&self) -> String {
        REG_NAMES.iter().zip(self.regs.iter()).enumerate()
            .map(|(a, (name, v))| format!("{:02X} {:<10} = 0x{:02X}", a, name, v))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Capture state for save state.
    pub fn save_state(&self) -> crate::savestate::RegisterFileState {
        crate::savestate::RegisterFileState { regs: self.regs }
    }

    /// Restore state from save state.
    pub fn load_state(&mut self, s: &crate::savestate::RegisterFileState) {
        self.regs = s.regs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_writes() {
        let mut r = RegisterFile::new();
        for (addr, val) in [(ENABLE_A, 0xF0), (ENABLE_B, 0xCC), (PWM_MODE_A, 0x01), (PWM_MODE_B, 0x80), (DUTY, 0x7F)] {
            assert!(r.write(addr, val));
            assert_eq!(r.get(addr), Some(val));
        }
        assert_eq!(r.enable(), 0xCCF0);
        assert_eq!(r.pwm_mode(), 0x8001);
        assert_eq!(r.duty(), 0x7F);
    }

    #[test]
    fn test_reserved_addresses_ignored() {
        let mut r = RegisterFile::new();
        r.write(ENABLE_A, 0xF0);
        let before = r.as_array();
        for addr in 0x05..=0x7F {
            assert!(!r.write(addr, 0xAA));
            assert_eq!(r.as_array(), before);
        }
        assert_eq!(r.dbg_dropped, 0x7B);
        assert_eq!(r.get(0x30), None);
    }

    #[test]
    fn test_read_frame_has_no_effect() {
        let mut r = RegisterFile::new();
        r.apply(Frame::read(ENABLE_A, 0xBE));
        r.apply(Frame::read(0x41, 0xEF));
        assert_eq!(r.as_array(), [0; REG_COUNT]);
        r.apply(Frame::write(ENABLE_A, 0xBE));
        assert_eq!(r.get(ENABLE_A), Some(0xBE));
    }

    #[test]
    fn test_idempotent_write() {
        let mut once = RegisterFile::new();
        once.write(DUTY, 0x80);
        let mut twice = RegisterFile::new();
        twice.write(DUTY, 0x80);
        twice.write(DUTY, 0x80);
        assert_eq!(once.as_array(), twice.as_array());
    }

    #[test]
    fn test_reset() {
        let mut r = RegisterFile::new();
        r.write(ENABLE_B, 0xFF);
        r.reset();
        assert_eq!(r.as_array(), [0; REG_COUNT]);
    }
}
