//! Host-side SPI controller that bit-bangs frames onto the peripheral pins.
//!
//! Waveform per frame (one character = one [`BusTiming`] slot):
//!
//! ```text
//! nCS  ‾‾\___________________________ ... ______/‾‾‾‾‾‾‾‾‾‾‾‾
//! SCLK ____________/‾‾‾‾‾‾\______/‾‾‾ ... ‾‾‾‾‾‾\____________
//! COPI ____<  bit 15     ><  bit 14   ...  bit 0 >____________
//!         setup  half     half          half     trailing_idle
//! ```
//!
//! COPI changes while SCLK is low and is held through the high phase, so the
//! peripheral samples it on the rising edge.

use crate::config::BusTiming;
use crate::error::{Error, Result};
use crate::peripherals::{Frame, SpiPins, FRAME_BITS};

/// Anything that can be clocked with SPI pin levels, one system clock per call.
pub trait SpiTarget {
    fn clock(&mut self, pins: SpiPins);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpiDriver {
    pub timing: BusTiming,
}

impl SpiDriver {
    pub fn new(timing: BusTiming) -> Self {
        SpiDriver { timing }
    }

    /// Write `data` to register `address` (0–127).
    pub fn write<T: SpiTarget>(&self, target: &mut T, address: u8, data: u8) -> Result<()> {
        check_address(address)?;
        self.send(target, Frame::write(address, data));
        Ok(())
    }

    /// Issue a read frame. The peripheral consumes it without driving data back.
    pub fn read<T: SpiTarget>(&self, target: &mut T, address: u8, data: u8) -> Result<()> {
        check_address(address)?;
        self.send(target, Frame::read(address, data));
        Ok(())
    }

    /// Shift a complete frame and release the bus.
    pub fn send<T: SpiTarget>(&self, target: &mut T, frame: Frame) {
        self.select(target);
        self.shift(target, frame.to_bits(), FRAME_BITS);
        self.release(target);
    }

    /// Shift only the first `bits` bits of `frame`, then raise nCS.
    pub fn send_aborted<T: SpiTarget>(&self, target: &mut T, frame: Frame, bits: u8) {
        self.select(target);
        self.shift(target, frame.to_bits(), bits.min(FRAME_BITS));
        self.release(target);
    }

    /// Hold the bus idle for `cycles` system clocks.
    pub fn idle<T: SpiTarget>(&self, target: &mut T, cycles: u64) {
        hold(target, SpiPins::IDLE, cycles);
    }

    fn select<T: SpiTarget>(&self, target: &mut T) {
        hold(target, SpiPins { sclk: false, copi: false, ncs: false }, self.timing.setup as u64);
    }

    fn shift<T: SpiTarget>(&self, target: &mut T, bits: u16, count: u8) {
        let half = self.timing.half_period as u64;
        for i in 0..count {
            let copi = (bits >> (15 - i)) & 1 != 0;
            hold(target, SpiPins { sclk: false, copi, ncs: false }, half);
            hold(target, SpiPins { sclk: true, copi, ncs: false }, half);
        }
    }

    fn release<T: SpiTarget>(&self, target: &mut T) {
        hold(target, SpiPins::IDLE, self.timing.trailing_idle as u64);
    }

    /// System clocks one full frame occupies on the bus.
    pub fn frame_cycles(&self) -> u64 {
        self.timing.setup as u64
            + FRAME_BITS as u64 * 2 * self.timing.half_period as u64
            + self.timing.trailing_idle as u64
    }
}

fn hold<T: SpiTarget>(target: &mut T, pins: SpiPins, cycles: u64) {
    for _ in 0..cycles {
        target.clock(pins);
    }
}

fn check_address(address: u8) -> Result<()> {
    if address > 0x7F {
        return Err(Error::AddressRange { address });
    }
    Ok(())
}
