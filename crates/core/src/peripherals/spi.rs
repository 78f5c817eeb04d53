//! SPI target (peripheral side) frame receiver.
//!
//! Mode 0, write-only: COPI is sampled on each rising SCLK edge while nCS is
//! low, most significant bit first. Sixteen bits make a [`Frame`]:
//!
//! ```text
//!  15   14 ........ 8   7 ........ 0
//! +---+---------------+--------------+
//! |R/W|  address[6:0] |  data[7:0]   |
//! +---+---------------+--------------+
//! ```
//!
//! All three pins are asynchronous to the system clock and go through a
//! two-stage [`Synchronizer`] first. A frame only starts on a synchronized
//! falling edge of nCS, so every frame needs its own CS pulse. Raising nCS
//! mid-frame drops the partial frame.

use tracing::{debug, trace};

use super::sync::{Edge, EdgeDetector, Synchronizer};

/// Bits per command frame
pub const FRAME_BITS: u8 = 16;

/// Pin levels presented to the receiver on one system clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiPins {
    pub sclk: bool,
    pub copi: bool,
    /// Chip select, active low
    pub ncs: bool,
}

impl SpiPins {
    /// Bus idle: nCS high, SCLK low.
    pub const IDLE: SpiPins = SpiPins { sclk: false, copi: false, ncs: true };

    /// Decode the `ui_in` input byte: bit 0 SCLK, bit 1 COPI, bit 2 nCS.
    pub fn from_ui_in(ui_in: u8) -> Self {
        SpiPins {
            sclk: ui_in & 0x01 != 0,
            copi: ui_in & 0x02 != 0,
            ncs: ui_in & 0x04 != 0,
        }
    }

    pub fn to_ui_in(self) -> u8 {
        (self.sclk as u8) | ((self.copi as u8) << 1) | ((self.ncs as u8) << 2)
    }
}

impl Default for SpiPins {
    fn default() -> Self {
        SpiPins::IDLE
    }
}

/// One decoded 16-bit command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub write: bool,
    /// 7-bit register address
    pub address: u8,
    pub data: u8,
}

impl Frame {
    pub fn write(address: u8, data: u8) -> Self {
        Frame { write: true, address: address & 0x7F, data }
    }

    pub fn read(address: u8, data: u8) -> Self {
        Frame { write: false, address: address & 0x7F, data }
    }

    pub fn from_bits(bits: u16) -> Self {
        Frame {
            write: bits & 0x8000 != 0,
            address: ((bits >> 8) & 0x7F) as u8,
            data: bits as u8,
        }
    }

    pub fn to_bits(self) -> u16 {
        ((self.write as u16) << 15) | (((self.address & 0x7F) as u16) << 8) | self.data as u16
    }
}

/// Receiver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    Idle,
    /// `bit_count` bits already shifted into `shift`
    Shifting { bit_count: u8, shift: u16 },
}

pub struct SpiReceiver {
    sclk_sync: Synchronizer,
    copi_sync: Synchronizer,
    ncs_sync: Synchronizer,
    sclk_edge: EdgeDetector,
    ncs_edge: EdgeDetector,
    pub state: RxState,
    // Debug counters
    pub dbg_frames: u32,
    pub dbg_aborted: u32,
}

impl SpiReceiver {
    pub fn new() -> Self {
        SpiReceiver {
            sclk_sync: Synchronizer::new(),
            copi_sync: Synchronizer::new(),
            ncs_sync: Synchronizer::with_level(true),
            sclk_edge: EdgeDetector::new(),
            ncs_edge: EdgeDetector::with_level(true),
            state: RxState::Idle,
            dbg_frames: 0,
            dbg_aborted: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = SpiReceiver::new();
    }

    /// Advance one system clock. Returns a frame on the tick its 16th bit is
    /// sampled.
    pub fn tick(&mut self, pins: SpiPins) -> Option<Frame> {
        let sclk = self.sclk_sync.clock(pins.sclk);
        let copi = self.copi_sync.clock(pins.copi);
        let ncs = self.ncs_sync.clock(pins.ncs);
        let sclk_edge = self.sclk_edge.clock(sclk);
        let ncs_edge = self.ncs_edge.clock(ncs);

        if ncs {
            if let RxState::Shifting { bit_count, .. } = self.state {
                debug!(bit_count, "SPI frame aborted by nCS deassert");
                self.dbg_aborted += 1;
            }
            self.state = RxState::Idle;
            return None;
        }

        if self.state == RxState::Idle && ncs_edge == Edge::Falling {
            trace!("SPI frame start");
            self.state = RxState::Shifting { bit_count: 0, shift: 0 };
        }

        let RxState::Shifting { bit_count, shift } = self.state else {
            return None;
        };
        if sclk_edge != Edge::Rising {
            return None;
        }

        let shift = (shift << 1) | copi as u16;
        let bit_count = bit_count + 1;
        if bit_count < FRAME_BITS {
            self.state = RxState::Shifting { bit_count, shift };
            return None;
        }

        self.state = RxState::Idle;
        self.dbg_frames += 1;
        let frame = Frame::from_bits(shift);
        debug!(
            write = frame.write,
            address = frame.address,
            data = frame.data,
            "SPI frame complete"
        );
        Some(frame)
    }

    /// Synchronized (SCLK, COPI, nCS) as seen by the receiver logic.
    pub fn synced_pins(&self) -> SpiPins {
        SpiPins {
            sclk: self.sclk_sync.output(),
            copi: self.copi_sync.output(),
            ncs: self.ncs_sync.output(),
        }
    }

    pub fn dbg_info(&self) -> String {
        format!("state={:?} frames={} aborted={}", self.state, self.dbg_frames, self.dbg_aborted)
    }

    /// Capture state for save state.
    pub fn save_state(&self) -> crate::savestate::SpiReceiverState {
        let (shifting, bit_count, shift) = match self.state {
            RxState::Idle => (false, 0, 0),
            RxState::Shifting { bit_count, shift } => (true, bit_count, shift),
        };
        crate::savestate::SpiReceiverState {
            sclk_sync: *self.sclk_sync.stages(),
            copi_sync: *self.copi_sync.stages(),
            ncs_sync: *self.ncs_sync.stages(),
            sclk_prev: self.sclk_edge.prev(),
            ncs_prev: self.ncs_edge.prev(),
            shifting, bit_count, shift,
        }
    }

    /// Restore state from save state.
    pub fn load_state(&mut self, s: &crate::savestate::SpiReceiverState) {
        self.sclk_sync.set_stages(s.sclk_sync);
        self.copi_sync.set_stages(s.copi_sync);
        self.ncs_sync.set_stages(s.ncs_sync);
        self.sclk_edge.set_prev(s.sclk_prev);
        self.ncs_edge.set_prev(s.ncs_prev);
        self.state = if s.shifting {
            RxState::Shifting { bit_count: s.bit_count.min(FRAME_BITS - 1), shift: s.shift }
        } else {
            RxState::Idle
        };
    }
}

impl Default for SpiReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Clock `pins` into the receiver `n` times, collecting any frames.
    fn hold(rx: &mut SpiReceiver, pins: SpiPins, n: usize, out: &mut Vec<Frame>) {
        for _ in 0..n {
            if let Some(f) = rx.tick(pins) {
                out.push(f);
            }
        }
    }

    fn shift_bits(rx: &mut SpiReceiver, bits: u16, count: u8, out: &mut Vec<Frame>) {
        for i in 0..count {
            let copi = (bits >> (15 - i)) & 1 != 0;
            hold(rx, SpiPins { sclk: false, copi, ncs: false }, 4, out);
            hold(rx, SpiPins { sclk: true, copi, ncs: false }, 4, out);
        }
    }

    fn send(rx: &mut SpiReceiver, bits: u16) -> Vec<Frame> {
        let mut out = Vec::new();
        hold(rx, SpiPins::IDLE, 4, &mut out);
        hold(rx, SpiPins { sclk: false, copi: false, ncs: false }, 1, &mut out);
        shift_bits(rx, bits, 16, &mut out);
        hold(rx, SpiPins::IDLE, 4, &mut out);
        out
    }

    #[test]
    fn test_frame_bits() {
        let f = Frame::from_bits(0x80F0);
        assert_eq!(f, Frame { write: true, address: 0x00, data: 0xF0 });
        let f = Frame::from_bits(0x41EF);
        assert_eq!(f, Frame { write: false, address: 0x41, data: 0xEF });
        assert_eq!(Frame::write(0x04, 0x80).to_bits(), 0x8480);
    }

    #[test]
    fn test_ui_in_layout() {
        let p = SpiPins::from_ui_in(0b0000_0101);
        assert_eq!(p, SpiPins { sclk: true, copi: false, ncs: true });
        assert_eq!(SpiPins { sclk: false, copi: true, ncs: false }.to_ui_in(), 0b010);
    }

    #[test]
    fn test_receive_write_frame() {
        let mut rx = SpiReceiver::new();
        let frames = send(&mut rx, 0x81CC);
        assert_eq!(frames, vec![Frame { write: true, address: 0x01, data: 0xCC }]);
        assert_eq!(rx.state, RxState::Idle);
    }

    #[test]
    fn test_receive_read_frame() {
        let mut rx = SpiReceiver::new();
        let frames = send(&mut rx, 0x30BE);
        assert_eq!(frames, vec![Frame { write: false, address: 0x30, data: 0xBE }]);
    }

    #[test]
    fn test_abort_discards_partial_frame() {
        let mut rx = SpiReceiver::new();
        let mut out = Vec::new();
        hold(&mut rx, SpiPins::IDLE, 4, &mut out);
        hold(&mut rx, SpiPins { sclk: false, copi: false, ncs: false }, 1, &mut out);
        shift_bits(&mut rx, 0x80FF, 9, &mut out);
        hold(&mut rx, SpiPins::IDLE, 4, &mut out);
        assert!(out.is_empty());
        assert_eq!(rx.dbg_aborted, 1);

        // The next full frame is received cleanly.
        let frames = send(&mut rx, 0x8412);
        assert_eq!(frames, vec![Frame::write(0x04, 0x12)]);
    }

    #[test]
    fn test_no_back_to_back_without_cs_pulse() {
        let mut rx = SpiReceiver::new();
        let mut out = Vec::new();
        hold(&mut rx, SpiPins::IDLE, 4, &mut out);
        hold(&mut rx, SpiPins { sclk: false, copi: false, ncs: false }, 1, &mut out);
        shift_bits(&mut rx, 0x8001, 16, &mut out);
        // Keep nCS low and clock another 16 bits: ignored.
        shift_bits(&mut rx, 0x8002, 16, &mut out);
        hold(&mut rx, SpiPins::IDLE, 4, &mut out);
        assert_eq!(out, vec![Frame::write(0x00, 0x01)]);
    }

    #[test]
    fn test_frame_right_after_reset() {
        let mut rx = SpiReceiver::new();
        rx.reset();
        let mut out = Vec::new();
        hold(&mut rx, SpiPins { sclk: false, copi: false, ncs: false }, 1, &mut out);
        shift_bits(&mut rx, 0x8203, 16, &mut out);
        assert_eq!(out, vec![Frame::write(0x02, 0x03)]);
    }

    #[test]
    fn test_clock_without_cs_ignored() {
        let mut rx = SpiReceiver::new();
        let mut out = Vec::new();
        for _ in 0..32 {
            hold(&mut rx, SpiPins { sclk: false, copi: true, ncs: true }, 3, &mut out);
            hold(&mut rx, SpiPins { sclk: true, copi: true, ncs: true }, 3, &mut out);
        }
        assert!(out.is_empty());
        assert_eq!(rx.state, RxState::Idle);
    }

    #[test]
    fn test_frame_emitted_after_sync_latency() {
        let mut rx = SpiReceiver::new();
        let mut out = Vec::new();
        hold(&mut rx, SpiPins::IDLE, 4, &mut out);
        hold(&mut rx, SpiPins { sclk: false, copi: false, ncs: false }, 1, &mut out);
        shift_bits(&mut rx, 0x8055, 15, &mut out);
        hold(&mut rx, SpiPins { sclk: false, copi: true, ncs: false }, 4, &mut out);
        // 16th rising edge presented; two ticks in the synchronizer before use.
        assert!(rx.tick(SpiPins { sclk: true, copi: true, ncs: false }).is_none());
        assert_eq!(rx.tick(SpiPins { sclk: true, copi: true, ncs: false }), Some(Frame::write(0x00, 0x55)));
    }
}
