//! # spi-pwm-core
//!
//! Cycle-accurate model of a small synchronous peripheral: an SPI-written
//! register file driving sixteen digital output channels, any of which can
//! carry one shared PWM waveform.
//!
//! The model is advanced one system clock at a time with
//! [`Peripheral::tick`]. Default clocking is 10 MHz with a ~3 kHz PWM
//! (counter modulus 3333).
//!
//! ## Architecture
//!
//! - [`Peripheral`] — Top-level model that wires the blocks together
//! - [`peripherals`] — Synchronizer, SPI receiver, register file, PWM, output mux
//! - [`stimulus`] — Host-side SPI bit-bang driver ([`SpiDriver`])
//! - [`measure`] — PWM frequency / duty measurement on an output channel
//! - [`trace`] — Output edge capture for waveform views and audio
//! - [`savestate`] — Compressed save states
//! - [`script`] — Line-oriented stimulus scripts for headless runs
//!
//! ## Data flow
//!
//! ```text
//! SCLK/COPI/nCS ─► sync ─► SpiReceiver ─► RegisterFile ─┬─► PwmGenerator (DUTY)
//!                                                        └─► mux ─► uo_out / uio_out
//! ```

pub mod config;
pub mod error;
pub mod measure;
pub mod peripherals;
pub mod savestate;
pub mod script;
pub mod stimulus;
pub mod trace;

pub use config::{BusTiming, Config};
pub use error::{Error, Result};
pub use measure::{measure_pwm, PwmMeasurement};
pub use peripherals::{ChannelMode, Frame, SpiPins, CHANNEL_COUNT};
pub use stimulus::{SpiDriver, SpiTarget};
pub use trace::Trace;

use tracing::debug;

/// Main peripheral model combining all blocks
pub struct Peripheral {
    pub config: Config,
    pub spi: peripherals::SpiReceiver,
    pub regs: peripherals::RegisterFile,
    pub pwm: peripherals::PwmGenerator,
    /// Output capture for waveform views
    pub trace: Trace,
    /// System clock ticks since construction
    pub tick: u64,
    /// Enable input. While low nothing advances and outputs hold.
    pub ena: bool,
    rst_n: bool,
    /// Pins presented on the most recent tick
    pins: SpiPins,
    outputs: u16,
}

impl Peripheral {
    /// New peripheral with the default 10 MHz / 3 kHz configuration.
    pub fn new() -> Self {
        Self::build(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: Config) -> Self {
        Peripheral {
            config,
            spi: peripherals::SpiReceiver::new(),
            regs: peripherals::RegisterFile::new(),
            pwm: peripherals::PwmGenerator::new(config.pwm_modulus()),
            trace: Trace::new(),
            tick: 0,
            ena: true,
            rst_n: true,
            pins: SpiPins::IDLE,
            outputs: 0,
        }
    }

    /// Clear registers, counters and the receiver.
    pub fn reset(&mut self) {
        debug!(tick = self.tick, "peripheral reset");
        self.spi.reset();
        self.regs.reset();
        self.pwm.reset();
        self.set_outputs(0);
    }

    /// Drive the active-low reset input. Asserting resets immediately and
    /// holds the peripheral in reset; release takes effect on the next tick.
    pub fn set_rst_n(&mut self, level: bool) {
        self.rst_n = level;
        if !level {
            self.reset();
        }
    }

    pub fn rst_n(&self) -> bool {
        self.rst_n
    }

    /// Advance one system clock with `pins` on the SPI inputs. Returns the
    /// output word visible after the clock edge.
    pub fn tick(&mut self, pins: SpiPins) -> u16 {
        self.tick += 1;
        self.pins = pins;
        if !self.rst_n {
            return self.outputs;
        }
        if !self.ena {
            return self.outputs;
        }

        if let Some(frame) = self.spi.tick(pins) {
            self.regs.apply(frame);
        }
        self.pwm.tick(self.regs.duty());

        let out = peripherals::mux::select(self.regs.enable(), self.regs.pwm_mode(), self.pwm.level());
        self.set_outputs(out);
        out
    }

    /// Advance `cycles` system clocks with the pins held.
    pub fn run_cycles(&mut self, cycles: u64, pins: SpiPins) {
        for _ in 0..cycles {
            self.tick(pins);
        }
    }

    /// Advance with the SPI bus idle (nCS high).
    pub fn idle(&mut self, cycles: u64) {
        self.run_cycles(cycles, SpiPins::IDLE);
    }

    fn set_outputs(&mut self, out: u16) {
        self.outputs = out;
        if self.trace.enabled {
            self.trace.record(self.tick, out);
        }
    }

    /// Start recording output edges from the current tick.
    pub fn begin_capture(&mut self) {
        self.trace.enabled = true;
        self.trace.outputs = self.outputs;
        self.trace.begin_window(self.tick);
    }

    /// Close the capture window at the current tick. Recording continues.
    pub fn end_capture(&mut self) {
        self.trace.end_window(self.tick);
    }

    /// All 16 channel outputs (channel 0 = bit 0).
    pub fn outputs(&self) -> u16 {
        self.outputs
    }

    /// Channels 0–7.
    pub fn uo_out(&self) -> u8 {
        self.outputs as u8
    }

    /// Channels 8–15.
    pub fn uio_out(&self) -> u8 {
        (self.outputs >> 8) as u8
    }

    pub fn channel(&self, channel: usize) -> bool {
        channel < CHANNEL_COUNT && self.outputs & (1 << channel) != 0
    }

    pub fn channel_mode(&self, channel: usize) -> ChannelMode {
        ChannelMode::of(channel, self.regs.enable(), self.regs.pwm_mode())
    }

    pub fn pins(&self) -> SpiPins {
        self.pins
    }

    /// Human-readable register and counter dump.
    pub fn dump_regs(&self) -> String {
        format!(
            "{}\nOUT  uo=0x{:02X} uio=0x{:02X}\nPWM  {}\nSPI  {}\ntick={} ena={} rst_n={}",
            self.regs.dump(),
            self.uo_out(),
            self.uio_out(),
            self.pwm.dbg_info(),
            self.spi.dbg_info(),
            self.tick,
            self.ena,
            self.rst_n,
        )
    }

    /// Capture the full clocked state.
    pub fn save_state(&self) -> savestate::SaveState {
        savestate::SaveState {
            config: self.config,
            tick: self.tick,
            ena: self.ena,
            rst_n: self.rst_n,
            ui_in: self.pins.to_ui_in(),
            outputs: self.outputs,
            spi: self.spi.save_state(),
            regs: self.regs.save_state(),
            pwm: self.pwm.save_state(),
        }
    }

    /// Restore a captured state. The saved configuration replaces the current one.
    pub fn load_state(&mut self, s: &savestate::SaveState) -> Result<()> {
        s.config.validate()?;
        if s.config != self.config {
            self.config = s.config;
            self.pwm = peripherals::PwmGenerator::new(s.config.pwm_modulus());
        }
        self.tick = s.tick;
        self.ena = s.ena;
        self.rst_n = s.rst_n;
        self.pins = SpiPins::from_ui_in(s.ui_in);
        self.spi.load_state(&s.spi);
        self.regs.load_state(&s.regs);
        self.pwm.load_state(&s.pwm);
        self.outputs = s.outputs;
        self.trace.outputs = s.outputs;
        self.trace.begin_window(self.tick);
        Ok(())
    }
}

impl Default for Peripheral {
    fn default() -> Self {
        Self::new()
    }
}

impl SpiTarget for Peripheral {
    fn clock(&mut self, pins: SpiPins) {
        self.tick(pins);
    }
}
