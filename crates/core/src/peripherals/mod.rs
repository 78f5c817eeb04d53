//! Peripheral building blocks.
//!
//! - [`Synchronizer`] / [`EdgeDetector`]: clock-domain crossing for the SPI pins
//! - [`SpiReceiver`]: SPI target state machine assembling 16-bit [`Frame`]s
//! - [`RegisterFile`]: five write-only 8-bit configuration registers
//! - [`PwmGenerator`]: counter/compare PWM shared by all channels
//! - [`mux`]: per-channel off / high / PWM output select

mod sync;
mod spi;
pub mod regs;
mod pwm;
pub mod mux;

pub use sync::{Edge, EdgeDetector, Synchronizer};
pub use spi::{Frame, RxState, SpiPins, SpiReceiver, FRAME_BITS};
pub use regs::RegisterFile;
pub use pwm::{duty_threshold, PwmGenerator};
pub use mux::{ChannelMode, CHANNEL_COUNT};
