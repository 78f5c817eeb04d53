//! Line-oriented stimulus scripts for headless runs.
//!
//! ```text
//! # comment
//! reset                               pulse rst_n low for 5 cycles
//! ena 0|1                             drive the enable input
//! write <addr> <data>                 SPI write frame
//! read <addr> <data>                  SPI read frame (no effect)
//! abort <addr> <data> <bits>          frame cut short after <bits> bits
//! wait <cycles>                       idle the bus
//! expect uo|uio|out|reg:<addr> <v>    compare outputs or a register
//! measure <ch> [periods]              report PWM frequency / duty
//! expect-freq <ch> <min> <max> [periods]
//! expect-duty <ch> <pct> <tol> [periods]
//! ```
//!
//! Integers are decimal or `0x` hex.

use tracing::debug;

use crate::error::{Error, Result};
use crate::measure::{measure_pwm, PwmMeasurement};
use crate::peripherals::regs::REG_COUNT;
use crate::peripherals::{Frame, CHANNEL_COUNT};
use crate::stimulus::SpiDriver;
use crate::Peripheral;

/// Cycles `reset` holds rst_n low, and idles after release.
const RESET_CYCLES: u64 = 5;
/// Periods averaged by `measure` when none is given.
const DEFAULT_PERIODS: u32 = 4;

/// What an `expect` line looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Uo,
    Uio,
    Out,
    Reg(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Reset,
    Ena(bool),
    Write { address: u8, data: u8 },
    Read { address: u8, data: u8 },
    Abort { address: u8, data: u8, bits: u8 },
    Wait(u64),
    Expect { probe: Probe, value: u16 },
    Measure { channel: usize, periods: u32 },
    ExpectFreq { channel: usize, min: f64, max: f64, periods: u32 },
    ExpectDuty { channel: usize, percent: f64, tolerance: f64, periods: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// 1-based source line
    pub number: usize,
    pub command: Command,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub lines: Vec<Line>,
}

/// Result of a successful run.
#[derive(Debug, Clone, Default)]
pub struct Report {
    /// One human-readable line per executed command
    pub log: Vec<String>,
    /// `(source line, measurement)` for every measure / expect-freq / expect-duty
    pub measurements: Vec<(usize, PwmMeasurement)>,
    /// System clocks consumed by the run
    pub cycles: u64,
}

impl Script {
    pub fn parse(src: &str) -> Result<Script> {
        let mut lines = Vec::new();
        for (i, raw) in src.lines().enumerate() {
            let number = i + 1;
            let text = raw.split('#').next().unwrap_or("").trim();
            if text.is_empty() {
                continue;
            }
            let command = parse_command(text).map_err(|msg| Error::Script { line: number, msg })?;
            lines.push(Line { number, command });
        }
        Ok(Script { lines })
    }

    /// Execute against `p`, stopping at the first failed expectation.
    pub fn run(&self, p: &mut Peripheral, driver: &SpiDriver) -> Result<Report> {
        let mut report = Report::default();
        let start = p.tick;
        for line in &self.lines {
            let n = line.number;
            match line.command {
                Command::Reset => {
                    p.set_rst_n(false);
                    p.idle(RESET_CYCLES);
                    p.set_rst_n(true);
                    p.idle(RESET_CYCLES);
                    report.log.push(format!("{:>4}: reset", n));
                }
                Command::Ena(level) => {
                    p.ena = level;
                    report.log.push(format!("{:>4}: ena={}", n, level as u8));
                }
                Command::Write { address, data } => {
                    driver.send(p, Frame::write(address, data));
                    report.log.push(format!("{:>4}: write 0x{:02X} <- 0x{:02X}", n, address, data));
                }
                Command::Read { address, data } => {
                    driver.send(p, Frame::read(address, data));
                    report.log.push(format!("{:>4}: read  0x{:02X} (0x{:02X})", n, address, data));
                }
                Command::Abort { address, data, bits } => {
                    driver.send_aborted(p, Frame::write(address, data), bits);
                    report.log.push(format!("{:>4}: abort 0x{:02X} after {} bits", n, address, bits));
                }
                Command::Wait(cycles) => {
                    p.idle(cycles);
                    report.log.push(format!("{:>4}: wait {}", n, cycles));
                }
                Command::Expect { probe, value } => {
                    let actual = read_probe(p, probe);
                    if actual != Some(value) {
                        return Err(Error::Expectation {
                            line: n,
                            msg: format!("{:?}: expected 0x{:02X}, got {}", probe, value,
                                actual.map_or("none".to_string(), |v| format!("0x{:02X}", v))),
                        });
                    }
                    report.log.push(format!("{:>4}: expect {:?} == 0x{:02X} ok", n, probe, value));
                }
                Command::Measure { channel, periods } => {
                    let m = measure_pwm(p, channel, periods);
                    debug!(channel, freq_hz = m.freq_hz, duty = m.duty_percent, "measure");
                    report.log.push(format!("{:>4}: ch{} {:.1} Hz {:.2} %", n, channel, m.freq_hz, m.duty_percent));
                    report.measurements.push((n, m));
                }
                Command::ExpectFreq { channel, min, max, periods } => {
                    let m = measure_pwm(p, channel, periods);
                    report.measurements.push((n, m));
                    if m.freq_hz < min || m.freq_hz > max {
                        return Err(Error::Expectation {
                            line: n,
                            msg: format!("ch{} frequency {:.1} Hz outside {}..={} Hz", channel, m.freq_hz, min, max),
                        });
                    }
                    report.log.push(format!("{:>4}: ch{} {:.1} Hz ok", n, channel, m.freq_hz));
                }
                Command::ExpectDuty { channel, percent, tolerance, periods } => {
                    let m = measure_pwm(p, channel, periods);
                    report.measurements.push((n, m));
                    if (m.duty_percent - percent).abs() > tolerance {
                        return Err(Error::Expectation {
                            line: n,
                            msg: format!("ch{} duty {:.2} % not within {} of {} %", channel, m.duty_percent, tolerance, percent),
                        });
                    }
                    report.log.push(format!("{:>4}: ch{} {:.2} % ok", n, channel, m.duty_percent));
                }
            }
        }
        report.cycles = p.tick - start;
        Ok(report)
    }
}

fn read_probe(p: &Peripheral, probe: Probe) -> Option<u16> {
    match probe {
        Probe::Uo => Some(p.uo_out() as u16),
        Probe::Uio => Some(p.uio_out() as u16),
        Probe::Out => Some(p.outputs()),
        Probe::Reg(addr) => p.regs.get(addr).map(u16::from),
    }
}

fn parse_command(text: &str) -> std::result::Result<Command, String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let args = &words[1..];
    let cmd = match words[0].to_ascii_lowercase().as_str() {
        "reset" => {
            arity(args, 0, 0)?;
            Command::Reset
        }
        "ena" => {
            arity(args, 1, 1)?;
            Command::Ena(match args[0] {
                "0" => false,
                "1" => true,
                other => return Err(format!("ena expects 0 or 1, got '{}'", other)),
            })
        }
        "write" | "read" => {
            arity(args, 2, 2)?;
            let address = parse_address(args[0])?;
            let data = parse_u8(args[1])?;
            if words[0].eq_ignore_ascii_case("write") {
                Command::Write { address, data }
            } else {
                Command::Read { address, data }
            }
        }
        "abort" => {
            arity(args, 3, 3)?;
            let bits = parse_u8(args[2])?;
            if bits >= 16 {
                return Err(format!("abort after {} bits would complete the frame", bits));
            }
            Command::Abort { address: parse_address(args[0])?, data: parse_u8(args[1])?, bits }
        }
        "wait" => {
            arity(args, 1, 1)?;
            Command::Wait(parse_int(args[0])?)
        }
        "expect" => {
            arity(args, 2, 2)?;
            let probe = parse_probe(args[0])?;
            let value = parse_int(args[1])?;
            let limit = if probe == Probe::Out { 0xFFFF } else { 0xFF };
            if value > limit {
                return Err(format!("value 0x{:X} too wide for {}", value, args[0]));
            }
            Command::Expect { probe, value: value as u16 }
        }
        "measure" => {
            arity(args, 1, 2)?;
            Command::Measure { channel: parse_channel(args[0])?, periods: parse_periods(args.get(1))? }
        }
        "expect-freq" => {
            arity(args, 3, 4)?;
            Command::ExpectFreq {
                channel: parse_channel(args[0])?,
                min: parse_float(args[1])?,
                max: parse_float(args[2])?,
                periods: parse_periods(args.get(3))?,
            }
        }
        "expect-duty" => {
            arity(args, 3, 4)?;
            Command::ExpectDuty {
                channel: parse_channel(args[0])?,
                percent: parse_float(args[1])?,
                tolerance: parse_float(args[2])?,
                periods: parse_periods(args.get(3))?,
            }
        }
        other => return Err(format!("unknown command '{}'", other)),
    };
    Ok(cmd)
}

fn arity(args: &[&str], min: usize, max: usize) -> std::result::Result<(), String> {
    if args.len() < min || args.len() > max {
        if min == max {
            return Err(format!("expected {} argument(s), got {}", min, args.len()));
        }
        return Err(format!("expected {}..={} arguments, got {}", min, max, args.len()));
    }
    Ok(())
}

fn parse_int(s: &str) -> std::result::Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| format!("bad number '{}'", s))
}

fn parse_u8(s: &str) -> std::result::Result<u8, String> {
    let v = parse_int(s)?;
    u8::try_from(v).map_err(|_| format!("{} does not fit in 8 bits", s))
}

fn parse_address(s: &str) -> std::result::Result<u8, String> {
    let v = parse_u8(s)?;
    if v > 0x7F {
        return Err(format!("address {} does not fit in 7 bits", s));
    }
    Ok(v)
}

fn parse_channel(s: &str) -> std::result::Result<usize, String> {
    let v = parse_int(s)? as usize;
    if v >= CHANNEL_COUNT {
        return Err(format!("channel {} out of range 0..{}", v, CHANNEL_COUNT));
    }
    Ok(v)
}

fn parse_periods(s: Option<&&str>) -> std::result::Result<u32, String> {
    match s {
        None => Ok(DEFAULT_PERIODS),
        Some(s) => {
            let v = parse_int(s)?;
            if v == 0 || v > u32::MAX as u64 {
                return Err(format!("bad period count '{}'", s));
            }
            Ok(v as u32)
        }
    }
}

fn parse_float(s: &str) -> std::result::Result<f64, String> {
    s.parse().map_err(|_| format!("bad number '{}'", s))
}

fn parse_probe(s: &str) -> std::result::Result<Probe, String> {
    let lower = s.to_ascii_lowercase();
    match lower.as_str() {
        "uo" => Ok(Probe::Uo),
        "uio" => Ok(Probe::Uio),
        "out" => Ok(Probe::Out),
        _ => {
            let addr = lower.strip_prefix("reg:").ok_or_else(|| format!("unknown probe '{}'", s))?;
            let addr = parse_u8(addr)?;
            if addr as usize >= REG_COUNT {
                return Err(format!("0x{:02X} is not a register", addr));
            }
            Ok(Probe::Reg(addr))
        }
    }
}
