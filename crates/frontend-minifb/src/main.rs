//! SPI PWM peripheral simulator frontend.
//!
//! Provides two execution modes:
//!
//! - **GUI mode** (default): 16-lane logic-analyzer view of the outputs,
//!   keyboard register pokes, and one channel played as audio.
//! - **Headless mode** (`--headless`): Runs a stimulus script and prints the
//!   report. Exits non-zero on the first failed expectation.
//!
//! GUI keys: 1-8 toggle ENABLE_A bits, Shift+1-8 toggle PWM_MODE_A bits,
//! Up/Down adjust DUTY (Shift for steps of 16), Tab selects the monitored
//! channel, R resets, F5/F9 save/load state, D dumps registers, M mutes.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use minifb::{Key, Scale, ScaleMode, Window, WindowOptions};
use spi_pwm_core::peripherals::regs::{DUTY, ENABLE_A, PWM_MODE_A};
use spi_pwm_core::script::Script;
use spi_pwm_core::{savestate, BusTiming, ChannelMode, Config, Peripheral, SpiDriver, CHANNEL_COUNT};
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Audio output sample rate in Hz
const AUDIO_SAMPLE_RATE: u32 = 44100;
/// Monitor amplitude (0.0–1.0)
const AUDIO_VOLUME: f32 = 0.15;
/// GUI refresh rate; one frame simulates `clock_hz / FPS` cycles
const FPS: u64 = 60;

/// Logic-analyzer canvas before scaling
const VIEW_W: usize = 320;
const LANE_H: usize = 12;
const VIEW_H: usize = LANE_H * CHANNEL_COUNT;
/// PWM periods shown across the canvas
const VIEW_PERIODS: u64 = 4;

const COLOR_BG: u32 = 0x10_1418;
const COLOR_GRID: u32 = 0x24_2A30;
const COLOR_OFF: u32 = 0x50_5860;
const COLOR_HIGH: u32 = 0x40_D060;
const COLOR_PWM: u32 = 0x40_C0E0;
const COLOR_MONITOR: u32 = 0xF0_C040;

#[derive(Parser, Debug)]
#[command(name = "spi-pwm-sim", version, about = "SPI-configured 16-channel PWM peripheral simulator")]
struct Cli {
    /// Stimulus script to run (required with --headless)
    script: Option<PathBuf>,
    /// Run without GUI
    #[arg(long)]
    headless: bool,
    /// Idle cycles to run after the script (headless)
    #[arg(long, default_value_t = 0)]
    cycles: u64,
    /// Verbose logging and a register dump at exit
    #[arg(long)]
    debug: bool,
    /// Disable audio
    #[arg(long)]
    mute: bool,
    /// Initial window scale 1-6
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=6))]
    scale: u8,
    /// System clock frequency in Hz
    #[arg(long, default_value_t = Config::default().clock_hz)]
    clock_hz: u32,
    /// Target PWM frequency in Hz
    #[arg(long, default_value_t = Config::default().pwm_hz)]
    pwm_hz: u32,
    /// SCLK half period in system cycles
    #[arg(long, default_value_t = BusTiming::default().half_period)]
    half_period: u32,
    /// Save state file (default derived from the script name)
    #[arg(long)]
    state: Option<PathBuf>,
}

// ─── Audio Source ───────────────────────────────────────────────────────────

/// Mono source draining PCM rendered from the monitored channel. Plays
/// silence when the ring runs dry.
struct MonitorSource {
    ring: Arc<Mutex<VecDeque<f32>>>,
    sample_rate: u32,
}

impl Iterator for MonitorSource {
    type Item = f32;
    fn next(&mut self) -> Option<f32> {
        if let Ok(mut ring) = self.ring.try_lock() {
            if let Some(s) = ring.pop_front() {
                return Some(s);
            }
        }
        Some(0.0)
    }
}

impl rodio::Source for MonitorSource {
    fn current_frame_len(&self) -> Option<usize> { None }
    fn channels(&self) -> u16 { 1 }
    fn sample_rate(&self) -> u32 { self.sample_rate }
    fn total_duration(&self) -> Option<Duration> { None }
}

fn setup_audio(ring: Arc<Mutex<VecDeque<f32>>>) -> Option<(rodio::OutputStream, rodio::Sink)> {
    let (stream, handle) = match rodio::OutputStream::try_default() {
        Ok(s) => s,
        Err(e) => { warn!("audio device: {}", e); return None; }
    };
    match rodio::Sink::try_new(&handle) {
        Ok(sink) => {
            sink.append(MonitorSource { ring, sample_rate: AUDIO_SAMPLE_RATE });
            Some((stream, sink))
        }
        Err(e) => { warn!("audio sink: {}", e); None }
    }
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.debug { "debug" } else { "warn" }));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = Config { clock_hz: cli.clock_hz, pwm_hz: cli.pwm_hz };
    let mut p = Peripheral::with_config(config).context("invalid clock configuration")?;
    let driver = SpiDriver::new(BusTiming { half_period: cli.half_period, ..BusTiming::default() });
    info!(
        clock_hz = config.clock_hz,
        modulus = config.pwm_modulus(),
        half_period = cli.half_period,
        "peripheral ready"
    );

    let script = match &cli.script {
        Some(path) => {
            let src = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            Some(Script::parse(&src).with_context(|| format!("parsing {}", path.display()))?)
        }
        None => None,
    };

    if cli.headless {
        let script = script.ok_or_else(|| anyhow!("--headless needs a script"))?;
        run_headless(&cli, &mut p, &driver, &script)
    } else {
        if let Some(script) = &script {
            let report = script.run(&mut p, &driver)?;
            info!(cycles = report.cycles, "script finished");
        }
        run_gui(&cli, &mut p, &driver)
    }
}

// ─── Headless Mode ──────────────────────────────────────────────────────────

fn run_headless(cli: &Cli, p: &mut Peripheral, driver: &SpiDriver, script: &Script) -> Result<()> {
    let started = Instant::now();
    let report = script.run(p, driver)?;
    for line in &report.log {
        println!("{}", line);
    }
    if cli.cycles > 0 {
        p.idle(cli.cycles);
    }
    println!(
        "ok: {} commands, {} cycles ({:.3} ms simulated, {:.2}s wall)",
        script.lines.len(),
        report.cycles + cli.cycles,
        (report.cycles + cli.cycles) as f64 * 1e3 / p.config.clock_hz as f64,
        started.elapsed().as_secs_f64(),
    );
    if cli.debug {
        println!("{}", p.dump_regs());
    }
    Ok(())
}

// ─── GUI Mode ───────────────────────────────────────────────────────────────

/// Key edge tracking for one-shot actions.
struct Keys {
    prev: Vec<Key>,
}

impl Keys {
    fn pressed(&self, window: &Window, key: Key) -> bool {
        window.is_key_down(key) && !self.prev.contains(&key)
    }

    fn update(&mut self, window: &Window) {
        self.prev = window.get_keys();
    }
}

const DIGIT_KEYS: [Key; 8] = [
    Key::Key1, Key::Key2, Key::Key3, Key::Key4,
    Key::Key5, Key::Key6, Key::Key7, Key::Key8,
];

fn open_window(scale: usize) -> Result<Window> {
    let mut window = Window::new(
        "SPI PWM Simulator",
        VIEW_W * scale,
        VIEW_H * scale,
        WindowOptions {
            scale: Scale::X1,
            scale_mode: ScaleMode::AspectRatioStretch,
            resize: true,
            ..Default::default()
        },
    )
    .map_err(|e| anyhow!("creating window: {}", e))?;
    window.set_target_fps(FPS as usize);
    Ok(window)
}

fn run_gui(cli: &Cli, p: &mut Peripheral, driver: &SpiDriver) -> Result<()> {
    let scale = cli.scale as usize;
    let (scaled_w, scaled_h) = (VIEW_W * scale, VIEW_H * scale);
    let mut window = open_window(scale)?;
    let state_file = cli.state.clone().unwrap_or_else(|| savestate::state_path(cli.script.as_deref()));

    let audio_ring: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::with_capacity(16384)));
    let mut muted = cli.mute;
    let mut _audio = if !muted { setup_audio(audio_ring.clone()) } else { None };
    let mut pcm_buf: Vec<f32> = Vec::with_capacity(16384);

    let cycles_per_frame = p.config.clock_hz as u64 / FPS;
    let mut canvas = vec![0u32; VIEW_W * VIEW_H];
    let mut scaled_buf = vec![0u32; scaled_w * scaled_h];
    let mut keys = Keys { prev: Vec::new() };
    let mut monitor = 0usize;
    let mut frame_count: u64 = 0;
    let mut last_fps_time = Instant::now();
    let mut fps_frames: u64 = 0;

    while window.is_open() && !window.is_key_down(Key::Escape) {
        let shift = window.is_key_down(Key::LeftShift) || window.is_key_down(Key::RightShift);

        p.begin_capture();
        let frame_start = p.tick;

        // Register pokes go out over the simulated bus inside the frame.
        for (bit, &key) in DIGIT_KEYS.iter().enumerate() {
            if keys.pressed(&window, key) {
                let addr = if shift { PWM_MODE_A } else { ENABLE_A };
                let value = p.regs.get(addr).unwrap_or(0) ^ (1 << bit);
                driver.write(p, addr, value)?;
            }
        }
        let step = if shift { 16 } else { 1 };
        let duty = p.regs.duty();
        if keys.pressed(&window, Key::Up) {
            driver.write(p, DUTY, duty.saturating_add(step))?;
        }
        if keys.pressed(&window, Key::Down) {
            driver.write(p, DUTY, duty.saturating_sub(step))?;
        }
        if keys.pressed(&window, Key::Tab) {
            monitor = (monitor + 1) % CHANNEL_COUNT;
        }
        if keys.pressed(&window, Key::R) {
            p.set_rst_n(false);
            p.idle(5);
            p.set_rst_n(true);
        }
        if keys.pressed(&window, Key::F5) {
            match savestate::save_to_file(&p.save_state(), &state_file) {
                Ok(()) => eprintln!("State saved: {}", state_file.display()),
                Err(e) => warn!("save state: {}", e),
            }
        }
        if keys.pressed(&window, Key::F9) {
            let loaded = savestate::load_from_file(&state_file).and_then(|s| p.load_state(&s));
            match loaded {
                Ok(()) => {
                    eprintln!("State loaded: {}", state_file.display());
                    p.begin_capture();
                }
                Err(e) => warn!("load state: {}", e),
            }
        }
        if keys.pressed(&window, Key::D) {
            eprintln!("--- Regs (frame {}) ---\n{}\n---", frame_count, p.dump_regs());
        }
        if keys.pressed(&window, Key::M) {
            muted = !muted;
            _audio = if muted { None } else { setup_audio(audio_ring.clone()) };
        }
        keys.update(&window);

        let spent = p.tick.saturating_sub(frame_start);
        p.idle(cycles_per_frame.saturating_sub(spent));
        p.end_capture();
        frame_count += 1;
        fps_frames += 1;

        if !muted {
            p.trace.render_samples(monitor, &mut pcm_buf, AUDIO_SAMPLE_RATE, p.config.clock_hz, AUDIO_VOLUME);
            if let Ok(mut ring) = audio_ring.lock() {
                // Limit buffer to avoid latency buildup (~200 ms)
                if ring.len() < AUDIO_SAMPLE_RATE as usize / 5 {
                    ring.extend(pcm_buf.iter());
                }
            }
        }

        draw_lanes(p, monitor, &mut canvas);
        for y in 0..scaled_h {
            let src = (y / scale) * VIEW_W;
            let dst = y * scaled_w;
            for x in 0..scaled_w {
                scaled_buf[dst + x] = canvas[src + x / scale];
            }
        }
        window
            .update_with_buffer(&scaled_buf, scaled_w, scaled_h)
            .map_err(|e| anyhow!("window update: {}", e))?;

        if last_fps_time.elapsed() >= Duration::from_secs(2) {
            let fps = fps_frames as f64 / last_fps_time.elapsed().as_secs_f64();
            let duty = p.regs.duty();
            let ms = if muted { " [MUTE]" } else { "" };
            window.set_title(&format!(
                "SPI PWM - DUTY 0x{:02X} ({:.1} %) - monitor ch{}{} - {:.0} FPS",
                duty,
                p.pwm.duty_percent(),
                monitor,
                ms,
                fps
            ));
            fps_frames = 0;
            last_fps_time = Instant::now();
        }
    }
    if cli.debug {
        println!("{} frames, {} cycles\n{}", frame_count, p.tick, p.dump_regs());
    }
    Ok(())
}

/// Draw one lane per channel over the first `VIEW_PERIODS` PWM periods of the
/// captured frame.
fn draw_lanes(p: &Peripheral, monitor: usize, canvas: &mut [u32]) {
    canvas.fill(COLOR_BG);
    let start = p.trace.window_start;
    let end = start + VIEW_PERIODS * p.pwm.modulus() as u64;

    for ch in 0..CHANNEL_COUNT {
        let top = ch * LANE_H;
        for x in 0..VIEW_W {
            canvas[(top + LANE_H - 1) * VIEW_W + x] = COLOR_GRID;
        }
        let color = if ch == monitor {
            COLOR_MONITOR
        } else {
            match p.channel_mode(ch) {
                ChannelMode::Off => COLOR_OFF,
                ChannelMode::High => COLOR_HIGH,
                ChannelMode::Pwm => COLOR_PWM,
            }
        };
        let y_high = top + 2;
        let y_low = top + LANE_H - 3;

        let columns = p.trace.sample_columns(ch, start, end, VIEW_W);
        let mut prev_y = None;
        for (x, &v) in columns.iter().enumerate() {
            let y = if v >= 0.5 { y_high } else { y_low };
            if let Some(py) = prev_y {
                if py != y {
                    for yy in y_high..=y_low {
                        canvas[yy * VIEW_W + x] = color;
                    }
                }
            }
            canvas[y * VIEW_W + x] = color;
            prev_y = Some(y);
        }
    }
}
