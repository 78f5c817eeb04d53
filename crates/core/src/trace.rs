//! Output waveform capture.
//!
//! Records transitions of the 16-bit output word with system-clock tick
//! timestamps during a capture window, then answers level queries, resamples
//! a channel into display columns, or renders it to PCM for an audible
//! monitor.
//!
//! Storing one edge per change of the whole word keeps a 60 Hz window of
//! 3 kHz PWM at roughly 100 edges per active channel.

use crate::peripherals::CHANNEL_COUNT;

/// A change of the output word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputEdge {
    /// Tick on which the new value became visible.
    pub tick: u64,
    /// Output word from this tick on (channel 0 = bit 0).
    pub outputs: u16,
}

/// Output word bit for `channel`, `None` past the last channel.
fn channel_bit(channel: usize) -> Option<u16> {
    if channel < CHANNEL_COUNT { Some(1 << channel) } else { None }
}

/// DC-blocking high-pass cutoff (Hz). PWM carries a DC term equal to its duty.
const HPF_CUTOFF: f32 = 20.0;
/// Fade-in/fade-out time (seconds) when the monitored channel starts or stops.
const ENV_RAMP_S: f32 = 0.003;

pub struct Trace {
    edges: Vec<OutputEdge>,
    /// Output word at `window_start`
    initial: u16,
    /// Most recent output word (carried across windows)
    pub outputs: u16,
    pub window_start: u64,
    pub window_end: u64,
    /// Recording is skipped entirely while false
    pub enabled: bool,

    // ── Audio post-processing state (persists across windows) ──
    hpf_prev_in: f32,
    hpf_prev_out: f32,
    envelope: f32,
}

impl Trace {
    pub fn new() -> Self {
        Trace {
            edges: Vec::with_capacity(4096),
            initial: 0,
            outputs: 0,
            window_start: 0,
            window_end: 0,
            enabled: false,
            hpf_prev_in: 0.0,
            hpf_prev_out: 0.0,
            envelope: 0.0,
        }
    }

    /// Start a new capture window at `tick`, dropping old edges.
    pub fn begin_window(&mut self, tick: u64) {
        self.window_start = tick;
        self.window_end = tick;
        self.initial = self.outputs;
        self.edges.clear();
    }

    pub fn end_window(&mut self, tick: u64) {
        self.window_end = tick;
    }

    /// Record the output word seen after `tick`.
    #[inline]
    pub fn record(&mut self, tick: u64, outputs: u16) {
        if outputs != self.outputs {
            self.edges.push(OutputEdge { tick, outputs });
            self.outputs = outputs;
        }
    }

    pub fn edges(&self) -> &[OutputEdge] {
        &self.edges
    }

    /// Number of edges of a single channel in the window.
    pub fn channel_edges(&self, channel: usize) -> usize {
        let Some(bit) = channel_bit(channel) else {
            return 0;
        };
        let mut prev = self.initial & bit;
        let mut n = 0;
        for e in &self.edges {
            if e.outputs & bit != prev {
                prev = e.outputs & bit;
                n += 1;
            }
        }
        n
    }

    /// Output word at `tick` (clamped to the window start).
    pub fn outputs_at(&self, tick: u64) -> u16 {
        let idx = self.edges.partition_point(|e| e.tick <= tick);
        if idx == 0 { self.initial } else { self.edges[idx - 1].outputs }
    }

    pub fn level_at(&self, channel: usize, tick: u64) -> bool {
        channel_bit(channel).is_some_and(|bit| self.outputs_at(tick) & bit != 0)
    }

    /// Fraction of time `channel` is high in each of `columns` equal slices of
    /// `[start, end)`.
    pub fn sample_columns(&self, channel: usize, start: u64, end: u64, columns: usize) -> Vec<f32> {
        let Some(bit) = channel_bit(channel) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(columns);
        if columns == 0 || end <= start {
            return out;
        }
        let span = (end - start) as f64 / columns as f64;
        let mut idx = self.edges.partition_point(|e| e.tick <= start);
        let mut level = self.outputs_at(start) & bit != 0;
        for c in 0..columns {
            let p_start = start as f64 + c as f64 * span;
            let high = Self::integrate(&self.edges, bit, &mut idx, &mut level, p_start, p_start + span);
            out.push((high / span) as f32);
        }
        out
    }

    /// Render the window of one channel to mono f32 PCM at `sample_rate`.
    ///
    /// Each sample is the time-weighted average level over its sample period
    /// (box-filter anti-alias), mapped to `[-volume, +volume]`, then DC-blocked
    /// and enveloped to avoid pops when the channel starts or stops toggling.
    ///
    /// Returns the number of samples written.
    pub fn render_samples(
        &mut self,
        channel: usize,
        out: &mut Vec<f32>,
        sample_rate: u32,
        clock_hz: u32,
        volume: f32,
    ) -> usize {
        out.clear();
        let window_ticks = self.window_end.saturating_sub(self.window_start);
        let Some(bit) = channel_bit(channel) else {
            return 0;
        };
        if window_ticks == 0 || sample_rate == 0 || clock_hz == 0 {
            return 0;
        }
        let num_samples = ((window_ticks as f64 * sample_rate as f64) / clock_hz as f64).ceil() as usize;
        out.reserve(num_samples);

        let tps = clock_hz as f64 / sample_rate as f64;
        let active = self.channel_edges(channel) > 0;

        let rc = 1.0 / (2.0 * std::f32::consts::PI * HPF_CUTOFF);
        let dt = 1.0 / sample_rate as f32;
        let alpha = rc / (rc + dt);
        let ramp = 1.0 / (ENV_RAMP_S * sample_rate as f32);

        let mut idx = 0usize;
        let mut level = self.initial & bit != 0;
        for i in 0..num_samples {
            let p_start = self.window_start as f64 + i as f64 * tps;
            let high = Self::integrate(&self.edges, bit, &mut idx, &mut level, p_start, p_start + tps);
            let raw = volume * (2.0 * (high / tps) as f32 - 1.0);

            let hp = alpha * (self.hpf_prev_out + raw - self.hpf_prev_in);
            self.hpf_prev_in = raw;
            self.hpf_prev_out = hp;

            self.envelope = if active {
                (self.envelope + ramp).min(1.0)
            } else {
                (self.envelope - ramp).max(0.0)
            };
            out.push(hp * self.envelope);
        }
        num_samples
    }

    /// Ticks spent high in `[p_start, p_end)`, advancing the edge cursor.
    #[inline]
    fn integrate(
        edges: &[OutputEdge],
        bit: u16,
        idx: &mut usize,
        level: &mut bool,
        p_start: f64,
        p_end: f64,
    ) -> f64 {
        let mut time_high = 0.0f64;
        let mut cursor = p_start;
        while *idx < edges.len() && (edges[*idx].tick as f64) < p_end {
            let edge_tick = edges[*idx].tick as f64;
            if edge_tick > cursor {
                if *level {
                    time_high += edge_tick - cursor;
                }
                cursor = edge_tick;
            }
            *level = edges[*idx].outputs & bit != 0;
            *idx += 1;
        }
        if *level {
            time_high += p_end - cursor;
        }
        time_high
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(trace: &mut Trace, half: u64, periods: u64) {
        trace.begin_window(0);
        for p in 0..periods {
            trace.record(p * 2 * half, 0x0001);
            trace.record(p * 2 * half + half, 0x0000);
        }
        trace.end_window(periods * 2 * half);
    }

    #[test]
    fn test_record_only_changes() {
        let mut t = Trace::new();
        t.begin_window(0);
        t.record(1, 0x0000);
        t.record(2, 0x0003);
        t.record(3, 0x0003);
        t.record(4, 0x0001);
        assert_eq!(t.edges().len(), 2);
        assert_eq!(t.channel_edges(0), 1);
        assert_eq!(t.channel_edges(1), 2);
    }

    #[test]
    fn test_level_at() {
        let mut t = Trace::new();
        square(&mut t, 10, 3);
        assert!(t.level_at(0, 0));
        assert!(t.level_at(0, 9));
        assert!(!t.level_at(0, 10));
        assert!(t.level_at(0, 20));
        assert!(!t.level_at(1, 5));
    }

    #[test]
    fn test_window_carries_level() {
        let mut t = Trace::new();
        t.begin_window(0);
        t.record(5, 0x8000);
        t.end_window(10);
        t.begin_window(10);
        assert!(t.edges().is_empty());
        assert!(t.level_at(15, 12));
    }

    #[test]
    fn test_sample_columns_half_duty() {
        let mut t = Trace::new();
        square(&mut t, 10, 4);
        let cols = t.sample_columns(0, 0, 80, 4);
        assert_eq!(cols.len(), 4);
        for c in cols {
            assert!((c - 0.5).abs() < 1e-6, "{}", c);
        }
        let cols = t.sample_columns(0, 0, 20, 2);
        assert_eq!(cols, vec![1.0, 0.0]);
    }

    #[test]
    fn test_render_sample_count() {
        let mut t = Trace::new();
        // 3 kHz square at 10 MHz, 1/60 s window
        t.begin_window(0);
        let mut tick = 0;
        while tick < 166_666 {
            t.record(tick, 1);
            t.record(tick + 1666, 0);
            tick += 3333;
        }
        t.end_window(166_666);
        let mut out = Vec::new();
        let n = t.render_samples(0, &mut out, 44_100, 10_000_000, 0.2);
        assert_eq!(n, 735);
        assert_eq!(out.len(), n);
        assert!(out.iter().all(|s| s.abs() <= 0.45));
        assert!(out.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn test_out_of_range_channel() {
        let mut t = Trace::new();
        square(&mut t, 10, 3);
        assert!(!t.level_at(16, 5));
        assert!(!t.level_at(usize::MAX, 5));
        assert_eq!(t.channel_edges(16), 0);
        assert!(t.sample_columns(16, 0, 60, 6).is_empty());
        let mut out = vec![1.0];
        assert_eq!(t.render_samples(16, &mut out, 44_100, 10_000_000, 0.2), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_render_silent_channel() {
        let mut t = Trace::new();
        t.begin_window(0);
        t.end_window(10_000);
        let mut out = Vec::new();
        t.render_samples(3, &mut out, 44_100, 10_000_000, 0.2);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
