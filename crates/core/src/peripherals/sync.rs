//! Clock-domain crossing for the asynchronous SPI pins.
//!
//! Each external pin passes through a fixed-depth flip-flop chain before any
//! logic looks at it. A value presented on the input becomes visible at the
//! output `STAGES` ticks later.

/// Multi-stage synchronizer (default two flip-flops).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Synchronizer<const STAGES: usize = 2> {
    stages: [bool; STAGES],
    /// Level every stage takes on reset
    reset_level: bool,
}

impl<const STAGES: usize> Synchronizer<STAGES> {
    pub fn new() -> Self {
        Self::with_level(false)
    }

    /// Chain that resets to `level` (e.g. high for an active-low select).
    pub fn with_level(level: bool) -> Self {
        Synchronizer { stages: [level; STAGES], reset_level: level }
    }

    pub fn reset(&mut self) {
        self.stages = [self.reset_level; STAGES];
    }

    /// Clock one sample in and return the synchronized output.
    pub fn clock(&mut self, input: bool) -> bool {
        for i in (1..STAGES).rev() {
            self.stages[i] = self.stages[i - 1];
        }
        if STAGES > 0 {
            self.stages[0] = input;
        }
        self.output()
    }

    /// Current synchronized value (last stage).
    pub fn output(&self) -> bool {
        STAGES > 0 && self.stages[STAGES - 1]
    }

    pub fn stages(&self) -> &[bool; STAGES] {
        &self.stages
    }

    pub fn set_stages(&mut self, stages: [bool; STAGES]) {
        self.stages = stages;
    }
}

impl<const STAGES: usize> Default for Synchronizer<STAGES> {
    fn default() -> Self {
        Self::new()
    }
}

/// Edge detector on an already-synchronized signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeDetector {
    prev: bool,
    reset_level: bool,
}

/// Edge seen on one clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    None,
    Rising,
    Falling,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::with_level(false)
    }

    pub fn with_level(level: bool) -> Self {
        EdgeDetector { prev: level, reset_level: level }
    }

    pub fn reset(&mut self) {
        self.prev = self.reset_level;
    }

    pub fn clock(&mut self, level: bool) -> Edge {
        let edge = match (self.prev, level) {
            (false, true) => Edge::Rising,
            (true, false) => Edge::Falling,
            _ => Edge::None,
        };
        self.prev = level;
        edge
    }

    pub fn prev(&self) -> bool {
        self.prev
    }

    pub fn set_prev(&mut self, prev: bool) {
        self.prev = prev;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_stage_latency() {
        let mut s: Synchronizer = Synchronizer::new();
        assert!(!s.clock(true));
        assert!(s.clock(true));
        assert!(s.clock(false));
        assert!(!s.clock(false));
    }

    #[test]
    fn test_glitch_shorter_than_chain_still_propagates_once() {
        // A one-tick pulse is delayed, not filtered.
        let mut s: Synchronizer<3> = Synchronizer::new();
        let out: Vec<bool> = [true, false, false, false, false]
            .iter()
            .map(|&v| s.clock(v))
            .collect();
        assert_eq!(out, vec![false, false, true, false, false]);
    }

    #[test]
    fn test_reset_clears_chain() {
        let mut s: Synchronizer = Synchronizer::new();
        s.clock(true);
        s.clock(true);
        s.reset();
        assert!(!s.output());
        assert_eq!(s.stages(), &[false, false]);
    }

    #[test]
    fn test_reset_level_high() {
        let mut s: Synchronizer = Synchronizer::with_level(true);
        assert!(s.output());
        s.clock(false);
        s.clock(false);
        assert!(!s.output());
        s.reset();
        assert!(s.output());

        let mut e = EdgeDetector::with_level(true);
        assert_eq!(e.clock(false), Edge::Falling);
        e.reset();
        assert!(e.prev());
    }

    #[test]
    fn test_edge_detector() {
        let mut e = EdgeDetector::new();
        assert_eq!(e.clock(false), Edge::None);
        assert_eq!(e.clock(true), Edge::Rising);
        assert_eq!(e.clock(true), Edge::None);
        assert_eq!(e.clock(false), Edge::Falling);
    }
}
