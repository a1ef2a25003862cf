/// Monotonic simulation clock accumulating per-tick deltas.
///
/// Owned by the store; consumers only read it.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    tick: u64,
    elapsed: f64,
}

impl SimClock {
    /// Create a clock at tick 0 with no elapsed time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one tick of `dt` seconds. Returns the new tick number.
    ///
    /// Negative or non-finite deltas count as zero so elapsed time never
    /// runs backwards.
    pub fn advance(&mut self, dt: f64) -> u64 {
        self.tick += 1;
        if dt.is_finite() && dt > 0.0 {
            self.elapsed += dt;
        }
        self.tick
    }

    /// Number of ticks advanced so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Total simulated seconds.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Reset to a previously saved tick count and elapsed time.
    pub(crate) fn resume(&mut self, tick: u64, elapsed: f64) {
        self.tick = tick;
        self.elapsed = if elapsed.is_finite() { elapsed.max(0.0) } else { 0.0 };
    }
}
