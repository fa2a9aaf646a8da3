//! Tick-decayed spam counters.

/// Counter that grows by a fixed step per event and decays by one per tick.
#[derive(Debug, Clone)]
pub struct TickThrottler {
    increment: u32,
    threshold: u32,
    count: u32,
}

impl TickThrottler {
    /// A throttler that trips once the count exceeds `threshold`.
    pub fn new(increment: u32, threshold: u32) -> Self {
        Self {
            increment,
            threshold,
            count: 0,
        }
    }

    /// Record one event.
    pub fn increment(&mut self) {
        self.count = self.count.saturating_add(self.increment);
    }

    /// Whether the current level is still acceptable.
    pub fn is_under_threshold(&self) -> bool {
        self.count <= self.threshold
    }

    /// Decay by one step.
    pub fn tick(&mut self) {
        self.count = self.count.saturating_sub(1);
    }

    /// Current level.
    pub fn count(&self) -> u32 {
        self.count
    }
}
