//! Consecutive-failure bookkeeping for the health monitor

/// Counts consecutive unhealthy ticks and decides when to restart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureTracker {
    consecutive: u32,
    threshold: u32,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Count a failure. Returns the count reached and whether it crossed the
    /// threshold; on crossing, the counter is already back at zero.
    pub fn record_failure(&mut self) -> (u32, bool) {
        self.consecutive = self.consecutive.saturating_add(1);
        let reached = self.consecutive;
        if reached >= self.threshold {
            self.consecutive = 0;
            (reached, true)
        } else {
            (reached, false)
        }
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}
