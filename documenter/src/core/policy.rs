//! Confidence gate and failure-streak circuit breaker.

/// Consecutive tool failures that abort a run.
pub const FAILURE_STREAK_LIMIT: u32 = 3;

/// Admits decisions whose confidence meets the configured threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    threshold: f64,
}

impl ConfidenceGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn admits(&self, confidence: f64) -> bool {
        confidence >= self.threshold
    }
}

/// State of the breaker after recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakStatus {
    /// Below the limit; the run may continue.
    Continue { consecutive: u32 },
    /// The limit was reached; the run must stop now.
    Tripped { consecutive: u32 },
}

/// Counts consecutive tool failures. Any success resets the count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureStreak {
    consecutive: u32,
    limit: u32,
}

impl Default for FailureStreak {
    fn default() -> Self {
        Self::new(FAILURE_STREAK_LIMIT)
    }
}

impl FailureStreak {
    pub fn new(limit: u32) -> Self {
        Self {
            consecutive: 0,
            limit,
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn record_failure(&mut self) -> StreakStatus {
        self.consecutive += 1;
        if self.consecutive >= self.limit {
            StreakStatus::Tripped {
                consecutive: self.consecutive,
            }
        } else {
            StreakStatus::Continue {
                consecutive: self.consecutive,
            }
        }
    }
}
