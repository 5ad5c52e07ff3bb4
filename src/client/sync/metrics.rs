//! # Replay Metrics
//!
//! Counters and timings for replay attempts.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct ReplayMetrics {
    pub attempts: u64,
    pub commits: u64,
    pub failures: u64,
    pub discards: u64,
    pub retries: u64,
    pub average_replay_duration: Duration,
    pub last_replay_duration: Option<Duration>,
    pub last_replay_start: Option<Instant>,
}

impl ReplayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt_start(&mut self) {
        self.last_replay_start = Some(Instant::now());
        self.attempts += 1;
    }

    pub fn record_commit(&mut self) {
        if let Some(start) = self.last_replay_start.take() {
            let duration = start.elapsed();
            self.last_replay_duration = Some(duration);
            self.commits += 1;

            // Update rolling average
            let total = self.average_replay_duration * (self.commits - 1) as u32 + duration;
            self.average_replay_duration = total / self.commits as u32;
        }
    }

    pub fn record_failure(&mut self) {
        self.last_replay_start = None;
        self.failures += 1;
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    pub fn record_discard(&mut self) {
        self.discards += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.commits as f64 / self.attempts as f64
        }
    }
}
