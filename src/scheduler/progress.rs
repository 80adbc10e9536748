//! Progress notifications for bulk indexing, throttled per spec §6: "≥500 ms
//! or every 10 files".

use std::time::{Duration, Instant};

use crate::uri::Uri;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressState {
    Busy,
    Finalizing,
    Idle,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProgressEvent {
    pub state: ProgressState,
    pub processed: usize,
    pub total: usize,
    pub current_file: Option<Uri>,
}

/// Decides whether a progress event is due, per the time-or-count throttle.
/// Always lets the first and `finalizing`/`idle` events through.
pub struct ProgressThrottle {
    interval: Duration,
    every_n: usize,
    last_emit: Option<Instant>,
    since_last: usize,
}

impl ProgressThrottle {
    pub fn new(interval: Duration, every_n: usize) -> Self {
        Self { interval, every_n: every_n.max(1), last_emit: None, since_last: 0 }
    }

    /// Call once per processed file. Returns `true` if an event should be
    /// emitted now.
    pub fn tick(&mut self) -> bool {
        self.since_last += 1;
        let due = match self.last_emit {
            None => true,
            Some(last) => last.elapsed() >= self.interval || self.since_last >= self.every_n,
        };
        if due {
            self.last_emit = Some(Instant::now());
            self.since_last = 0;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_is_always_due() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(5), 10);
        assert!(throttle.tick());
    }

    #[test]
    fn count_threshold_forces_emission_within_the_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_secs(5), 3);
        assert!(throttle.tick());
        assert!(!throttle.tick());
        assert!(throttle.tick());
    }
}
