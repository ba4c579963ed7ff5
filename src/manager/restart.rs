//! Crash-loop detection for `Restart=always` services

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    RestartNow,
    /// Too many crashes inside the window; restart once `until` passes
    CoolDown { until: Instant },
}

/// Per-unit crash history
///
/// A crash is recorded with the time it was reaped. Once `threshold`
/// crashes fall inside `window`, the unit is parked for `cooldown` and its
/// history cleared.
#[derive(Debug)]
pub struct RestartTracker {
    window: Duration,
    threshold: usize,
    cooldown: Duration,
    history: HashMap<String, VecDeque<Instant>>,
    pending: HashMap<String, Instant>,
}

impl RestartTracker {
    pub fn new(window: Duration, threshold: usize, cooldown: Duration) -> Self {
        Self {
            window,
            threshold,
            cooldown,
            history: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn record_crash(&mut self, unit: &str, now: Instant) -> RestartDecision {
        let window = self.window;
        let crashes = self.history.entry(unit.to_string()).or_default();
        crashes.retain(|&at| now.saturating_duration_since(at) < window);
        crashes.push_back(now);

        if crashes.len() < self.threshold {
            return RestartDecision::RestartNow;
        }

        crashes.clear();
        let until = now + self.cooldown;
        self.pending.insert(unit.to_string(), until);
        RestartDecision::CoolDown { until }
    }

    /// Remove and return units whose cool-down has expired, sorted by name
    pub fn take_due(&mut self, now: Instant) -> Vec<String> {
        let mut due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, until)| **until <= now)
            .map(|(unit, _)| unit.clone())
            .collect();
        for unit in &due {
            self.pending.remove(unit);
        }
        due.sort();
        due
    }

    pub fn pending_until(&self, unit: &str) -> Option<Instant> {
        self.pending.get(unit).copied()
    }

    /// Crashes currently counted against `unit`
    pub fn crash_count(&self, unit: &str) -> usize {
        self.history.get(unit).map_or(0, VecDeque::len)
    }
}
