//! Burst suppression
//!
//! `DedupCache` drops a `(level, message)` pair seen again inside the window;
//! `NoiseFilter` drops known-noisy messages before they reach the cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::IgnoreRule;
use crate::record::LogLevel;

/// Last-accepted timestamps per `(level, message)`
#[derive(Debug)]
pub struct DedupCache {
    window: Duration,
    seen: HashMap<(LogLevel, String), Instant>,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// Check a record against the cache at the current time
    pub fn should_forward(&mut self, level: LogLevel, message: &str) -> bool {
        self.should_forward_at(level, message, Instant::now())
    }

    /// Check a record against the cache at `now`
    ///
    /// Stale entries are swept first. A duplicate inside the window returns
    /// false and keeps its original timestamp; anything else is recorded and
    /// returns true.
    pub fn should_forward_at(&mut self, level: LogLevel, message: &str, now: Instant) -> bool {
        let window = self.window;
        self.seen
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) <= window);

        let key = (level, message.to_string());
        if self.seen.contains_key(&key) {
            return false;
        }
        self.seen.insert(key, now);
        true
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Forget every entry
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

/// Case-insensitive denylist of messages that never carry new information
#[derive(Debug, Clone, Default)]
pub struct NoiseFilter {
    rules: Vec<Vec<String>>,
}

impl NoiseFilter {
    pub fn new(rules: &[IgnoreRule]) -> Self {
        let rules = rules
            .iter()
            .filter(|rule| !rule.all_of.is_empty())
            .map(|rule| rule.all_of.iter().map(|f| f.to_lowercase()).collect())
            .collect();
        Self { rules }
    }

    /// Whether any rule matches `message`
    pub fn is_ignored(&self, message: &str) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let normalized = message.to_lowercase();
        self.rules
            .iter()
            .any(|fragments| fragments.iter().all(|f| normalized.contains(f.as_str())))
    }
}
