//! Bounded in-memory buffers of the most recent scoring traffic.
//!
//! The window is not synchronised on its own; the engine keeps it behind the
//! same lock as the alert list so a detector pass always sees one consistent
//! state.

use std::collections::{HashMap, VecDeque};

use crate::detect::stats::SampleStats;
use crate::event::ScoringEvent;

/// Fixed-capacity FIFO ring: pushing into a full ring evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Ring<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a value, evicting the oldest one if the ring is full.
    pub fn push(&mut self, value: T) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }
}

/// Recent events, scores and latencies plus per-actor request counters.
///
/// The three rings share one capacity but fill independently: the score
/// ring only receives events that carry a credit score.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    events: Ring<ScoringEvent>,
    scores: Ring<f64>,
    latencies: Ring<f64>,
    user_counts: HashMap<String, u64>,
    address_counts: HashMap<String, u64>,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Ring::new(capacity),
            scores: Ring::new(capacity),
            latencies: Ring::new(capacity),
            user_counts: HashMap::new(),
            address_counts: HashMap::new(),
        }
    }

    /// Record one event in every buffer and bump its actor counters.
    ///
    /// Counters are lifetime totals; they are never windowed or decayed.
    pub fn append(&mut self, event: ScoringEvent) {
        if let Some(score) = event.credit_score() {
            self.scores.push(score);
        }
        self.latencies.push(event.processing_time);
        *self.user_counts.entry(event.user_id.clone()).or_insert(0) += 1;
        *self
            .address_counts
            .entry(event.source_address.clone())
            .or_insert(0) += 1;
        self.events.push(event);
    }

    pub fn events(&self) -> &Ring<ScoringEvent> {
        &self.events
    }

    pub fn scores(&self) -> &Ring<f64> {
        &self.scores
    }

    pub fn latencies(&self) -> &Ring<f64> {
        &self.latencies
    }

    pub fn user_count(&self, user_id: &str) -> u64 {
        self.user_counts.get(user_id).copied().unwrap_or(0)
    }

    pub fn address_count(&self, address: &str) -> u64 {
        self.address_counts.get(address).copied().unwrap_or(0)
    }

    /// Events with `timestamp > since`.
    pub fn events_since(&self, since: f64) -> impl Iterator<Item = &ScoringEvent> + '_ {
        self.events.iter().filter(move |e| e.timestamp > since)
    }

    /// Owned summary of the current window contents.
    pub fn snapshot(&self, now: f64) -> WindowSnapshot {
        let hour_ago = now - 3600.0;
        let (last_hour, errors_last_hour) = self
            .events_since(hour_ago)
            .fold((0usize, 0usize), |(n, errs), e| (n + 1, errs + usize::from(e.is_error())));

        WindowSnapshot {
            events: self.events.len(),
            latency: SampleStats::from_values(self.latencies.iter().copied()),
            score: SampleStats::from_values(self.scores.iter().copied()),
            events_last_hour: last_hour,
            errors_last_hour,
        }
    }
}

/// Point-in-time view of a [`SlidingWindow`].
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    pub events: usize,
    pub latency: SampleStats,
    pub score: SampleStats,
    pub events_last_hour: usize,
    pub errors_last_hour: usize,
}
