//! Runtime counters and the recent-event ring consumed by the admin
//! surface. The core never serializes these; it only hands out snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;

/// Fixed-capacity ring: writes overwrite the oldest entry once full.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// # Panics
    /// Panics when `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            slots: vec![None; capacity],
            head: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, value: T) {
        let capacity = self.slots.len();
        self.slots[self.head] = Some(value);
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Contents oldest-first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        let capacity = self.slots.len();
        let start = (self.head + capacity - self.len) % capacity;
        (0..self.len)
            .filter_map(|i| self.slots[(start + i) % capacity].clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub client_id: String,
    pub detail: String,
    pub at: SystemTime,
}

/// Monotonic counters, cheap to bump from any task.
#[derive(Debug, Default)]
pub struct GatewayStats {
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    publishes_routed: AtomicU64,
    decode_errors: AtomicU64,
    dead_letters: AtomicU64,
    retries: AtomicU64,
    events: Mutex<Option<RingBuffer<SessionEvent>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_in: u64,
    pub frames_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub publishes_routed: u64,
    pub decode_errors: u64,
    pub dead_letters: u64,
    pub retries: u64,
}

impl GatewayStats {
    #[must_use]
    pub fn new(event_capacity: usize) -> Self {
        Self {
            events: Mutex::new(Some(RingBuffer::new(event_capacity.max(1)))),
            ..Self::default()
        }
    }

    pub fn frame_in(&self, bytes: usize) {
        self.frames_in.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn frame_out(&self, bytes: usize) {
        self.frames_out.fetch_add(1, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn publish_routed(&self) {
        self.publishes_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dead_letter(&self) {
        self.dead_letters.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self, client_id: &str, detail: impl Into<String>) {
        if let Some(ring) = self.events.lock().as_mut() {
            ring.push(SessionEvent {
                client_id: client_id.to_string(),
                detail: detail.into(),
                at: SystemTime::now(),
            });
        }
    }

    #[must_use]
    pub fn recent_events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .as_ref()
            .map(RingBuffer::to_vec)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_out: self.frames_out.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            publishes_routed: self.publishes_routed.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_overwrites_oldest() {
        let mut ring = RingBuffer::new(3);
        for i in 0..5 {
            ring.push(i);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.to_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn ring_partial_fill() {
        let mut ring = RingBuffer::new(4);
        ring.push("a");
        ring.push("b");
        assert_eq!(ring.to_vec(), vec!["a", "b"]);
    }

    #[test]
    fn counters_accumulate() {
        let stats = GatewayStats::new(8);
        stats.frame_in(10);
        stats.frame_in(5);
        stats.frame_out(7);
        stats.publish_routed();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_in, 2);
        assert_eq!(snapshot.bytes_in, 15);
        assert_eq!(snapshot.frames_out, 1);
        assert_eq!(snapshot.bytes_out, 7);
        assert_eq!(snapshot.publishes_routed, 1);
    }

    #[test]
    fn events_capped() {
        let stats = GatewayStats::new(2);
        stats.record_event("a", "connected");
        stats.record_event("b", "connected");
        stats.record_event("c", "connected");
        let events = stats.recent_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].client_id, "b");
        assert_eq!(events[1].client_id, "c");
    }
}
