//! Per-session outbound queue and the dead-letter sink.

use std::collections::VecDeque;
use std::time::SystemTime;

use parking_lot::Mutex;
use uuid::Uuid;

use mqttsn_codec::QoS;

use crate::error::{GatewayError, Result};

/// One pending outbound publish. The payload lives in the payload registry;
/// the queue holds a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPublish {
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,
    pub payload_id: Uuid,
}

/// Bounded FIFO. Overflow is the caller's problem: the rejected publish is
/// handed back so it can be dead-lettered with its payload reference.
#[derive(Debug)]
pub struct SessionQueue {
    queue: VecDeque<QueuedPublish>,
    max_messages: usize,
}

impl SessionQueue {
    #[must_use]
    pub fn new(max_messages: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max_messages,
        }
    }

    /// # Errors
    /// `QueueFull` when the bound is reached; nothing is evicted.
    pub fn enqueue(&mut self, client_id: &str, publish: QueuedPublish) -> Result<()> {
        if self.queue.len() >= self.max_messages {
            return Err(GatewayError::QueueFull(client_id.to_string()));
        }
        self.queue.push_back(publish);
        Ok(())
    }

    #[must_use]
    pub fn peek(&self) -> Option<&QueuedPublish> {
        self.queue.front()
    }

    #[must_use]
    pub fn dequeue(&mut self) -> Option<QueuedPublish> {
        self.queue.pop_front()
    }

    /// Empties the queue, returning what was pending (session teardown
    /// releases the payload references).
    pub fn drain(&mut self) -> Vec<QueuedPublish> {
        self.queue.drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    QueueOverflow,
    RetryExhausted,
    AliasExhausted,
    SessionDropped,
}

#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    pub client_id: String,
    pub topic: String,
    pub payload_id: Uuid,
    pub reason: DeadLetterReason,
    pub at: SystemTime,
}

/// Terminal sink for undeliverable publishes. Capped; pushing into a full
/// queue evicts the oldest entry, which is returned so the caller can drop
/// its payload reference.
#[derive(Debug)]
pub struct DeadLetterQueue {
    entries: Mutex<VecDeque<DeadLetterEntry>>,
    capacity: usize,
}

impl DeadLetterQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn push(
        &self,
        client_id: &str,
        topic: &str,
        payload_id: Uuid,
        reason: DeadLetterReason,
    ) -> Option<DeadLetterEntry> {
        let mut entries = self.entries.lock();
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(DeadLetterEntry {
            client_id: client_id.to_string(),
            topic: topic.to_string(),
            payload_id,
            reason,
            at: SystemTime::now(),
        });
        evicted
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(topic: &str) -> QueuedPublish {
        QueuedPublish {
            topic: topic.to_string(),
            qos: QoS::AtLeastOnce,
            retain: false,
            payload_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn fifo_order_preserved() {
        let mut queue = SessionQueue::new(10);
        for topic in ["a", "b", "c"] {
            queue.enqueue("dev", publish(topic)).unwrap();
        }
        assert_eq!(queue.dequeue().unwrap().topic, "a");
        assert_eq!(queue.dequeue().unwrap().topic, "b");
        assert_eq!(queue.dequeue().unwrap().topic, "c");
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn overflow_rejects_without_evicting() {
        let mut queue = SessionQueue::new(2);
        queue.enqueue("dev", publish("a")).unwrap();
        queue.enqueue("dev", publish("b")).unwrap();

        assert!(matches!(
            queue.enqueue("dev", publish("c")),
            Err(GatewayError::QueueFull(_))
        ));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek().unwrap().topic, "a");
    }

    #[test]
    fn drain_empties() {
        let mut queue = SessionQueue::new(4);
        queue.enqueue("dev", publish("a")).unwrap();
        queue.enqueue("dev", publish("b")).unwrap();
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn dead_letter_eviction() {
        let dlq = DeadLetterQueue::new(2);
        let first = Uuid::new_v4();
        assert!(dlq
            .push("dev", "t/1", first, DeadLetterReason::QueueOverflow)
            .is_none());
        assert!(dlq
            .push("dev", "t/2", Uuid::new_v4(), DeadLetterReason::RetryExhausted)
            .is_none());

        let evicted = dlq
            .push("dev", "t/3", Uuid::new_v4(), DeadLetterReason::QueueOverflow)
            .unwrap();
        assert_eq!(evicted.payload_id, first);
        assert_eq!(dlq.len(), 2);
        assert_eq!(dlq.snapshot()[0].topic, "t/2");
    }
}
