//! Drives the queue processor for every eligible session, honoring
//! exponential backoff between BACKOFF results, and ticks the retry clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tracing::trace;

use crate::config::GatewayConfig;
use crate::processor::{ProcessResult, QueueProcessor};
use crate::session::SessionRegistry;

const TICK: Duration = Duration::from_millis(20);
/// Cap on immediate REPROCESS iterations per session per tick, so one busy
/// session cannot starve the rest.
const REPROCESS_BUDGET: usize = 64;

#[derive(Debug, Clone, Copy)]
enum RunState {
    /// Queue known empty; wait for a `schedule` call.
    Idle,
    /// Ready to run now.
    Due { consecutive: u32 },
    /// Backed off until the deadline.
    At { at: Instant, consecutive: u32 },
}

pub struct QueueScheduler {
    config: Arc<GatewayConfig>,
    sessions: Arc<SessionRegistry>,
    processor: Arc<QueueProcessor>,
    run_states: Mutex<HashMap<String, RunState>>,
    wake: Notify,
}

impl QueueScheduler {
    #[must_use]
    pub fn new(
        config: Arc<GatewayConfig>,
        sessions: Arc<SessionRegistry>,
        processor: Arc<QueueProcessor>,
    ) -> Self {
        Self {
            config,
            sessions,
            processor,
            run_states: Mutex::new(HashMap::new()),
            wake: Notify::new(),
        }
    }

    /// Marks a session ready (new work enqueued or an ack arrived) and
    /// wakes the scheduler. Resets any backoff.
    pub fn schedule(&self, client_id: &str) {
        self.run_states
            .lock()
            .insert(client_id.to_string(), RunState::Due { consecutive: 0 });
        self.wake.notify_one();
    }

    fn backoff_delay(&self, consecutive: u32) -> Duration {
        let exponent = consecutive.saturating_sub(1).min(16);
        let delay = self.config.backoff_base.saturating_mul(1u32 << exponent);
        delay.min(self.config.backoff_max)
    }

    /// One pass over all sessions. Public for tests; the run loop calls it
    /// on every tick or wake.
    pub fn drive(&self, now: Instant) {
        let sessions = self.sessions.all();
        let mut states = self.run_states.lock();

        // drop bookkeeping for sessions that no longer exist
        states.retain(|client_id, _| {
            sessions
                .iter()
                .any(|session| session.client_id() == client_id)
        });

        for session in &sessions {
            self.processor.check_retries(session, now);

            if !session.state().is_deliverable() {
                continue;
            }

            let state = states
                .entry(session.client_id().to_string())
                .or_insert(RunState::Due { consecutive: 0 });
            let consecutive = match *state {
                RunState::Idle => continue,
                RunState::Due { consecutive } => consecutive,
                RunState::At { at, consecutive } => {
                    if now < at {
                        continue;
                    }
                    consecutive
                }
            };

            let mut budget = REPROCESS_BUDGET;
            let next = loop {
                match self.processor.process(session) {
                    ProcessResult::Reprocess => {
                        budget -= 1;
                        if budget == 0 {
                            break RunState::Due { consecutive: 0 };
                        }
                    }
                    ProcessResult::BackoffProcess => {
                        let consecutive = consecutive + 1;
                        let at = now + self.backoff_delay(consecutive);
                        trace!(
                            client_id = session.client_id(),
                            consecutive,
                            "backing off"
                        );
                        break RunState::At { at, consecutive };
                    }
                    ProcessResult::RemoveProcess => break RunState::Idle,
                }
            };
            *state = next;
        }
    }

    /// Scheduler task body; returns on shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = self.wake.notified() => {}
                _ = tick.tick() => {}
            }
            self.drive(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let config = Arc::new(GatewayConfig::default().with_backoff(
            Duration::from_millis(100),
            Duration::from_secs(2),
        ));
        let sessions = Arc::new(SessionRegistry::new(Arc::clone(&config)));
        let processor = test_processor(&config, &sessions);
        let scheduler = QueueScheduler::new(config, sessions, processor);

        assert_eq!(scheduler.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(scheduler.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(scheduler.backoff_delay(3), Duration::from_millis(400));
        // capped
        assert_eq!(scheduler.backoff_delay(10), Duration::from_secs(2));
        assert_eq!(scheduler.backoff_delay(32), Duration::from_secs(2));
    }

    fn test_processor(
        config: &Arc<GatewayConfig>,
        sessions: &Arc<SessionRegistry>,
    ) -> Arc<QueueProcessor> {
        use crate::net::NetworkRegistry;
        use crate::payload::PayloadRegistry;
        use crate::queue::DeadLetterQueue;
        use crate::stats::GatewayStats;
        use crate::transport::ChannelTransport;
        use mqttsn_codec::MessageFactory;

        let _ = sessions;
        Arc::new(QueueProcessor::new(
            Arc::clone(config),
            MessageFactory::default(),
            Arc::new(NetworkRegistry::new()),
            Arc::new(PayloadRegistry::new()),
            Arc::new(DeadLetterQueue::new(16)),
            Arc::new(ChannelTransport::new()),
            Arc::new(GatewayStats::new(16)),
        ))
    }
}
