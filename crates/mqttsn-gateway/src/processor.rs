//! Queue processor: advances a session's outbound queue one message at a
//! time through the message state service.
//!
//! Each call handles at most the queue head. A REGISTER round-trip, when
//! the topic has no alias yet, occupies the inflight slot while the publish
//! waits at the head; acknowledgements re-schedule the session.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use mqttsn_codec::{Message, MessageFactory, QoS};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::inflight;
use crate::net::NetworkRegistry;
use crate::payload::PayloadRegistry;
use crate::queue::{DeadLetterQueue, DeadLetterReason};
use crate::session::{ClientState, Session, SessionInner};
use crate::stats::GatewayStats;
use crate::transport::Transport;

/// What the caller should do with this session next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// Queue empty; stop scheduling until new work arrives.
    RemoveProcess,
    /// Slot busy or a round-trip pending; come back later. Consecutive
    /// backoffs grow exponentially.
    BackoffProcess,
    /// More work is ready; call again immediately.
    Reprocess,
}

pub struct QueueProcessor {
    config: Arc<GatewayConfig>,
    factory: MessageFactory,
    network: Arc<NetworkRegistry>,
    payloads: Arc<PayloadRegistry>,
    dead_letters: Arc<DeadLetterQueue>,
    transport: Arc<dyn Transport>,
    stats: Arc<GatewayStats>,
}

impl QueueProcessor {
    #[must_use]
    pub fn new(
        config: Arc<GatewayConfig>,
        factory: MessageFactory,
        network: Arc<NetworkRegistry>,
        payloads: Arc<PayloadRegistry>,
        dead_letters: Arc<DeadLetterQueue>,
        transport: Arc<dyn Transport>,
        stats: Arc<GatewayStats>,
    ) -> Self {
        Self {
            config,
            factory,
            network,
            payloads,
            dead_letters,
            transport,
            stats,
        }
    }

    fn send(&self, session: &Session, inner: &mut SessionInner, message: &Message) -> bool {
        let Some(address) = self.network.address_of(session.client_id()) else {
            debug!(client_id = session.client_id(), "no address for session");
            return false;
        };
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(error) => {
                warn!(client_id = session.client_id(), %error, "encode failed");
                return false;
            }
        };
        match self.transport.send(address, &frame) {
            Ok(()) => {
                self.stats.frame_out(frame.len());
                true
            }
            Err(error) => {
                warn!(client_id = session.client_id(), %error, "send failed, marking lost");
                let _ = inner.transition(ClientState::Lost);
                false
            }
        }
    }

    fn release_dead_letter_eviction(&self, evicted: Option<crate::queue::DeadLetterEntry>) {
        if let Some(entry) = evicted {
            let _ = self.payloads.release(entry.payload_id);
        }
    }

    /// Drains one step of the session's queue.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn process(&self, session: &Arc<Session>) -> ProcessResult {
        let mut inner = session.lock();

        if !inner.state.is_deliverable() {
            return ProcessResult::RemoveProcess;
        }
        if inner.outbound.is_some() {
            return ProcessResult::BackoffProcess;
        }

        let Some(head) = inner.queue.peek().cloned() else {
            self.finish_awake_drain(session, &mut inner);
            return ProcessResult::RemoveProcess;
        };

        let resolved = inner.topics.lookup_by_topic(&head.topic);
        let Some((alias, kind)) = resolved else {
            // REGISTER round-trip required; the publish re-queues behind it.
            let alias = match inner.topics.register(&head.topic) {
                Ok(alias) => alias,
                Err(GatewayError::RegistryFull) => {
                    warn!(
                        client_id = session.client_id(),
                        topic = %head.topic,
                        "alias space exhausted, dead-lettering"
                    );
                    inner.queue.dequeue();
                    let evicted = self.dead_letters.push(
                        session.client_id(),
                        &head.topic,
                        head.payload_id,
                        DeadLetterReason::AliasExhausted,
                    );
                    self.release_dead_letter_eviction(evicted);
                    self.stats.dead_letter();
                    return if inner.queue.is_empty() {
                        ProcessResult::RemoveProcess
                    } else {
                        ProcessResult::Reprocess
                    };
                }
                Err(_) => return ProcessResult::BackoffProcess,
            };
            match inflight::begin_register(
                &mut inner,
                &self.factory,
                &self.config,
                head.topic.clone(),
                alias,
            ) {
                Ok(frame) => {
                    self.send(session, &mut inner, &frame);
                    return ProcessResult::BackoffProcess;
                }
                Err(_) => return ProcessResult::BackoffProcess,
            }
        };

        let Some(payload) = self.payloads.get(head.payload_id) else {
            // payload evicted under us; drop the stale entry
            inner.queue.dequeue();
            return ProcessResult::Reprocess;
        };

        if head.qos == QoS::AtMostOnce {
            inner.queue.dequeue();
            let frame = self.factory.publish(
                false,
                QoS::AtMostOnce,
                head.retain,
                kind.into(),
                alias,
                0,
                payload.to_vec(),
            );
            self.send(session, &mut inner, &frame);
            let _ = self.payloads.release(head.payload_id);
            self.stats.publish_routed();
            if inner.queue.is_empty() {
                self.finish_awake_drain(session, &mut inner);
                return ProcessResult::RemoveProcess;
            }
            return ProcessResult::Reprocess;
        }

        inner.queue.dequeue();
        match inflight::begin_publish(
            &mut inner,
            &self.factory,
            &self.config,
            head.topic.clone(),
            alias,
            kind.into(),
            head.qos,
            head.retain,
            head.payload_id,
            payload.to_vec(),
        ) {
            Ok(frame) => {
                self.send(session, &mut inner, &frame);
                self.stats.publish_routed();
                if inner.queue.is_empty() {
                    ProcessResult::RemoveProcess
                } else {
                    ProcessResult::BackoffProcess
                }
            }
            Err(_) => ProcessResult::BackoffProcess,
        }
    }

    /// An AWAKE session whose queue just drained gets its PINGRESP and goes
    /// back to sleep.
    fn finish_awake_drain(&self, session: &Session, inner: &mut SessionInner) {
        if inner.state == ClientState::Awake
            && inner.outbound.is_none()
            && inner.transition(ClientState::Asleep).is_ok()
        {
            debug!(client_id = session.client_id(), "awake drain complete");
            let pingresp = self.factory.pingresp();
            self.send(session, inner, &pingresp);
        }
    }

    /// Drives the retry clock for the session's inflight slot.
    pub fn check_retries(&self, session: &Arc<Session>, now: Instant) {
        let mut inner = session.lock();
        if !matches!(inner.state, ClientState::Active | ClientState::Awake) {
            return;
        }
        let payload = inflight::inflight_payload(&inner)
            .and_then(|id| self.payloads.get(id))
            .map(|bytes| bytes.to_vec());

        match inflight::check_retry(&mut inner, &self.factory, &self.config, payload, now) {
            inflight::RetryDecision::Wait => {}
            inflight::RetryDecision::Resend(frame) => {
                debug!(client_id = session.client_id(), "retransmitting");
                self.stats.retry();
                self.send(session, &mut inner, &frame);
            }
            inflight::RetryDecision::Exhausted { topic, payload_id } => {
                warn!(
                    client_id = session.client_id(),
                    topic = %topic,
                    "retries exhausted, dead-lettering"
                );
                if let Some(payload_id) = payload_id {
                    let evicted = self.dead_letters.push(
                        session.client_id(),
                        &topic,
                        payload_id,
                        DeadLetterReason::RetryExhausted,
                    );
                    self.release_dead_letter_eviction(evicted);
                    self.stats.dead_letter();
                }
            }
        }
    }
}
