//! Message state service: the single outbound inflight slot per session,
//! its acknowledgement phases, and the retry/dead-letter policy.
//!
//! The functions here mutate a locked [`SessionInner`] and hand back typed
//! outcomes; callers own the payload registry and the wire.

use std::time::Instant;

use uuid::Uuid;

use mqttsn_codec::{Message, MessageFactory, QoS, TopicIdType};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::session::SessionInner;

/// Which acknowledgement the slot is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPhase {
    /// QoS 1 publish awaiting PUBACK.
    PubAck,
    /// QoS 2 publish awaiting PUBREC.
    PubRec,
    /// QoS 2 publish, PUBREL sent, awaiting PUBCOMP.
    PubComp,
    /// Gateway REGISTER awaiting REGACK.
    RegAck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InflightKind {
    Publish {
        topic: String,
        topic_id: u16,
        topic_id_type: TopicIdType,
        qos: QoS,
        retain: bool,
        payload_id: Uuid,
    },
    /// A REGISTER round-trip blocking the publish at the queue head.
    Register { topic: String, topic_id: u16 },
}

/// The one outbound message awaiting acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InflightSlot {
    pub msg_id: u16,
    pub kind: InflightKind,
    pub phase: AckPhase,
    pub attempt: u32,
    pub deadline: Instant,
}

/// Inbound QoS 2 publish held between PUBREC and PUBREL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundInflight {
    pub msg_id: u16,
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,
    pub payload: Vec<u8>,
}

/// What a completed acknowledgement freed up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// Publish acknowledged; the caller releases this payload reference.
    PublishDone { payload_id: Uuid },
    /// REGISTER acknowledged; the queue head may now proceed.
    RegisterDone { topic: String },
    /// QoS 2 midpoint: send this PUBREL, slot stays occupied.
    SendPubRel(Message),
    /// No slot, or the id did not match; duplicate acks are ignored.
    Ignored,
}

/// Outcome of a deadline check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Deadline not reached (or nothing inflight).
    Wait,
    /// Resend this frame; DUP is set for publishes.
    Resend(Message),
    /// Attempts exhausted; slot cleared. The caller dead-letters the
    /// payload (publishes) or drops the registration.
    Exhausted {
        topic: String,
        payload_id: Option<Uuid>,
    },
}

fn build_frame(factory: &MessageFactory, slot: &InflightSlot, payload: Vec<u8>, dup: bool) -> Message {
    match &slot.kind {
        InflightKind::Publish {
            topic_id,
            topic_id_type,
            qos,
            retain,
            ..
        } => factory.publish(
            dup,
            *qos,
            *retain,
            *topic_id_type,
            *topic_id,
            slot.msg_id,
            payload,
        ),
        InflightKind::Register { topic, topic_id } => {
            factory.register(*topic_id, slot.msg_id, topic)
        }
    }
}

/// Occupies the slot with a publish and returns the frame to send.
///
/// # Errors
/// `InflightOccupied` when a message is already awaiting acknowledgement.
#[allow(clippy::too_many_arguments)]
pub fn begin_publish(
    inner: &mut SessionInner,
    factory: &MessageFactory,
    config: &GatewayConfig,
    topic: String,
    topic_id: u16,
    topic_id_type: TopicIdType,
    qos: QoS,
    retain: bool,
    payload_id: Uuid,
    payload: Vec<u8>,
) -> Result<Message> {
    if let Some(slot) = &inner.outbound {
        return Err(GatewayError::InflightOccupied(slot.msg_id));
    }
    let msg_id = inner.allocate_msg_id()?;
    let phase = match qos {
        QoS::ExactlyOnce => AckPhase::PubRec,
        _ => AckPhase::PubAck,
    };
    let slot = InflightSlot {
        msg_id,
        kind: InflightKind::Publish {
            topic,
            topic_id,
            topic_id_type,
            qos,
            retain,
            payload_id,
        },
        phase,
        attempt: 1,
        deadline: Instant::now() + config.retry_timeout,
    };
    let frame = build_frame(factory, &slot, payload, false);
    inner.outbound = Some(slot);
    Ok(frame)
}

/// Occupies the slot with a gateway REGISTER.
///
/// # Errors
/// `InflightOccupied` when a message is already awaiting acknowledgement.
pub fn begin_register(
    inner: &mut SessionInner,
    factory: &MessageFactory,
    config: &GatewayConfig,
    topic: String,
    topic_id: u16,
) -> Result<Message> {
    if let Some(slot) = &inner.outbound {
        return Err(GatewayError::InflightOccupied(slot.msg_id));
    }
    let msg_id = inner.allocate_msg_id()?;
    let slot = InflightSlot {
        msg_id,
        kind: InflightKind::Register { topic, topic_id },
        phase: AckPhase::RegAck,
        attempt: 1,
        deadline: Instant::now() + config.retry_timeout,
    };
    let frame = build_frame(factory, &slot, Vec::new(), false);
    inner.outbound = Some(slot);
    Ok(frame)
}

/// Handles PUBACK for the occupied slot.
#[must_use]
pub fn on_puback(inner: &mut SessionInner, msg_id: u16) -> AckOutcome {
    match &inner.outbound {
        Some(slot) if slot.msg_id == msg_id && slot.phase == AckPhase::PubAck => {
            let Some(InflightSlot {
                kind: InflightKind::Publish { payload_id, .. },
                ..
            }) = inner.outbound.take()
            else {
                return AckOutcome::Ignored;
            };
            AckOutcome::PublishDone { payload_id }
        }
        _ => AckOutcome::Ignored,
    }
}

/// Handles PUBREC: moves a QoS 2 publish to the PUBCOMP phase and emits the
/// PUBREL. The retry clock restarts for the new phase.
#[must_use]
pub fn on_pubrec(inner: &mut SessionInner, config: &GatewayConfig, msg_id: u16) -> AckOutcome {
    match inner.outbound.as_mut() {
        Some(slot) if slot.msg_id == msg_id && slot.phase == AckPhase::PubRec => {
            slot.phase = AckPhase::PubComp;
            slot.attempt = 1;
            slot.deadline = Instant::now() + config.retry_timeout;
            AckOutcome::SendPubRel(Message::PubRel(mqttsn_codec::PubRel { msg_id }))
        }
        _ => AckOutcome::Ignored,
    }
}

/// Handles PUBCOMP, completing a QoS 2 flow.
#[must_use]
pub fn on_pubcomp(inner: &mut SessionInner, msg_id: u16) -> AckOutcome {
    match &inner.outbound {
        Some(slot) if slot.msg_id == msg_id && slot.phase == AckPhase::PubComp => {
            let Some(InflightSlot {
                kind: InflightKind::Publish { payload_id, .. },
                ..
            }) = inner.outbound.take()
            else {
                return AckOutcome::Ignored;
            };
            AckOutcome::PublishDone { payload_id }
        }
        _ => AckOutcome::Ignored,
    }
}

/// Handles REGACK for a gateway-initiated REGISTER.
#[must_use]
pub fn on_regack(inner: &mut SessionInner, msg_id: u16) -> AckOutcome {
    match &inner.outbound {
        Some(slot) if slot.msg_id == msg_id && slot.phase == AckPhase::RegAck => {
            let Some(InflightSlot {
                kind: InflightKind::Register { topic, .. },
                ..
            }) = inner.outbound.take()
            else {
                return AckOutcome::Ignored;
            };
            AckOutcome::RegisterDone { topic }
        }
        _ => AckOutcome::Ignored,
    }
}

/// Checks the retry deadline. On expiry the frame is rebuilt with DUP set
/// and the attempt counter bumped, until `max_retries` is exhausted.
pub fn check_retry(
    inner: &mut SessionInner,
    factory: &MessageFactory,
    config: &GatewayConfig,
    payload: Option<Vec<u8>>,
    now: Instant,
) -> RetryDecision {
    let Some(mut slot) = inner.outbound.take() else {
        return RetryDecision::Wait;
    };
    if now < slot.deadline {
        inner.outbound = Some(slot);
        return RetryDecision::Wait;
    }

    if slot.attempt >= config.max_retries {
        let (topic, payload_id) = match slot.kind {
            InflightKind::Publish {
                topic, payload_id, ..
            } => (topic, Some(payload_id)),
            InflightKind::Register { topic, .. } => (topic, None),
        };
        return RetryDecision::Exhausted { topic, payload_id };
    }

    slot.attempt += 1;
    slot.deadline = now + config.retry_timeout;
    // PUBCOMP-phase retries resend the PUBREL, not the publish.
    let frame = if slot.phase == AckPhase::PubComp {
        Message::PubRel(mqttsn_codec::PubRel { msg_id: slot.msg_id })
    } else {
        build_frame(factory, &slot, payload.unwrap_or_default(), true)
    };
    inner.outbound = Some(slot);
    RetryDecision::Resend(frame)
}

/// The payload id the occupied slot references, if any (used to look the
/// bytes up before a retry).
#[must_use]
pub fn inflight_payload(inner: &SessionInner) -> Option<Uuid> {
    match &inner.outbound {
        Some(InflightSlot {
            kind: InflightKind::Publish { payload_id, .. },
            ..
        }) => Some(*payload_id),
        _ => None,
    }
}
