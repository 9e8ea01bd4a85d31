//! Session state: the client lifecycle machine and everything the gateway
//! tracks per remote device.

mod registry;

pub use registry::{SessionRegistry, SweepOutcome};

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Mutex, MutexGuard};

use mqttsn_codec::{ProtocolVersion, QoS};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::inflight::{InboundInflight, InflightSlot};
use crate::queue::SessionQueue;
use crate::topic::{PredefinedAliases, TopicRegistry};

/// Session expiry interval meaning "never".
pub const EXPIRY_NEVER: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    Disconnected,
    Active,
    Asleep,
    Awake,
    Lost,
}

impl ClientState {
    /// The legal transition table. Reconnecting out of sleep is permitted;
    /// everything else follows the lifecycle exactly.
    #[must_use]
    pub fn allows(self, next: ClientState) -> bool {
        use ClientState::{Active, Asleep, Awake, Disconnected, Lost};
        matches!(
            (self, next),
            (Disconnected, Active)
                | (Active, Disconnected | Asleep | Lost)
                | (Asleep, Awake | Active | Lost | Disconnected)
                | (Awake, Asleep | Active | Lost)
                | (Lost, Active | Disconnected)
        )
    }

    /// States whose queues the scheduler drains.
    #[must_use]
    pub fn is_deliverable(self) -> bool {
        matches!(self, ClientState::Active | ClientState::Awake)
    }
}

/// Last will, fired on ungraceful loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WillRecord {
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,
    pub payload: Vec<u8>,
}

/// Progress of the CONNECT-time will exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WillNegotiation {
    /// WILLTOPICREQ sent, CONNACK held back.
    AwaitingTopic,
    /// WILLMSGREQ sent.
    AwaitingMessage {
        topic: String,
        qos: QoS,
        retain: bool,
    },
}

/// Everything mutable about a session, behind the session lock. Handler,
/// queue processor and expiry monitor all serialize on it, which is what
/// keeps acknowledgements from racing the next send.
#[derive(Debug)]
pub struct SessionInner {
    pub state: ClientState,
    pub last_seen: Instant,
    pub session_started: SystemTime,
    pub keep_alive: Duration,
    /// Seconds; [`EXPIRY_NEVER`] disables expiry.
    pub session_expiry: u32,
    pub max_packet_size: usize,
    pub protocol_version: ProtocolVersion,
    pub will: Option<WillRecord>,
    pub will_negotiation: Option<WillNegotiation>,
    pub topics: TopicRegistry,
    pub queue: SessionQueue,
    pub outbound: Option<InflightSlot>,
    pub inbound: Option<InboundInflight>,
    /// Mirror of the filters installed in the matcher.
    pub subscriptions: Vec<String>,
    /// Requested sleep window while ASLEEP/AWAKE.
    pub sleep_duration: Option<Duration>,
    next_msg_id: u16,
}

impl SessionInner {
    /// Stamps traffic from the device. A LOST session that speaks again
    /// comes back ACTIVE.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
        if self.state == ClientState::Lost {
            self.state = ClientState::Active;
        }
    }

    /// # Errors
    /// `InvalidTransition` for anything outside the lifecycle table.
    pub fn transition(&mut self, next: ClientState) -> Result<()> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.allows(next) {
            return Err(GatewayError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Next free 16-bit message id: monotonic, wraps at 0xFFFF, skips 0 and
    /// ids still awaiting acknowledgement.
    ///
    /// # Errors
    /// `MessageIdExhausted` when every id is in use.
    pub fn allocate_msg_id(&mut self) -> Result<u16> {
        for _ in 0..=u16::MAX {
            let candidate = self.next_msg_id;
            self.next_msg_id = if self.next_msg_id == u16::MAX {
                1
            } else {
                self.next_msg_id + 1
            };
            let in_use = self.outbound.as_ref().is_some_and(|s| s.msg_id == candidate)
                || self.inbound.as_ref().is_some_and(|s| s.msg_id == candidate);
            if !in_use {
                return Ok(candidate);
            }
        }
        Err(GatewayError::MessageIdExhausted)
    }

    /// Whether the keepalive (or sleep) window, widened by the grace
    /// factor, has elapsed without traffic.
    #[must_use]
    pub fn keepalive_expired(&self, config: &GatewayConfig, now: Instant) -> bool {
        let window = match self.state {
            ClientState::Active | ClientState::Awake => {
                if self.keep_alive.is_zero() {
                    return false;
                }
                self.keep_alive
            }
            ClientState::Asleep => match self.sleep_duration {
                Some(duration) => duration,
                None => return false,
            },
            ClientState::Lost | ClientState::Disconnected => return false,
        };
        now.duration_since(self.last_seen) > config.keepalive_timeout(window)
    }

    /// Whether the session-expiry interval has elapsed since last traffic.
    #[must_use]
    pub fn expired(&self, now: Instant) -> bool {
        if self.session_expiry == EXPIRY_NEVER {
            return false;
        }
        now.duration_since(self.last_seen) > Duration::from_secs(u64::from(self.session_expiry))
    }
}

/// Read-only view for the admin surface.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub client_id: String,
    pub state: ClientState,
    pub since_last_seen: Duration,
    pub session_started: SystemTime,
    pub keep_alive: Duration,
    pub queue_depth: usize,
    pub inflight: bool,
    pub subscription_count: usize,
}

#[derive(Debug)]
pub struct Session {
    client_id: String,
    inner: Mutex<SessionInner>,
}

impl Session {
    #[must_use]
    pub fn new(
        client_id: &str,
        predefined: Arc<PredefinedAliases>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            inner: Mutex::new(SessionInner {
                state: ClientState::Disconnected,
                last_seen: Instant::now(),
                session_started: SystemTime::now(),
                keep_alive: Duration::ZERO,
                session_expiry: EXPIRY_NEVER,
                max_packet_size: usize::from(u16::MAX),
                protocol_version: config.protocol_version,
                will: None,
                will_negotiation: None,
                topics: TopicRegistry::new(predefined),
                queue: SessionQueue::new(config.max_queue_size),
                outbound: None,
                inbound: None,
                subscriptions: Vec::new(),
                sleep_duration: None,
                next_msg_id: 1,
            }),
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Serializes all per-session work.
    pub fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock()
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.inner.lock().state
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock();
        SessionSnapshot {
            client_id: self.client_id.clone(),
            state: inner.state,
            since_last_seen: inner.last_seen.elapsed(),
            session_started: inner.session_started,
            keep_alive: inner.keep_alive,
            queue_depth: inner.queue.len(),
            inflight: inner.outbound.is_some(),
            subscription_count: inner.subscriptions.len(),
        }
    }
}
