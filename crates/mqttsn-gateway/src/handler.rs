//! Protocol semantics: decoded frames come in with their network context,
//! session state mutates, responses go out.
//!
//! Errors never propagate above this layer. Malformed frames are dropped at
//! debug (with a rate-limited warning on floods), protocol violations get
//! the defined rejection code where one exists, and anything fatal is fatal
//! for that session only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use mqttsn_codec::{
    Connect, Disconnect, Message, MessageFactory, PingReq, PubAck, PubComp, PubRec, PubRel,
    Publish, QoS, RegAck, Register, ReturnCode, SearchGw, Subscribe, TopicIdType, TopicSpec,
    UnsubAck, Unsubscribe, WillMsg, WillMsgUpd, WillTopic, WillTopicUpd,
};

use crate::auth::Authenticator;
use crate::config::GatewayConfig;
use crate::connector::Connector;
use crate::error::GatewayError;
use crate::inflight::{self, AckOutcome, InboundInflight};
use crate::net::{NetworkAddress, NetworkRegistry};
use crate::payload::PayloadRegistry;
use crate::queue::{DeadLetterQueue, DeadLetterReason, QueuedPublish};
use crate::scheduler::QueueScheduler;
use crate::session::{
    ClientState, Session, SessionRegistry, WillNegotiation, WillRecord,
};
use crate::stats::GatewayStats;
use crate::subscription::SubscriptionTree;
use crate::topic::AliasKind;
use crate::transport::Transport;

/// Codec-error floods per address: over this many in the window, one
/// warning is emitted and the rest stay at debug.
const FLOOD_THRESHOLD: u32 = 10;
const FLOOD_WINDOW: Duration = Duration::from_secs(10);
const SEARCH_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct FloodWindowState {
    count: u32,
    window_start: Instant,
    warned: bool,
}

pub struct MessageHandler {
    config: Arc<GatewayConfig>,
    factory: MessageFactory,
    sessions: Arc<SessionRegistry>,
    network: Arc<NetworkRegistry>,
    subscriptions: Arc<RwLock<SubscriptionTree>>,
    payloads: Arc<PayloadRegistry>,
    dead_letters: Arc<DeadLetterQueue>,
    scheduler: Arc<QueueScheduler>,
    transport: Arc<dyn Transport>,
    connector: Arc<dyn Connector>,
    authenticator: Option<Arc<dyn Authenticator>>,
    stats: Arc<GatewayStats>,
    floods: Mutex<HashMap<NetworkAddress, FloodWindowState>>,
}

impl MessageHandler {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<GatewayConfig>,
        factory: MessageFactory,
        sessions: Arc<SessionRegistry>,
        network: Arc<NetworkRegistry>,
        subscriptions: Arc<RwLock<SubscriptionTree>>,
        payloads: Arc<PayloadRegistry>,
        dead_letters: Arc<DeadLetterQueue>,
        scheduler: Arc<QueueScheduler>,
        transport: Arc<dyn Transport>,
        connector: Arc<dyn Connector>,
        authenticator: Option<Arc<dyn Authenticator>>,
        stats: Arc<GatewayStats>,
    ) -> Self {
        Self {
            config,
            factory,
            sessions,
            network,
            subscriptions,
            payloads,
            dead_letters,
            scheduler,
            transport,
            connector,
            authenticator,
            stats,
            floods: Mutex::new(HashMap::new()),
        }
    }

    /// Entry point for the transport reader.
    pub async fn handle_datagram(&self, address: NetworkAddress, bytes: &[u8]) {
        self.stats.frame_in(bytes.len());
        self.network.touch(address);

        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(error) => {
                self.note_decode_error(address, &error.to_string());
                return;
            }
        };

        // Forwarder encapsulation is the outermost layer on the wire; the
        // inner frame is applied as if it arrived from the wireless device,
        // with the forwarder's address standing in for it.
        let message = match message {
            Message::Encapsulated(frame) => {
                debug!(
                    %address,
                    wireless_node_id = ?frame.wireless_node_id,
                    radius = frame.radius,
                    "forwarder encapsulation"
                );
                match *frame.message {
                    Message::Encapsulated(_) => {
                        debug!(%address, "nested forwarder encapsulation, dropping");
                        return;
                    }
                    inner => inner,
                }
            }
            other => other,
        };

        let message = match message {
            Message::Integrity(envelope) => {
                if !self.config.integrity_enabled {
                    debug!(%address, "integrity frame while integrity disabled, dropping");
                    return;
                }
                // Tag verification belongs to the security layer; the
                // runtime unwraps the envelope and applies the inner frame.
                match envelope.inner() {
                    Ok(inner) => inner,
                    Err(error) => {
                        self.note_decode_error(address, &error.to_string());
                        return;
                    }
                }
            }
            other => other,
        };

        match message {
            Message::Connect(connect) => self.on_connect(address, connect).await,
            Message::SearchGw(search) => self.on_searchgw(address, &search),
            Message::PingReq(pingreq) => self.on_pingreq(address, &pingreq),
            Message::WillTopic(will_topic) => self.on_will_topic(address, will_topic),
            Message::WillMsg(will_msg) => self.on_will_msg(address, &will_msg),
            other => self.dispatch_bound(address, other).await,
        }
    }

    /// Messages that require an established session binding.
    async fn dispatch_bound(&self, address: NetworkAddress, message: Message) {
        let Some(session) = self.session_for(address) else {
            debug!(%address, message_type = message.message_type(), "frame from unbound address");
            return;
        };
        session.lock().touch();

        match message {
            Message::Register(register) => self.on_register(address, &session, &register),
            Message::RegAck(regack) => self.on_regack(&session, &regack),
            Message::Publish(publish) => self.on_publish(address, &session, publish).await,
            Message::PubAck(puback) => self.on_puback(&session, &puback),
            Message::PubRec(pubrec) => self.on_pubrec(address, &session, &pubrec),
            Message::PubRel(pubrel) => self.on_pubrel(address, &session, &pubrel).await,
            Message::PubComp(pubcomp) => self.on_pubcomp(&session, &pubcomp),
            Message::Subscribe(subscribe) => self.on_subscribe(address, &session, subscribe).await,
            Message::Unsubscribe(unsubscribe) => {
                self.on_unsubscribe(address, &session, &unsubscribe);
            }
            Message::PingResp(_) => {}
            Message::Disconnect(disconnect) => {
                self.on_disconnect(address, &session, disconnect);
            }
            Message::WillTopicUpd(update) => self.on_will_topic_upd(address, &session, update),
            Message::WillMsgUpd(update) => self.on_will_msg_upd(address, &session, &update),
            other => {
                debug!(
                    client_id = session.client_id(),
                    message_type = other.message_type(),
                    "unexpected frame, dropping"
                );
            }
        }
    }

    fn session_for(&self, address: NetworkAddress) -> Option<Arc<Session>> {
        self.network
            .client_for(&address)
            .and_then(|client_id| self.sessions.get(&client_id))
    }

    fn send_to(&self, address: NetworkAddress, message: &Message) {
        match message.encode() {
            Ok(frame) => {
                if let Err(error) = self.transport.send(address, &frame) {
                    warn!(%address, %error, "send failed");
                    if let Some(session) = self.session_for(address) {
                        let _ = session.lock().transition(ClientState::Lost);
                    }
                } else {
                    self.stats.frame_out(frame.len());
                }
            }
            Err(error) => warn!(%address, %error, "encode failed"),
        }
    }

    fn note_decode_error(&self, address: NetworkAddress, error: &str) {
        self.stats.decode_error();
        debug!(%address, error, "dropping malformed frame");

        let mut floods = self.floods.lock();
        let now = Instant::now();
        let entry = floods.entry(address).or_insert(FloodWindowState {
            count: 0,
            window_start: now,
            warned: false,
        });
        if now.duration_since(entry.window_start) > FLOOD_WINDOW {
            *entry = FloodWindowState {
                count: 0,
                window_start: now,
                warned: false,
            };
        }
        entry.count += 1;
        if entry.count >= FLOOD_THRESHOLD && !entry.warned {
            entry.warned = true;
            warn!(%address, count = entry.count, "malformed frame flood");
        }
    }

    async fn authenticate(&self, client_id: &str, address: &NetworkAddress) -> bool {
        match &self.authenticator {
            Some(authenticator) => authenticator.authenticate(client_id, address).await,
            None => self.config.allow_anonymous,
        }
    }

    async fn on_connect(&self, address: NetworkAddress, connect: Connect) {
        if !self.authenticate(&connect.client_id, &address).await {
            info!(client_id = %connect.client_id, %address, "connect rejected (auth)");
            self.send_to(address, &self.factory.connack(ReturnCode::NotSupported));
            return;
        }

        let (session, resumed) = match self.sessions.create_or_resume(&connect.client_id) {
            Ok(result) => result,
            Err(GatewayError::MaxSessionsReached(max)) => {
                warn!(client_id = %connect.client_id, max, "connect rejected (capacity)");
                self.send_to(address, &self.factory.connack(ReturnCode::Congestion));
                return;
            }
            Err(error) => {
                warn!(client_id = %connect.client_id, %error, "connect failed");
                self.send_to(address, &self.factory.connack(ReturnCode::NotSupported));
                return;
            }
        };

        self.network.bind(address, &connect.client_id);

        let wants_will = {
            let mut inner = session.lock();
            inner.touch();
            inner.keep_alive = Duration::from_secs(u64::from(connect.duration));
            inner.sleep_duration = None;

            if connect.clean_session {
                inner.topics.clear_normal();
                inner.will = None;
                for publish in inner.queue.drain() {
                    let _ = self.payloads.release(publish.payload_id);
                }
                if let Some(payload_id) = inflight::inflight_payload(&inner) {
                    let _ = self.payloads.release(payload_id);
                }
                inner.outbound = None;
                inner.inbound = None;
                inner.subscriptions.clear();
                self.subscriptions.write().remove_client(&connect.client_id);
            }

            if let Err(error) = inner.transition(ClientState::Active) {
                debug!(client_id = %connect.client_id, %error, "connect transition");
            }

            if connect.will {
                inner.will_negotiation = Some(WillNegotiation::AwaitingTopic);
            }
            connect.will
        };

        info!(client_id = %connect.client_id, %address, resumed, "connected");
        self.stats.record_event(&connect.client_id, "connected");

        if wants_will {
            // CONNACK is held back until the will exchange completes
            self.send_to(address, &self.factory.will_topic_req());
        } else {
            self.send_to(address, &self.factory.connack(ReturnCode::Accepted));
        }
        self.scheduler.schedule(&connect.client_id);
    }

    fn on_will_topic(&self, address: NetworkAddress, will_topic: WillTopic) {
        let Some(session) = self.session_for(address) else {
            debug!(%address, "WILLTOPIC from unbound address");
            return;
        };
        let mut inner = session.lock();
        inner.touch();
        match (&inner.will_negotiation, will_topic.topic) {
            (Some(WillNegotiation::AwaitingTopic), Some(topic)) => {
                inner.will_negotiation = Some(WillNegotiation::AwaitingMessage {
                    topic,
                    qos: will_topic.qos,
                    retain: will_topic.retain,
                });
                drop(inner);
                self.send_to(address, &self.factory.will_msg_req());
            }
            (Some(WillNegotiation::AwaitingTopic), None) => {
                // empty WILLTOPIC deletes the will
                inner.will = None;
                inner.will_negotiation = None;
                drop(inner);
                self.send_to(address, &self.factory.connack(ReturnCode::Accepted));
            }
            _ => debug!(client_id = session.client_id(), "unsolicited WILLTOPIC"),
        }
    }

    fn on_will_msg(&self, address: NetworkAddress, will_msg: &WillMsg) {
        let Some(session) = self.session_for(address) else {
            debug!(%address, "WILLMSG from unbound address");
            return;
        };
        let mut inner = session.lock();
        inner.touch();
        if let Some(WillNegotiation::AwaitingMessage { topic, qos, retain }) =
            inner.will_negotiation.take()
        {
            inner.will = Some(WillRecord {
                topic,
                qos,
                retain,
                payload: will_msg.payload.clone(),
            });
            drop(inner);
            self.send_to(address, &self.factory.connack(ReturnCode::Accepted));
        } else {
            debug!(client_id = session.client_id(), "unsolicited WILLMSG");
        }
    }

    fn on_will_topic_upd(&self, address: NetworkAddress, session: &Arc<Session>, update: WillTopicUpd) {
        let mut inner = session.lock();
        match update.topic {
            Some(topic) => {
                let payload = inner
                    .will
                    .as_ref()
                    .map(|will| will.payload.clone())
                    .unwrap_or_default();
                inner.will = Some(WillRecord {
                    topic,
                    qos: update.qos,
                    retain: update.retain,
                    payload,
                });
            }
            None => inner.will = None,
        }
        drop(inner);
        self.send_to(
            address,
            &Message::WillTopicResp(mqttsn_codec::WillTopicResp {
                return_code: ReturnCode::Accepted,
            }),
        );
    }

    fn on_will_msg_upd(&self, address: NetworkAddress, session: &Arc<Session>, update: &WillMsgUpd) {
        let mut inner = session.lock();
        if let Some(will) = inner.will.as_mut() {
            will.payload.clone_from(&update.payload);
        }
        drop(inner);
        self.send_to(
            address,
            &Message::WillMsgResp(mqttsn_codec::WillMsgResp {
                return_code: ReturnCode::Accepted,
            }),
        );
    }

    fn on_register(&self, address: NetworkAddress, session: &Arc<Session>, register: &Register) {
        let mut inner = session.lock();
        let response = match inner.topics.register(&register.topic_name) {
            Ok(alias) => self
                .factory
                .regack(alias, register.msg_id, ReturnCode::Accepted),
            Err(GatewayError::RegistryFull) => {
                warn!(client_id = session.client_id(), "alias space exhausted");
                self.factory
                    .regack(0, register.msg_id, ReturnCode::Congestion)
            }
            Err(error) => {
                debug!(client_id = session.client_id(), %error, "register failed");
                self.factory
                    .regack(0, register.msg_id, ReturnCode::NotSupported)
            }
        };
        drop(inner);
        self.send_to(address, &response);
    }

    fn on_regack(&self, session: &Arc<Session>, regack: &RegAck) {
        let outcome = {
            let mut inner = session.lock();
            inflight::on_regack(&mut inner, regack.msg_id)
        };
        match outcome {
            AckOutcome::RegisterDone { topic } => {
                debug!(client_id = session.client_id(), topic = %topic, "register acknowledged");
                self.scheduler.schedule(session.client_id());
            }
            _ => debug!(client_id = session.client_id(), "stray REGACK"),
        }
    }

    fn resolve_publish_topic(
        &self,
        session: &Arc<Session>,
        topic_id_type: TopicIdType,
        topic_id: u16,
    ) -> Option<String> {
        let inner = session.lock();
        inner
            .topics
            .lookup_by_alias(topic_id, AliasKind::from(topic_id_type))
    }

    async fn on_publish(&self, address: NetworkAddress, session: &Arc<Session>, publish: Publish) {
        let Some(topic) =
            self.resolve_publish_topic(session, publish.topic_id_type, publish.topic_id)
        else {
            debug!(
                client_id = session.client_id(),
                topic_id = publish.topic_id,
                "publish with unknown alias"
            );
            if publish.qos >= QoS::AtLeastOnce {
                self.send_to(
                    address,
                    &self.factory.puback(
                        publish.topic_id,
                        publish.msg_id,
                        ReturnCode::InvalidTopicId,
                    ),
                );
            }
            return;
        };

        if publish.qos == QoS::ExactlyOnce {
            let mut inner = session.lock();
            match &inner.inbound {
                Some(pending) if pending.msg_id == publish.msg_id => {
                    // duplicate of the held publish
                }
                Some(_) => {
                    debug!(
                        client_id = session.client_id(),
                        "second inbound publish while one is held, dropping"
                    );
                    return;
                }
                None => {
                    inner.inbound = Some(InboundInflight {
                        msg_id: publish.msg_id,
                        topic,
                        qos: publish.qos,
                        retain: publish.retain,
                        payload: publish.payload,
                    });
                }
            }
            drop(inner);
            self.send_to(
                address,
                &Message::PubRec(PubRec {
                    msg_id: publish.msg_id,
                }),
            );
            return;
        }

        let accepted = self
            .deliver_upstream(&topic, publish.qos, publish.retain, &publish.payload)
            .await;

        if publish.qos == QoS::AtLeastOnce {
            let return_code = if accepted {
                ReturnCode::Accepted
            } else {
                ReturnCode::Congestion
            };
            self.send_to(
                address,
                &self
                    .factory
                    .puback(publish.topic_id, publish.msg_id, return_code),
            );
        }
    }

    /// Hands a device publish to the upstream side. For the loopback
    /// connector this re-injects into the local fan-out.
    async fn deliver_upstream(&self, topic: &str, qos: QoS, retain: bool, payload: &[u8]) -> bool {
        match self.connector.publish(topic, qos, retain, payload).await {
            Ok(()) => true,
            Err(error) => {
                warn!(topic, %error, "upstream publish failed");
                false
            }
        }
    }

    fn on_puback(&self, session: &Arc<Session>, puback: &PubAck) {
        let outcome = {
            let mut inner = session.lock();
            inflight::on_puback(&mut inner, puback.msg_id)
        };
        match outcome {
            AckOutcome::PublishDone { payload_id } => {
                let _ = self.payloads.release(payload_id);
                self.scheduler.schedule(session.client_id());
            }
            _ => debug!(
                client_id = session.client_id(),
                msg_id = puback.msg_id,
                "stray PUBACK"
            ),
        }
    }

    fn on_pubrec(&self, address: NetworkAddress, session: &Arc<Session>, pubrec: &PubRec) {
        let outcome = {
            let mut inner = session.lock();
            inflight::on_pubrec(&mut inner, &self.config, pubrec.msg_id)
        };
        match outcome {
            AckOutcome::SendPubRel(frame) => self.send_to(address, &frame),
            _ => debug!(client_id = session.client_id(), "stray PUBREC"),
        }
    }

    async fn on_pubrel(&self, address: NetworkAddress, session: &Arc<Session>, pubrel: &PubRel) {
        let pending = {
            let mut inner = session.lock();
            match &inner.inbound {
                Some(held) if held.msg_id == pubrel.msg_id => inner.inbound.take(),
                _ => None,
            }
        };
        if let Some(held) = pending {
            let _ = self
                .deliver_upstream(&held.topic, held.qos, held.retain, &held.payload)
                .await;
        }
        self.send_to(
            address,
            &Message::PubComp(PubComp {
                msg_id: pubrel.msg_id,
            }),
        );
    }

    fn on_pubcomp(&self, session: &Arc<Session>, pubcomp: &PubComp) {
        let outcome = {
            let mut inner = session.lock();
            inflight::on_pubcomp(&mut inner, pubcomp.msg_id)
        };
        match outcome {
            AckOutcome::PublishDone { payload_id } => {
                let _ = self.payloads.release(payload_id);
                self.scheduler.schedule(session.client_id());
            }
            _ => debug!(client_id = session.client_id(), "stray PUBCOMP"),
        }
    }

    async fn on_subscribe(&self, address: NetworkAddress, session: &Arc<Session>, subscribe: Subscribe) {
        let filter = match &subscribe.topic {
            TopicSpec::Name(name) => name.clone(),
            TopicSpec::Predefined(id) => {
                let inner = session.lock();
                match inner.topics.lookup_by_alias(*id, AliasKind::Predefined) {
                    Some(topic) => topic,
                    None => {
                        drop(inner);
                        self.send_to(
                            address,
                            &self.factory.suback(
                                QoS::AtMostOnce,
                                0,
                                subscribe.msg_id,
                                ReturnCode::InvalidTopicId,
                            ),
                        );
                        return;
                    }
                }
            }
            TopicSpec::Short(chars) => String::from_utf8_lossy(chars).into_owned(),
        };

        let granted = subscribe.qos;
        let installed = self
            .subscriptions
            .write()
            .subscribe(&filter, session.client_id(), granted);

        if let Err(error) = installed {
            debug!(client_id = session.client_id(), filter = %filter, %error, "subscribe rejected");
            self.send_to(
                address,
                &self
                    .factory
                    .suback(QoS::AtMostOnce, 0, subscribe.msg_id, ReturnCode::NotSupported),
            );
            return;
        }

        // a concrete (non-wildcard) plain filter gets an alias up front
        let topic_id = {
            let mut inner = session.lock();
            if !inner.subscriptions.iter().any(|f| f == &filter) {
                inner.subscriptions.push(filter.clone());
            }
            match &subscribe.topic {
                TopicSpec::Predefined(id) => *id,
                TopicSpec::Name(name)
                    if !name.contains('+') && !name.contains('#') && name.len() != 2 =>
                {
                    inner.topics.register(name).unwrap_or(0)
                }
                _ => 0,
            }
        };

        info!(client_id = session.client_id(), filter = %filter, ?granted, "subscribed");
        self.stats.record_event(session.client_id(), "subscribed");
        self.send_to(
            address,
            &self
                .factory
                .suback(granted, topic_id, subscribe.msg_id, ReturnCode::Accepted),
        );

        if let Err(error) = self.connector.subscribe(&filter, granted).await {
            warn!(filter = %filter, %error, "upstream subscribe failed");
        }
    }

    fn on_unsubscribe(&self, address: NetworkAddress, session: &Arc<Session>, unsubscribe: &Unsubscribe) {
        let filter = match &unsubscribe.topic {
            TopicSpec::Name(name) => Some(name.clone()),
            TopicSpec::Predefined(id) => {
                let inner = session.lock();
                inner.topics.lookup_by_alias(*id, AliasKind::Predefined)
            }
            TopicSpec::Short(chars) => Some(String::from_utf8_lossy(chars).into_owned()),
        };

        if let Some(filter) = filter {
            self.subscriptions
                .write()
                .unsubscribe(&filter, session.client_id());
            session.lock().subscriptions.retain(|f| f != &filter);
        }
        self.send_to(
            address,
            &Message::UnsubAck(UnsubAck {
                msg_id: unsubscribe.msg_id,
            }),
        );
    }

    fn on_pingreq(&self, address: NetworkAddress, pingreq: &PingReq) {
        let Some(client_id) = &pingreq.client_id else {
            // plain liveness probe
            if let Some(session) = self.session_for(address) {
                session.lock().touch();
            }
            self.send_to(address, &self.factory.pingresp());
            return;
        };

        let Some(session) = self.sessions.get(client_id) else {
            debug!(%address, %client_id, "PINGREQ for unknown session");
            self.send_to(address, &self.factory.pingresp());
            return;
        };

        // the device may poll from a fresh source address
        self.network.bind(address, client_id);

        let woke = {
            let mut inner = session.lock();
            inner.touch();
            if inner.state == ClientState::Asleep {
                inner.transition(ClientState::Awake).is_ok()
            } else {
                false
            }
        };

        if woke {
            debug!(%client_id, "awake drain starts");
            // queued messages flow first; the drain sends PINGRESP when the
            // queue is empty and puts the session back to sleep
            self.scheduler.schedule(client_id);
        } else {
            self.send_to(address, &self.factory.pingresp());
        }
    }

    fn on_disconnect(&self, address: NetworkAddress, session: &Arc<Session>, disconnect: Disconnect) {
        match disconnect.duration {
            // an explicit zero duration is a terminal disconnect, not a
            // zero-length sleep
            None | Some(0) => {
                info!(client_id = session.client_id(), "clean disconnect");
                self.stats.record_event(session.client_id(), "disconnected");
                {
                    let mut inner = session.lock();
                    // a clean disconnect never fires the will
                    inner.will = None;
                    let _ = inner.transition(ClientState::Disconnected);
                }
                self.send_to(address, &self.factory.disconnect(None));
                self.teardown(session, DeadLetterReason::SessionDropped);
            }
            Some(seconds) => {
                let max_secs = self.config.max_sleep_duration.as_secs();
                let clamped =
                    u16::try_from(u64::from(seconds).min(max_secs)).unwrap_or(u16::MAX);
                let mut inner = session.lock();
                if inner.transition(ClientState::Asleep).is_ok() {
                    inner.sleep_duration =
                        Some(Duration::from_secs(u64::from(clamped)));
                    drop(inner);
                    debug!(client_id = session.client_id(), seconds = clamped, "sleeping");
                    self.stats.record_event(session.client_id(), "asleep");
                    self.send_to(address, &self.factory.disconnect(Some(clamped)));
                } else {
                    drop(inner);
                    debug!(
                        client_id = session.client_id(),
                        "sleep request in wrong state"
                    );
                    self.send_to(address, &self.factory.disconnect(None));
                }
            }
        }
    }

    fn on_searchgw(&self, address: NetworkAddress, _search: &SearchGw) {
        if self.network.note_search(address, SEARCH_WINDOW) {
            self.send_to(address, &self.factory.gwinfo(self.config.gateway_id));
        } else {
            debug!(%address, "SEARCHGW suppressed (rate limit)");
        }
    }

    /// Fans a publish out to every matching local subscriber. Called for
    /// traffic arriving from the connector (which in loopback mode is the
    /// device traffic itself, re-injected).
    pub fn fan_out(&self, topic: &str, qos: QoS, retain: bool, payload: &[u8]) {
        let matches = self.subscriptions.read().search(topic);
        if matches.is_empty() {
            debug!(topic, "no subscribers");
            return;
        }

        let Some(payload_id) = self.payloads.store(payload.to_vec(), matches.len()) else {
            return;
        };
        self.stats.publish_routed();

        for (client_id, granted) in matches {
            let Some(session) = self.sessions.get(&client_id) else {
                let _ = self.payloads.release(payload_id);
                continue;
            };
            let effective_qos = qos.min(granted);
            let queued = {
                let mut inner = session.lock();
                inner.queue.enqueue(
                    &client_id,
                    QueuedPublish {
                        topic: topic.to_string(),
                        qos: effective_qos,
                        retain,
                        payload_id,
                    },
                )
            };
            match queued {
                Ok(()) => self.scheduler.schedule(&client_id),
                Err(_) => {
                    warn!(client_id = %client_id, topic, "queue full, dead-lettering");
                    let evicted = self.dead_letters.push(
                        &client_id,
                        topic,
                        payload_id,
                        DeadLetterReason::QueueOverflow,
                    );
                    if let Some(entry) = evicted {
                        let _ = self.payloads.release(entry.payload_id);
                    }
                    self.stats.dead_letter();
                }
            }
        }
    }

    /// Fires the will (if armed) and releases everything a dead session
    /// holds. Used for clean disconnects, expiry and invariant violations.
    pub fn teardown(&self, session: &Arc<Session>, reason: DeadLetterReason) {
        let client_id = session.client_id().to_string();
        let will = {
            let mut inner = session.lock();
            let will = inner.will.take();

            for publish in inner.queue.drain() {
                let evicted = self.dead_letters.push(
                    &client_id,
                    &publish.topic,
                    publish.payload_id,
                    reason,
                );
                if let Some(entry) = evicted {
                    let _ = self.payloads.release(entry.payload_id);
                }
                self.stats.dead_letter();
            }
            if let Some(payload_id) = inflight::inflight_payload(&inner) {
                let _ = self.payloads.release(payload_id);
            }
            inner.outbound = None;
            inner.inbound = None;
            inner.topics.clear_normal();
            inner.subscriptions.clear();
            will
        };

        self.subscriptions.write().remove_client(&client_id);
        self.network.unbind_client(&client_id);
        self.sessions.remove(&client_id);

        if let Some(will) = will {
            info!(client_id = %client_id, topic = %will.topic, "firing will");
            self.fan_out(&will.topic, will.qos, will.retain, &will.payload);
        }
    }
}
