//! The gateway runtime: owns every component, spawns the task topology and
//! coordinates cooperative shutdown.
//!
//! One handle carries all capabilities; components receive exactly what
//! they need at construction and nothing reaches for ambient state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mqttsn_codec::MessageFactory;

use crate::auth::Authenticator;
use crate::config::GatewayConfig;
use crate::connector::{Connector, ConnectorEvent, LoopbackConnector};
use crate::error::{GatewayError, Result};
use crate::handler::MessageHandler;
use crate::net::NetworkRegistry;
use crate::payload::PayloadRegistry;
use crate::processor::QueueProcessor;
use crate::queue::{DeadLetterEntry, DeadLetterQueue, DeadLetterReason};
use crate::scheduler::QueueScheduler;
use crate::session::{SessionRegistry, SessionSnapshot};
use crate::stats::{GatewayStats, SessionEvent, StatsSnapshot};
use crate::subscription::SubscriptionTree;
use crate::transport::Transport;

const EXPIRY_TICK: Duration = Duration::from_millis(500);

pub struct GatewayRuntimeBuilder {
    config: GatewayConfig,
    transport: Option<Arc<dyn Transport>>,
    connector: Option<(Arc<dyn Connector>, flume::Receiver<ConnectorEvent>)>,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl GatewayRuntimeBuilder {
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Installs the upstream connector together with the channel its
    /// deliveries arrive on.
    #[must_use]
    pub fn connector(
        mut self,
        connector: Arc<dyn Connector>,
        events: flume::Receiver<ConnectorEvent>,
    ) -> Self {
        self.connector = Some((connector, events));
        self
    }

    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// # Errors
    /// `Configuration` for invalid options or a missing transport.
    pub fn build(self) -> Result<GatewayRuntime> {
        self.config.validate()?;
        let transport = self.transport.ok_or_else(|| {
            GatewayError::Configuration("a transport is required".to_string())
        })?;

        let (connector, connector_events) = match self.connector {
            Some(pair) => pair,
            None => {
                let (loopback, events) = LoopbackConnector::new();
                (Arc::new(loopback) as Arc<dyn Connector>, events)
            }
        };

        let config = Arc::new(self.config);
        let factory = MessageFactory::new(config.protocol_version);
        let sessions = Arc::new(SessionRegistry::new(Arc::clone(&config)));
        let network = Arc::new(NetworkRegistry::new());
        let subscriptions = Arc::new(RwLock::new(SubscriptionTree::new(
            config.subscription_limits,
        )));
        let payloads = Arc::new(PayloadRegistry::new());
        let dead_letters = Arc::new(DeadLetterQueue::new(config.dead_letter_capacity));
        let stats = Arc::new(GatewayStats::new(64));

        let processor = Arc::new(QueueProcessor::new(
            Arc::clone(&config),
            factory,
            Arc::clone(&network),
            Arc::clone(&payloads),
            Arc::clone(&dead_letters),
            Arc::clone(&transport),
            Arc::clone(&stats),
        ));
        let scheduler = Arc::new(QueueScheduler::new(
            Arc::clone(&config),
            Arc::clone(&sessions),
            Arc::clone(&processor),
        ));
        let handler = Arc::new(MessageHandler::new(
            Arc::clone(&config),
            factory,
            Arc::clone(&sessions),
            Arc::clone(&network),
            Arc::clone(&subscriptions),
            Arc::clone(&payloads),
            Arc::clone(&dead_letters),
            Arc::clone(&scheduler),
            Arc::clone(&transport),
            Arc::clone(&connector),
            self.authenticator,
            Arc::clone(&stats),
        ));

        let (shutdown_tx, _) = broadcast::channel(4);

        Ok(GatewayRuntime {
            inner: Arc::new(RuntimeInner {
                config,
                factory,
                sessions,
                network,
                payloads,
                dead_letters,
                stats,
                scheduler,
                handler,
                transport,
                connector,
                connector_events: Mutex::new(Some(connector_events)),
                shutdown_tx,
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }
}

struct RuntimeInner {
    config: Arc<GatewayConfig>,
    factory: MessageFactory,
    sessions: Arc<SessionRegistry>,
    network: Arc<NetworkRegistry>,
    payloads: Arc<PayloadRegistry>,
    dead_letters: Arc<DeadLetterQueue>,
    stats: Arc<GatewayStats>,
    scheduler: Arc<QueueScheduler>,
    handler: Arc<MessageHandler>,
    transport: Arc<dyn Transport>,
    connector: Arc<dyn Connector>,
    connector_events: Mutex<Option<flume::Receiver<ConnectorEvent>>>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct GatewayRuntime {
    inner: Arc<RuntimeInner>,
}

impl GatewayRuntime {
    #[must_use]
    pub fn builder(config: GatewayConfig) -> GatewayRuntimeBuilder {
        GatewayRuntimeBuilder {
            config,
            transport: None,
            connector: None,
            authenticator: None,
        }
    }

    /// Connects the upstream link and spawns the task topology: transport
    /// reader, connector event pump, queue scheduler, expiry monitor and
    /// (when configured) the ADVERTISE beacon.
    ///
    /// # Errors
    /// `Transport` when the bind fails, `Connector` when the upstream
    /// connect fails.
    pub async fn start(&self) -> Result<()> {
        self.inner.transport.listen()?;
        self.inner.connector.connect().await?;

        let mut tasks = self.inner.tasks.lock();

        {
            let inner = Arc::clone(&self.inner);
            let mut shutdown = self.inner.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        received = inner.transport.receive() => {
                            let Some((address, bytes)) = received else { break };
                            inner.handler.handle_datagram(address, &bytes).await;
                        }
                    }
                }
                debug!("transport reader stopped");
            }));
        }

        if let Some(events) = self.inner.connector_events.lock().take() {
            let inner = Arc::clone(&self.inner);
            let mut shutdown = self.inner.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        event = events.recv_async() => {
                            let Ok(event) = event else { break };
                            match event {
                                ConnectorEvent::Publish { topic, qos, retain, payload } => {
                                    inner.handler.fan_out(&topic, qos, retain, &payload);
                                }
                            }
                        }
                    }
                }
                debug!("connector pump stopped");
            }));
        }

        {
            let scheduler = Arc::clone(&self.inner.scheduler);
            let shutdown = self.inner.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(scheduler.run(shutdown)));
        }

        {
            let inner = Arc::clone(&self.inner);
            let mut shutdown = self.inner.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(EXPIRY_TICK);
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tick.tick() => {}
                    }
                    let outcome = inner.sessions.sweep(Instant::now());
                    for session in outcome.lost {
                        inner.stats.record_event(session.client_id(), "lost");
                        let will = session.lock().will.take();
                        if let Some(will) = will {
                            info!(client_id = session.client_id(), topic = %will.topic, "firing will");
                            inner.handler.fan_out(&will.topic, will.qos, will.retain, &will.payload);
                        }
                    }
                    for session in outcome.expired {
                        inner.stats.record_event(session.client_id(), "expired");
                        inner
                            .handler
                            .teardown(&session, DeadLetterReason::SessionDropped);
                    }
                }
                debug!("expiry monitor stopped");
            }));
        }

        if let Some(interval) = self.inner.config.advertise_interval {
            let inner = Arc::clone(&self.inner);
            let mut shutdown = self.inner.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(interval);
                let seconds = u16::try_from(interval.as_secs()).unwrap_or(u16::MAX);
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tick.tick() => {}
                    }
                    let beacon = inner.factory.advertise(inner.config.gateway_id, seconds);
                    match beacon.encode() {
                        Ok(frame) => {
                            if let Err(error) = inner.transport.broadcast(&frame) {
                                debug!(%error, "advertise broadcast failed");
                            }
                        }
                        Err(error) => warn!(%error, "advertise encode failed"),
                    }
                }
                debug!("advertise beacon stopped");
            }));
        }

        info!(
            sessions = self.inner.config.max_sessions,
            version = ?self.inner.config.protocol_version,
            "gateway started"
        );
        Ok(())
    }

    /// Cooperative shutdown: stop accepting, let in-flight work finish
    /// within `grace`, then abort what remains.
    pub async fn shutdown(&self, grace: Duration) {
        info!("gateway draining");
        let _ = self.inner.shutdown_tx.send(());
        self.inner.transport.stop();
        let _ = self.inner.connector.disconnect().await;

        let mut tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        let drain = async {
            for task in tasks.iter_mut() {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!("shutdown grace period elapsed, aborting tasks");
            for task in &tasks {
                task.abort();
            }
        }
        info!("gateway stopped");
    }

    // Read-only accessors for the admin surface. The core hands out typed
    // snapshots; serialization happens elsewhere.

    #[must_use]
    pub fn session_snapshots(&self) -> Vec<SessionSnapshot> {
        self.inner.sessions.snapshots()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    #[must_use]
    pub fn queue_depth(&self, client_id: &str) -> Option<usize> {
        self.inner
            .sessions
            .get(client_id)
            .map(|session| session.lock().queue.len())
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    #[must_use]
    pub fn recent_events(&self) -> Vec<SessionEvent> {
        self.inner.stats.recent_events()
    }

    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetterEntry> {
        self.inner.dead_letters.snapshot()
    }

    #[must_use]
    pub fn network_contexts(&self) -> usize {
        self.inner.network.len()
    }

    #[must_use]
    pub fn payload_count(&self) -> usize {
        self.inner.payloads.len()
    }
}
