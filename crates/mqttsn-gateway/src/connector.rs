//! Upstream broker link. The aggregating gateway forwards device traffic to
//! a real MQTT broker through this contract; loopback mode substitutes an
//! in-process implementation that re-injects publishes into the local
//! subscription matcher.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use mqttsn_codec::QoS;

use crate::error::{GatewayError, Result};

pub type ConnectorFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Traffic flowing back from the upstream side into the gateway's fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    Publish {
        topic: String,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    },
}

pub trait Connector: Send + Sync {
    fn connect(&self) -> ConnectorFuture<'_>;

    fn disconnect(&self) -> ConnectorFuture<'_>;

    fn publish<'a>(
        &'a self,
        topic: &'a str,
        qos: QoS,
        retain: bool,
        payload: &'a [u8],
    ) -> ConnectorFuture<'a>;

    fn subscribe<'a>(&'a self, filter: &'a str, qos: QoS) -> ConnectorFuture<'a>;

    fn is_connected(&self) -> bool;
}

/// Degenerate in-process broker: every publish comes straight back as a
/// [`ConnectorEvent`] for the runtime to fan out. A convenience, not a
/// scalability path.
pub struct LoopbackConnector {
    events: flume::Sender<ConnectorEvent>,
    connected: AtomicBool,
}

impl LoopbackConnector {
    #[must_use]
    pub fn new() -> (Self, flume::Receiver<ConnectorEvent>) {
        let (events, receiver) = flume::unbounded();
        (
            Self {
                events,
                connected: AtomicBool::new(false),
            },
            receiver,
        )
    }
}

impl Connector for LoopbackConnector {
    fn connect(&self) -> ConnectorFuture<'_> {
        Box::pin(async move {
            self.connected.store(true, Ordering::Release);
            Ok(())
        })
    }

    fn disconnect(&self) -> ConnectorFuture<'_> {
        Box::pin(async move {
            self.connected.store(false, Ordering::Release);
            Ok(())
        })
    }

    fn publish<'a>(
        &'a self,
        topic: &'a str,
        qos: QoS,
        retain: bool,
        payload: &'a [u8],
    ) -> ConnectorFuture<'a> {
        Box::pin(async move {
            if !self.is_connected() {
                return Err(GatewayError::Connector("loopback not connected".to_string()));
            }
            self.events
                .send(ConnectorEvent::Publish {
                    topic: topic.to_string(),
                    qos,
                    retain,
                    payload: payload.to_vec(),
                })
                .map_err(|_| GatewayError::Connector("loopback receiver dropped".to_string()))
        })
    }

    fn subscribe<'a>(&'a self, _filter: &'a str, _qos: QoS) -> ConnectorFuture<'a> {
        // every local topic is already visible to the loopback
        Box::pin(async move { Ok(()) })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reinjects() {
        let (connector, events) = LoopbackConnector::new();
        connector.connect().await.unwrap();
        assert!(connector.is_connected());

        connector
            .publish("sensors/temp", QoS::AtLeastOnce, false, &[0x41])
            .await
            .unwrap();

        let event = events.recv_async().await.unwrap();
        assert_eq!(
            event,
            ConnectorEvent::Publish {
                topic: "sensors/temp".to_string(),
                qos: QoS::AtLeastOnce,
                retain: false,
                payload: vec![0x41],
            }
        );
    }

    #[tokio::test]
    async fn publish_requires_connect() {
        let (connector, _events) = LoopbackConnector::new();
        let result = connector.publish("t", QoS::AtMostOnce, false, &[]).await;
        assert!(matches!(result, Err(GatewayError::Connector(_))));
    }

    #[tokio::test]
    async fn disconnect_flips_state() {
        let (connector, _events) = LoopbackConnector::new();
        connector.connect().await.unwrap();
        connector.disconnect().await.unwrap();
        assert!(!connector.is_connected());
    }
}
