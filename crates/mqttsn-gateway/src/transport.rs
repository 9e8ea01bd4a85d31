//! Transport contract consumed by the runtime, plus the in-memory channel
//! transport used by tests and the loopback demo. Concrete UDP/BLE
//! implementations live outside this crate and only need these methods.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;

use crate::error::{GatewayError, Result};
use crate::net::NetworkAddress;

pub type ReceiveFuture<'a> = Pin<Box<dyn Future<Output = Option<(NetworkAddress, Bytes)>> + Send + 'a>>;

pub trait Transport: Send + Sync {
    /// Binds to the medium. In-memory transports are born listening, so
    /// the default is a no-op.
    ///
    /// # Errors
    /// `Transport` when the bind fails.
    fn listen(&self) -> Result<()> {
        Ok(())
    }

    /// Hands one datagram to the wire. Non-blocking; failures come back as
    /// an error for the caller to map onto session state, never a panic.
    ///
    /// # Errors
    /// `Transport` describing the send failure.
    fn send(&self, address: NetworkAddress, bytes: &[u8]) -> Result<()>;

    /// Waits for the next datagram. Resolves to `None` once the transport
    /// has been stopped and its queue drained.
    fn receive(&self) -> ReceiveFuture<'_>;

    /// Discovery beacon; transports without broadcast media ignore it.
    ///
    /// # Errors
    /// `Transport` when the medium exists but the send fails.
    fn broadcast(&self, bytes: &[u8]) -> Result<()> {
        let _ = bytes;
        Ok(())
    }

    /// Begins shutdown: subsequent `receive` calls drain then yield `None`.
    fn stop(&self);
}

/// Paired in-memory endpoints over flume channels. The test side injects
/// datagrams and observes everything the gateway sends.
pub struct ChannelTransport {
    inbound_tx: flume::Sender<(NetworkAddress, Bytes)>,
    inbound_rx: flume::Receiver<(NetworkAddress, Bytes)>,
    outbound_tx: flume::Sender<(NetworkAddress, Bytes)>,
    outbound_rx: flume::Receiver<(NetworkAddress, Bytes)>,
    broadcasts: AtomicU64,
    stopped: AtomicBool,
}

impl ChannelTransport {
    #[must_use]
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = flume::unbounded();
        let (outbound_tx, outbound_rx) = flume::unbounded();
        Self {
            inbound_tx,
            inbound_rx,
            outbound_tx,
            outbound_rx,
            broadcasts: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    /// Feeds a datagram into the gateway, as if it arrived from `address`.
    pub fn inject(&self, address: NetworkAddress, bytes: impl Into<Bytes>) {
        let _ = self.inbound_tx.send((address, bytes.into()));
    }

    /// Next frame the gateway sent, in send order across all addresses.
    pub async fn next_sent(&self) -> Option<(NetworkAddress, Bytes)> {
        self.outbound_rx.recv_async().await.ok()
    }

    /// Non-blocking drain of everything sent so far.
    #[must_use]
    pub fn drain_sent(&self) -> Vec<(NetworkAddress, Bytes)> {
        self.outbound_rx.drain().collect()
    }

    #[must_use]
    pub fn broadcast_count(&self) -> u64 {
        self.broadcasts.load(Ordering::Relaxed)
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ChannelTransport {
    fn send(&self, address: NetworkAddress, bytes: &[u8]) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(GatewayError::Transport("transport stopped".to_string()));
        }
        self.outbound_tx
            .send((address, Bytes::copy_from_slice(bytes)))
            .map_err(|_| GatewayError::Transport("outbound channel closed".to_string()))
    }

    fn receive(&self) -> ReceiveFuture<'_> {
        Box::pin(async move {
            if self.stopped.load(Ordering::Acquire) && self.inbound_rx.is_empty() {
                return None;
            }
            match self.inbound_rx.recv_async().await {
                Ok((address, bytes)) => {
                    // shutdown sentinel, not a datagram
                    if bytes.is_empty() && self.stopped.load(Ordering::Acquire) {
                        return None;
                    }
                    Some((address, bytes))
                }
                Err(_) => None,
            }
        })
    }

    fn broadcast(&self, _bytes: &[u8]) -> Result<()> {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        // wake any blocked receiver by closing the inbound side
        let _ = self.inbound_tx.send((
            NetworkAddress::Local(u64::MAX),
            Bytes::new(),
        ));
    }
}
