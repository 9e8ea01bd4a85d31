//! Mapping between transport-layer addresses and logical session contexts,
//! plus the discovery bookkeeping used to answer SEARCHGW.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Where a datagram came from. UDP carries a socket address; the loopback
/// and test transports use an opaque tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkAddress {
    Socket(SocketAddr),
    Local(u64),
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkAddress::Socket(addr) => write!(f, "{addr}"),
            NetworkAddress::Local(tag) => write!(f, "local:{tag}"),
        }
    }
}

/// Per-address state. Exists from the first datagram, before any CONNECT.
#[derive(Debug, Clone)]
pub struct NetworkContext {
    pub address: NetworkAddress,
    /// Client bound to this address; at most one at a time.
    pub client_id: Option<String>,
    pub last_datagram: Instant,
    last_search: Option<Instant>,
}

impl NetworkContext {
    fn new(address: NetworkAddress) -> Self {
        Self {
            address,
            client_id: None,
            last_datagram: Instant::now(),
            last_search: None,
        }
    }
}

/// Thread-safe address book. Reads dominate; writes happen on bind/unbind.
#[derive(Debug, Default)]
pub struct NetworkRegistry {
    contexts: RwLock<HashMap<NetworkAddress, NetworkContext>>,
    by_client: RwLock<HashMap<String, NetworkAddress>>,
}

impl NetworkRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures a context exists for `address` and stamps it.
    pub fn touch(&self, address: NetworkAddress) {
        let mut contexts = self.contexts.write();
        contexts
            .entry(address)
            .or_insert_with(|| NetworkContext::new(address))
            .last_datagram = Instant::now();
    }

    #[must_use]
    pub fn context_for(&self, address: &NetworkAddress) -> Option<NetworkContext> {
        self.contexts.read().get(address).cloned()
    }

    /// Binds an address to a client, replacing any previous binding in
    /// either direction (a device may roam to a new source address).
    pub fn bind(&self, address: NetworkAddress, client_id: &str) {
        let mut contexts = self.contexts.write();
        let mut by_client = self.by_client.write();

        if let Some(previous) = by_client.insert(client_id.to_string(), address) {
            if previous != address {
                if let Some(context) = contexts.get_mut(&previous) {
                    context.client_id = None;
                }
            }
        }

        let context = contexts
            .entry(address)
            .or_insert_with(|| NetworkContext::new(address));
        context.client_id = Some(client_id.to_string());
        context.last_datagram = Instant::now();
    }

    #[must_use]
    pub fn client_for(&self, address: &NetworkAddress) -> Option<String> {
        self.contexts
            .read()
            .get(address)
            .and_then(|context| context.client_id.clone())
    }

    #[must_use]
    pub fn address_of(&self, client_id: &str) -> Option<NetworkAddress> {
        self.by_client.read().get(client_id).copied()
    }

    pub fn unbind_client(&self, client_id: &str) {
        let mut by_client = self.by_client.write();
        if let Some(address) = by_client.remove(client_id) {
            if let Some(context) = self.contexts.write().get_mut(&address) {
                context.client_id = None;
            }
        }
    }

    pub fn remove(&self, address: &NetworkAddress) {
        let mut contexts = self.contexts.write();
        if let Some(context) = contexts.remove(address) {
            if let Some(client_id) = context.client_id {
                self.by_client.write().remove(&client_id);
            }
        }
    }

    /// Records a SEARCHGW from `address`; returns false when the previous
    /// one was inside `window`, so GWINFO replies can be rate limited.
    pub fn note_search(&self, address: NetworkAddress, window: Duration) -> bool {
        let mut contexts = self.contexts.write();
        let context = contexts
            .entry(address)
            .or_insert_with(|| NetworkContext::new(address));
        let now = Instant::now();
        let allowed = context
            .last_search
            .map_or(true, |previous| now.duration_since(previous) >= window);
        if allowed {
            context.last_search = Some(now);
        }
        allowed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }
}
