//! MQTT-SN gateway runtime.
//!
//! Terminates MQTT-SN on the device side and bridges traffic to an MQTT
//! broker through a [`Connector`] (or loops it back in-process). The
//! [`GatewayRuntime`] handle owns the session registry, topic alias
//! registries, subscription matcher, per-session queues and the queue
//! processor; transports and brokers plug in through small contracts.

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod connector;
pub mod error;
pub mod handler;
pub mod inflight;
pub mod net;
pub mod payload;
pub mod processor;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod storage;
pub mod subscription;
pub mod topic;
pub mod transport;

pub use auth::{AllowAnonymous, Authenticator, DenyAll};
pub use config::GatewayConfig;
pub use connector::{Connector, ConnectorEvent, LoopbackConnector};
pub use error::{GatewayError, Result};
pub use net::{NetworkAddress, NetworkContext, NetworkRegistry};
pub use processor::ProcessResult;
pub use queue::{DeadLetterEntry, DeadLetterReason};
pub use runtime::{GatewayRuntime, GatewayRuntimeBuilder};
pub use session::{ClientState, Session, SessionRegistry, SessionSnapshot};
pub use stats::{SessionEvent, StatsSnapshot};
pub use storage::{InMemoryStorage, StorageService};
pub use subscription::{SubscriptionLimits, SubscriptionTree};
pub use topic::{AliasKind, TopicRegistry};
pub use transport::{ChannelTransport, Transport};
