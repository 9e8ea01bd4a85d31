//! Gateway configuration: serde-friendly, builder-style, and loadable from
//! a flat-key [`StorageService`].

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mqttsn_codec::ProtocolVersion;

use crate::error::{GatewayError, Result};
use crate::storage::StorageService;
use crate::subscription::SubscriptionLimits;

/// Options recognized by the gateway core. The protocol pins the inflight
/// window to one message; the field exists so misconfiguration is caught
/// loudly instead of silently ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub max_sessions: usize,
    pub max_queue_size: usize,
    pub max_inflight_messages: usize,
    #[serde(with = "humantime_serde")]
    pub retry_timeout: Duration,
    pub max_retries: u32,
    /// Keepalive grace in percent; 150 is the protocol's 1.5 factor.
    pub keepalive_grace_percent: u32,
    /// Topic string to alias, agreed out of band. Survives clean starts.
    pub predefined_aliases: HashMap<String, u16>,
    pub subscription_limits: SubscriptionLimits,
    #[serde(skip)]
    pub protocol_version: ProtocolVersion,
    pub integrity_enabled: bool,
    pub allow_anonymous: bool,
    /// First backoff delay after a BACKOFF result; doubles per consecutive
    /// backoff up to `backoff_max`.
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,
    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,
    /// Upper bound accepted in DISCONNECT duration requests.
    #[serde(with = "humantime_serde")]
    pub max_sleep_duration: Duration,
    /// ADVERTISE beacon period; `None` disables the beacon.
    #[serde(with = "humantime_serde")]
    pub advertise_interval: Option<Duration>,
    pub dead_letter_capacity: usize,
    pub gateway_id: u8,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1024,
            max_queue_size: 128,
            max_inflight_messages: 1,
            retry_timeout: Duration::from_secs(10),
            max_retries: 5,
            keepalive_grace_percent: 150,
            predefined_aliases: HashMap::new(),
            subscription_limits: SubscriptionLimits::default(),
            protocol_version: ProtocolVersion::V1_2,
            integrity_enabled: false,
            allow_anonymous: true,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(30),
            max_sleep_duration: Duration::from_secs(3600),
            advertise_interval: None,
            dead_letter_capacity: 256,
            gateway_id: 1,
        }
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the subset of options present in a storage service, falling
    /// back to defaults for the rest. Keys are flat strings under the
    /// `gateway.` prefix.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn from_storage(storage: &dyn StorageService) -> Self {
        let defaults = Self::default();
        let version = match storage.get_string("gateway.protocolVersion", "1.2").as_str() {
            "2.0" => ProtocolVersion::V2_0,
            _ => ProtocolVersion::V1_2,
        };
        Self {
            max_sessions: storage.get_int("gateway.maxSessions", defaults.max_sessions as i64)
                as usize,
            max_queue_size: storage.get_int("gateway.maxQueueSize", defaults.max_queue_size as i64)
                as usize,
            max_inflight_messages: storage.get_int("gateway.maxInflightMessages", 1) as usize,
            retry_timeout: Duration::from_millis(
                storage.get_int(
                    "gateway.retryTimeoutMs",
                    defaults.retry_timeout.as_millis() as i64,
                ) as u64,
            ),
            max_retries: storage.get_int("gateway.maxRetries", i64::from(defaults.max_retries))
                as u32,
            keepalive_grace_percent: storage.get_int(
                "gateway.keepaliveGracePercent",
                i64::from(defaults.keepalive_grace_percent),
            ) as u32,
            protocol_version: version,
            integrity_enabled: storage.get_int("gateway.integrityEnabled", 0) != 0,
            allow_anonymous: storage.get_int("gateway.allowAnonymous", 1) != 0,
            gateway_id: storage.get_int("gateway.gatewayId", i64::from(defaults.gateway_id)) as u8,
            ..defaults
        }
    }

    /// # Errors
    /// `Configuration` when an option is outside its supported range.
    pub fn validate(&self) -> Result<()> {
        if self.max_inflight_messages != 1 {
            return Err(GatewayError::Configuration(format!(
                "maxInflightMessages is fixed at 1 by the protocol, got {}",
                self.max_inflight_messages
            )));
        }
        if self.max_sessions == 0 {
            return Err(GatewayError::Configuration(
                "maxSessions must be positive".to_string(),
            ));
        }
        if self.max_queue_size == 0 {
            return Err(GatewayError::Configuration(
                "maxQueueSize must be positive".to_string(),
            ));
        }
        if self.keepalive_grace_percent < 100 {
            return Err(GatewayError::Configuration(
                "keepaliveGracePercent below 100 would expire live sessions".to_string(),
            ));
        }
        if self.backoff_base.is_zero() || self.backoff_max < self.backoff_base {
            return Err(GatewayError::Configuration(
                "backoff range is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Grace-adjusted keepalive window after which a session is LOST.
    #[must_use]
    pub fn keepalive_timeout(&self, keep_alive: Duration) -> Duration {
        let millis = u64::try_from(keep_alive.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(millis.saturating_mul(u64::from(self.keepalive_grace_percent)) / 100)
    }

    #[must_use]
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    #[must_use]
    pub fn with_max_queue_size(mut self, max: usize) -> Self {
        self.max_queue_size = max;
        self
    }

    #[must_use]
    pub fn with_retry_timeout(mut self, timeout: Duration) -> Self {
        self.retry_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn with_predefined_alias(mut self, topic: impl Into<String>, alias: u16) -> Self {
        self.predefined_aliases.insert(topic.into(), alias);
        self
    }

    #[must_use]
    pub fn with_subscription_limits(mut self, limits: SubscriptionLimits) -> Self {
        self.subscription_limits = limits;
        self
    }

    #[must_use]
    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    #[must_use]
    pub fn with_integrity_enabled(mut self, enabled: bool) -> Self {
        self.integrity_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_allow_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    #[must_use]
    pub fn with_advertise_interval(mut self, interval: Duration) -> Self {
        self.advertise_interval = Some(interval);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[test]
    fn defaults_validate() {
        GatewayConfig::default().validate().unwrap();
    }

    #[test]
    fn inflight_window_is_pinned() {
        let mut config = GatewayConfig::default();
        config.max_inflight_messages = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn keepalive_timeout_applies_grace() {
        let config = GatewayConfig::default();
        assert_eq!(
            config.keepalive_timeout(Duration::from_secs(60)),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn loads_overrides_from_storage() {
        let storage = InMemoryStorage::new();
        storage.put_string("gateway.maxSessions", "16");
        storage.put_string("gateway.retryTimeoutMs", "2500");
        storage.put_string("gateway.protocolVersion", "2.0");
        storage.put_string("gateway.integrityEnabled", "1");

        let config = GatewayConfig::from_storage(&storage);
        assert_eq!(config.max_sessions, 16);
        assert_eq!(config.retry_timeout, Duration::from_millis(2500));
        assert_eq!(config.protocol_version, ProtocolVersion::V2_0);
        assert!(config.integrity_enabled);
        // untouched keys keep defaults
        assert_eq!(config.max_queue_size, 128);
    }

    #[test]
    fn builder_round_trip() {
        let config = GatewayConfig::new()
            .with_max_sessions(8)
            .with_max_queue_size(4)
            .with_predefined_alias("control/reset", 0x0100)
            .with_allow_anonymous(false);
        assert_eq!(config.max_sessions, 8);
        assert_eq!(config.predefined_aliases["control/reset"], 0x0100);
        assert!(!config.allow_anonymous);
        config.validate().unwrap();
    }

    #[test]
    fn serde_round_trip() {
        let config = GatewayConfig::default().with_max_sessions(42);
        let json = serde_json::to_string(&config).unwrap();
        let back: GatewayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_sessions, 42);
        assert_eq!(back.retry_timeout, config.retry_timeout);
    }
}
