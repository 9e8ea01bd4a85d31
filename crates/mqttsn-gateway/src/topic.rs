//! Per-session topic alias registry.
//!
//! Three alias kinds share the 16-bit field: gateway-allocated normal
//! aliases, predefined aliases agreed out of band, and two-character short
//! topics carried directly in the field. Within a session an alias never
//! maps to two strings, and a topic string holds at most one normal alias.

use std::collections::HashMap;
use std::sync::Arc;

use mqttsn_codec::constants::{ALIAS_MAX, ALIAS_MIN};
use mqttsn_codec::TopicIdType;

use crate::error::{GatewayError, Result};

/// Resolves the alias kind used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
    Normal,
    Predefined,
    Short,
}

impl From<AliasKind> for TopicIdType {
    fn from(kind: AliasKind) -> Self {
        match kind {
            AliasKind::Normal => TopicIdType::Normal,
            AliasKind::Predefined => TopicIdType::Predefined,
            AliasKind::Short => TopicIdType::Short,
        }
    }
}

impl From<TopicIdType> for AliasKind {
    fn from(kind: TopicIdType) -> Self {
        match kind {
            TopicIdType::Normal => AliasKind::Normal,
            TopicIdType::Predefined => AliasKind::Predefined,
            TopicIdType::Short => AliasKind::Short,
        }
    }
}

/// Shared predefined table, built once from configuration. Survives clean
/// starts and session expiry.
#[derive(Debug, Default)]
pub struct PredefinedAliases {
    by_alias: HashMap<u16, String>,
    by_topic: HashMap<String, u16>,
}

impl PredefinedAliases {
    #[must_use]
    pub fn from_config(entries: &HashMap<String, u16>) -> Arc<Self> {
        let mut table = Self::default();
        for (topic, alias) in entries {
            table.by_alias.insert(*alias, topic.clone());
            table.by_topic.insert(topic.clone(), *alias);
        }
        Arc::new(table)
    }

    #[must_use]
    pub fn topic(&self, alias: u16) -> Option<&str> {
        self.by_alias.get(&alias).map(String::as_str)
    }

    #[must_use]
    pub fn alias(&self, topic: &str) -> Option<u16> {
        self.by_topic.get(topic).copied()
    }
}

/// Encodes a two-character topic name into the 16-bit field.
#[must_use]
pub fn short_topic_alias(topic: &str) -> Option<u16> {
    let bytes = topic.as_bytes();
    if bytes.len() == 2 {
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    } else {
        None
    }
}

/// Decodes a short alias back into its two characters.
#[must_use]
pub fn short_topic_name(alias: u16) -> Option<String> {
    let bytes = alias.to_be_bytes();
    std::str::from_utf8(&bytes).ok().map(str::to_string)
}

#[derive(Debug)]
pub struct TopicRegistry {
    predefined: Arc<PredefinedAliases>,
    by_alias: HashMap<u16, String>,
    by_topic: HashMap<String, u16>,
    next_alias: u16,
}

impl TopicRegistry {
    #[must_use]
    pub fn new(predefined: Arc<PredefinedAliases>) -> Self {
        Self {
            predefined,
            by_alias: HashMap::new(),
            by_topic: HashMap::new(),
            next_alias: ALIAS_MIN,
        }
    }

    /// Returns the existing normal alias for `topic` or allocates the next
    /// free one. Allocation walks the range monotonically, wrapping and
    /// skipping in-use aliases.
    ///
    /// # Errors
    /// `RegistryFull` when every alias in the range is taken; callers are
    /// failed rather than evicted.
    pub fn register(&mut self, topic: &str) -> Result<u16> {
        if let Some(&alias) = self.by_topic.get(topic) {
            return Ok(alias);
        }

        let range = usize::from(ALIAS_MAX - ALIAS_MIN) + 1;
        if self.by_alias.len() >= range {
            return Err(GatewayError::RegistryFull);
        }

        while self.by_alias.contains_key(&self.next_alias) {
            self.next_alias = Self::next_in_range(self.next_alias);
        }

        let alias = self.next_alias;
        self.next_alias = Self::next_in_range(alias);
        self.by_alias.insert(alias, topic.to_string());
        self.by_topic.insert(topic.to_string(), alias);
        Ok(alias)
    }

    fn next_in_range(alias: u16) -> u16 {
        if alias >= ALIAS_MAX {
            ALIAS_MIN
        } else {
            alias + 1
        }
    }

    #[must_use]
    pub fn lookup_by_alias(&self, alias: u16, kind: AliasKind) -> Option<String> {
        match kind {
            AliasKind::Normal => self.by_alias.get(&alias).cloned(),
            AliasKind::Predefined => self.predefined.topic(alias).map(str::to_string),
            AliasKind::Short => short_topic_name(alias),
        }
    }

    /// Finds the wire representation for a topic string, preferring the
    /// stable kinds: predefined, then short, then a session-normal alias.
    #[must_use]
    pub fn lookup_by_topic(&self, topic: &str) -> Option<(u16, AliasKind)> {
        if let Some(alias) = self.predefined.alias(topic) {
            return Some((alias, AliasKind::Predefined));
        }
        if let Some(alias) = short_topic_alias(topic) {
            return Some((alias, AliasKind::Short));
        }
        self.by_topic
            .get(topic)
            .map(|&alias| (alias, AliasKind::Normal))
    }

    /// Clears gateway-allocated aliases on session expiry or clean start.
    /// Predefined and short mappings survive by construction.
    pub fn clear_normal(&mut self) {
        self.by_alias.clear();
        self.by_topic.clear();
        self.next_alias = ALIAS_MIN;
    }

    #[must_use]
    pub fn normal_count(&self) -> usize {
        self.by_alias.len()
    }
}
