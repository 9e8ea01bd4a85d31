//! Flat-key storage contract used for configuration and operator
//! preferences. The gateway core only reads and writes strings and
//! integers; durable backends live outside this crate.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Process-wide, thread-safe key/value store with flat string keys.
pub trait StorageService: Send + Sync {
    fn get_string(&self, key: &str, default: &str) -> String;

    fn get_int(&self, key: &str, default: i64) -> i64;

    fn put_string(&self, key: &str, value: &str);
}

/// Default backend: everything lives in memory and dies with the process.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageService for InMemoryStorage {
    fn get_string(&self, key: &str, default: &str) -> String {
        self.entries
            .read()
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn get_int(&self, key: &str, default: i64) -> i64 {
        self.entries
            .read()
            .get(key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }

    fn put_string(&self, key: &str, value: &str) {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.get_string("gateway.gatewayId", "1"), "1");
        assert_eq!(storage.get_int("gateway.maxSessions", 128), 128);
    }

    #[test]
    fn put_then_get() {
        let storage = InMemoryStorage::new();
        storage.put_string("gateway.maxSessions", "64");
        assert_eq!(storage.get_int("gateway.maxSessions", 128), 64);
        assert_eq!(storage.get_string("gateway.maxSessions", ""), "64");
    }

    #[test]
    fn unparsable_int_falls_back() {
        let storage = InMemoryStorage::new();
        storage.put_string("gateway.maxRetries", "not-a-number");
        assert_eq!(storage.get_int("gateway.maxRetries", 5), 5);
    }
}
