//! Live configuration shared by the gateway and its background tasks.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::ClientConfig;

/// Lock-free holder of the current configuration.
#[derive(Debug)]
pub struct ConfigStore {
    current: ArcSwap<ClientConfig>,
}

impl ConfigStore {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Snapshot for one call; stays consistent even if a reload lands mid-call.
    pub fn snapshot(&self) -> Arc<ClientConfig> {
        self.current.load_full()
    }

    pub fn replace(&self, config: ClientConfig) {
        self.current.store(Arc::new(config));
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_survives_replace() {
        let store = ConfigStore::default();
        let before = store.snapshot();

        let mut next = ClientConfig::default();
        next.transport.request_timeout_ms = 5;
        store.replace(next);

        assert_eq!(before.transport.request_timeout_ms, 30_000);
        assert_eq!(store.snapshot().transport.request_timeout_ms, 5);
    }
}
