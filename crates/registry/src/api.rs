use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::RegistryError;
use crate::metrics;
use crate::snapshot::RegistrySnapshot;
use crate::stores::{BindingStore, KeyStore, ProxyStore};

/// Shared handle over the key, binding and proxy caches.
#[derive(Clone, Default)]
pub struct Registry {
    keys: Arc<KeyStore>,
    bindings: Arc<BindingStore>,
    proxies: Arc<ProxyStore>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Result<Self, RegistryError> {
        let registry = Self::new();
        registry.apply_snapshot(snapshot)?;
        Ok(registry)
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn bindings(&self) -> &BindingStore {
        &self.bindings
    }

    pub fn proxies(&self) -> &ProxyStore {
        &self.proxies
    }

    /// Replaces the cache contents with `snapshot`.
    ///
    /// An invalid snapshot is rejected as a whole and the caches keep serving
    /// the previous contents.
    pub fn apply_snapshot(&self, snapshot: RegistrySnapshot) -> Result<(), RegistryError> {
        snapshot.validate()?;
        let RegistrySnapshot {
            keys,
            bindings,
            proxies,
        } = snapshot;
        self.keys.replace_all(keys);
        self.bindings.replace_all(bindings);
        self.proxies.replace_all(proxies);

        metrics::record_snapshot_applied(
            self.keys.len(),
            self.bindings.len(),
            self.proxies.len(),
        );
        debug!(
            keys = self.keys.len(),
            bindings = self.bindings.len(),
            proxies = self.proxies.len(),
            "registry snapshot applied"
        );
        Ok(())
    }

    /// Follows an external refresh-on-change feed until the sender is dropped.
    ///
    /// The value current at subscription time is applied first.
    pub fn spawn_sync(&self, mut updates: watch::Receiver<Arc<RegistrySnapshot>>) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            loop {
                let snapshot = updates.borrow_and_update().as_ref().clone();
                if let Err(err) = registry.apply_snapshot(snapshot) {
                    warn!(?err, "rejected registry snapshot; keeping previous contents");
                }
                if updates.changed().await.is_err() {
                    info!("registry update feed closed");
                    break;
                }
            }
        })
    }
}
