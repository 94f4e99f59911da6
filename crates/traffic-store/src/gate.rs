use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use apikey_core_types::{ApiKeyBinding, TrafficScope};
use chrono::{DateTime, Utc};
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::api::{TrafficStore, TrafficStoreResult};
use crate::errors::TrafficError;
use crate::metrics;

/// Decides whether recorded traffic exceeds a key's rate or quota ceiling.
///
/// Every check reports `true` (violated) when the store errors, the call
/// outlives its deadline, or the key is not part of the binding.
#[derive(Clone)]
pub struct TrafficGate {
    store: Arc<dyn TrafficStore>,
    timeout: Duration,
}

impl TrafficGate {
    pub fn new(store: Arc<dyn TrafficStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> Arc<dyn TrafficStore> {
        Arc::clone(&self.store)
    }

    /// Violated when more events than the quota have been recorded to date.
    pub async fn check_quota(
        &self,
        binding: &ApiKeyBinding,
        key_name: &str,
        deadline: Option<Instant>,
    ) -> bool {
        let Some(key) = binding.key(key_name) else {
            warn!(binding = %binding.name, key = key_name, "quota check for key outside binding");
            return true;
        };
        let Some(quota) = key.quota else {
            return false;
        };

        let scope = TrafficScope::for_binding(binding, key_name);
        match self.bounded("quota", deadline, self.store.count(&scope, None)).await {
            Ok(count) => {
                debug!(%scope, count, quota, "quota checked");
                count > quota
            }
            Err(err) => {
                warn!(%scope, %err, "quota check failed; denying");
                metrics::record_fail_closed("quota");
                true
            }
        }
    }

    /// Violated when more events than the rate allows fall inside the window
    /// ending at `now`.
    pub async fn check_rate(
        &self,
        binding: &ApiKeyBinding,
        key_name: &str,
        now: DateTime<Utc>,
        deadline: Option<Instant>,
    ) -> bool {
        let Some(key) = binding.key(key_name) else {
            warn!(binding = %binding.name, key = key_name, "rate check for key outside binding");
            return true;
        };
        let Some(rate) = key.rate else {
            return false;
        };
        let Ok(window) = chrono::Duration::from_std(rate.unit.window()) else {
            return true;
        };

        let scope = TrafficScope::for_binding(binding, key_name);
        let since = now - window;
        match self
            .bounded("rate", deadline, self.store.count(&scope, Some(since)))
            .await
        {
            Ok(count) => {
                debug!(%scope, count, amount = rate.amount, "rate checked");
                count > rate.amount
            }
            Err(err) => {
                warn!(%scope, %err, "rate check failed; denying");
                metrics::record_fail_closed("rate");
                true
            }
        }
    }

    async fn bounded<F>(
        &self,
        check: &str,
        deadline: Option<Instant>,
        call: F,
    ) -> TrafficStoreResult<u64>
    where
        F: Future<Output = TrafficStoreResult<u64>>,
    {
        let budget = match deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(self.timeout),
            None => self.timeout,
        };
        if budget.is_zero() {
            debug!(check, "request deadline already passed");
            return Err(TrafficError::Timeout);
        }
        timeout(budget, call)
            .await
            .unwrap_or(Err(TrafficError::Timeout))
    }
}
