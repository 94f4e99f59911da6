use lazy_static::lazy_static;
use prometheus::{core::Collector, IntCounter, IntGauge, Registry};
use tracing::error;

lazy_static! {
    static ref REGISTRY_KEYS_TOTAL: IntGauge =
        IntGauge::new("apikey_registry_keys_total", "API keys held in the cache").unwrap();
    static ref REGISTRY_BINDINGS_TOTAL: IntGauge = IntGauge::new(
        "apikey_registry_bindings_total",
        "API key bindings held in the cache"
    )
    .unwrap();
    static ref REGISTRY_PROXIES_TOTAL: IntGauge =
        IntGauge::new("apikey_registry_proxies_total", "Proxies held in the cache").unwrap();
    static ref REGISTRY_SNAPSHOTS_APPLIED: IntCounter = IntCounter::new(
        "apikey_registry_snapshots_applied_total",
        "Registry snapshots applied to the caches"
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register registry metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, REGISTRY_KEYS_TOTAL.clone());
    register(registry, REGISTRY_BINDINGS_TOTAL.clone());
    register(registry, REGISTRY_PROXIES_TOTAL.clone());
    register(registry, REGISTRY_SNAPSHOTS_APPLIED.clone());
}

pub fn record_snapshot_applied(keys: usize, bindings: usize, proxies: usize) {
    REGISTRY_KEYS_TOTAL.set(keys as i64);
    REGISTRY_BINDINGS_TOTAL.set(bindings as i64);
    REGISTRY_PROXIES_TOTAL.set(proxies as i64);
    REGISTRY_SNAPSHOTS_APPLIED.inc();
}
