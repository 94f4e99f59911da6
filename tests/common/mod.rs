#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use apikey_core_types::{
    ApiKey, ApiKeyBinding, ApiProxy, BindingKey, Rule, TrafficEvent, TrafficScope,
    API_KEY_BINDING_NAME,
};
use apikey_gateway::{Gateway, GatewaySettings};
use apikey_registry::{Registry, RegistrySnapshot};
use apikey_traffic_store::{InMemoryTrafficStore, TrafficStore};
use chrono::{DateTime, Utc};

pub const SECRET: &str = "abc123";

pub fn api_key() -> ApiKey {
    ApiKey {
        name: "frontend".into(),
        namespace: "shop".into(),
        secret: SECRET.into(),
    }
}

pub fn proxy() -> ApiProxy {
    ApiProxy {
        name: "widgets-proxy".into(),
        namespace: "shop".into(),
        source_path: "/v1".into(),
        target_path: "/internal".into(),
        plugin_config: HashMap::from([(API_KEY_BINDING_NAME.to_string(), "widgets".to_string())]),
    }
}

pub fn binding(key: BindingKey) -> ApiKeyBinding {
    ApiKeyBinding {
        name: "widgets".into(),
        namespace: "shop".into(),
        keys: vec![key],
    }
}

pub fn granted(verbs: &[&str], quota: Option<u64>) -> BindingKey {
    BindingKey {
        name: "frontend".into(),
        quota,
        default_rule: Some(Rule::granular(verbs.iter().copied())),
        ..Default::default()
    }
}

pub fn snapshot(key: BindingKey) -> RegistrySnapshot {
    RegistrySnapshot {
        keys: vec![api_key()],
        bindings: vec![binding(key)],
        proxies: vec![proxy()],
    }
}

pub fn scope() -> TrafficScope {
    TrafficScope::new("shop", "widgets", "frontend")
}

pub async fn seeded_store(events: usize, at: DateTime<Utc>) -> Arc<InMemoryTrafficStore> {
    let store = Arc::new(InMemoryTrafficStore::new());
    for _ in 0..events {
        store.record(TrafficEvent::new(scope(), at)).await.unwrap();
    }
    store
}

pub fn gateway(snapshot: RegistrySnapshot, store: Arc<dyn TrafficStore>) -> Gateway {
    gateway_with(GatewaySettings::default(), snapshot, store)
}

pub fn gateway_with(
    settings: GatewaySettings,
    snapshot: RegistrySnapshot,
    store: Arc<dyn TrafficStore>,
) -> Gateway {
    let registry = Registry::from_snapshot(snapshot).unwrap();
    Gateway::build(&settings, registry, store).unwrap()
}
