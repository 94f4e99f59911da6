mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apikey_core_types::{RateLimit, RateUnit, Rule, SubpathRule, TrafficEvent, TrafficScope};
use apikey_gateway::{GatewaySettings, InboundRequest, Plugin, PluginError, RequestContext};
use apikey_traffic_store::{InMemoryTrafficStore, TrafficStore, TrafficStoreResult};
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use chrono::{DateTime, Utc};
use tokio_test::{assert_err, assert_ok};

use common::*;

fn request(method: Method, path: &str, key: Option<&str>) -> InboundRequest {
    let mut headers = HeaderMap::new();
    if let Some(key) = key {
        headers.insert("apikey", HeaderValue::from_str(key).unwrap());
    }
    InboundRequest::new(method, path).with_headers(headers)
}

fn ctx() -> RequestContext {
    RequestContext::new(Some(Duration::from_secs(1)))
}

#[tokio::test]
async fn granted_get_is_allowed_and_recorded() {
    let store = seeded_store(5, Utc::now()).await;
    let gateway = gateway(snapshot(granted(&["GET"], Some(100))), store.clone());

    let result = gateway
        .plugin
        .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/widgets", Some(SECRET)))
        .await;
    assert_ok!(result);

    gateway.reporter.shutdown().await;
    assert_eq!(store.len(), 6);
}

#[tokio::test]
async fn method_outside_verbs_is_unauthorized_and_not_recorded() {
    let store = seeded_store(5, Utc::now()).await;
    let gateway = gateway(snapshot(granted(&["POST"], Some(100))), store.clone());

    let err = assert_err!(
        gateway
            .plugin
            .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/widgets", Some(SECRET)))
            .await
    );
    assert_eq!(err, PluginError::Unauthorized);
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

    gateway.reporter.shutdown().await;
    assert_eq!(store.len(), 5);
}

#[tokio::test]
async fn verbs_match_case_insensitively() {
    let store = Arc::new(InMemoryTrafficStore::new());
    let gateway = gateway(snapshot(granted(&["get", "POST"], None)), store);

    let allowed = gateway
        .plugin
        .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/widgets", Some(SECRET)))
        .await;
    assert_ok!(allowed);

    let denied = gateway
        .plugin
        .on_request(&ctx(), &proxy(), &request(Method::DELETE, "/v1/widgets", Some(SECRET)))
        .await;
    assert_eq!(denied, Err(PluginError::Unauthorized));
}

#[tokio::test]
async fn preflight_bypasses_every_check() {
    let store = Arc::new(InMemoryTrafficStore::new());
    let gateway = gateway(snapshot(granted(&[], Some(0))), store.clone());

    let result = gateway
        .plugin
        .on_request(&ctx(), &proxy(), &request(Method::OPTIONS, "/v1/widgets", None))
        .await;
    assert_ok!(result);

    gateway.reporter.shutdown().await;
    assert!(store.is_empty());
}

#[tokio::test]
async fn credential_failures_are_distinguished() {
    let store = Arc::new(InMemoryTrafficStore::new());
    let gateway = gateway(snapshot(granted(&["GET"], None)), store);
    let plugin = &gateway.plugin;

    let missing = plugin
        .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/widgets", None))
        .await;
    assert_eq!(missing, Err(PluginError::Unauthenticated));

    let empty = plugin
        .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/widgets", Some("")))
        .await;
    assert_eq!(empty, Err(PluginError::Unauthenticated));

    let unknown = plugin
        .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/widgets", Some("ABC123")))
        .await;
    assert_eq!(unknown, Err(PluginError::CredentialNotFound));
}

#[tokio::test]
async fn missing_binding_name_fails_closed() {
    let store = Arc::new(InMemoryTrafficStore::new());
    let gateway = gateway(snapshot(granted(&["GET"], None)), store);
    let mut unbound = proxy();
    unbound.plugin_config.clear();

    let err = assert_err!(
        gateway
            .plugin
            .on_request(&ctx(), &unbound, &request(Method::GET, "/v1/widgets", Some(SECRET)))
            .await
    );
    assert!(matches!(err, PluginError::Misconfigured { .. }));
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_binding_and_ungranted_key_are_denied() {
    let store = Arc::new(InMemoryTrafficStore::new());
    let gateway = gateway(snapshot(granted(&["GET"], None)), Arc::clone(&store) as _);
    let mut elsewhere = proxy();
    elsewhere.namespace = "billing".into();

    let result = gateway
        .plugin
        .on_request(&ctx(), &elsewhere, &request(Method::GET, "/v1/widgets", Some(SECRET)))
        .await;
    assert_eq!(result, Err(PluginError::BindingNotFound));

    let mut other_key = granted(&["GET"], None);
    other_key.name = "backend".into();
    let gateway = common::gateway(snapshot(other_key), store);
    let result = gateway
        .plugin
        .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/widgets", Some(SECRET)))
        .await;
    assert_eq!(result, Err(PluginError::KeyNotGranted));
}

#[tokio::test]
async fn global_rule_overrides_empty_granular() {
    let store = Arc::new(InMemoryTrafficStore::new());
    let mut key = granted(&[], None);
    key.default_rule = Some(Rule {
        global: true,
        ..Rule::granular(Vec::<String>::new())
    });
    let gateway = gateway(snapshot(key), store);

    for method in [Method::GET, Method::DELETE, Method::PATCH] {
        let result = gateway
            .plugin
            .on_request(&ctx(), &proxy(), &request(method, "/v1/widgets", Some(SECRET)))
            .await;
        assert_ok!(result);
    }
}

#[tokio::test]
async fn subpath_rule_applies_to_rewritten_target() {
    let store = Arc::new(InMemoryTrafficStore::new());
    let mut key = granted(&["GET"], None);
    key.subpaths = vec![SubpathRule {
        path: "/internal/admin".into(),
        rule: Rule::granular(["DELETE"]),
    }];
    let gateway = gateway(snapshot(key), store);
    let plugin = &gateway.plugin;

    let admin_delete = plugin
        .on_request(&ctx(), &proxy(), &request(Method::DELETE, "/v1/admin/users/7", Some(SECRET)))
        .await;
    assert_ok!(admin_delete);

    let admin_get = plugin
        .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/admin/users/7", Some(SECRET)))
        .await;
    assert_eq!(admin_get, Err(PluginError::Unauthorized));

    let widgets_delete = plugin
        .on_request(&ctx(), &proxy(), &request(Method::DELETE, "/v1/widgets", Some(SECRET)))
        .await;
    assert_eq!(widgets_delete, Err(PluginError::Unauthorized));
}

#[tokio::test]
async fn subpath_rule_sees_decoded_path() {
    let mut key = granted(&["GET"], None);
    key.subpaths = vec![SubpathRule {
        path: "/internal/admin".into(),
        rule: Rule::granular(["DELETE"]),
    }];
    let gateway = gateway(snapshot(key), Arc::new(InMemoryTrafficStore::new()));
    let plugin = &gateway.plugin;

    for path in ["/v1/%61dmin/users", "/v1/x/../admin/users", "/v1/%2E/admin"] {
        let result = plugin
            .on_request(&ctx(), &proxy(), &request(Method::GET, path, Some(SECRET)))
            .await;
        assert_eq!(result, Err(PluginError::Unauthorized), "{path}");
    }

    let split = plugin
        .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/admin%2fusers", Some(SECRET)))
        .await;
    assert!(matches!(split, Err(PluginError::InvalidPath { .. })));
}

#[tokio::test]
async fn quota_exhaustion_returns_429() {
    let store = seeded_store(4, Utc::now()).await;
    let gateway = gateway(snapshot(granted(&["GET"], Some(3))), store.clone());

    let err = assert_err!(
        gateway
            .plugin
            .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/widgets", Some(SECRET)))
            .await
    );
    assert_eq!(err, PluginError::QuotaExceeded);
    assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);

    gateway.reporter.shutdown().await;
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn rate_violation_is_a_hard_deny() {
    let store = seeded_store(3, Utc::now()).await;
    let mut key = granted(&["GET"], None);
    key.rate = Some(RateLimit {
        amount: 2,
        unit: RateUnit::Minute,
    });
    let gateway = gateway(snapshot(key), store);

    let result = gateway
        .plugin
        .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/widgets", Some(SECRET)))
        .await;
    assert_eq!(result, Err(PluginError::RateExceeded));
}

#[tokio::test]
async fn events_outside_rate_window_do_not_count() {
    let store = seeded_store(10, Utc::now() - chrono::Duration::hours(2)).await;
    let mut key = granted(&["GET"], None);
    key.rate = Some(RateLimit {
        amount: 2,
        unit: RateUnit::Hour,
    });
    let gateway = gateway(snapshot(key), store);

    let result = gateway
        .plugin
        .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/widgets", Some(SECRET)))
        .await;
    assert_ok!(result);
}

/// Store whose reads never finish.
#[derive(Default)]
struct StalledStore {
    writes: AtomicUsize,
}

#[async_trait]
impl TrafficStore for StalledStore {
    async fn count(&self, _: &TrafficScope, _: Option<DateTime<Utc>>) -> TrafficStoreResult<u64> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(0)
    }

    async fn record(&self, _: TrafficEvent) -> TrafficStoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn store_timeout_fails_closed() {
    let store = Arc::new(StalledStore::default());
    let mut settings = GatewaySettings::default();
    settings.traffic.store_timeout_ms = 20;
    let gateway = gateway_with(
        settings,
        snapshot(granted(&["GET"], Some(100))),
        Arc::clone(&store) as _,
    );

    let result = gateway
        .plugin
        .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/widgets", Some(SECRET)))
        .await;
    assert_eq!(result, Err(PluginError::QuotaExceeded));

    gateway.reporter.shutdown().await;
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn custom_header_name_is_honoured() {
    let store = Arc::new(InMemoryTrafficStore::new());
    let mut settings = GatewaySettings::default();
    settings.plugin.api_key.header_key = "x-api-key".into();
    let gateway = gateway_with(settings, snapshot(granted(&["GET"], None)), store);

    let default_header = gateway
        .plugin
        .on_request(&ctx(), &proxy(), &request(Method::GET, "/v1/widgets", Some(SECRET)))
        .await;
    assert_eq!(default_header, Err(PluginError::Unauthenticated));

    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", HeaderValue::from_static(SECRET));
    let custom = InboundRequest::new(Method::GET, "/v1/widgets").with_headers(headers);
    assert_ok!(gateway.plugin.on_request(&ctx(), &proxy(), &custom).await);
}
