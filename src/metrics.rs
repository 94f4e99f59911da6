use std::{net::SocketAddr, sync::Arc};

use apikey_registry::metrics as registry_metrics;
use apikey_traffic_store::metrics as traffic_metrics;
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use lazy_static::lazy_static;
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{opts, Encoder, IntCounterVec, Registry, TextEncoder};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{error, info};

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();

lazy_static! {
    static ref DECISIONS: IntCounterVec = IntCounterVec::new(
        opts!("apikey_decisions_total", "Authorization decisions by outcome"),
        &["outcome"]
    )
    .unwrap();
}

/// Counts one plugin decision; `outcome` is `allow`, `preflight` or an error kind.
pub fn record_decision(outcome: &str) {
    DECISIONS.with_label_values(&[outcome]).inc();
}

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = global_registry();
        registry_metrics::register_metrics(registry);
        traffic_metrics::register_metrics(registry);
        if let Err(err) = registry.register(Box::new(DECISIONS.clone())) {
            error!(?err, "failed to register decision metric");
        }
    });
}

pub fn spawn_metrics_server(port: u16) -> Option<JoinHandle<()>> {
    if port == 0 {
        return None;
    }

    register_metrics();
    let registry = Arc::new(global_registry().clone());
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(%addr, "metrics server listening");
    Some(tokio::spawn(async move {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(err) = axum::serve(listener, app.into_make_service()).await {
                    error!(?err, "metrics server exited with error");
                }
            }
            Err(err) => {
                error!(?err, "failed to bind metrics listener");
            }
        }
    }))
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> Response {
    match render(&registry) {
        Ok((content_type, body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(reason) => {
            error!(reason, "failed to render prometheus metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response()
        }
    }
}

fn render(registry: &Registry) -> Result<(HeaderValue, String), &'static str> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|_| "encode")?;
    let body = String::from_utf8(buffer).map_err(|_| "utf8")?;
    let content_type = HeaderValue::from_str(encoder.format_type()).map_err(|_| "content-type")?;
    Ok((content_type, body))
}

pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}
