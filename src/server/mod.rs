mod router;
mod state;

pub use router::{build_router, FORWARDED_METHOD_HEADER, FORWARDED_URI_HEADER};
pub use state::ServeState;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use apikey_registry::{load_snapshot_from_path, Registry, RegistrySnapshot};
use apikey_traffic_store::{TrafficGate, TrafficReporter, TrafficStore};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::GatewaySettings;
use crate::plugin::{ApiKeyPlugin, Plugin};

/// Wires registry, gate, reporter and plugin together from `settings`.
pub struct Gateway {
    pub registry: Registry,
    pub plugin: Arc<ApiKeyPlugin>,
    pub reporter: Arc<TrafficReporter>,
}

impl Gateway {
    /// Must be called inside a tokio runtime; the reporter spawns its writer.
    pub fn build(
        settings: &GatewaySettings,
        registry: Registry,
        store: Arc<dyn TrafficStore>,
    ) -> Result<Self> {
        let gate = TrafficGate::new(Arc::clone(&store), settings.traffic.store_timeout());
        let reporter = Arc::new(TrafficReporter::spawn(
            store,
            settings.traffic.report_queue_capacity,
            settings.traffic.write_timeout(),
        ));
        let plugin = ApiKeyPlugin::new(
            registry.clone(),
            gate,
            Arc::clone(&reporter),
            &settings.plugin.api_key,
        )
        .context("invalid api key plugin settings")?;
        Ok(Self {
            registry,
            plugin: Arc::new(plugin),
            reporter,
        })
    }

    pub fn state(&self, settings: &GatewaySettings) -> ServeState {
        ServeState::new(
            self.registry.clone(),
            Arc::clone(&self.plugin),
            settings.server.request_timeout(),
        )
    }
}

/// Runs the forward-auth server until ctrl-c, then drains queued traffic events.
pub async fn serve(settings: GatewaySettings, store: Arc<dyn TrafficStore>) -> Result<()> {
    let addr = settings.server.listen_addr()?;
    let registry = Registry::new();
    let sync = start_registry_sync(&registry, settings.registry.snapshot_path.clone())?;

    let gateway = Gateway::build(&settings, registry, store)?;
    let app = build_router(gateway.state(&settings));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, plugin = gateway.plugin.name(), "api key gateway listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("forward-auth server failed")?;

    info!("shutting down; draining traffic reporter");
    gateway.reporter.shutdown().await;
    if let Some(sync) = sync {
        sync.abort();
    }
    Ok(())
}

/// Loads the snapshot file and follows it: on unix a SIGHUP reloads it.
fn start_registry_sync(
    registry: &Registry,
    path: Option<PathBuf>,
) -> Result<Option<JoinHandle<()>>> {
    let Some(path) = path else {
        warn!("no registry snapshot configured; every request will be denied");
        return Ok(None);
    };
    let snapshot = load_snapshot_from_path(&path)
        .with_context(|| format!("failed to load registry snapshot {}", path.display()))?;
    registry
        .apply_snapshot(snapshot.clone())
        .with_context(|| format!("invalid registry snapshot {}", path.display()))?;

    let (tx, rx) = watch::channel(Arc::new(snapshot));
    let sync = registry.spawn_sync(rx);
    spawn_reload_on_hangup(path, tx);
    Ok(Some(sync))
}

#[cfg(unix)]
fn spawn_reload_on_hangup(path: PathBuf, tx: watch::Sender<Arc<RegistrySnapshot>>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(err) => {
                warn!(?err, "cannot listen for SIGHUP; registry reload disabled");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            match load_snapshot_from_path(&path) {
                Ok(snapshot) => {
                    info!(path = %path.display(), "reloading registry snapshot");
                    if tx.send(Arc::new(snapshot)).is_err() {
                        break;
                    }
                }
                Err(err) => warn!(path = %path.display(), %err, "registry reload failed"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_path: PathBuf, _tx: watch::Sender<Arc<RegistrySnapshot>>) {}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
