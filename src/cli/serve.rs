use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use apikey_gateway::{serve, GatewaySettings};
use apikey_traffic_store::InMemoryTrafficStore;
use clap::Args;
use humantime::format_duration;
use tracing::info;

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Listen address, overriding `server.listen`
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Registry snapshot (json/yaml), overriding `registry.snapshot_path`
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<PathBuf>,
}

pub async fn cmd_serve(args: ServeArgs, mut settings: GatewaySettings) -> Result<()> {
    if let Some(listen) = args.listen {
        settings.server.listen = listen.to_string();
    }
    if let Some(snapshot) = args.snapshot {
        settings.registry.snapshot_path = Some(snapshot);
    }

    info!(
        header = %settings.plugin.api_key.header_key,
        store_timeout = %format_duration(settings.traffic.store_timeout()),
        request_timeout = %format_duration(settings.server.request_timeout()),
        "using in-memory traffic store"
    );
    serve(settings, Arc::new(InMemoryTrafficStore::new())).await
}
