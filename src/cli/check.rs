use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use apikey_gateway::{Gateway, GatewaySettings, InboundRequest, Plugin, RequestContext};
use apikey_registry::{load_snapshot_from_path, Registry};
use apikey_traffic_store::InMemoryTrafficStore;
use axum::http::{HeaderMap, HeaderValue, Method};
use clap::Args;
use serde_json::json;

use super::OutputFormat;

#[derive(Args, Clone, Debug)]
pub struct CheckArgs {
    /// Registry snapshot (json/yaml)
    #[arg(long, value_name = "FILE")]
    pub snapshot: PathBuf,

    /// HTTP method of the simulated request
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Request path, matched against proxy source paths
    #[arg(long)]
    pub path: String,

    /// Api key sent in the configured header
    #[arg(long)]
    pub key: Option<String>,
}

/// Evaluates one request against a snapshot with an empty traffic store.
pub async fn cmd_check(
    args: CheckArgs,
    settings: GatewaySettings,
    output: OutputFormat,
) -> Result<()> {
    let snapshot = load_snapshot_from_path(&args.snapshot)
        .with_context(|| format!("invalid snapshot {}", args.snapshot.display()))?;
    let registry = Registry::from_snapshot(snapshot)?;
    let gateway = Gateway::build(&settings, registry, Arc::new(InMemoryTrafficStore::new()))?;

    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| anyhow!("invalid method '{}'", args.method))?;
    let mut headers = HeaderMap::new();
    if let Some(key) = &args.key {
        let value = HeaderValue::from_str(key).context("api key is not a valid header value")?;
        headers.insert(gateway.plugin.header_key().clone(), value);
    }
    let request = InboundRequest::new(method, args.path.clone()).with_headers(headers);
    let ctx = RequestContext::new(Some(settings.server.request_timeout()));

    let path = request
        .normalized_path()
        .with_context(|| format!("invalid request path {}", request.path))?;
    let proxy = gateway
        .registry
        .proxies()
        .match_path(&path)
        .ok_or_else(|| anyhow!("no proxy covers {path}"))?;
    let result = gateway.plugin.on_request(&ctx, &proxy, &request).await;
    gateway.reporter.shutdown().await;

    let report = match &result {
        Ok(()) => json!({ "allowed": true, "status": 200, "proxy": proxy.name }),
        Err(err) => json!({
            "allowed": false,
            "status": err.status().as_u16(),
            "reason": err.kind(),
            "message": err.to_string(),
            "proxy": proxy.name,
        }),
    };
    if let Some(rendered) = output.render(&report)? {
        println!("{rendered}");
        return Ok(());
    }
    match &result {
        Ok(()) => println!(
            "allowed ({} {} via {})",
            request.method, request.path, proxy.name
        ),
        Err(err) => println!(
            "denied {}: {} ({})",
            err.status().as_u16(),
            err,
            err.kind()
        ),
    }
    Ok(())
}
