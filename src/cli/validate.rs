use std::path::PathBuf;

use anyhow::{Context, Result};
use apikey_registry::load_snapshot_from_path;
use clap::Args;
use serde_json::json;

use super::OutputFormat;

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Registry snapshot to validate (json/yaml)
    #[arg(value_name = "FILE")]
    pub snapshot: PathBuf,
}

pub async fn cmd_validate(args: ValidateArgs, output: OutputFormat) -> Result<()> {
    let snapshot = load_snapshot_from_path(&args.snapshot)
        .with_context(|| format!("invalid snapshot {}", args.snapshot.display()))?;

    let unbound: Vec<String> = snapshot
        .proxies
        .iter()
        .filter(|proxy| proxy.binding_name().is_none())
        .map(|proxy| format!("{}/{}", proxy.namespace, proxy.name))
        .collect();

    let report = json!({
        "keys": snapshot.keys.len(),
        "bindings": snapshot.bindings.len(),
        "proxies": snapshot.proxies.len(),
        "proxiesWithoutBinding": &unbound,
    });
    if let Some(rendered) = output.render(&report)? {
        println!("{rendered}");
        return Ok(());
    }

    println!("{} is valid", args.snapshot.display());
    println!("   keys:     {}", snapshot.keys.len());
    println!("   bindings: {}", snapshot.bindings.len());
    println!("   proxies:  {}", snapshot.proxies.len());
    for proxy in unbound {
        println!("warning: proxy {proxy} has no apiKeyBindingName; its requests will be denied");
    }
    Ok(())
}
