//! `gatelink probe HOST:PORT`: check that a tunnel can be opened.

use std::time::Instant;

use anyhow::{Context, Result};
use gatelink_client::{Target, TunnelRegistry};
use tracing::info;

pub async fn run(registry: &TunnelRegistry, target: &str) -> Result<()> {
    let target = Target::parse(target).with_context(|| format!("invalid target '{target}'"))?;

    let tunnel = registry.create_tunnel();
    let started = Instant::now();
    let result = tunnel.open(target.clone()).await;
    tunnel.close(None);

    result.with_context(|| format!("cannot open tunnel to {target}"))?;

    let elapsed = started.elapsed();
    info!(target = %target, ?elapsed, "probe succeeded");
    println!("{target}: tunnel opened in {} ms", elapsed.as_millis());
    Ok(())
}
