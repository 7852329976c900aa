pub mod forward;
pub mod probe;

use std::sync::Arc;

use anyhow::{bail, Result};
use gatelink_client::{GatewayResolver, HttpGatewayResolver, StaticGateway, TunnelRegistry};

use crate::config::Config;

/// Build the registry every command shares.
///
/// A fixed gateway URL wins; otherwise the account API chooses one.
pub fn build_registry(cfg: &Config) -> Result<TunnelRegistry> {
    let gateway = &cfg.gateway;
    let resolver: Arc<dyn GatewayResolver> = if !gateway.url.is_empty() {
        Arc::new(StaticGateway::new(gateway.url.clone()))
    } else if !gateway.api_base.is_empty() {
        Arc::new(HttpGatewayResolver::new(&gateway.api_base))
    } else {
        bail!("no gateway configured: pass --gateway or --api, or set [gateway] in the config file");
    };

    Ok(TunnelRegistry::with_websocket(cfg.tunnel_settings(), resolver))
}
