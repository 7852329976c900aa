//! Gateway resolution.
//!
//! Before connecting, a tunnel needs the URL of a connection gateway. The
//! URL either comes from settings or from a [`GatewayResolver`]; the HTTP
//! resolver asks the account API to pick one.

use gatelink_core::transport::BoxFuture;
use gatelink_core::{TunnelError, TunnelResult};
use serde::Deserialize;
use tracing::debug;

/// A gateway picked for a tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Gateway {
    pub url: String,
}

/// Chooses a gateway for a new tunnel.
pub trait GatewayResolver: Send + Sync {
    fn resolve(&self) -> BoxFuture<'_, TunnelResult<Gateway>>;
}

/// Always returns the same gateway.
#[derive(Debug, Clone)]
pub struct StaticGateway {
    url: String,
}

impl StaticGateway {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl GatewayResolver for StaticGateway {
    fn resolve(&self) -> BoxFuture<'_, TunnelResult<Gateway>> {
        Box::pin(async move {
            Ok(Gateway {
                url: self.url.clone(),
            })
        })
    }
}

/// Asks the account API to choose a gateway.
///
/// Issues `POST {api_base}/api/1/gateways/choose` with an empty JSON body
/// and expects `{"url": "..."}` back.
#[derive(Debug, Clone)]
pub struct HttpGatewayResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGatewayResolver {
    pub fn new(api_base: &str) -> Self {
        Self::with_client(reqwest::Client::new(), api_base)
    }

    pub fn with_client(client: reqwest::Client, api_base: &str) -> Self {
        Self {
            client,
            endpoint: choose_endpoint(api_base),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl GatewayResolver for HttpGatewayResolver {
    fn resolve(&self) -> BoxFuture<'_, TunnelResult<Gateway>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.endpoint)
                .json(&serde_json::json!({}))
                .send()
                .await
                .map_err(|e| TunnelError::GatewayResolution(e.to_string()))?
                .error_for_status()
                .map_err(|e| TunnelError::GatewayResolution(e.to_string()))?;

            let gateway: Gateway = response
                .json()
                .await
                .map_err(|e| TunnelError::GatewayResolution(format!("bad response: {e}")))?;

            debug!(url = %gateway.url, "gateway chosen");
            Ok(gateway)
        })
    }
}

fn choose_endpoint(api_base: &str) -> String {
    format!("{}/api/1/gateways/choose", api_base.trim_end_matches('/'))
}
