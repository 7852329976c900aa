//! Tunnel registry.
//!
//! Creates tunnels that share one set of settings, one gateway resolver and
//! one connector, and keeps track of the ones that have not closed yet.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use gatelink_core::Connector;

use crate::gateway::GatewayResolver;
use crate::settings::TunnelSettings;
use crate::transport::WebSocketConnector;
use crate::tunnel::{Tunnel, TunnelId};

type ActiveSet = Mutex<HashMap<TunnelId, Tunnel>>;

/// Factory and liveness tracker for tunnels.
///
/// A tunnel is listed from [`create_tunnel`](Self::create_tunnel) until it
/// closes. Clones share the same set.
#[derive(Clone)]
pub struct TunnelRegistry {
    settings: Arc<TunnelSettings>,
    resolver: Arc<dyn GatewayResolver>,
    connector: Arc<dyn Connector>,
    active: Arc<ActiveSet>,
}

impl TunnelRegistry {
    pub fn new(
        settings: TunnelSettings,
        resolver: Arc<dyn GatewayResolver>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            resolver,
            connector,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registry whose tunnels connect over WebSocket.
    pub fn with_websocket(settings: TunnelSettings, resolver: Arc<dyn GatewayResolver>) -> Self {
        Self::new(settings, resolver, Arc::new(WebSocketConnector))
    }

    pub fn settings(&self) -> &TunnelSettings {
        &self.settings
    }

    /// Create an idle tunnel and start tracking it.
    pub fn create_tunnel(&self) -> Tunnel {
        let tunnel = Tunnel::new(
            self.settings.clone(),
            self.resolver.clone(),
            self.connector.clone(),
        );
        lock(&self.active).insert(tunnel.id(), tunnel.clone());

        let active = Arc::downgrade(&self.active);
        tunnel.on_close(move |id| {
            if let Some(active) = active.upgrade() {
                if lock(&active).remove(&id).is_some() {
                    debug!(tunnel = id, "tunnel removed from registry");
                }
            }
        });

        debug!(tunnel = tunnel.id(), "tunnel created");
        tunnel
    }

    /// Number of tunnels that have not closed.
    pub fn len(&self) -> usize {
        lock(&self.active).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: TunnelId) -> bool {
        lock(&self.active).contains_key(&id)
    }

    /// The live tunnels at this moment.
    pub fn snapshot(&self) -> Vec<Tunnel> {
        lock(&self.active).values().cloned().collect()
    }

    /// Close every live tunnel.
    pub fn close_all(&self) {
        // Snapshot first: each close re-enters the set through its observer.
        for tunnel in self.snapshot() {
            tunnel.close(None);
        }
    }
}

fn lock(active: &ActiveSet) -> MutexGuard<'_, HashMap<TunnelId, Tunnel>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}
