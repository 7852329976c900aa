//! `gatelink forward`: expose a remote target on a local TCP port.
//!
//! Every accepted local connection gets its own tunnel. Bytes the local
//! client sends before the gateway confirms the target are buffered by the
//! tunnel and flushed once it opens.

use anyhow::{Context, Result};
use gatelink_client::{Target, Tunnel, TunnelEvent, TunnelRegistry};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

const READ_BUF: usize = 16 * 1024;

pub async fn run(registry: TunnelRegistry, listen: &str, target: &str) -> Result<()> {
    let target = Target::parse(target).with_context(|| format!("invalid target '{target}'"))?;
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to listen on {listen}"))?;

    let local = listener.local_addr()?;
    info!(listen = %local, target = %target, "forwarding");
    println!("forwarding {local} -> {target}");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("accept failed")?;
                debug!(peer = %peer, "local connection accepted");
                tokio::spawn(bridge(registry.create_tunnel(), stream, target.clone()));
            }
            _ = tokio::signal::ctrl_c() => {
                info!(open = registry.len(), "shutting down, closing tunnels");
                registry.close_all();
                return Ok(());
            }
        }
    }
}

/// Pump one local connection through `tunnel`.
///
/// The tunnel closes when the gateway side ends, the local socket fails, or
/// a reply can no longer be written locally. A local half-close only stops
/// the uplink.
async fn bridge(tunnel: Tunnel, stream: TcpStream, target: Target) {
    let Some(mut events) = tunnel.events() else {
        return;
    };
    let (mut reader, mut writer) = stream.into_split();

    let uplink = {
        let tunnel = tunnel.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUF];
            loop {
                match reader.read(&mut buf).await {
                    // Half-close: keep the tunnel so buffered bytes and the reply still flow.
                    Ok(0) => {
                        debug!(tunnel = tunnel.id(), "local client finished sending");
                        break;
                    }
                    Ok(n) => tunnel.write(&buf[..n]),
                    Err(e) => {
                        debug!(tunnel = tunnel.id(), error = %e, "local read failed");
                        tunnel.close(None);
                        break;
                    }
                }
            }
        })
    };

    let opener = {
        let tunnel = tunnel.clone();
        tokio::spawn(async move {
            if let Err(e) = tunnel.open(target).await {
                debug!(tunnel = tunnel.id(), error = %e, "open failed");
            }
        })
    };

    while let Some(event) = events.recv().await {
        match event {
            TunnelEvent::Opened => debug!(tunnel = tunnel.id(), "relaying"),
            TunnelEvent::Data(bytes) => {
                if let Err(e) = writer.write_all(&bytes).await {
                    debug!(tunnel = tunnel.id(), error = %e, "local write failed");
                    break;
                }
            }
            TunnelEvent::Error(e) => warn!(tunnel = tunnel.id(), error = %e, "tunnel failed"),
            TunnelEvent::Closed => break,
        }
    }

    tunnel.close(None);
    uplink.abort();
    let _ = opener.await;
    let _ = writer.shutdown().await;
}
