//! WebSocket channel for gatelink.
//!
//! Text WebSocket messages carry JSON control messages and binary messages
//! carry payload, so frames map one-to-one onto [`Frame`] values. Two tasks
//! pump each connection: a writer draining the tunnel's outbound queue and
//! a reader feeding the inbound queue. The reader answers pings and ends the
//! inbound queue on a close frame, a read error, or a failed write.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, warn};

use gatelink_core::transport::BoxFuture;
use gatelink_core::{ChannelHalves, Connector, Frame, Outbound, TunnelError, TunnelResult};

use super::check_scheme;

type WsSink<S> = Arc<Mutex<SplitSink<WebSocketStream<S>, Message>>>;

/// Connects tunnels to gateways over WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, TunnelResult<ChannelHalves>> {
        Box::pin(async move {
            check_scheme(url)?;
            let (ws_stream, _response) = connect_async(url)
                .await
                .map_err(|e| TunnelError::Transport(format!("WebSocket connect error: {e}")))?;

            debug!(url, "WebSocket connected");
            Ok(spawn_pumps(ws_stream))
        })
    }
}

/// Attach writer and reader tasks to an established WebSocket.
pub fn spawn_pumps<S>(ws_stream: WebSocketStream<S>) -> ChannelHalves
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (ws_sink, ws_read) = ws_stream.split();
    let ws_sink: WsSink<S> = Arc::new(Mutex::new(ws_sink));

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Outbound>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Frame>();

    let write_failed = Arc::new(Notify::new());
    tokio::spawn(write_loop(outbound_rx, ws_sink.clone(), write_failed.clone()));
    tokio::spawn(read_loop(ws_read, inbound_tx, ws_sink, write_failed));

    ChannelHalves {
        outbound: outbound_tx,
        inbound: inbound_rx,
    }
}

async fn write_loop<S>(
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    ws_sink: WsSink<S>,
    write_failed: Arc<Notify>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(cmd) = outbound_rx.recv().await {
        let message = match cmd {
            Outbound::Frame(Frame::Text(text)) => Message::Text(text),
            Outbound::Frame(Frame::Binary(data)) => Message::Binary(data),
            Outbound::Close => break,
        };

        let mut sink = ws_sink.lock().await;
        if let Err(e) = sink.send(message).await {
            warn!("WebSocket write error: {}", e);
            // The channel is unusable; make the reader end the inbound side too.
            write_failed.notify_one();
            break;
        }
    }

    // Sends a close frame; errors here mean the socket is already gone.
    let mut sink = ws_sink.lock().await;
    let _ = sink.close().await;
    debug!("WebSocket write loop ended");
}

async fn read_loop<S>(
    mut ws_read: SplitStream<WebSocketStream<S>>,
    inbound_tx: mpsc::UnboundedSender<Frame>,
    ws_sink: WsSink<S>,
    write_failed: Arc<Notify>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let msg = tokio::select! {
            msg = ws_read.next() => msg,
            _ = write_failed.notified() => {
                debug!("WebSocket writer failed, ending read loop");
                break;
            }
        };
        let Some(msg) = msg else {
            break;
        };

        let frame = match msg {
            Ok(Message::Text(text)) => Frame::Text(text),
            Ok(Message::Binary(data)) => Frame::Binary(data),
            Ok(Message::Ping(payload)) => {
                let mut sink = ws_sink.lock().await;
                let _ = sink.send(Message::Pong(payload)).await;
                continue;
            }
            Ok(Message::Close(_)) => {
                debug!("WebSocket close frame received");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket read error: {}", e);
                break;
            }
        };

        if inbound_tx.send(frame).is_err() {
            break;
        }
    }

    debug!("WebSocket read loop ended");
}
