//! End-to-end tunnel test against a minimal gateway speaking the real
//! WebSocket protocol, bridging to a local TCP echo server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gatelink_client::{StaticGateway, Target, TunnelEvent, TunnelRegistry, TunnelSettings};
use gatelink_core::{ClientMessage, TunnelError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type ServerWs = WebSocketStream<TcpStream>;

async fn echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = stream.into_split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    port
}

async fn next_client_message(ws: &mut ServerWs) -> ClientMessage {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("gateway expected control message, got {other:?}"),
        }
    }
}

/// Accept one tunnel, run the handshake and relay until either side closes.
/// Reports the hello reply it received on `hellos`.
async fn gateway(reject_with: Option<&'static str>) -> (u16, mpsc::UnboundedReceiver<ClientMessage>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (hellos_tx, hellos) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        ws.send(Message::Text(r#"{"_":"hello","version":1}"#.into()))
            .await
            .unwrap();
        let hello = next_client_message(&mut ws).await;
        hellos_tx.send(hello).unwrap();

        if let Some(details) = reject_with {
            let msg = serde_json::json!({"_": "error", "details": details}).to_string();
            ws.send(Message::Text(msg)).await.unwrap();
            let _ = ws.next().await;
            return;
        }

        ws.send(Message::Text(r#"{"_":"ready"}"#.into())).await.unwrap();
        let (host, port) = match next_client_message(&mut ws).await {
            ClientMessage::Connect { host, port } => (host, port),
            other => panic!("expected connect, got {other:?}"),
        };

        let upstream = TcpStream::connect((host.as_str(), port)).await.unwrap();
        ws.send(Message::Text(r#"{"_":"connected"}"#.into()))
            .await
            .unwrap();

        let (mut up_read, mut up_write) = upstream.into_split();
        let mut buf = vec![0u8; 4096];
        loop {
            tokio::select! {
                msg = ws.next() => match msg {
                    Some(Ok(Message::Binary(data))) => up_write.write_all(&data).await.unwrap(),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
                n = up_read.read(&mut buf) => match n {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if ws.send(Message::Binary(buf[..n].to_vec())).await.is_err() {
                            break;
                        }
                    }
                },
            }
        }
    });

    (port, hellos)
}

async fn collect_data(events: &mut mpsc::UnboundedReceiver<TunnelEvent>, want: usize) -> Vec<u8> {
    let mut received = Vec::new();
    while received.len() < want {
        let event = time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for data");
        match event {
            Some(TunnelEvent::Data(bytes)) => received.extend(bytes),
            Some(TunnelEvent::Opened) => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
    received
}

#[tokio::test]
async fn tunnel_relays_through_websocket_gateway() {
    let echo_port = echo_server().await;
    let (gw_port, mut hellos) = gateway(None).await;

    let registry = TunnelRegistry::with_websocket(
        TunnelSettings::with_token("s3cret"),
        Arc::new(StaticGateway::new(format!("ws://127.0.0.1:{gw_port}"))),
    );
    let tunnel = registry.create_tunnel();
    let mut events = tunnel.events().unwrap();

    tunnel.write(b"early ");
    tunnel.write(b"bytes");
    time::timeout(
        Duration::from_secs(5),
        tunnel.open(Target::new("127.0.0.1", echo_port)),
    )
    .await
    .expect("open timed out")
    .unwrap();

    assert_eq!(hellos.recv().await, Some(ClientMessage::hello("s3cret")));
    assert_eq!(collect_data(&mut events, 11).await, b"early bytes");

    tunnel.write(b" and late");
    assert_eq!(collect_data(&mut events, 9).await, b" and late");

    assert_eq!(registry.len(), 1);
    tunnel.close(None);
    assert!(registry.is_empty());

    let tail = time::timeout(Duration::from_secs(5), events.recv()).await.unwrap();
    assert_eq!(tail, Some(TunnelEvent::Closed));
}

#[tokio::test]
async fn gateway_rejection_surfaces_details() {
    let (gw_port, _hellos) = gateway(Some("target unreachable")).await;

    let registry = TunnelRegistry::with_websocket(
        TunnelSettings::with_token("tok"),
        Arc::new(StaticGateway::new(format!("ws://127.0.0.1:{gw_port}"))),
    );
    let tunnel = registry.create_tunnel();

    let err = time::timeout(Duration::from_secs(5), tunnel.open(Target::new("10.9.9.9", 22)))
        .await
        .expect("open timed out")
        .unwrap_err();
    assert_eq!(err, TunnelError::Protocol("target unreachable".into()));
    assert!(registry.is_empty());
}
