//! A single gateway-brokered byte tunnel.
//!
//! `Tunnel` owns one control channel to a connection gateway. Opening it
//! resolves a gateway, connects the channel and runs the handshake:
//!
//! ```text
//! gateway  -> {"_":"hello"}
//! client   -> {"_":"hello","version":1,"auth_token":T}
//! gateway  -> {"_":"ready"}
//! client   -> {"_":"connect","host":H,"port":P}
//! gateway  -> {"_":"connected"}
//! ```
//!
//! After `connected` every binary frame is payload. Bytes written before
//! that point are kept in a pending buffer and flushed as one binary frame
//! under the same lock that moves the tunnel to `Relaying`, so they always
//! reach the channel ahead of any later write.
//!
//! All terminal paths (gateway `error`, remote close, handshake timeout,
//! explicit close) go through [`Tunnel::close`], which runs at most once.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use gatelink_core::codec::{decode_control, encode_control};
use gatelink_core::{
    ClientMessage, Connector, Frame, Outbound, ServerMessage, TunnelError, TunnelResult,
    TunnelState,
};

use crate::gateway::GatewayResolver;
use crate::settings::TunnelSettings;

/// Process-unique tunnel identifier.
pub type TunnelId = u64;

static NEXT_TUNNEL_ID: AtomicU64 = AtomicU64::new(1);

type CloseObserver = Box<dyn FnOnce(TunnelId) + Send>;

/// The TCP endpoint the gateway should connect to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port` or `[v6addr]:port`.
    pub fn parse(s: &str) -> TunnelResult<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| TunnelError::InvalidTarget(format!("missing port in '{s}'")))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let port: u16 = port
            .parse()
            .map_err(|_| TunnelError::InvalidTarget(format!("bad port in '{s}'")))?;

        let target = Self::new(host, port);
        target.validate()?;
        Ok(target)
    }

    fn validate(&self) -> TunnelResult<()> {
        if self.host.is_empty() {
            return Err(TunnelError::InvalidTarget("empty host".into()));
        }
        if self.port == 0 {
            return Err(TunnelError::InvalidTarget("port 0".into()));
        }
        Ok(())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Something the tunnel reports to its owner.
///
/// `Closed` is always the last event; the stream ends right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    /// The handshake finished and buffered writes were flushed.
    Opened,
    /// A payload frame from the remote target.
    Data(Vec<u8>),
    /// The tunnel failed. At most one per tunnel, always before `Closed`.
    Error(TunnelError),
    /// The tunnel is closed.
    Closed,
}

struct Inner {
    state: TunnelState,
    target: Option<Target>,
    pending: Vec<u8>,
    /// Outbound half of the channel; present only while the state allows it.
    channel: Option<mpsc::UnboundedSender<Outbound>>,
    events_tx: Option<mpsc::UnboundedSender<TunnelEvent>>,
    events_rx: Option<mpsc::UnboundedReceiver<TunnelEvent>>,
    opened_tx: Option<oneshot::Sender<TunnelResult<()>>>,
    close_observers: Vec<CloseObserver>,
}

impl Inner {
    fn send(&self, out: Outbound) -> bool {
        match &self.channel {
            Some(tx) => tx.send(out).is_ok(),
            None => false,
        }
    }

    fn send_control(&self, msg: &ClientMessage) -> TunnelResult<()> {
        let frame = encode_control(msg)?;
        if !self.send(Outbound::Frame(frame)) {
            debug!("channel writer gone, control message dropped");
        }
        Ok(())
    }

    fn emit(&self, event: TunnelEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(event);
        }
    }
}

struct Shared {
    id: TunnelId,
    settings: Arc<TunnelSettings>,
    resolver: Arc<dyn GatewayResolver>,
    connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
    /// Wakes the driver task when the tunnel is closed from outside it.
    shutdown: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a tunnel. Clones share the same tunnel.
#[derive(Clone)]
pub struct Tunnel {
    shared: Arc<Shared>,
}

impl fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tunnel")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

impl Tunnel {
    /// Create an idle tunnel. Usually called through
    /// [`TunnelRegistry::create_tunnel`](crate::TunnelRegistry::create_tunnel).
    pub fn new(
        settings: Arc<TunnelSettings>,
        resolver: Arc<dyn GatewayResolver>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                id: NEXT_TUNNEL_ID.fetch_add(1, Ordering::Relaxed),
                settings,
                resolver,
                connector,
                inner: Mutex::new(Inner {
                    state: TunnelState::Idle,
                    target: None,
                    pending: Vec::new(),
                    channel: None,
                    events_tx: Some(events_tx),
                    events_rx: Some(events_rx),
                    opened_tx: None,
                    close_observers: Vec::new(),
                }),
                shutdown: Notify::new(),
            }),
        }
    }

    pub fn id(&self) -> TunnelId {
        self.shared.id
    }

    pub fn state(&self) -> TunnelState {
        self.shared.lock().state
    }

    /// The target passed to [`open`](Self::open), once it has been called.
    pub fn target(&self) -> Option<Target> {
        self.shared.lock().target.clone()
    }

    /// Bytes currently waiting for the tunnel to open.
    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Take the event stream. Returns `None` after the first call.
    ///
    /// Payload received while the stream has not been taken is dropped;
    /// take it before opening to see every `Data` event.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<TunnelEvent>> {
        self.shared.lock().events_rx.take()
    }

    /// Run `observer` once when the tunnel closes (immediately if it
    /// already has).
    pub fn on_close<F>(&self, observer: F)
    where
        F: FnOnce(TunnelId) + Send + 'static,
    {
        let mut inner = self.shared.lock();
        if inner.state == TunnelState::Closed {
            drop(inner);
            observer(self.id());
        } else {
            inner.close_observers.push(Box::new(observer));
        }
    }

    /// Open the tunnel to `target`.
    ///
    /// Resolves once the gateway reports `connected`. If the tunnel closes
    /// first, resolves with the close reason, or [`TunnelError::Closed`]
    /// when there was none.
    pub async fn open(&self, target: Target) -> TunnelResult<()> {
        target.validate()?;

        let opened_rx = {
            let mut inner = self.shared.lock();
            if inner.state != TunnelState::Idle {
                return Err(TunnelError::InvalidState(inner.state));
            }
            let (tx, rx) = oneshot::channel();
            inner.opened_tx = Some(tx);
            inner.target = Some(target.clone());
            inner.state = TunnelState::ResolvingGateway;
            rx
        };

        info!(tunnel = self.id(), target = %target, "opening tunnel");

        let url = match self.gateway_url().await {
            Ok(url) => url,
            Err(e) => {
                warn!(tunnel = self.id(), error = %e, "gateway resolution failed");
                self.close(Some(e));
                return settle(opened_rx).await;
            }
        };

        if !self.advance(TunnelState::ResolvingGateway, TunnelState::Connecting) {
            return settle(opened_rx).await;
        }
        debug!(tunnel = self.id(), url = %url, "connecting to gateway");

        let halves = match self.shared.connector.connect(&url).await {
            Ok(halves) => halves,
            Err(e) => {
                warn!(tunnel = self.id(), url = %url, error = %e, "gateway connect failed");
                self.close(Some(e));
                return settle(opened_rx).await;
            }
        };

        let adopted = {
            let mut inner = self.shared.lock();
            if inner.state == TunnelState::Connecting {
                inner.channel = Some(halves.outbound);
                inner.state = TunnelState::AwaitingHello;
                true
            } else {
                // Closed while connecting; hang up the fresh channel.
                let _ = halves.outbound.send(Outbound::Close);
                false
            }
        };

        if adopted {
            tokio::spawn(self.clone().drive(halves.inbound));
        }
        settle(opened_rx).await
    }

    /// Send `chunk` to the target.
    ///
    /// Before the tunnel opens the bytes are buffered. Writes after close
    /// are dropped.
    pub fn write(&self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }

        let overflow = {
            let mut inner = self.shared.lock();
            match inner.state {
                TunnelState::Relaying => {
                    if !inner.send(Outbound::Frame(Frame::Binary(chunk.to_vec()))) {
                        debug!(tunnel = self.id(), "channel writer gone, write dropped");
                    }
                    None
                }
                TunnelState::Closed => {
                    debug!(tunnel = self.id(), len = chunk.len(), "write on closed tunnel dropped");
                    None
                }
                _ => match self.shared.settings.max_pending_bytes {
                    Some(limit) if inner.pending.len() + chunk.len() > limit => {
                        Some(TunnelError::BufferOverflow { limit })
                    }
                    _ => {
                        inner.pending.extend_from_slice(chunk);
                        None
                    }
                },
            }
        };

        if let Some(e) = overflow {
            warn!(tunnel = self.id(), error = %e, "pending buffer full");
            self.close(Some(e));
        }
    }

    /// Close the tunnel, reporting `error` to the owner if given.
    ///
    /// Only the first call has any effect. Close observers run before the
    /// owner sees `Closed` or a pending `open()` resolves.
    pub fn close(&self, error: Option<TunnelError>) {
        let (observers, events_tx, opened_tx) = {
            let mut inner = self.shared.lock();
            if inner.state == TunnelState::Closed {
                return;
            }
            let previous = inner.state;
            inner.state = TunnelState::Closed;
            inner.pending.clear();

            if let Some(channel) = inner.channel.take() {
                let _ = channel.send(Outbound::Close);
            }

            match &error {
                Some(e) => info!(tunnel = self.id(), from = %previous, error = %e, "tunnel closed"),
                None => info!(tunnel = self.id(), from = %previous, "tunnel closed"),
            }
            (
                mem::take(&mut inner.close_observers),
                inner.events_tx.take(),
                inner.opened_tx.take(),
            )
        };

        self.shared.shutdown.notify_one();
        for observer in observers {
            observer(self.id());
        }

        // Dropping the sender afterwards ends the owner's stream.
        if let Some(events) = events_tx {
            if let Some(e) = &error {
                let _ = events.send(TunnelEvent::Error(e.clone()));
            }
            let _ = events.send(TunnelEvent::Closed);
        }
        if let Some(tx) = opened_tx {
            let _ = tx.send(Err(error.unwrap_or(TunnelError::Closed)));
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn gateway_url(&self) -> TunnelResult<String> {
        if let Some(url) = &self.shared.settings.custom_gateway {
            return Ok(url.clone());
        }
        Ok(self.shared.resolver.resolve().await?.url)
    }

    /// Move from `from` to `to`; false if the tunnel left `from` meanwhile.
    fn advance(&self, from: TunnelState, to: TunnelState) -> bool {
        let mut inner = self.shared.lock();
        if inner.state != from {
            return false;
        }
        inner.state = to;
        true
    }

    /// Per-tunnel task: feeds inbound frames through the state machine and
    /// enforces the handshake timeout.
    async fn drive(self, mut inbound: mpsc::UnboundedReceiver<Frame>) {
        let timeout = self.shared.settings.handshake_timeout;
        let deadline = Instant::now() + timeout;

        loop {
            let handshaking = self.state().is_handshaking();

            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = self.handle_frame(frame) {
                            self.close(Some(e));
                        }
                        if self.state() == TunnelState::Closed {
                            break;
                        }
                    }
                    None => {
                        debug!(tunnel = self.id(), "channel closed by peer");
                        self.close(None);
                        break;
                    }
                },
                _ = self.shared.shutdown.notified() => {
                    if self.state() == TunnelState::Closed {
                        break;
                    }
                }
                _ = time::sleep_until(deadline), if handshaking && !timeout.is_zero() => {
                    let state = self.state();
                    if state.is_handshaking() {
                        warn!(tunnel = self.id(), state = %state, "handshake timed out");
                        self.close(Some(TunnelError::HandshakeTimeout(state)));
                    }
                    break;
                }
            }
        }

        debug!(tunnel = self.id(), "tunnel driver ended");
    }

    fn handle_frame(&self, frame: Frame) -> TunnelResult<()> {
        match frame {
            Frame::Text(text) => match decode_control(&text) {
                Ok(msg) => self.handle_control(msg, &text),
                Err(e) => {
                    warn!(tunnel = self.id(), error = %e, "ignoring undecodable control message");
                    Ok(())
                }
            },
            Frame::Binary(data) => {
                let inner = self.shared.lock();
                if inner.state == TunnelState::Relaying {
                    if inner.events_rx.is_some() {
                        // Nobody took the event stream; don't let payload pile up.
                        debug!(tunnel = self.id(), len = data.len(), "no event consumer, payload dropped");
                    } else {
                        inner.emit(TunnelEvent::Data(data));
                    }
                } else {
                    warn!(
                        tunnel = self.id(),
                        state = %inner.state,
                        len = data.len(),
                        "dropping payload received before tunnel opened"
                    );
                }
                Ok(())
            }
        }
    }

    fn handle_control(&self, msg: ServerMessage, raw: &str) -> TunnelResult<()> {
        let mut inner = self.shared.lock();

        match (msg, inner.state) {
            (ServerMessage::Hello { version }, TunnelState::AwaitingHello) => {
                debug!(tunnel = self.id(), ?version, "gateway hello");
                inner.send_control(&ClientMessage::hello(&self.shared.settings.auth_token))?;
                inner.state = TunnelState::AwaitingReady;
            }
            (ServerMessage::Ready, TunnelState::AwaitingReady) => {
                let target = inner.target.clone().ok_or(TunnelError::InvalidState(inner.state))?;
                debug!(tunnel = self.id(), target = %target, "gateway ready, requesting target");
                inner.send_control(&ClientMessage::connect(target.host, target.port))?;
                inner.state = TunnelState::AwaitingConnected;
            }
            (ServerMessage::Connected, TunnelState::AwaitingConnected) => {
                inner.state = TunnelState::Relaying;
                let buffered = mem::take(&mut inner.pending);
                let flushed = buffered.len();
                if !buffered.is_empty() && !inner.send(Outbound::Frame(Frame::Binary(buffered))) {
                    debug!(tunnel = self.id(), "channel writer gone, flush dropped");
                }
                if let Some(tx) = inner.opened_tx.take() {
                    let _ = tx.send(Ok(()));
                }
                inner.emit(TunnelEvent::Opened);
                info!(tunnel = self.id(), flushed, "tunnel open");
            }
            (ServerMessage::Error { details }, state) => {
                drop(inner);
                error!(tunnel = self.id(), state = %state, details = %details, "connection gateway error");
                return Err(TunnelError::Protocol(details));
            }
            (ServerMessage::Unknown, _) => {
                warn!(tunnel = self.id(), message = %raw, "unknown control message");
            }
            (msg, state) => {
                warn!(tunnel = self.id(), ?msg, state = %state, "ignoring out-of-order control message");
            }
        }

        Ok(())
    }
}

async fn settle(opened_rx: oneshot::Receiver<TunnelResult<()>>) -> TunnelResult<()> {
    opened_rx.await.unwrap_or(Err(TunnelError::Closed))
}
