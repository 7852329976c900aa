//! Abstract channel traits for gatelink.
//!
//! A tunnel talks to its gateway through a pair of queues: frames it wants
//! sent go into `outbound`, frames the peer sent come out of `inbound`.
//! The inbound queue ending means the channel closed.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::codec::Frame;
use crate::error::TunnelResult;

/// Boxed future returned by the object-safe traits in this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Instruction for the channel's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send a frame.
    Frame(Frame),
    /// Close the channel. Nothing queued after this is sent.
    Close,
}

/// The two ends of a connected channel, as seen by its owner.
#[derive(Debug)]
pub struct ChannelHalves {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::UnboundedReceiver<Frame>,
}

/// Opens channels to gateway URLs.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, TunnelResult<ChannelHalves>>;
}
