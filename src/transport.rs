//! Outbound transport seam
//!
//! The coordinator hands fully-formed messages to a [`TransportWriter`];
//! encoding and SCTP delivery happen below this crate. Writes are
//! fire-and-forget: nothing at this layer retries or confirms delivery.

use tokio::sync::mpsc;
use tracing::warn;

use crate::messages::M3uaMessage;

/// Best-effort, non-blocking writer for outbound M3UA messages
pub trait TransportWriter: Send + Sync {
    fn write(&self, msg: M3uaMessage);
}

/// Transport writer backed by an unbounded channel, feeding whatever task
/// owns the actual association writer
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<M3uaMessage>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<M3uaMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TransportWriter for ChannelTransport {
    fn write(&self, msg: M3uaMessage) {
        if self.tx.send(msg).is_err() {
            warn!("transport channel closed, dropping outbound message");
        }
    }
}
