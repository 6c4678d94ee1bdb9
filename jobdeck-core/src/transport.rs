use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::protocol::ClientFrame;

/// Events delivered by a transport to the session loop
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// The channel is (re)established. The session re-issues its active
    /// subscriptions on every occurrence; subscribe is idempotent and
    /// self-contained, so this is safe after any number of reconnects.
    Connected,
    /// One raw inbound frame. Decoding happens at the dispatch boundary,
    /// not here, so one malformed frame cannot take down the connection.
    Frame(String),
    /// The channel dropped; the transport will try to re-establish it.
    Disconnected,
}

/// Sending half handed to the synchronization layer.
///
/// Sends are fire-and-forget: no acknowledgement is awaited, and a frame
/// sent while the channel is down is simply lost. The protocol tolerates
/// this because a fresh subscribe always carries the full resume state.
#[derive(Clone, Debug)]
pub struct TransportHandle {
    tx: mpsc::UnboundedSender<ClientFrame>,
}

impl TransportHandle {
    pub fn send(&self, frame: ClientFrame) {
        let _ = self.tx.send(frame);
    }
}

/// Create the outbound channel pair: a handle for the session and the
/// receiver the transport drains in its run loop.
pub fn transport_channel() -> (TransportHandle, mpsc::UnboundedReceiver<ClientFrame>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TransportHandle { tx }, rx)
}

/// The Transport trait defines a pluggable duplex channel backend.
///
/// Implementations:
/// - `WsTransport`: a real WebSocket connection with reconnect
/// - `FakeServer`: a scripted in-process server for demos/testing
///
/// All transports communicate via channels:
/// - Drain outbound frames from `outbound_rx`
/// - Deliver inbound events via `inbound_tx`
#[async_trait]
pub trait Transport: Send {
    /// Run the transport's main loop.
    ///
    /// This method should:
    /// 1. Establish the channel and emit `Connected`
    /// 2. Forward frames from `outbound_rx` to the server
    /// 3. Deliver inbound frames as `TransportEvent::Frame`
    /// 4. Emit `Disconnected` and re-establish on failure
    /// 5. Return when `outbound_rx` closes
    async fn run(
        &mut self,
        outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
        inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    );

    /// Get the name of this transport implementation
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StreamKind;

    #[test]
    fn test_handle_is_fire_and_forget() {
        let (handle, mut rx) = transport_channel();
        handle.send(ClientFrame::Unsubscribe {
            kind: StreamKind::Log,
            job_id: "j".into(),
        });
        assert!(rx.try_recv().is_ok());

        // dropping the receiver must not make sends panic
        drop(rx);
        handle.send(ClientFrame::Unsubscribe {
            kind: StreamKind::Log,
            job_id: "j".into(),
        });
    }
}
