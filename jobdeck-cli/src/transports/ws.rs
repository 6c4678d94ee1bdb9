//! WebSocket transport: the live duplex channel to the panel server.
//!
//! Maintains a persistent connection with exponential-backoff reconnect.
//! Frames are JSON text messages. The synchronization layer never sees the
//! socket: it gets `Connected`/`Frame`/`Disconnected` events and re-issues
//! its subscriptions on every `Connected`, so a reconnect here needs no
//! coordination beyond emitting the events in order.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use jobdeck_core::protocol::ClientFrame;
use jobdeck_core::transport::{Transport, TransportEvent};

pub struct WsTransport {
    url: String,
    min_backoff: Duration,
    max_backoff: Duration,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, min_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            url: url.into(),
            min_backoff,
            max_backoff,
        }
    }
}

/// Why a live connection ended
enum Disconnect {
    /// The session dropped its handle; stop for good
    SessionClosed,
    /// Socket error or server close; reconnect
    ChannelLost,
}

#[async_trait]
impl Transport for WsTransport {
    fn name(&self) -> &'static str {
        "ws"
    }

    async fn run(
        &mut self,
        mut outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
        inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    ) {
        let mut delay = self.min_backoff;

        loop {
            info!("connecting to {}", self.url);
            match connect_async(self.url.as_str()).await {
                Ok((ws_stream, _response)) => {
                    delay = self.min_backoff;
                    let _ = inbound_tx.send(TransportEvent::Connected);

                    match pump(ws_stream, &mut outbound_rx, &inbound_tx).await {
                        Disconnect::SessionClosed => return,
                        Disconnect::ChannelLost => {
                            let _ = inbound_tx.send(TransportEvent::Disconnected);
                        }
                    }
                }
                Err(err) => {
                    warn!("connect failed: {}, retrying in {:?}", err, delay);
                }
            }

            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.max_backoff);
        }
    }
}

/// Forward frames both ways until either side goes away
async fn pump(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    outbound_rx: &mut mpsc::UnboundedReceiver<ClientFrame>,
    inbound_tx: &mpsc::UnboundedSender<TransportEvent>,
) -> Disconnect {
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            maybe_frame = outbound_rx.recv() => {
                let Some(frame) = maybe_frame else {
                    let _ = sink.send(Message::Close(None)).await;
                    return Disconnect::SessionClosed;
                };
                let json = match frame.to_json() {
                    Ok(json) => json,
                    Err(err) => {
                        warn!("skipping unserializable frame: {}", err);
                        continue;
                    }
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    return Disconnect::ChannelLost;
                }
            }

            maybe_msg = stream.next() => {
                match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = inbound_tx.send(TransportEvent::Frame(text));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            return Disconnect::ChannelLost;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Disconnect::ChannelLost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("socket error: {}", err);
                        return Disconnect::ChannelLost;
                    }
                }
            }
        }
    }
}
