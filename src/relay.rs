//! WebSocket relay that bridges broadcast hubs across processes.
//!
//! Each link forwards hub traffic to the socket and socket traffic into the
//! hub, tagging inbound envelopes with the link id so they are not echoed
//! back. Links must form a tree (e.g. a star around one listening relay).

use crate::broadcast::{BroadcastHub, Envelope};
use crate::error::{AppError, AppResult};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Bridges one hub to remote relays
#[derive(Clone)]
pub struct WsRelay {
    hub: BroadcastHub,
}

impl WsRelay {
    pub fn new(hub: BroadcastHub) -> Self {
        Self { hub }
    }

    /// Accept relay links until the listener fails
    pub async fn serve(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New relay link from {}", addr);
                    let relay = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = relay.handle_connection(stream).await {
                            error!("Relay link error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Relay accept error: {}", e);
                }
            }
        }
    }

    /// Upgrade an accepted TCP stream and pump it until either side closes
    pub async fn handle_connection(&self, stream: TcpStream) -> AppResult<()> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| AppError::ExternalService(format!("WebSocket handshake failed: {}", e)))?;
        pump(self.hub.clone(), ws_stream).await;
        Ok(())
    }

    /// Dial a remote relay and pump the link in the background
    pub async fn connect(&self, url: &str) -> AppResult<tokio::task::JoinHandle<()>> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| AppError::ExternalService(format!("Relay connect to {} failed: {}", url, e)))?;
        info!("Connected to relay {}", url);

        let hub = self.hub.clone();
        Ok(tokio::spawn(pump(hub, ws_stream)))
    }
}

async fn pump<S>(hub: BroadcastHub, ws_stream: WebSocketStream<S>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let link_id = Uuid::new_v4();
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut outbound = hub.subscribe();

    debug!("Relay link {} up", link_id);

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<Envelope>(&text) {
                        Ok(mut envelope) => {
                            envelope.relayed_by = Some(link_id);
                            hub.publish(envelope);
                        }
                        Err(e) => warn!("Dropping malformed relay message: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Relay link {} closed", link_id);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Relay link {} error: {}", link_id, e);
                    break;
                }
            },
            outgoing = outbound.recv() => match outgoing {
                Ok(envelope) if envelope.relayed_by == Some(link_id) => {}
                Ok(envelope) => {
                    let json = match serde_json::to_string(&envelope) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize relay message: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = ws_sender.send(Message::Text(json)).await {
                        error!("Failed to send on relay link {}: {}", link_id, e);
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Relay link {} lagged, {} messages lost", link_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}
