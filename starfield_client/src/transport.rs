//! Transport seam.
//!
//! The driver only needs three things from a connection: send the request
//! command, receive the next text payload, and close. [`WsTransport`] does
//! that over a WebSocket; tests can swap in an in-memory implementation.

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use starfield_shared::net::REQUEST_FRAMES;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

#[async_trait]
pub trait FrameTransport: Send {
    /// Sends one request command.
    async fn send_request(&mut self) -> anyhow::Result<()>;

    /// Next text payload, or `None` once the peer has closed.
    ///
    /// Must be cancel-safe: the driver polls it inside `select!`.
    async fn recv(&mut self) -> anyhow::Result<Option<String>>;

    async fn close(&mut self) -> anyhow::Result<()>;
}

/// WebSocket connection to a frame server.
pub struct WsTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        info!(%url, "Connecting to frame server");
        let (ws, _response) = connect_async(url)
            .await
            .with_context(|| format!("websocket connect {url}"))?;
        Ok(Self { ws })
    }
}

#[async_trait]
impl FrameTransport for WsTransport {
    async fn send_request(&mut self) -> anyhow::Result<()> {
        self.ws
            .send(Message::Text(REQUEST_FRAMES.to_string()))
            .await
            .context("send frame request")
    }

    async fn recv(&mut self) -> anyhow::Result<Option<String>> {
        while let Some(msg) = self.ws.next().await {
            match msg.context("websocket read")? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Close(frame) => {
                    debug!(?frame, "Server closed connection");
                    return Ok(None);
                }
                other => debug!(?other, "Ignoring non-text message"),
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.ws.close(None).await.context("websocket close")
    }
}
