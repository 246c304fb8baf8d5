//! Server implementation.
//!
//! Every WebSocket connection gets its own simulation. The simulation runs on
//! a blocking task and feeds a bounded channel; each request command drains
//! one batch from that channel and ships it as a JSON text message.
//!
//! Flow per connection:
//! - handshake
//! - simulation producer starts, blocking once `batch_size` frames are buffered
//! - `REQUEST_FRAMES` -> one batch
//! - producer exhausted -> final partial batch, then close

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use starfield_shared::{
    config::StarfieldConfig,
    net::{encode_batch, Frame, REQUEST_FRAMES},
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::sim::Simulation;

/// Per-connection counters, returned when the connection ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub requests: u64,
    pub batches_sent: u64,
    pub frames_sent: u64,
}

/// Frame server.
pub struct FrameServer {
    pub cfg: StarfieldConfig,
    listener: TcpListener,
}

impl FrameServer {
    /// Binds the listener at `cfg.server_addr`.
    pub async fn bind(cfg: StarfieldConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { cfg, listener })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts exactly one connection and spawns its handler.
    pub async fn accept_one(&self) -> anyhow::Result<JoinHandle<anyhow::Result<ConnectionStats>>> {
        let (stream, peer) = self.listener.accept().await.context("tcp accept")?;
        info!(%peer, "Client connected");
        let cfg = self.cfg.clone();
        Ok(tokio::spawn(serve_connection(stream, peer, cfg)))
    }

    /// Accepts connections forever.
    pub async fn serve(&self) -> anyhow::Result<()> {
        loop {
            let handle = self.accept_one().await?;
            tokio::spawn(async move {
                match handle.await {
                    Ok(Ok(stats)) => info!(?stats, "Connection finished"),
                    Ok(Err(e)) => warn!(error = %e, "Connection failed"),
                    Err(e) => warn!(error = %e, "Connection task panicked"),
                }
            });
        }
    }
}

/// Runs one client connection to completion.
pub async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    cfg: StarfieldConfig,
) -> anyhow::Result<ConnectionStats> {
    let ws = accept_async(stream).await.context("websocket handshake")?;
    let (mut write, mut read) = ws.split();

    let batch_size = cfg.server.batch_size.max(1);
    let (tx, mut rx) = mpsc::channel::<Frame>(batch_size);
    let sim_cfg = cfg.sim.clone();
    let producer = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let sim = Simulation::with_default_bodies(&sim_cfg)?;
        for frame in sim {
            // A diverged step has no JSON form and every later step inherits it.
            if let Err(e) = frame.validate() {
                warn!(error = %e, "Simulation diverged, ending stream");
                break;
            }
            if tx.blocking_send(frame).is_err() {
                // Connection went away.
                break;
            }
        }
        Ok(())
    });
    info!(%peer, batch_size, "Simulation started");

    let mut stats = ConnectionStats::default();
    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!(%peer, error = %e, "WebSocket read failed");
                break;
            }
        };
        match msg {
            Message::Text(text) if text == REQUEST_FRAMES => {
                stats.requests += 1;
                let mut frames = Vec::with_capacity(batch_size);
                while frames.len() < batch_size {
                    match rx.recv().await {
                        Some(f) => frames.push(f),
                        None => break,
                    }
                }
                let exhausted = frames.len() < batch_size;

                if !frames.is_empty() {
                    let payload = encode_batch(&frames)?;
                    write
                        .send(Message::Text(payload))
                        .await
                        .context("send frame batch")?;
                    stats.batches_sent += 1;
                    stats.frames_sent += frames.len() as u64;
                    debug!(%peer, frames = frames.len(), "Responded to client");
                }

                if exhausted {
                    info!(%peer, "Simulation finished, closing connection");
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
            Message::Text(other) => {
                debug!(%peer, command = %other, "Ignoring unknown command");
            }
            Message::Close(frame) => {
                info!(%peer, ?frame, "Client closed connection");
                break;
            }
            _ => {}
        }
    }

    drop(rx);
    match producer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(%peer, error = %e, "Simulation setup failed"),
        Err(e) => warn!(%peer, error = %e, "Simulation task failed"),
    }
    Ok(stats)
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(
    mut cfg: StarfieldConfig,
) -> anyhow::Result<(FrameServer, StarfieldConfig)> {
    cfg.server_addr = format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let server = FrameServer::bind(cfg).await?;
    let addr = server.local_addr()?;
    let mut cfg = server.cfg.clone();
    cfg.server_addr = addr.to_string();
    Ok((server, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use starfield_shared::net::decode_batch;
    use tokio_tungstenite::connect_async;

    fn small_cfg() -> StarfieldConfig {
        let mut cfg = StarfieldConfig::default();
        cfg.server.batch_size = 4;
        cfg.sim.max_steps = 6;
        cfg
    }

    #[tokio::test]
    async fn request_yields_one_batch_then_partial_then_close() -> anyhow::Result<()> {
        let (server, cfg) = bind_ephemeral(small_cfg()).await?;
        let accept = tokio::spawn(async move { server.accept_one().await?.await? });

        let (mut ws, _) = connect_async(cfg.ws_url()).await?;

        ws.send(Message::Text(REQUEST_FRAMES.to_string())).await?;
        let first = match ws.next().await {
            Some(Ok(Message::Text(t))) => decode_batch(&t)?,
            other => anyhow::bail!("expected frame batch, got {other:?}"),
        };
        assert_eq!(first.len(), 4);
        assert!(first.iter().all(|f| f.len() == 5));

        ws.send(Message::Text(REQUEST_FRAMES.to_string())).await?;
        let second = match ws.next().await {
            Some(Ok(Message::Text(t))) => decode_batch(&t)?,
            other => anyhow::bail!("expected frame batch, got {other:?}"),
        };
        assert_eq!(second.len(), 2);

        let stats = accept.await??;
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.frames_sent, 6);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_commands_are_ignored() -> anyhow::Result<()> {
        let (server, cfg) = bind_ephemeral(small_cfg()).await?;
        let accept = tokio::spawn(async move { server.accept_one().await?.await? });

        let (mut ws, _) = connect_async(cfg.ws_url()).await?;
        ws.send(Message::Text("hello".to_string())).await?;
        ws.send(Message::Text(REQUEST_FRAMES.to_string())).await?;
        match ws.next().await {
            Some(Ok(Message::Text(t))) => assert_eq!(decode_batch(&t)?.len(), 4),
            other => anyhow::bail!("expected frame batch, got {other:?}"),
        }
        ws.close(None).await?;

        let stats = accept.await??;
        assert_eq!(stats.requests, 1);
        Ok(())
    }

    #[tokio::test]
    async fn diverged_simulation_closes_without_sending_bad_frames() -> anyhow::Result<()> {
        let mut cfg = small_cfg();
        cfg.sim.g = f64::NAN;
        let (server, cfg) = bind_ephemeral(cfg).await?;
        let accept = tokio::spawn(async move { server.accept_one().await?.await? });

        let (mut ws, _) = connect_async(cfg.ws_url()).await?;
        ws.send(Message::Text(REQUEST_FRAMES.to_string())).await?;
        match ws.next().await {
            Some(Ok(Message::Close(_))) | None => {}
            other => anyhow::bail!("expected close, got {other:?}"),
        }

        let stats = accept.await??;
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.batches_sent, 0);
        assert_eq!(stats.frames_sent, 0);
        Ok(())
    }
}
