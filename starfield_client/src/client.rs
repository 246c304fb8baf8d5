//! Client implementation.
//!
//! The client maintains:
//! - One frame transport (WebSocket in production)
//! - The session state machine (queue, animator, camera, request token)
//! - Three clocks: request polling, display refresh, and the session deadline
//!
//! The run loop turns each clock tick or socket message into a
//! [`SessionEvent`] and executes whatever the session asks for.

use starfield_shared::{
    config::{ClientConfig, StarfieldConfig},
    net::decode_batch,
    render::SceneBackend,
};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    session::{CloseReason, Session, SessionAction, SessionEvent, SessionStats},
    transport::{FrameTransport, WsTransport},
};

/// High-level viewer client.
pub struct FrameClient<T: FrameTransport> {
    transport: T,
    session: Session,
    cfg: ClientConfig,
}

impl FrameClient<WsTransport> {
    /// Connects to the configured frame server.
    pub async fn connect(cfg: &StarfieldConfig) -> anyhow::Result<Self> {
        let transport = WsTransport::connect(&cfg.ws_url()).await?;
        Ok(Self::new(transport, cfg.client.clone()))
    }
}

impl<T: FrameTransport> FrameClient<T> {
    pub fn new(transport: T, cfg: ClientConfig) -> Self {
        Self {
            transport,
            session: Session::new(cfg.clone()),
            cfg,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Forwards a window input event (keys, pointer) to the session.
    pub fn handle_input<S: SceneBackend>(&mut self, event: SessionEvent, scene: &mut S) {
        let actions = self.session.handle(event, scene);
        debug_assert!(actions.is_empty(), "input produced actions: {actions:?}");
    }

    /// Runs until the connection has closed and every buffered frame has been
    /// shown.
    pub async fn run<S: SceneBackend>(&mut self, scene: &mut S) -> anyhow::Result<SessionStats> {
        let mut poll = time::interval(self.cfg.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut refresh = time::interval(self.cfg.frame_interval());
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let deadline = time::sleep(self.cfg.session_timeout());
        tokio::pin!(deadline);

        self.dispatch(SessionEvent::Connected, scene).await;

        while !self.session.is_finished() {
            tokio::select! {
                _ = poll.tick(), if self.session.is_open() => {
                    self.dispatch(SessionEvent::PollTick, scene).await;
                }
                _ = refresh.tick() => {
                    self.dispatch(SessionEvent::FrameTick, scene).await;
                }
                _ = &mut deadline, if self.session.is_open() => {
                    self.dispatch(SessionEvent::Closed(CloseReason::Timeout), scene).await;
                }
                msg = self.transport.recv(), if self.session.is_open() => {
                    self.on_message(msg, scene).await?;
                }
            }
        }

        let stats = self.session.stats().clone();
        info!(?stats, "Session finished");
        Ok(stats)
    }

    async fn on_message<S: SceneBackend>(
        &mut self,
        msg: anyhow::Result<Option<String>>,
        scene: &mut S,
    ) -> anyhow::Result<()> {
        match msg {
            Ok(Some(text)) => {
                let frames = decode_batch(&text)?;
                let token = self.session.in_flight();
                debug!(frames = frames.len(), ?token, "Frame batch received");
                self.dispatch(SessionEvent::FramesReceived { token, frames }, scene).await;
            }
            Ok(None) => {
                self.dispatch(SessionEvent::Closed(CloseReason::Remote), scene).await;
            }
            Err(e) => {
                warn!(error = %e, "Connection failed");
                self.dispatch(SessionEvent::Closed(CloseReason::Error), scene).await;
            }
        }
        Ok(())
    }

    async fn dispatch<S: SceneBackend>(&mut self, event: SessionEvent, scene: &mut S) {
        for action in self.session.handle(event, scene) {
            match action {
                SessionAction::SendRequest(token) => {
                    if let Err(e) = self.transport.send_request().await {
                        warn!(token = token.0, error = %e, "Request failed");
                        self.session.handle(SessionEvent::Closed(CloseReason::Error), scene);
                    }
                }
                SessionAction::StartAnimation => debug!("Animation started"),
                SessionAction::CloseConnection => {
                    if let Err(e) = self.transport.close().await {
                        debug!(error = %e, "Close failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use starfield_shared::{
        math::Vec3,
        net::{encode_batch, EntityKey, Frame},
        render::HeadlessScene,
    };
    use tokio::sync::mpsc;

    /// In-memory transport: requests go out on one channel, payloads come in
    /// on another.
    struct ChannelTransport {
        requests: mpsc::UnboundedSender<()>,
        incoming: mpsc::UnboundedReceiver<String>,
        closed: bool,
    }

    #[async_trait]
    impl FrameTransport for ChannelTransport {
        async fn send_request(&mut self) -> anyhow::Result<()> {
            self.requests.send(()).map_err(|_| anyhow::anyhow!("peer gone"))
        }

        async fn recv(&mut self) -> anyhow::Result<Option<String>> {
            Ok(self.incoming.recv().await)
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    fn fast_cfg(timeout_secs: u64) -> ClientConfig {
        ClientConfig {
            poll_interval_ms: 2,
            frame_hz: 500,
            session_timeout_secs: timeout_secs,
            ..Default::default()
        }
    }

    fn batch(step: usize, n: usize) -> String {
        let frames: Vec<Frame> = (0..n)
            .map(|i| {
                let x = (step * n + i) as f64;
                Frame::from_entities([
                    (EntityKey::from(1u16), Vec3::new(x, 0.0, 0.0)),
                    (EntityKey::from(2u16), Vec3::new(0.0, x, 0.0)),
                ])
            })
            .collect();
        encode_batch(&frames).unwrap()
    }

    #[tokio::test]
    async fn server_close_drains_queue_and_finishes() -> anyhow::Result<()> {
        let (req_tx, mut req_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport {
            requests: req_tx,
            incoming: msg_rx,
            closed: false,
        };

        // Answer three requests, then hang up.
        tokio::spawn(async move {
            for step in 0..3 {
                if req_rx.recv().await.is_none() {
                    return;
                }
                if msg_tx.send(batch(step, 5)).is_err() {
                    return;
                }
            }
        });

        let mut client = FrameClient::new(transport, fast_cfg(30));
        let mut scene = HeadlessScene::new();
        let stats = time::timeout(std::time::Duration::from_secs(10), client.run(&mut scene))
            .await??;

        assert_eq!(stats.frames_received, 15);
        assert_eq!(stats.frames_rendered, 15);
        assert_eq!(stats.frames_rejected, 0);
        assert_eq!(client.session().animator().entities().len(), 2);
        let last = client.session().animator().entity("1").unwrap().position;
        assert_eq!(last, Vec3::new(14.0, 0.0, 0.0));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error() {
        let (req_tx, mut req_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport {
            requests: req_tx,
            incoming: msg_rx,
            closed: false,
        };
        tokio::spawn(async move {
            if req_rx.recv().await.is_some() {
                let _ = msg_tx.send("{not json".to_string());
            }
            // Keep the channel open so only the payload can end the run.
            std::future::pending::<()>().await;
        });

        let mut client = FrameClient::new(transport, fast_cfg(30));
        let mut scene = HeadlessScene::new();
        let err = client.run(&mut scene).await.unwrap_err();
        assert!(err.to_string().contains("decode frame batch"));
    }

    #[tokio::test]
    async fn timeout_closes_silent_connection() -> anyhow::Result<()> {
        let (req_tx, _req_rx) = mpsc::unbounded_channel();
        let (_msg_tx, msg_rx) = mpsc::unbounded_channel::<String>();
        let transport = ChannelTransport {
            requests: req_tx,
            incoming: msg_rx,
            closed: false,
        };

        let mut client = FrameClient::new(transport, fast_cfg(1));
        let mut scene = HeadlessScene::new();
        let stats = time::timeout(std::time::Duration::from_secs(10), client.run(&mut scene))
            .await??;

        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.frames_rendered, 0);
        assert!(client.transport.closed);
        Ok(())
    }
}
